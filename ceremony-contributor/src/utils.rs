use ceremony_shared::structures::format_zkey_index;

use blake2::{Blake2b, Digest};
use fs_err::{create_dir_all, read, remove_file, write};
use std::path::Path;

pub fn remove_file_if_exists(file_path: &Path) -> std::io::Result<()> {
    if file_path.exists() {
        remove_file(file_path)?;
    }
    Ok(())
}

/// Returns the file contents, or `None` if the file does not exist.
pub fn read_from_file(file_path: &Path) -> std::io::Result<Option<Vec<u8>>> {
    if !file_path.exists() {
        return Ok(None);
    }
    read(file_path).map(Some)
}

///
/// This function writes `file_bytes` to the `file_path`.
///
/// If a parent directory doesn't already exists, this function will
/// automatically generate one.
///
pub fn write_to_file(file_path: &Path, file_bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = file_path.parent() {
        create_dir_all(parent)?;
    }
    remove_file_if_exists(file_path)?;
    write(file_path, file_bytes)
}

/// Returns the name of the bucket storing the artifacts of a ceremony.
pub fn get_bucket_name(ceremony_prefix: &str, bucket_postfix: &str) -> String {
    format!("{}{}", ceremony_prefix, bucket_postfix)
}

/// Returns the filename of the zkey of a circuit at the given progress.
pub fn zkey_filename(circuit_prefix: &str, progress: u64) -> String {
    format!("{}_{}.zkey", circuit_prefix, format_zkey_index(progress))
}

/// Returns the storage path of a circuit zkey inside the ceremony bucket.
pub fn get_zkey_storage_path(circuit_prefix: &str, filename: &str) -> String {
    format!("circuits/{}/contributions/{}", circuit_prefix, filename)
}

/// Returns the public url of an object in a ceremony bucket.
pub fn get_public_object_url(bucket: &str, region: &str, key: &str) -> String {
    format!("https://{}.s3.{}.amazonaws.com/{}", bucket, region, key)
}

pub fn calculate_hash(input_map: &[u8]) -> Vec<u8> {
    let chunk_size = 1 << 30;
    let mut hasher = Blake2b::default();
    for chunk in input_map.chunks(chunk_size) {
        hasher.update(&chunk);
    }
    hasher.finalize().to_vec()
}

///
/// Formats a hash as four lines of four big-endian words,
/// preceded by the given title.
///
pub fn format_hash(hash: &[u8], title: &str) -> String {
    let lines = hash
        .chunks(16)
        .take(4)
        .map(|line| {
            let words = line.chunks(4).map(hex::encode).collect::<Vec<_>>().join(" ");
            format!("\t\t{}", words)
        })
        .collect::<Vec<_>>()
        .join("\n");

    if title.is_empty() {
        lines
    } else {
        format!("{}\n{}", title, lines)
    }
}

/// Returns a pretty print of the given hash bytes for logging.
pub fn pretty_hash(input: &[u8]) -> String {
    let mut output = format!("\n\n");
    for line in input.chunks(16) {
        output += "\t";
        for section in line.chunks(4) {
            output += &hex::encode(section);
            output += " ";
        }
        output += "\n";
    }
    output
}

/// Milliseconds since the unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
