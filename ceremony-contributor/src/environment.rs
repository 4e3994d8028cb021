use crate::tasks::DEFAULT_MAX_CONCURRENCY;

use std::{path::PathBuf, str::FromStr, time::Duration};
use url::Url;

/// Size of every part of a multi-part upload.
pub const DEFAULT_CHUNK_SIZE: usize = 25 * 1024 * 1024;

/// The execution ceiling of the verification function.
const VERIFICATION_CEILING: Duration = Duration::from_secs(60 * 60);
const VERIFICATION_BUFFER: Duration = Duration::from_secs(1);
const VERIFICATION_GRACE: Duration = Duration::from_secs(5 * 60);

const DELAY_AFTER_DOWNLOAD: Duration = Duration::from_secs(10);
const DELAY_AFTER_COMPUTATION: Duration = Duration::from_secs(5);
const DELAY_AFTER_STEP: Duration = Duration::from_secs(1);
const DELAY_POLL_DOCUMENT: Duration = Duration::from_secs(5);

/// Circuits above this many constraints are too large to contribute to comfortably.
const MAX_CONSTRAINTS: u64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentKind {
    Development,
    Production,
}

impl EnvironmentKind {
    /// The names accepted by `from_str`.
    pub fn variants() -> &'static [&'static str] {
        &["development", "production"]
    }
}

impl FromStr for EnvironmentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" => Ok(EnvironmentKind::Development),
            "production" => Ok(EnvironmentKind::Production),
            _ => Err(format!("Unknown environment: {}", s)),
        }
    }
}

///
/// The settings of a contribution: where the coordinator lives,
/// how artifacts are transferred and how long to wait for the
/// coordinator to propagate its state changes.
///
#[derive(Debug, Clone)]
pub struct Environment {
    pub kind: EnvironmentKind,
    /// Base url of the callable functions, ending with a slash.
    pub functions_url: Url,
    /// Direct url of the verification function.
    pub verify_contribution_url: Url,
    /// Base url of the document gateway, ending with a slash.
    pub store_url: Url,
    pub aws_region: String,
    pub bucket_postfix: String,
    pub chunk_size: usize,
    pub max_concurrency: usize,
    pub delay_after_download: Duration,
    pub delay_after_computation: Duration,
    pub delay_after_step: Duration,
    pub poll_interval: Duration,
    pub verification_ceiling: Duration,
    pub verification_buffer: Duration,
    pub verification_grace: Duration,
    pub max_constraints: u64,
    pub output_directory: PathBuf,
}

impl Environment {
    /// A coordinator running on the local emulators.
    pub fn development() -> Self {
        let functions_url = parse_url("http://localhost:5001/ceremony-development/us-central1/");
        Self {
            kind: EnvironmentKind::Development,
            verify_contribution_url: join_url(&functions_url, "verifycontribution"),
            functions_url,
            store_url: parse_url("http://localhost:8080/v1/projects/ceremony-development/documents/"),
            aws_region: "us-east-1".to_string(),
            bucket_postfix: "-ph2-ceremony".to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            delay_after_download: DELAY_AFTER_STEP,
            delay_after_computation: DELAY_AFTER_STEP,
            delay_after_step: DELAY_AFTER_STEP,
            poll_interval: DELAY_POLL_DOCUMENT,
            verification_ceiling: VERIFICATION_CEILING,
            verification_buffer: VERIFICATION_BUFFER,
            verification_grace: VERIFICATION_GRACE,
            max_constraints: MAX_CONSTRAINTS,
            output_directory: PathBuf::from("ceremony-contributor"),
        }
    }

    /// A coordinator deployed under the given project.
    pub fn production(project_id: &str) -> Self {
        let functions_url = parse_url(&format!("https://us-central1-{}.cloudfunctions.net/", project_id));
        Self {
            kind: EnvironmentKind::Production,
            verify_contribution_url: join_url(&functions_url, "verifycontribution"),
            store_url: join_url(&functions_url, "documents/"),
            functions_url,
            delay_after_download: DELAY_AFTER_DOWNLOAD,
            delay_after_computation: DELAY_AFTER_COMPUTATION,
            ..Self::development()
        }
    }

    /// Time before the verification fallback starts listening to the circuit.
    pub fn verification_fallback_delay(&self) -> Duration {
        self.verification_ceiling
            .checked_sub(self.verification_buffer)
            .unwrap_or_default()
    }

    /// An environment without propagation delays, for tests.
    #[cfg(test)]
    pub fn test(output_directory: PathBuf) -> Self {
        Self {
            chunk_size: 4,
            delay_after_download: Duration::from_millis(0),
            delay_after_computation: Duration::from_millis(0),
            delay_after_step: Duration::from_millis(0),
            poll_interval: Duration::from_millis(10),
            verification_ceiling: Duration::from_secs(5),
            verification_grace: Duration::from_millis(500),
            output_directory,
            ..Self::development()
        }
    }
}

fn parse_url(text: &str) -> Url {
    Url::parse(text).unwrap_or_else(|_| panic!("Failed to parse built-in url: {}", text))
}

fn join_url(base: &Url, path: &str) -> Url {
    base.join(path)
        .unwrap_or_else(|_| panic!("Failed to join built-in url {} with {}", base, path))
}
