//! In-process stand-ins for the coordinator, the object storage and GitHub.

use crate::{
    attestation::GistPublisher,
    commands::ContributionComputer,
    directory::{ceremony_path, circuit_path, circuits_path, contributions_path, participant_path},
    errors::{AttestationError, ContributeError, FunctionError, TransferError},
    functions::*,
    store::MemoryDocumentStore,
    transfer::{DownloadStream, ObjectTransport},
};

use ceremony_shared::structures::{
    format_zkey_index,
    AvgTimings,
    Circuit,
    CircuitFiles,
    CircuitMetadata,
    ContributionStep,
    ETagWithPartNumber,
    Participant,
    ParticipantContribution,
    ParticipantStatus,
    TempContributionData,
    WaitingQueue,
};

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use secrecy::SecretString;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};
use tokio::sync::Notify;

pub const TEST_CEREMONY_ID: &str = "ceremony-1";
pub const TEST_PARTICIPANT_ID: &str = "participant-1";
pub const FAKE_GIST_URL: &str = "https://gist.github.com/alice/0123456789abcdef";

lazy_static! {
    static ref TEST_ROOT: PathBuf =
        std::env::temp_dir().join(format!("ceremony-contributor-tests-{}", std::process::id()));
}

/// Returns an empty directory dedicated to the named test.
pub fn test_output_directory(name: &str) -> PathBuf {
    let directory = TEST_ROOT.join(name);
    let _ = fs_err::remove_dir_all(&directory);
    fs_err::create_dir_all(&directory).expect("Should have created the test directory");
    directory
}

pub fn test_circuit_id(sequence_position: u64) -> String {
    format!("circuit-id-{}", sequence_position)
}

pub fn test_circuit(sequence_position: u64) -> Circuit {
    Circuit {
        name: format!("Circuit {}", sequence_position),
        description: String::new(),
        prefix: format!("circuit-{}", sequence_position),
        sequence_position,
        waiting_queue: Some(WaitingQueue::default()),
        avg_timings: AvgTimings::default(),
        files: CircuitFiles::default(),
        metadata: CircuitMetadata {
            constraints: Some(sequence_position * 1000),
            ..CircuitMetadata::default()
        },
        zkey_size_in_bytes: None,
        dynamic_threshold: None,
        fixed_time_window: None,
        last_updated: None,
    }
}

/// Stores a ceremony with `circuits` circuits, numbered from 1.
pub fn seed_ceremony(store: &MemoryDocumentStore, circuits: u64) {
    store.set_document(
        &ceremony_path(TEST_CEREMONY_ID),
        json!({
            "title": "Test Ceremony",
            "description": "A ceremony for tests",
            "prefix": "test-ceremony",
            "startDate": 0,
            "endDate": 4_102_444_800_000i64,
            "state": "OPENED",
            "type": "PHASE2",
            "timeoutMechanismType": "DYNAMIC",
            "penalty": 10,
            "coordinatorId": "coordinator"
        }),
    );
    for sequence_position in 1..=circuits {
        store.set_document(
            &circuit_path(TEST_CEREMONY_ID, &test_circuit_id(sequence_position)),
            to_value(&test_circuit(sequence_position)),
        );
    }
}

pub fn seed_participant(store: &MemoryDocumentStore, participant: serde_json::Value) {
    store.set_document(&participant_path(TEST_CEREMONY_ID, TEST_PARTICIPANT_ID), participant);
}

/// Stores a verified contribution to the circuit at `sequence_position`.
pub fn seed_contribution(
    store: &MemoryDocumentStore,
    sequence_position: u64,
    document_id: &str,
    participant_id: &str,
    zkey_index: u64,
    valid: bool,
) {
    store.set_document(
        &format!(
            "{}/{}",
            contributions_path(TEST_CEREMONY_ID, &test_circuit_id(sequence_position)),
            document_id
        ),
        json!({
            "participantId": participant_id,
            "contributionComputationTime": 10,
            "verificationComputationTime": 5,
            "zkeyIndex": format_zkey_index(zkey_index),
            "valid": valid
        }),
    );
}

pub fn seed_waiting_queue(
    store: &MemoryDocumentStore,
    sequence_position: u64,
    contributors: &[&str],
    current_contributor: &str,
    completed_contributions: u64,
) {
    let path = circuit_path(TEST_CEREMONY_ID, &test_circuit_id(sequence_position));
    let mut circuit = read::<Circuit>(store, &path);
    circuit.waiting_queue = Some(WaitingQueue {
        contributors: contributors.iter().map(|contributor| contributor.to_string()).collect(),
        current_contributor: current_contributor.to_string(),
        completed_contributions,
        failed_contributions: 0,
    });
    store.set_document(&path, to_value(&circuit));
}

fn read<T: DeserializeOwned>(store: &MemoryDocumentStore, path: &str) -> T {
    let document = store
        .document(path)
        .unwrap_or_else(|| panic!("Document {} should exist", path));
    serde_json::from_value(document).expect("Should have decoded the document")
}

fn to_value<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).expect("Should have encoded the document")
}

#[derive(Default)]
struct Recorded {
    calls: Vec<String>,
    stored_chunks: Vec<ETagWithPartNumber>,
    completed_parts: Vec<ETagWithPartNumber>,
    stored_hashes: Vec<String>,
    computation_time: u64,
}

///
/// A coordinator recording every call. A passive coordinator changes no
/// documents, an active one moves the participant through its statuses and
/// steps the way the real coordinator does.
///
pub struct FakeCoordinator {
    store: Option<Arc<MemoryDocumentStore>>,
    eligible: bool,
    hang_verification: bool,
    recorded: Mutex<Recorded>,
    called: Notify,
}

impl FakeCoordinator {
    pub fn passive() -> Self {
        Self {
            store: None,
            eligible: true,
            hang_verification: false,
            recorded: Mutex::new(Recorded::default()),
            called: Notify::new(),
        }
    }

    pub fn active(store: Arc<MemoryDocumentStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::passive()
        }
    }

    pub fn ineligible(mut self) -> Self {
        self.eligible = false;
        self
    }

    /// Never answers verification requests.
    pub fn hanging_verification(mut self) -> Self {
        self.hang_verification = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.recorded().calls.clone()
    }

    pub fn stored_chunks(&self) -> Vec<ETagWithPartNumber> {
        self.recorded().stored_chunks.clone()
    }

    pub fn completed_parts(&self) -> Vec<ETagWithPartNumber> {
        self.recorded().completed_parts.clone()
    }

    pub fn stored_hashes(&self) -> Vec<String> {
        self.recorded().stored_hashes.clone()
    }

    /// Waits until the function was called at least once.
    pub async fn wait_for_call(&self, function: &str) {
        loop {
            let called = self.called.notified();
            if self.calls().iter().any(|call| call == function) {
                return;
            }
            called.await;
        }
    }

    fn recorded(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.recorded.lock().expect("Should have locked the recorded calls")
    }

    fn record(&self, function: &str) {
        self.recorded().calls.push(function.to_string());
        self.called.notify_one();
    }

    fn update_participant<F: FnOnce(&mut Participant)>(&self, ceremony_id: &str, update: F) {
        if let Some(store) = &self.store {
            let path = participant_path(ceremony_id, TEST_PARTICIPANT_ID);
            let mut participant = read::<Participant>(store, &path);
            update(&mut participant);
            store.set_document(&path, to_value(&participant));
        }
    }

    fn update_circuit<F: FnOnce(&mut Circuit)>(&self, ceremony_id: &str, sequence_position: u64, update: F) {
        if let Some(store) = &self.store {
            let path = circuit_path(ceremony_id, &test_circuit_id(sequence_position));
            let mut circuit = read::<Circuit>(store, &path);
            update(&mut circuit);
            store.set_document(&path, to_value(&circuit));
        }
    }

    fn circuit_count(&self, ceremony_id: &str) -> u64 {
        self.store
            .as_ref()
            .map(|store| {
                (1..)
                    .take_while(|sequence_position| {
                        store
                            .document(&circuit_path(ceremony_id, &test_circuit_id(*sequence_position)))
                            .is_some()
                    })
                    .count() as u64
            })
            .unwrap_or(0)
    }

    fn current_participant(&self, ceremony_id: &str) -> Option<Participant> {
        self.store
            .as_ref()
            .map(|store| read::<Participant>(store, &participant_path(ceremony_id, TEST_PARTICIPANT_ID)))
    }
}

#[async_trait::async_trait]
impl CeremonyFunctions for FakeCoordinator {
    async fn check_participant_for_ceremony(&self, _ceremony_id: &str) -> Result<bool, FunctionError> {
        self.record(CHECK_PARTICIPANT_FOR_CEREMONY);
        Ok(self.eligible)
    }

    async fn progress_to_next_circuit_for_contribution(&self, ceremony_id: &str) -> Result<(), FunctionError> {
        let progress = self
            .current_participant(ceremony_id)
            .map(|participant| participant.contribution_progress);

        if let Some(progress) = progress {
            if progress >= self.circuit_count(ceremony_id) {
                self.update_participant(ceremony_id, |participant| participant.status = ParticipantStatus::Done);
            } else {
                let next = progress + 1;
                self.update_circuit(ceremony_id, next, |circuit| {
                    if let Some(queue) = circuit.waiting_queue.as_mut() {
                        queue.contributors = vec![TEST_PARTICIPANT_ID.to_string()];
                        queue.current_contributor = TEST_PARTICIPANT_ID.to_string();
                    }
                });
                self.update_participant(ceremony_id, |participant| {
                    participant.status = ParticipantStatus::Contributing;
                    participant.contribution_step = Some(ContributionStep::Downloading);
                    participant.contribution_progress = next;
                    participant.temp_contribution_data = None;
                });
            }
        }

        self.record(PROGRESS_TO_NEXT_CIRCUIT_FOR_CONTRIBUTION);
        Ok(())
    }

    async fn progress_to_next_contribution_step(&self, ceremony_id: &str) -> Result<(), FunctionError> {
        self.update_participant(ceremony_id, |participant| {
            participant.contribution_step = match participant.contribution_step {
                Some(ContributionStep::Downloading) => Some(ContributionStep::Computing),
                Some(ContributionStep::Computing) => Some(ContributionStep::Uploading),
                Some(ContributionStep::Uploading) => Some(ContributionStep::Verifying),
                _ => Some(ContributionStep::Completed),
            };
        });

        self.record(PROGRESS_TO_NEXT_CONTRIBUTION_STEP);
        Ok(())
    }

    async fn permanently_store_contribution_time_and_hash(
        &self,
        ceremony_id: &str,
        contribution_computation_time: u64,
        contribution_hash: &str,
    ) -> Result<(), FunctionError> {
        {
            let mut recorded = self.recorded();
            recorded.stored_hashes.push(contribution_hash.to_string());
            recorded.computation_time = contribution_computation_time;
        }
        self.update_participant(ceremony_id, |participant| {
            participant
                .temp_contribution_data
                .get_or_insert_with(TempContributionData::default)
                .contribution_computation_time = Some(contribution_computation_time);
        });

        self.record(PERMANENTLY_STORE_CURRENT_CONTRIBUTION_TIME_AND_HASH);
        Ok(())
    }

    async fn resume_contribution_after_timeout_expiration(&self, ceremony_id: &str) -> Result<(), FunctionError> {
        self.update_participant(ceremony_id, |participant| {
            participant.status = ParticipantStatus::Contributing;
            participant.contribution_step = Some(ContributionStep::Downloading);
        });

        self.record(RESUME_CONTRIBUTION_AFTER_TIMEOUT_EXPIRATION);
        Ok(())
    }

    async fn verify_contribution(
        &self,
        ceremony_id: &str,
        _circuit_id: &str,
        contributor_id: &str,
        _bucket: &str,
    ) -> Result<(), FunctionError> {
        self.record(VERIFY_CONTRIBUTION);
        if self.hang_verification {
            futures::future::pending::<()>().await;
        }

        let participant = match self.current_participant(ceremony_id) {
            Some(participant) => participant,
            None => return Ok(()),
        };
        let sequence_position = participant.contribution_progress;
        let document_id = format!("contrib-{}", sequence_position);
        let (hash, computation_time) = {
            let recorded = self.recorded();
            (
                recorded.stored_hashes.last().cloned().unwrap_or_default(),
                recorded.computation_time,
            )
        };

        let mut completed = 0;
        self.update_circuit(ceremony_id, sequence_position, |circuit| {
            if let Some(queue) = circuit.waiting_queue.as_mut() {
                queue.completed_contributions += 1;
                completed = queue.completed_contributions;
            }
            circuit.avg_timings = AvgTimings {
                contribution_computation: circuit.avg_timings.contribution_computation + 10.0,
                full_contribution: circuit.avg_timings.full_contribution + 20.0,
                verify_cloud_function: circuit.avg_timings.verify_cloud_function + 30.0,
            };
        });
        if let Some(store) = &self.store {
            store.set_document(
                &format!(
                    "{}/{}",
                    contributions_path(ceremony_id, &test_circuit_id(sequence_position)),
                    document_id
                ),
                json!({
                    "participantId": contributor_id,
                    "contributionComputationTime": computation_time,
                    "verificationComputationTime": 30,
                    "zkeyIndex": format_zkey_index(completed),
                    "valid": true
                }),
            );
        }
        self.update_participant(ceremony_id, |participant| {
            participant.contributions.push(ParticipantContribution {
                doc: document_id,
                computation_time,
                hash,
            });
            participant.status = ParticipantStatus::Contributed;
            participant.contribution_step = Some(ContributionStep::Completed);
            participant.temp_contribution_data = None;
        });
        Ok(())
    }

    async fn generate_get_presigned_url(&self, bucket: &str, key: &str) -> Result<String, FunctionError> {
        self.record(GENERATE_GET_OBJECT_PRE_SIGNED_URL);
        Ok(format!("https://storage.test/{}/{}", bucket, key))
    }

    async fn open_multi_part_upload(&self, _bucket: &str, _key: &str, _ceremony_id: &str) -> Result<String, FunctionError> {
        self.record(START_MULTI_PART_UPLOAD);
        Ok("upload-1".to_string())
    }

    async fn store_multi_part_upload_id(&self, ceremony_id: &str, upload_id: &str) -> Result<(), FunctionError> {
        self.update_participant(ceremony_id, |participant| {
            participant
                .temp_contribution_data
                .get_or_insert_with(TempContributionData::default)
                .upload_id = Some(upload_id.to_string());
        });

        self.record(TEMPORARY_STORE_CURRENT_CONTRIBUTION_MULTI_PART_UPLOAD_ID);
        Ok(())
    }

    async fn generate_presigned_urls_for_parts(
        &self,
        bucket: &str,
        key: &str,
        _upload_id: &str,
        number_of_parts: usize,
        _ceremony_id: &str,
    ) -> Result<Vec<String>, FunctionError> {
        self.record(GENERATE_PRE_SIGNED_URLS_PARTS);
        Ok((1..=number_of_parts)
            .map(|part_number| format!("https://storage.test/{}/{}?part={}", bucket, key, part_number))
            .collect())
    }

    async fn store_uploaded_chunk(&self, ceremony_id: &str, chunk: &ETagWithPartNumber) -> Result<(), FunctionError> {
        self.recorded().stored_chunks.push(chunk.clone());
        self.update_participant(ceremony_id, |participant| {
            participant
                .temp_contribution_data
                .get_or_insert_with(TempContributionData::default)
                .chunks
                .push(chunk.clone());
        });

        self.record(TEMPORARY_STORE_CURRENT_CONTRIBUTION_UPLOADED_CHUNK_DATA);
        Ok(())
    }

    async fn complete_multi_part_upload(
        &self,
        bucket: &str,
        key: &str,
        _upload_id: &str,
        parts: &[ETagWithPartNumber],
        _ceremony_id: &str,
    ) -> Result<String, FunctionError> {
        self.recorded().completed_parts = parts.to_vec();
        self.record(COMPLETE_MULTI_PART_UPLOAD);
        Ok(format!("https://storage.test/{}/{}", bucket, key))
    }
}

#[derive(Default)]
struct Served {
    bytes: Vec<u8>,
    chunk_size: usize,
    put_part_numbers: Vec<u64>,
}

/// An object storage serving one object and accepting every part but one.
#[derive(Default)]
pub struct FakeTransport {
    served: Mutex<Served>,
    failing_part: Option<u64>,
    without_streaming: bool,
}

impl FakeTransport {
    pub fn failing_part(part_number: u64) -> Self {
        Self {
            failing_part: Some(part_number),
            ..Self::default()
        }
    }

    pub fn without_streaming() -> Self {
        Self {
            without_streaming: true,
            ..Self::default()
        }
    }

    /// Serves `bytes` to every download, in chunks of `chunk_size` bytes.
    pub fn serve(&self, bytes: Vec<u8>, chunk_size: usize) {
        let mut served = self.served.lock().expect("Should have locked the served object");
        served.bytes = bytes;
        served.chunk_size = chunk_size;
    }

    pub fn put_part_numbers(&self) -> Vec<u64> {
        self.served
            .lock()
            .expect("Should have locked the served object")
            .put_part_numbers
            .clone()
    }
}

fn part_number(url: &str) -> u64 {
    url.rsplit("part=").next().and_then(|part| part.parse().ok()).unwrap_or(0)
}

#[async_trait::async_trait]
impl ObjectTransport for FakeTransport {
    async fn get(&self, _url: &str) -> Result<Option<DownloadStream>, TransferError> {
        if self.without_streaming {
            return Ok(None);
        }

        let (bytes, chunk_size) = {
            let served = self.served.lock().expect("Should have locked the served object");
            (served.bytes.clone(), served.chunk_size.max(1))
        };
        let chunks = bytes
            .chunks(chunk_size)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect::<Vec<_>>();

        Ok(Some(DownloadStream {
            content_length: Some(bytes.len() as u64),
            body: stream::iter(chunks).boxed(),
        }))
    }

    async fn put(&self, url: &str, _body: Vec<u8>) -> Result<String, TransferError> {
        let part_number = part_number(url);
        if self.failing_part == Some(part_number) {
            return Err(TransferError::Network(format!("Connection reset while sending part {}", part_number)));
        }

        self.served
            .lock()
            .expect("Should have locked the served object")
            .put_part_numbers
            .push(part_number);
        Ok(format!("etag-{}", part_number))
    }
}

/// Appends `+identity` to the input, ignoring the entropy.
pub struct FakeComputer;

impl ContributionComputer for FakeComputer {
    fn compute(&self, input: &[u8], _entropy: &SecretString, identity: &str) -> Result<Vec<u8>, ContributeError> {
        Ok([input, b"+", identity.as_bytes()].concat())
    }
}

#[derive(Default)]
pub struct FakeGistPublisher {
    filenames: Mutex<Vec<String>>,
}

impl FakeGistPublisher {
    pub fn filenames(&self) -> Vec<String> {
        self.filenames.lock().expect("Should have locked the filenames").clone()
    }
}

#[async_trait::async_trait]
impl GistPublisher for FakeGistPublisher {
    async fn publish(
        &self,
        _token: &SecretString,
        _content: &str,
        filename: &str,
        _description: &str,
    ) -> Result<String, AttestationError> {
        self.filenames
            .lock()
            .expect("Should have locked the filenames")
            .push(filename.to_string());
        Ok(FAKE_GIST_URL.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_documents() {
        let store = MemoryDocumentStore::new();
        seed_ceremony(&store, 2);
        seed_waiting_queue(&store, 2, &["a"], "a", 3);

        let circuit = read::<Circuit>(&store, &circuit_path(TEST_CEREMONY_ID, &test_circuit_id(2)));
        assert_eq!(Some(3), circuit.waiting_queue.map(|queue| queue.completed_contributions));
        assert!(store.document(&format!("{}/{}", circuits_path(TEST_CEREMONY_ID), test_circuit_id(3))).is_none());
        assert_eq!(4, part_number("https://storage.test/b/k?part=4"));
    }
}
