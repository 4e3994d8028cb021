//! The documents of a ceremony as stored by the coordinator and read by contributors

use serde::{Deserialize, Serialize};

/// The index of the first zkey of every circuit. Its width is the width of every other index.
pub const GENESIS_ZKEY_INDEX: &str = "00000";

/// The index of the zkey produced by the coordinator's final contribution.
pub const FINAL_CONTRIBUTION_INDEX: &str = "final";

/// Formats a contribution progress as a zkey index, e.g. `42` as `00042`.
pub fn format_zkey_index(progress: u64) -> String {
    format!("{:0width$}", progress, width = GENESIS_ZKEY_INDEX.len())
}

/// A document together with its identifier in the store.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct DocumentInfo<T> {
    pub id: String,
    pub data: T,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CeremonyState {
    Scheduled,
    Opened,
    Paused,
    Closed,
    Finalized,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CeremonyType {
    Phase1,
    Phase2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CeremonyTimeoutType {
    Dynamic,
    Fixed,
}

/// The status of a participant, driven exclusively by the coordinator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantStatus {
    Created,
    Waiting,
    Ready,
    Contributing,
    Contributed,
    Done,
    Finalizing,
    Finalized,
    Timedout,
    Exhumed,
}

impl Default for ParticipantStatus {
    fn default() -> Self {
        ParticipantStatus::Created
    }
}

/// The step of the current contribution, driven exclusively by the coordinator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContributionStep {
    Downloading,
    Computing,
    Uploading,
    Verifying,
    Completed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeoutType {
    BlockingContribution,
    BlockingCloudFunction,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ceremony {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub prefix: String,
    pub start_date: i64,
    pub end_date: i64,
    pub state: CeremonyState,
    #[serde(rename = "type")]
    pub ceremony_type: CeremonyType,
    pub timeout_mechanism_type: CeremonyTimeoutType,
    /// Minutes a participant is blocked for after a timeout.
    #[serde(default)]
    pub penalty: u64,
    #[serde(default)]
    pub coordinator_id: String,
    #[serde(default)]
    pub last_updated: Option<i64>,
}

/// The queue of participants waiting to contribute to a circuit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitingQueue {
    #[serde(default)]
    pub contributors: Vec<String>,
    #[serde(default)]
    pub current_contributor: String,
    #[serde(default)]
    pub completed_contributions: u64,
    #[serde(default)]
    pub failed_contributions: u64,
}

impl WaitingQueue {
    /// Returns the 1-based position of the participant in the queue.
    pub fn position_of(&self, participant_id: &str) -> Option<usize> {
        self.contributors
            .iter()
            .position(|contributor| contributor == participant_id)
            .map(|index| index + 1)
    }

    pub fn is_current_contributor(&self, participant_id: &str) -> bool {
        self.current_contributor == participant_id
    }
}

/// Average timings of a circuit, in milliseconds.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvgTimings {
    #[serde(default)]
    pub contribution_computation: f64,
    #[serde(default)]
    pub full_contribution: f64,
    #[serde(default)]
    pub verify_cloud_function: f64,
}

impl AvgTimings {
    /// Returns `true` if every average differs from the ones in `other`.
    pub fn all_changed_from(&self, other: &AvgTimings) -> bool {
        self.contribution_computation != other.contribution_computation
            && self.full_contribution != other.full_contribution
            && self.verify_cloud_function != other.verify_cloud_function
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitFiles {
    #[serde(default)]
    pub pot_filename: Option<String>,
    #[serde(default)]
    pub r1cs_filename: Option<String>,
    #[serde(default)]
    pub initial_zkey_filename: Option<String>,
    #[serde(default)]
    pub pot_storage_path: Option<String>,
    #[serde(default)]
    pub r1cs_storage_path: Option<String>,
    #[serde(default)]
    pub initial_zkey_storage_path: Option<String>,
    #[serde(default)]
    pub pot_blake2b_hash: Option<String>,
    #[serde(default)]
    pub r1cs_blake2b_hash: Option<String>,
    #[serde(default)]
    pub initial_zkey_blake2b_hash: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitMetadata {
    #[serde(default)]
    pub curve: Option<String>,
    #[serde(default)]
    pub wires: Option<u64>,
    #[serde(default)]
    pub constraints: Option<u64>,
    #[serde(default)]
    pub private_inputs: Option<u64>,
    #[serde(default)]
    pub public_inputs: Option<u64>,
    #[serde(default)]
    pub labels: Option<u64>,
    #[serde(default)]
    pub outputs: Option<u64>,
    #[serde(default)]
    pub pot: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Circuit {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub prefix: String,
    /// 1-based position defining the contribution order within the ceremony.
    pub sequence_position: u64,
    #[serde(default)]
    pub waiting_queue: Option<WaitingQueue>,
    #[serde(default)]
    pub avg_timings: AvgTimings,
    #[serde(default)]
    pub files: CircuitFiles,
    #[serde(default)]
    pub metadata: CircuitMetadata,
    #[serde(default, rename = "zKeySizeInBytes")]
    pub zkey_size_in_bytes: Option<u64>,
    #[serde(default)]
    pub dynamic_threshold: Option<u64>,
    #[serde(default)]
    pub fixed_time_window: Option<u64>,
    #[serde(default)]
    pub last_updated: Option<i64>,
}

/// A contribution as recorded in the participant document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantContribution {
    #[serde(default)]
    pub doc: String,
    #[serde(default)]
    pub computation_time: u64,
    #[serde(default)]
    pub hash: String,
}

/// A part of a multi-part upload.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub struct ETagWithPartNumber {
    #[serde(rename = "ETag")]
    pub etag: String,
    #[serde(rename = "PartNumber")]
    pub part_number: u64,
}

/// Bookkeeping for a contribution that is still in progress.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TempContributionData {
    #[serde(default)]
    pub contribution_computation_time: Option<u64>,
    #[serde(default)]
    pub upload_id: Option<String>,
    #[serde(default)]
    pub chunks: Vec<ETagWithPartNumber>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub status: ParticipantStatus,
    #[serde(default)]
    pub contribution_progress: u64,
    #[serde(default)]
    pub contribution_step: Option<ContributionStep>,
    #[serde(default)]
    pub contributions: Vec<ParticipantContribution>,
    #[serde(default)]
    pub temp_contribution_data: Option<TempContributionData>,
    #[serde(default)]
    pub contribution_started_at: Option<i64>,
    #[serde(default)]
    pub verification_started_at: Option<i64>,
    #[serde(default)]
    pub last_updated: Option<i64>,
}

impl Participant {
    /// Returns `true` if `contributions <= contributionProgress <= circuit_count`.
    pub fn is_consistent_with(&self, circuit_count: usize) -> bool {
        let progress = self.contribution_progress as usize;
        self.contributions.len() <= progress && progress <= circuit_count
    }

    /// Returns the upload id of an interrupted upload, if any.
    pub fn upload_id(&self) -> Option<&str> {
        self.temp_contribution_data
            .as_ref()
            .and_then(|data| data.upload_id.as_deref())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionFiles {
    #[serde(default)]
    pub transcript_filename: Option<String>,
    #[serde(default)]
    pub last_zkey_filename: Option<String>,
    #[serde(default)]
    pub transcript_storage_path: Option<String>,
    #[serde(default)]
    pub last_zkey_storage_path: Option<String>,
    #[serde(default)]
    pub transcript_blake2b_hash: Option<String>,
    #[serde(default)]
    pub last_zkey_blake2b_hash: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationSoftware {
    pub name: String,
    pub version: String,
    pub commit_hash: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Beacon {
    pub value: String,
    pub hash: String,
}

/// A contribution as recorded by the coordinator after verification.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Contribution {
    pub participant_id: String,
    #[serde(default)]
    pub contribution_computation_time: u64,
    #[serde(default)]
    pub verification_computation_time: u64,
    pub zkey_index: String,
    #[serde(default)]
    pub files: ContributionFiles,
    #[serde(default)]
    pub verification_software: Option<VerificationSoftware>,
    pub valid: bool,
    #[serde(default)]
    pub last_updated: Option<i64>,
    #[serde(default)]
    pub beacon: Option<Beacon>,
}

impl Contribution {
    /// Returns the numeric contributor index, `None` for the final contribution.
    pub fn contributor_number(&self) -> Option<u64> {
        self.zkey_index.parse().ok()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeout {
    #[serde(rename = "type")]
    pub timeout_type: TimeoutType,
    pub start_date: i64,
    pub end_date: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    use lazy_static::lazy_static;
    use serde_json::json;

    lazy_static! {
        static ref UPLOADING_PARTICIPANT: serde_json::Value = json!({
            "userId": "uid-1",
            "status": "CONTRIBUTING",
            "contributionProgress": 1,
            "contributionStep": "UPLOADING",
            "contributions": [],
            "tempContributionData": {
                "contributionComputationTime": 1200,
                "uploadId": "upload-1",
                "chunks": [{ "ETag": "\"a\"", "PartNumber": 1 }]
            },
            "lastUpdated": 1666000000000i64
        });
    }

    #[test]
    fn test_zkey_index_padding() {
        assert_eq!("00000", format_zkey_index(0));
        assert_eq!("00042", format_zkey_index(42));
        assert_eq!("99999", format_zkey_index(99999));

        for progress in [0u64, 7, 10, 311, 5000, 99999].iter() {
            let index = format_zkey_index(*progress);
            assert_eq!(GENESIS_ZKEY_INDEX.len(), index.len());
            assert_eq!(*progress, index.parse::<u64>().unwrap());
        }
    }

    #[test]
    fn test_participant_decoding() {
        let participant: Participant = serde_json::from_value(UPLOADING_PARTICIPANT.clone()).unwrap();

        assert_eq!(ParticipantStatus::Contributing, participant.status);
        assert_eq!(Some(ContributionStep::Uploading), participant.contribution_step);
        assert_eq!(Some("upload-1"), participant.upload_id());

        let data = participant.temp_contribution_data.as_ref().unwrap();
        assert_eq!(Some(1200), data.contribution_computation_time);
        assert_eq!(1, data.chunks[0].part_number);
        assert_eq!("\"a\"", data.chunks[0].etag);

        assert!(participant.is_consistent_with(1));
        assert!(!participant.is_consistent_with(0));
    }

    #[test]
    fn test_waiting_participant_has_no_step() {
        let participant: Participant = serde_json::from_value(json!({
            "status": "WAITING",
            "contributionProgress": 0,
            "contributions": []
        }))
        .unwrap();

        assert_eq!(None, participant.contribution_step);
        assert_eq!(None, participant.upload_id());
    }

    #[test]
    fn test_circuit_decoding() {
        let circuit: Circuit = serde_json::from_value(json!({
            "name": "Multiplier",
            "prefix": "circuit-small",
            "sequencePosition": 1,
            "zKeySizeInBytes": 1024,
            "metadata": { "constraints": 4 },
            "avgTimings": { "fullContribution": 6000.0, "verifyCloudFunction": 3000.0 },
            "waitingQueue": {
                "contributors": ["a", "b"],
                "currentContributor": "a",
                "completedContributions": 3,
                "failedContributions": 0
            }
        }))
        .unwrap();

        let queue = circuit.waiting_queue.unwrap();
        assert!(queue.is_current_contributor("a"));
        assert_eq!(Some(2), queue.position_of("b"));
        assert_eq!(None, queue.position_of("c"));
        assert_eq!(Some(1024), circuit.zkey_size_in_bytes);
        assert_eq!(Some(4), circuit.metadata.constraints);
        assert_eq!(0.0, circuit.avg_timings.contribution_computation);
    }

    #[test]
    fn test_contributor_number() {
        let mut contribution: Contribution = serde_json::from_value(json!({
            "participantId": "uid-1",
            "zkeyIndex": "00003",
            "valid": true
        }))
        .unwrap();
        assert_eq!(Some(3), contribution.contributor_number());

        contribution.zkey_index = FINAL_CONTRIBUTION_INDEX.to_string();
        assert_eq!(None, contribution.contributor_number());
    }

    #[test]
    fn test_timeout_decoding() {
        let timeout: Timeout = serde_json::from_value(json!({
            "type": "BLOCKING_CLOUD_FUNCTION",
            "startDate": 10,
            "endDate": 20
        }))
        .unwrap();
        assert_eq!(TimeoutType::BlockingCloudFunction, timeout.timeout_type);
    }

    #[test]
    fn test_avg_timings_changes() {
        let before = AvgTimings {
            contribution_computation: 1.0,
            full_contribution: 2.0,
            verify_cloud_function: 3.0,
        };
        let mut after = before.clone();
        assert!(!after.all_changed_from(&before));

        after.contribution_computation = 4.0;
        after.full_contribution = 5.0;
        assert!(!after.all_changed_from(&before));

        after.verify_cloud_function = 6.0;
        assert!(after.all_changed_from(&before));
    }
}
