//! The remote functions exposed by the ceremony coordinator.

mod http;

pub use self::http::HttpCeremonyFunctions;

use crate::errors::FunctionError;

use ceremony_shared::structures::ETagWithPartNumber;

pub const CHECK_PARTICIPANT_FOR_CEREMONY: &str = "checkParticipantForCeremony";
pub const PROGRESS_TO_NEXT_CIRCUIT_FOR_CONTRIBUTION: &str = "progressToNextCircuitForContribution";
pub const PROGRESS_TO_NEXT_CONTRIBUTION_STEP: &str = "progressToNextContributionStep";
pub const PERMANENTLY_STORE_CURRENT_CONTRIBUTION_TIME_AND_HASH: &str = "permanentlyStoreCurrentContributionTimeAndHash";
pub const RESUME_CONTRIBUTION_AFTER_TIMEOUT_EXPIRATION: &str = "resumeContributionAfterTimeoutExpiration";
pub const VERIFY_CONTRIBUTION: &str = "verifycontribution";
pub const GENERATE_GET_OBJECT_PRE_SIGNED_URL: &str = "generateGetObjectPreSignedUrl";
pub const START_MULTI_PART_UPLOAD: &str = "startMultiPartUpload";
pub const TEMPORARY_STORE_CURRENT_CONTRIBUTION_MULTI_PART_UPLOAD_ID: &str =
    "temporaryStoreCurrentContributionMultiPartUploadId";
pub const GENERATE_PRE_SIGNED_URLS_PARTS: &str = "generatePreSignedUrlsParts";
pub const TEMPORARY_STORE_CURRENT_CONTRIBUTION_UPLOADED_CHUNK_DATA: &str =
    "temporaryStoreCurrentContributionUploadedChunkData";
pub const COMPLETE_MULTI_PART_UPLOAD: &str = "completeMultiPartUpload";

///
/// The coordinator functions a contributor relies on. The coordinator
/// is the only party changing the status and step of a participant,
/// these calls only request the changes.
///
#[async_trait::async_trait]
pub trait CeremonyFunctions: Send + Sync {
    /// Returns `true` if the caller can contribute to the ceremony.
    async fn check_participant_for_ceremony(&self, ceremony_id: &str) -> Result<bool, FunctionError>;

    async fn progress_to_next_circuit_for_contribution(&self, ceremony_id: &str) -> Result<(), FunctionError>;

    async fn progress_to_next_contribution_step(&self, ceremony_id: &str) -> Result<(), FunctionError>;

    async fn permanently_store_contribution_time_and_hash(
        &self,
        ceremony_id: &str,
        contribution_computation_time: u64,
        contribution_hash: &str,
    ) -> Result<(), FunctionError>;

    async fn resume_contribution_after_timeout_expiration(&self, ceremony_id: &str) -> Result<(), FunctionError>;

    /// Verifies the latest contribution to the circuit. May run for up to an hour.
    async fn verify_contribution(
        &self,
        ceremony_id: &str,
        circuit_id: &str,
        contributor_id: &str,
        bucket: &str,
    ) -> Result<(), FunctionError>;

    async fn generate_get_presigned_url(&self, bucket: &str, key: &str) -> Result<String, FunctionError>;

    /// Returns the id of a new multi-part upload.
    async fn open_multi_part_upload(&self, bucket: &str, key: &str, ceremony_id: &str) -> Result<String, FunctionError>;

    async fn store_multi_part_upload_id(&self, ceremony_id: &str, upload_id: &str) -> Result<(), FunctionError>;

    /// Returns one presigned url per part, in part order.
    async fn generate_presigned_urls_for_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        number_of_parts: usize,
        ceremony_id: &str,
    ) -> Result<Vec<String>, FunctionError>;

    async fn store_uploaded_chunk(&self, ceremony_id: &str, chunk: &ETagWithPartNumber) -> Result<(), FunctionError>;

    /// Returns the location of the uploaded object.
    async fn complete_multi_part_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[ETagWithPartNumber],
        ceremony_id: &str,
    ) -> Result<String, FunctionError>;
}
