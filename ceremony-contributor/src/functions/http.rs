use super::{
    CeremonyFunctions,
    CHECK_PARTICIPANT_FOR_CEREMONY,
    COMPLETE_MULTI_PART_UPLOAD,
    GENERATE_GET_OBJECT_PRE_SIGNED_URL,
    GENERATE_PRE_SIGNED_URLS_PARTS,
    PERMANENTLY_STORE_CURRENT_CONTRIBUTION_TIME_AND_HASH,
    PROGRESS_TO_NEXT_CIRCUIT_FOR_CONTRIBUTION,
    PROGRESS_TO_NEXT_CONTRIBUTION_STEP,
    RESUME_CONTRIBUTION_AFTER_TIMEOUT_EXPIRATION,
    START_MULTI_PART_UPLOAD,
    TEMPORARY_STORE_CURRENT_CONTRIBUTION_MULTI_PART_UPLOAD_ID,
    TEMPORARY_STORE_CURRENT_CONTRIBUTION_UPLOADED_CHUNK_DATA,
    VERIFY_CONTRIBUTION,
};
use crate::{errors::FunctionError, objects::*};

use ceremony_shared::structures::ETagWithPartNumber;

use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

///
/// Calls the coordinator functions with the callable protocol:
/// the arguments are posted as `{"data": ...}` and the answer
/// is read from `{"result": ...}`.
///
#[derive(Clone)]
pub struct HttpCeremonyFunctions {
    client: reqwest::Client,
    base_url: Url,
    verify_contribution_url: Url,
    verification_timeout: Duration,
    id_token: SecretString,
}

impl HttpCeremonyFunctions {
    pub fn new(base_url: Url, verify_contribution_url: Url, verification_timeout: Duration, id_token: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            verify_contribution_url,
            verification_timeout,
            id_token,
        }
    }

    async fn call<T: Serialize + Send + Sync, R: DeserializeOwned + Send>(
        &self,
        name: &str,
        url: Url,
        data: T,
        timeout: Option<Duration>,
    ) -> Result<R, FunctionError> {
        debug!("Calling {}", name);

        let bytes = serde_json::to_vec(&CallableRequest { data })?;
        let mut request = self
            .client
            .post(url.as_str())
            .header(http::header::AUTHORIZATION, format!("Bearer {}", self.id_token.expose_secret()))
            .header(http::header::CONTENT_TYPE, "application/json")
            .header(http::header::CONTENT_LENGTH, bytes.len())
            .body(bytes);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        let data = response.bytes().await?;

        if !status.is_success() {
            let message = match serde_json::from_slice::<CallableErrorResponse>(&*data) {
                Ok(error) => error.error.message,
                Err(_) => format!("{} returned {}", url, status),
            };
            return Err(FunctionError::FailedCall(name.to_string(), message));
        }

        serde_json::from_slice::<CallableResponse<R>>(&*data)
            .map(|response| response.result)
            .map_err(|error| FunctionError::UnexpectedResult(name.to_string(), error.to_string()))
    }

    async fn call_function<T: Serialize + Send + Sync, R: DeserializeOwned + Send>(
        &self,
        name: &str,
        data: T,
    ) -> Result<R, FunctionError> {
        let url = self.base_url.join(name)?;
        self.call(name, url, data, None).await
    }
}

#[async_trait::async_trait]
impl CeremonyFunctions for HttpCeremonyFunctions {
    async fn check_participant_for_ceremony(&self, ceremony_id: &str) -> Result<bool, FunctionError> {
        let request = CeremonyRequest {
            ceremony_id: ceremony_id.to_string(),
        };
        self.call_function(CHECK_PARTICIPANT_FOR_CEREMONY, request).await
    }

    async fn progress_to_next_circuit_for_contribution(&self, ceremony_id: &str) -> Result<(), FunctionError> {
        let request = CeremonyRequest {
            ceremony_id: ceremony_id.to_string(),
        };
        self.call_function::<_, serde_json::Value>(PROGRESS_TO_NEXT_CIRCUIT_FOR_CONTRIBUTION, request)
            .await
            .map(|_| ())
    }

    async fn progress_to_next_contribution_step(&self, ceremony_id: &str) -> Result<(), FunctionError> {
        let request = CeremonyRequest {
            ceremony_id: ceremony_id.to_string(),
        };
        self.call_function::<_, serde_json::Value>(PROGRESS_TO_NEXT_CONTRIBUTION_STEP, request)
            .await
            .map(|_| ())
    }

    async fn permanently_store_contribution_time_and_hash(
        &self,
        ceremony_id: &str,
        contribution_computation_time: u64,
        contribution_hash: &str,
    ) -> Result<(), FunctionError> {
        let request = ContributionTimeAndHashRequest {
            ceremony_id: ceremony_id.to_string(),
            contribution_computation_time,
            contribution_hash: contribution_hash.to_string(),
        };
        self.call_function::<_, serde_json::Value>(PERMANENTLY_STORE_CURRENT_CONTRIBUTION_TIME_AND_HASH, request)
            .await
            .map(|_| ())
    }

    async fn resume_contribution_after_timeout_expiration(&self, ceremony_id: &str) -> Result<(), FunctionError> {
        let request = CeremonyRequest {
            ceremony_id: ceremony_id.to_string(),
        };
        self.call_function::<_, serde_json::Value>(RESUME_CONTRIBUTION_AFTER_TIMEOUT_EXPIRATION, request)
            .await
            .map(|_| ())
    }

    async fn verify_contribution(
        &self,
        ceremony_id: &str,
        circuit_id: &str,
        contributor_id: &str,
        bucket: &str,
    ) -> Result<(), FunctionError> {
        let request = VerifyContributionRequest {
            ceremony_id: ceremony_id.to_string(),
            circuit_id: circuit_id.to_string(),
            contributor_or_coordinator_identifier: contributor_id.to_string(),
            bucket_name: bucket.to_string(),
        };
        self.call::<_, serde_json::Value>(
            VERIFY_CONTRIBUTION,
            self.verify_contribution_url.clone(),
            request,
            Some(self.verification_timeout),
        )
        .await
        .map(|_| ())
    }

    async fn generate_get_presigned_url(&self, bucket: &str, key: &str) -> Result<String, FunctionError> {
        let request = ObjectRequest {
            bucket_name: bucket.to_string(),
            object_key: key.to_string(),
        };
        self.call_function(GENERATE_GET_OBJECT_PRE_SIGNED_URL, request).await
    }

    async fn open_multi_part_upload(&self, bucket: &str, key: &str, ceremony_id: &str) -> Result<String, FunctionError> {
        let request = StartMultiPartUploadRequest {
            bucket_name: bucket.to_string(),
            object_key: key.to_string(),
            ceremony_id: ceremony_id.to_string(),
        };
        self.call_function(START_MULTI_PART_UPLOAD, request).await
    }

    async fn store_multi_part_upload_id(&self, ceremony_id: &str, upload_id: &str) -> Result<(), FunctionError> {
        let request = MultiPartUploadIdRequest {
            ceremony_id: ceremony_id.to_string(),
            upload_id: upload_id.to_string(),
        };
        self.call_function::<_, serde_json::Value>(TEMPORARY_STORE_CURRENT_CONTRIBUTION_MULTI_PART_UPLOAD_ID, request)
            .await
            .map(|_| ())
    }

    async fn generate_presigned_urls_for_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        number_of_parts: usize,
        ceremony_id: &str,
    ) -> Result<Vec<String>, FunctionError> {
        let request = PreSignedUrlsPartsRequest {
            bucket_name: bucket.to_string(),
            object_key: key.to_string(),
            upload_id: upload_id.to_string(),
            number_of_parts,
            ceremony_id: ceremony_id.to_string(),
        };
        self.call_function(GENERATE_PRE_SIGNED_URLS_PARTS, request).await
    }

    async fn store_uploaded_chunk(&self, ceremony_id: &str, chunk: &ETagWithPartNumber) -> Result<(), FunctionError> {
        let request = UploadedChunkRequest {
            ceremony_id: ceremony_id.to_string(),
            chunk: chunk.clone(),
        };
        self.call_function::<_, serde_json::Value>(TEMPORARY_STORE_CURRENT_CONTRIBUTION_UPLOADED_CHUNK_DATA, request)
            .await
            .map(|_| ())
    }

    async fn complete_multi_part_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[ETagWithPartNumber],
        ceremony_id: &str,
    ) -> Result<String, FunctionError> {
        let request = CompleteMultiPartUploadRequest {
            bucket_name: bucket.to_string(),
            object_key: key.to_string(),
            upload_id: upload_id.to_string(),
            parts: parts.to_vec(),
            ceremony_id: ceremony_id.to_string(),
        };
        self.call_function(COMPLETE_MULTI_PART_UPLOAD, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_functions() -> HttpCeremonyFunctions {
        let base_url = Url::parse("http://127.0.0.1:9/functions/").unwrap();
        HttpCeremonyFunctions::new(
            base_url.clone(),
            base_url.join(VERIFY_CONTRIBUTION).unwrap(),
            Duration::from_secs(1),
            SecretString::new("id-token".to_string()),
        )
    }

    #[test]
    fn test_function_urls() {
        let functions = unreachable_functions();
        assert_eq!(
            "http://127.0.0.1:9/functions/checkParticipantForCeremony",
            functions.base_url.join(CHECK_PARTICIPANT_FOR_CEREMONY).unwrap().as_str()
        );
        assert_eq!(
            "http://127.0.0.1:9/functions/verifycontribution",
            functions.verify_contribution_url.as_str()
        );
    }

    #[tokio::test]
    async fn test_unreachable_coordinator() {
        let error = unreachable_functions()
            .check_participant_for_ceremony("ceremony-1")
            .await
            .unwrap_err();
        assert!(matches!(error, FunctionError::Crate("reqwest", _)));
    }
}
