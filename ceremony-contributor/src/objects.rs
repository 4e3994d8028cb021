use ceremony_shared::structures::ETagWithPartNumber;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The envelope of a callable function request.
#[derive(Serialize, Debug, Clone)]
pub struct CallableRequest<T> {
    pub data: T,
}

/// The envelope of a successful callable function response.
#[derive(Deserialize, Debug, Clone)]
pub struct CallableResponse<T> {
    pub result: T,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CallableErrorResponse {
    pub error: CallableError,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CallableError {
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CeremonyRequest {
    pub ceremony_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContributionTimeAndHashRequest {
    pub ceremony_id: String,
    pub contribution_computation_time: u64,
    pub contribution_hash: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerifyContributionRequest {
    pub ceremony_id: String,
    pub circuit_id: String,
    pub contributor_or_coordinator_identifier: String,
    pub bucket_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRequest {
    pub bucket_name: String,
    pub object_key: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StartMultiPartUploadRequest {
    pub bucket_name: String,
    pub object_key: String,
    pub ceremony_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PreSignedUrlsPartsRequest {
    pub bucket_name: String,
    pub object_key: String,
    pub upload_id: String,
    pub number_of_parts: usize,
    pub ceremony_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompleteMultiPartUploadRequest {
    pub bucket_name: String,
    pub object_key: String,
    pub upload_id: String,
    pub parts: Vec<ETagWithPartNumber>,
    pub ceremony_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MultiPartUploadIdRequest {
    pub ceremony_id: String,
    pub upload_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadedChunkRequest {
    pub ceremony_id: String,
    pub chunk: ETagWithPartNumber,
}

#[derive(Serialize, Debug, Clone)]
pub struct GistFile {
    pub content: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct GistRequest {
    pub description: String,
    pub public: bool,
    pub files: HashMap<String, GistFile>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct GistResponse {
    pub html_url: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct GithubUser {
    pub login: String,
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_uploaded_chunk_encoding() {
        let request = CallableRequest {
            data: UploadedChunkRequest {
                ceremony_id: "c1".to_string(),
                chunk: ETagWithPartNumber {
                    etag: "\"etag\"".to_string(),
                    part_number: 2,
                },
            },
        };

        assert_eq!(
            json!({ "data": { "ceremonyId": "c1", "chunk": { "ETag": "\"etag\"", "PartNumber": 2 } } }),
            serde_json::to_value(&request).unwrap()
        );
    }

    #[test]
    fn test_verify_request_encoding() {
        let request = VerifyContributionRequest {
            ceremony_id: "c1".to_string(),
            circuit_id: "circuit".to_string(),
            contributor_or_coordinator_identifier: "uid".to_string(),
            bucket_name: "bucket".to_string(),
        };

        assert_eq!(
            json!({
                "ceremonyId": "c1",
                "circuitId": "circuit",
                "contributorOrCoordinatorIdentifier": "uid",
                "bucketName": "bucket"
            }),
            serde_json::to_value(&request).unwrap()
        );
    }
}
