//! Chunked transfers of ceremony artifacts through presigned urls.

use crate::{
    errors::TransferError,
    functions::CeremonyFunctions,
    status::{Status, StatusSink},
};

use ceremony_shared::structures::{ETagWithPartNumber, TempContributionData};

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tracing::{debug, info};

/// The body of a download, read incrementally.
pub struct DownloadStream {
    pub content_length: Option<u64>,
    pub body: BoxStream<'static, Result<Bytes, TransferError>>,
}

#[async_trait::async_trait]
pub trait ObjectTransport: Send + Sync {
    /// Starts a GET on a presigned url. Returns `None` if the
    /// transport cannot read the body incrementally.
    async fn get(&self, url: &str) -> Result<Option<DownloadStream>, TransferError>;

    /// PUTs `body` on a presigned url and returns the ETag of the stored part.
    async fn put(&self, url: &str, body: Vec<u8>) -> Result<String, TransferError>;
}

#[derive(Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ObjectTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<Option<DownloadStream>, TransferError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let content_length = response.content_length();

        let body = stream::unfold(Some(response), |response| async move {
            let mut response = response?;
            match response.chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), Some(response))),
                Ok(None) => None,
                Err(error) => Some((Err(TransferError::from(error)), None)),
            }
        })
        .boxed();

        Ok(Some(DownloadStream { content_length, body }))
    }

    async fn put(&self, url: &str, body: Vec<u8>) -> Result<String, TransferError> {
        let response = self
            .client
            .put(url)
            .header(http::header::CONTENT_TYPE, "application/octet-stream")
            .header(http::header::CONTENT_LENGTH, body.len())
            .body(body)
            .send()
            .await?
            .error_for_status()?;

        response
            .headers()
            .get(http::header::ETAG)
            .and_then(|etag| etag.to_str().ok())
            .map(|etag| etag.to_string())
            .ok_or_else(|| TransferError::Network(format!("Upload to {} did not return an ETag", response.url())))
    }
}

///
/// Splits `bytes` into consecutive chunks of `chunk_size` bytes.
/// The last chunk holds the remainder.
///
pub fn split_into_chunks(bytes: &[u8], chunk_size: usize) -> Result<Vec<&[u8]>, TransferError> {
    if chunk_size == 0 {
        return Err(TransferError::InvalidChunkSize);
    }
    Ok(bytes.chunks(chunk_size).collect())
}

///
/// Downloads and uploads ceremony artifacts. Failures are returned
/// to the caller and never retried; uploads persist enough state on
/// the coordinator to be resumed by calling them again.
///
#[derive(Clone)]
pub struct TransferEngine {
    functions: Arc<dyn CeremonyFunctions>,
    transport: Arc<dyn ObjectTransport>,
    chunk_size: usize,
}

impl TransferEngine {
    pub fn new(functions: Arc<dyn CeremonyFunctions>, transport: Arc<dyn ObjectTransport>, chunk_size: usize) -> Self {
        Self {
            functions,
            transport,
            chunk_size,
        }
    }

    /// Downloads the object at `key`, reporting the percentage received.
    pub async fn download_artifact(&self, bucket: &str, key: &str, sink: &dyn StatusSink) -> Result<Vec<u8>, TransferError> {
        let url = self.functions.generate_get_presigned_url(bucket, key).await?;
        let mut download = match self.transport.get(&url).await? {
            Some(download) => download,
            None => return Err(TransferError::StreamUnsupported),
        };

        let mut bytes = Vec::with_capacity(download.content_length.unwrap_or(0) as usize);
        let mut last_percentage = None;
        while let Some(chunk) = download.body.next().await {
            bytes.extend_from_slice(&chunk?);

            if let Some(content_length) = download.content_length.filter(|length| *length > 0) {
                let percentage = (bytes.len() as u64 * 100 / content_length).min(100);
                if last_percentage != Some(percentage) {
                    sink.report(Status::loading(format!("Downloading {}: {}%", key, percentage)));
                    last_percentage = Some(percentage);
                }
            }
        }

        info!("Downloaded {} ({} bytes)", key, bytes.len());
        Ok(bytes)
    }

    ///
    /// Uploads `bytes` to `key` in parts of the configured chunk size.
    ///
    /// With an upload id in `resume`, the parts it lists are kept and the
    /// upload continues from the first missing part. Otherwise a new upload
    /// is opened and its id stored on the coordinator. Every uploaded part
    /// is stored on the coordinator before the next one is sent.
    ///
    pub async fn multi_part_upload(
        &self,
        ceremony_id: &str,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        resume: Option<&TempContributionData>,
    ) -> Result<String, TransferError> {
        let resumable = resume.and_then(|data| data.upload_id.clone().map(|upload_id| (upload_id, data.chunks.clone())));
        let (upload_id, mut parts) = match resumable {
            Some((upload_id, parts)) => {
                info!("Resuming upload {} after {} parts", upload_id, parts.len());
                (upload_id, parts)
            }
            None => {
                let upload_id = self.functions.open_multi_part_upload(bucket, key, ceremony_id).await?;
                self.functions.store_multi_part_upload_id(ceremony_id, &upload_id).await?;
                (upload_id, vec![])
            }
        };

        let chunks = split_into_chunks(bytes, self.chunk_size)?;
        let urls = self
            .functions
            .generate_presigned_urls_for_parts(bucket, key, &upload_id, chunks.len(), ceremony_id)
            .await?;
        if urls.len() != chunks.len() {
            return Err(TransferError::MismatchedPresignedUrls(chunks.len(), urls.len()));
        }

        let already_uploaded = parts.len();
        for (index, (chunk, url)) in chunks.iter().zip(urls.iter()).enumerate().skip(already_uploaded) {
            let part_number = index as u64 + 1;
            debug!("Uploading part {} of {}", part_number, chunks.len());

            let etag = self
                .transport
                .put(url, chunk.to_vec())
                .await
                .map_err(|error| TransferError::ResumeRequired {
                    part_number,
                    reason: error.to_string(),
                })?;

            let part = ETagWithPartNumber { etag, part_number };
            self.functions.store_uploaded_chunk(ceremony_id, &part).await?;
            parts.push(part);
        }

        parts.sort_by_key(|part| part.part_number);
        let location = self
            .functions
            .complete_multi_part_upload(bucket, key, &upload_id, &parts, ceremony_id)
            .await?;

        info!("Uploaded {} in {} parts", key, parts.len());
        Ok(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        status::RecordingStatusSink,
        testing::{FakeCoordinator, FakeTransport},
    };

    #[test]
    fn test_split_into_chunks() {
        let bytes = (0..=255u8).cycle().take(1000).collect::<Vec<_>>();

        for &length in [1usize, 2, 7, 64, 999, 1000].iter() {
            for &chunk_size in [1usize, 3, 8, 100, 1000, 4096].iter() {
                let chunks = split_into_chunks(&bytes[..length], chunk_size).unwrap();
                assert_eq!((length + chunk_size - 1) / chunk_size, chunks.len());
                assert_eq!(&bytes[..length], &chunks.concat()[..]);
            }
        }

        assert!(matches!(split_into_chunks(&bytes, 0), Err(TransferError::InvalidChunkSize)));
    }

    #[tokio::test]
    async fn test_resumed_upload_skips_uploaded_parts() {
        let coordinator = Arc::new(FakeCoordinator::passive());
        let transport = Arc::new(FakeTransport::default());
        let engine = TransferEngine::new(coordinator.clone(), transport.clone(), 4);

        let resume = TempContributionData {
            contribution_computation_time: Some(10),
            upload_id: Some("upload-7".to_string()),
            chunks: (1..=3)
                .map(|part_number| ETagWithPartNumber {
                    etag: format!("etag-{}", part_number),
                    part_number,
                })
                .collect(),
        };

        engine
            .multi_part_upload("c1", "bucket", "zkey", &[7u8; 20], Some(&resume))
            .await
            .unwrap();

        assert_eq!(vec![4, 5], transport.put_part_numbers());
        assert!(!coordinator.calls().contains(&crate::functions::START_MULTI_PART_UPLOAD.to_string()));

        let completed = coordinator.completed_parts();
        assert_eq!(vec![1, 2, 3, 4, 5], completed.iter().map(|part| part.part_number).collect::<Vec<_>>());
        assert_eq!(
            vec![4, 5],
            coordinator.stored_chunks().iter().map(|part| part.part_number).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_fresh_upload_opens_and_stores_upload_id() {
        let coordinator = Arc::new(FakeCoordinator::passive());
        let transport = Arc::new(FakeTransport::default());
        let engine = TransferEngine::new(coordinator.clone(), transport.clone(), 4);

        engine.multi_part_upload("c1", "bucket", "zkey", &[1u8; 9], None).await.unwrap();

        assert_eq!(vec![1, 2, 3], transport.put_part_numbers());
        let calls = coordinator.calls();
        let opened = calls.iter().position(|call| call == crate::functions::START_MULTI_PART_UPLOAD);
        let stored = calls
            .iter()
            .position(|call| call == crate::functions::TEMPORARY_STORE_CURRENT_CONTRIBUTION_MULTI_PART_UPLOAD_ID);
        assert!(opened.unwrap() < stored.unwrap());
    }

    #[tokio::test]
    async fn test_failed_part_requires_resume() {
        let coordinator = Arc::new(FakeCoordinator::passive());
        let transport = Arc::new(FakeTransport::failing_part(2));
        let engine = TransferEngine::new(coordinator.clone(), transport.clone(), 4);

        let error = engine
            .multi_part_upload("c1", "bucket", "zkey", &[1u8; 12], None)
            .await
            .unwrap_err();

        assert!(matches!(error, TransferError::ResumeRequired { part_number: 2, .. }));
        assert_eq!(1, coordinator.stored_chunks().len());
        assert!(coordinator.completed_parts().is_empty());
    }

    #[tokio::test]
    async fn test_download_reports_progress() {
        let coordinator = Arc::new(FakeCoordinator::passive());
        let transport = Arc::new(FakeTransport::default());
        transport.serve(b"genesis zkey bytes".to_vec(), 5);
        let engine = TransferEngine::new(coordinator.clone(), transport.clone(), 4);
        let sink = RecordingStatusSink::default();

        let bytes = engine.download_artifact("bucket", "zkey", &sink).await.unwrap();

        assert_eq!(b"genesis zkey bytes".to_vec(), bytes);
        assert_eq!(Some("Downloading zkey: 100%".to_string()), sink.messages().last().cloned());
    }

    #[tokio::test]
    async fn test_download_without_streaming() {
        let coordinator = Arc::new(FakeCoordinator::passive());
        let transport = Arc::new(FakeTransport::without_streaming());
        let engine = TransferEngine::new(coordinator, transport, 4);

        let error = engine
            .download_artifact("bucket", "zkey", &RecordingStatusSink::default())
            .await
            .unwrap_err();
        assert!(matches!(error, TransferError::StreamUnsupported));
    }
}
