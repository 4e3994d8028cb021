use super::{DocumentStore, FieldFilter, StoredDocument, Subscription};
use crate::errors::StoreError;

use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tokio::{
    sync::{mpsc, oneshot},
    time::sleep,
};
use tracing::{debug, warn};
use url::Url;

#[derive(Serialize)]
struct QueryRequest<'a> {
    filters: &'a [FieldFilter],
}

///
/// A document store reached through the coordinator's document gateway.
///
/// `GET {base}/{path}` returns a single document, `GET {base}/{collection}`
/// lists a collection and `POST {base}/{collection}:query` filters it.
/// Subscriptions poll the document and deliver it whenever it changes.
///
#[derive(Clone)]
pub struct HttpDocumentStore {
    client: reqwest::Client,
    base_url: Url,
    id_token: SecretString,
    poll_interval: Duration,
}

impl HttpDocumentStore {
    pub fn new(base_url: Url, id_token: SecretString, poll_interval: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            id_token,
            poll_interval,
        }
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.id_token.expose_secret())
    }

    async fn fetch_document(&self, path: &str) -> Result<Option<StoredDocument>, StoreError> {
        let url = self.base_url.join(path)?;
        let response = self
            .client
            .get(url.as_str())
            .header(http::header::AUTHORIZATION, self.bearer())
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(StoreError::FailedRequest(path.to_string(), url.to_string()));
        }

        let data = response.bytes().await?;
        Ok(Some(serde_json::from_slice(&*data)?))
    }

    async fn poll(self, path: String, sender: mpsc::UnboundedSender<StoredDocument>, mut stop: oneshot::Receiver<()>) {
        let mut latest: Option<StoredDocument> = None;
        loop {
            match self.fetch_document(&path).await {
                Ok(Some(document)) if latest.as_ref() != Some(&document) => {
                    if sender.send(document.clone()).is_err() {
                        return;
                    }
                    latest = Some(document);
                }
                Ok(_) => {}
                Err(error) => warn!("Failed polling {}: {}", path, error),
            }

            tokio::select! {
                _ = &mut stop => {
                    debug!("Stopped polling {}", path);
                    return;
                }
                _ = sleep(self.poll_interval) => {}
            }
        }
    }
}

#[async_trait::async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn get_document(&self, path: &str) -> Result<Option<StoredDocument>, StoreError> {
        self.fetch_document(path).await
    }

    async fn list_collection(&self, collection: &str) -> Result<Vec<StoredDocument>, StoreError> {
        let url = self.base_url.join(collection)?;
        let response = self
            .client
            .get(url.as_str())
            .header(http::header::AUTHORIZATION, self.bearer())
            .send()
            .await?
            .error_for_status()
            .map_err(|_| StoreError::FailedRequest(collection.to_string(), url.to_string()))?;

        let data = response.bytes().await?;
        Ok(serde_json::from_slice(&*data)?)
    }

    async fn query_collection(&self, collection: &str, filters: &[FieldFilter]) -> Result<Vec<StoredDocument>, StoreError> {
        let url = self.base_url.join(&format!("{}:query", collection))?;
        let bytes = serde_json::to_vec(&QueryRequest { filters })?;
        let response = self
            .client
            .post(url.as_str())
            .header(http::header::AUTHORIZATION, self.bearer())
            .header(http::header::CONTENT_TYPE, "application/json")
            .header(http::header::CONTENT_LENGTH, bytes.len())
            .body(bytes)
            .send()
            .await?
            .error_for_status()
            .map_err(|_| StoreError::FailedRequest(collection.to_string(), url.to_string()))?;

        let data = response.bytes().await?;
        Ok(serde_json::from_slice(&*data)?)
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (stop_sender, stop_receiver) = oneshot::channel();

        tokio::spawn(self.clone().poll(path.to_string(), sender, stop_receiver));

        Ok(Subscription::new(path, receiver, Some(stop_sender)))
    }
}
