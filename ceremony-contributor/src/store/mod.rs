//! Access to the document store holding the state of every ceremony.

mod http;
mod memory;

pub use self::{http::HttpDocumentStore, memory::MemoryDocumentStore};

use crate::errors::StoreError;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// A document as returned by the store.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct StoredDocument {
    pub id: String,
    pub data: Value,
}

/// A predicate on a document field.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum FieldFilter {
    Equal { field: String, value: Value },
    GreaterOrEqual { field: String, value: Value },
}

impl FieldFilter {
    pub fn equal<V: Into<Value>>(field: &str, value: V) -> Self {
        FieldFilter::Equal {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn greater_or_equal<V: Into<Value>>(field: &str, value: V) -> Self {
        FieldFilter::GreaterOrEqual {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn matches(&self, data: &Value) -> bool {
        match self {
            FieldFilter::Equal { field, value } => data.get(field) == Some(value),
            FieldFilter::GreaterOrEqual { field, value } => match (data.get(field), value) {
                (Some(Value::Number(left)), Value::Number(right)) => match (left.as_f64(), right.as_f64()) {
                    (Some(left), Some(right)) => left >= right,
                    _ => false,
                },
                (Some(Value::String(left)), Value::String(right)) => left >= right,
                _ => false,
            },
        }
    }
}

///
/// A stream of snapshots of a single document. The current state is
/// delivered first, followed by the state after every write.
///
/// Dropping the subscription stops the delivery.
///
pub struct Subscription {
    path: String,
    receiver: mpsc::UnboundedReceiver<StoredDocument>,
    _stop: Option<oneshot::Sender<()>>,
}

impl Subscription {
    pub fn new(path: &str, receiver: mpsc::UnboundedReceiver<StoredDocument>, stop: Option<oneshot::Sender<()>>) -> Self {
        Self {
            path: path.to_string(),
            receiver,
            _stop: stop,
        }
    }

    /// Returns the next snapshot, or `None` once the store closed the subscription.
    pub async fn next(&mut self) -> Option<StoredDocument> {
        self.receiver.recv().await
    }

    /// Waits for a snapshot and skips to the most recent one already delivered.
    pub async fn next_latest(&mut self) -> Option<StoredDocument> {
        let mut latest = self.receiver.recv().await?;
        while let Ok(document) = self.receiver.try_recv() {
            latest = document;
        }
        Some(latest)
    }

    pub fn unsubscribe(self) {
        debug!("Unsubscribing from {}", self.path);
    }
}

#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns the document at `path`, if it exists.
    async fn get_document(&self, path: &str) -> Result<Option<StoredDocument>, StoreError>;

    /// Returns every document directly inside `collection`.
    async fn list_collection(&self, collection: &str) -> Result<Vec<StoredDocument>, StoreError>;

    /// Returns the documents inside `collection` matching every filter.
    async fn query_collection(&self, collection: &str, filters: &[FieldFilter]) -> Result<Vec<StoredDocument>, StoreError>;

    /// Subscribes to the changes of the document at `path`.
    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError>;
}
