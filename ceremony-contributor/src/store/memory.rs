use super::{DocumentStore, FieldFilter, StoredDocument, Subscription};
use crate::errors::StoreError;

use serde_json::Value;
use std::{collections::BTreeMap, sync::Mutex};
use tokio::sync::mpsc;

#[derive(Default)]
struct Documents {
    by_path: BTreeMap<String, Value>,
    subscribers: Vec<(String, mpsc::UnboundedSender<StoredDocument>)>,
}

///
/// An in-process document store. Every write is pushed to the
/// subscribers of the written document.
///
#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<Documents>,
}

fn document_id(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

fn is_in_collection(path: &str, collection: &str) -> bool {
    path.strip_prefix(collection)
        .and_then(|rest| rest.strip_prefix('/'))
        .map(|id| !id.is_empty() && !id.contains('/'))
        .unwrap_or(false)
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes the document at `path` and notifies its subscribers.
    pub fn set_document(&self, path: &str, data: Value) {
        let mut documents = self.documents.lock().expect("Should have locked the documents");
        documents.by_path.insert(path.to_string(), data.clone());

        let snapshot = StoredDocument {
            id: document_id(path),
            data,
        };
        documents
            .subscribers
            .retain(|(subscribed_path, sender)| subscribed_path != path || sender.send(snapshot.clone()).is_ok());
    }

    /// Returns the document at `path`, if it exists.
    pub fn document(&self, path: &str) -> Option<Value> {
        let documents = self.documents.lock().expect("Should have locked the documents");
        documents.by_path.get(path).cloned()
    }

    /// Ends every subscription once its pending snapshots are consumed.
    pub fn close_subscriptions(&self) {
        let mut documents = self.documents.lock().expect("Should have locked the documents");
        documents.subscribers.clear();
    }

    fn collection(&self, collection: &str) -> Vec<StoredDocument> {
        let documents = self.documents.lock().expect("Should have locked the documents");
        documents
            .by_path
            .iter()
            .filter(|(path, _)| is_in_collection(path, collection))
            .map(|(path, data)| StoredDocument {
                id: document_id(path),
                data: data.clone(),
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_document(&self, path: &str) -> Result<Option<StoredDocument>, StoreError> {
        Ok(self.document(path).map(|data| StoredDocument {
            id: document_id(path),
            data,
        }))
    }

    async fn list_collection(&self, collection: &str) -> Result<Vec<StoredDocument>, StoreError> {
        Ok(self.collection(collection))
    }

    async fn query_collection(&self, collection: &str, filters: &[FieldFilter]) -> Result<Vec<StoredDocument>, StoreError> {
        Ok(self
            .collection(collection)
            .into_iter()
            .filter(|document| filters.iter().all(|filter| filter.matches(&document.data)))
            .collect())
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError> {
        let (sender, receiver) = mpsc::unbounded_channel();

        let mut documents = self.documents.lock().expect("Should have locked the documents");
        if let Some(data) = documents.by_path.get(path) {
            let snapshot = StoredDocument {
                id: document_id(path),
                data: data.clone(),
            };
            // The receiver is still in scope.
            let _ = sender.send(snapshot);
        }
        documents.subscribers.push((path.to_string(), sender));

        Ok(Subscription::new(path, receiver, None))
    }
}
