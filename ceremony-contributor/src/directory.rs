//! Typed reads of the ceremony documents.

use crate::{
    errors::StoreError,
    store::{DocumentStore, FieldFilter, StoredDocument, Subscription},
    tasks::{process_items, DEFAULT_MAX_CONCURRENCY},
    utils::{get_bucket_name, get_public_object_url, get_zkey_storage_path, zkey_filename},
};

use ceremony_shared::structures::{
    Beacon,
    Ceremony,
    Circuit,
    Contribution,
    DocumentInfo,
    Participant,
    Timeout,
    FINAL_CONTRIBUTION_INDEX,
};

use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

pub fn ceremonies_path() -> String {
    "ceremonies".to_string()
}

pub fn ceremony_path(ceremony_id: &str) -> String {
    format!("ceremonies/{}", ceremony_id)
}

pub fn circuits_path(ceremony_id: &str) -> String {
    format!("ceremonies/{}/circuits", ceremony_id)
}

pub fn circuit_path(ceremony_id: &str, circuit_id: &str) -> String {
    format!("ceremonies/{}/circuits/{}", ceremony_id, circuit_id)
}

pub fn contributions_path(ceremony_id: &str, circuit_id: &str) -> String {
    format!("ceremonies/{}/circuits/{}/contributions", ceremony_id, circuit_id)
}

pub fn participants_path(ceremony_id: &str) -> String {
    format!("ceremonies/{}/participants", ceremony_id)
}

pub fn participant_path(ceremony_id: &str, participant_id: &str) -> String {
    format!("ceremonies/{}/participants/{}", ceremony_id, participant_id)
}

pub fn timeouts_path(ceremony_id: &str, participant_id: &str) -> String {
    format!("ceremonies/{}/participants/{}/timeouts", ceremony_id, participant_id)
}

/// Decodes a stored document into its typed form.
pub fn decode<T: DeserializeOwned>(document: StoredDocument) -> Result<DocumentInfo<T>, StoreError> {
    Ok(DocumentInfo {
        data: serde_json::from_value(document.data)?,
        id: document.id,
    })
}

/// The number of participants waiting for a circuit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WaitingQueueSummary {
    pub ceremony_name: String,
    pub circuit_name: String,
    pub waiting_queue: usize,
}

/// Public urls of the zkeys of a circuit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZkeyDownloadLinks {
    pub circuit_prefix: String,
    pub final_zkey_url: String,
    pub latest_zkey_url: String,
}

/// A circuit together with the contributions of a single participant to it.
#[derive(Clone, Debug, PartialEq)]
pub struct CircuitContributions {
    pub circuit: DocumentInfo<Circuit>,
    pub contributions: Vec<DocumentInfo<Contribution>>,
}

///
/// Read access to the ceremony documents. Every call reads the store,
/// nothing is cached between calls.
///
#[derive(Clone)]
pub struct CeremonyDirectory {
    store: Arc<dyn DocumentStore>,
    max_concurrency: usize,
}

impl CeremonyDirectory {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<Option<DocumentInfo<T>>, StoreError> {
        match self.store.get_document(path).await? {
            Some(document) => Ok(Some(decode(document)?)),
            None => Ok(None),
        }
    }

    async fn fetch_existing<T: DeserializeOwned>(&self, path: &str) -> Result<DocumentInfo<T>, StoreError> {
        self.fetch(path)
            .await?
            .ok_or_else(|| StoreError::MissingDocument(path.to_string()))
    }

    async fn list<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<DocumentInfo<T>>, StoreError> {
        self.store
            .list_collection(collection)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    async fn query<T: DeserializeOwned>(
        &self,
        collection: &str,
        filters: &[FieldFilter],
    ) -> Result<Vec<DocumentInfo<T>>, StoreError> {
        self.store
            .query_collection(collection, filters)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    pub async fn ceremony(&self, ceremony_id: &str) -> Result<DocumentInfo<Ceremony>, StoreError> {
        self.fetch_existing(&ceremony_path(ceremony_id)).await
    }

    pub async fn list_ceremonies(&self) -> Result<Vec<DocumentInfo<Ceremony>>, StoreError> {
        self.list(&ceremonies_path()).await
    }

    /// Returns the circuits of a ceremony in contribution order.
    pub async fn list_circuits(&self, ceremony_id: &str) -> Result<Vec<DocumentInfo<Circuit>>, StoreError> {
        let mut circuits = self.list::<Circuit>(&circuits_path(ceremony_id)).await?;
        circuits.sort_by_key(|circuit| circuit.data.sequence_position);
        Ok(circuits)
    }

    pub async fn circuit(&self, ceremony_id: &str, circuit_id: &str) -> Result<DocumentInfo<Circuit>, StoreError> {
        self.fetch_existing(&circuit_path(ceremony_id, circuit_id)).await
    }

    pub async fn list_participants(&self, ceremony_id: &str) -> Result<Vec<DocumentInfo<Participant>>, StoreError> {
        self.list(&participants_path(ceremony_id)).await
    }

    pub async fn participant(
        &self,
        ceremony_id: &str,
        participant_id: &str,
    ) -> Result<Option<DocumentInfo<Participant>>, StoreError> {
        self.fetch(&participant_path(ceremony_id, participant_id)).await
    }

    pub async fn list_circuit_contributions(
        &self,
        ceremony_id: &str,
        circuit_id: &str,
    ) -> Result<Vec<DocumentInfo<Contribution>>, StoreError> {
        self.list(&contributions_path(ceremony_id, circuit_id)).await
    }

    pub async fn circuit_contributions_from_participant(
        &self,
        ceremony_id: &str,
        circuit_id: &str,
        participant_id: &str,
    ) -> Result<Vec<DocumentInfo<Contribution>>, StoreError> {
        self.query(
            &contributions_path(ceremony_id, circuit_id),
            &[FieldFilter::equal("participantId", participant_id)],
        )
        .await
    }

    /// Returns the timeouts of the participant ending at or after `now`.
    pub async fn active_timeouts(
        &self,
        ceremony_id: &str,
        participant_id: &str,
        now: i64,
    ) -> Result<Vec<DocumentInfo<Timeout>>, StoreError> {
        self.query(
            &timeouts_path(ceremony_id, participant_id),
            &[FieldFilter::greater_or_equal("endDate", now)],
        )
        .await
    }

    /// Returns the validity of the participant's contribution to the circuit, if it was recorded.
    pub async fn latest_verification_result(
        &self,
        ceremony_id: &str,
        circuit_id: &str,
        participant_id: &str,
    ) -> Result<Option<bool>, StoreError> {
        let contributions = self
            .circuit_contributions_from_participant(ceremony_id, circuit_id, participant_id)
            .await?;
        Ok(contributions.first().map(|contribution| contribution.data.valid))
    }

    ///
    /// Returns the contributions of the participant to every circuit, in
    /// contribution order. The circuits are queried concurrently.
    ///
    pub async fn all_contributions(
        &self,
        ceremony_id: &str,
        participant_id: &str,
    ) -> Result<Vec<CircuitContributions>, StoreError> {
        let circuits = self.list_circuits(ceremony_id).await?;

        let processed = process_items(circuits, self.max_concurrency, |circuit| async move {
            let contributions = self
                .circuit_contributions_from_participant(ceremony_id, &circuit.id, participant_id)
                .await?;
            Ok::<_, StoreError>(CircuitContributions { circuit, contributions })
        })
        .await;

        if let Some(error) = processed.errors.into_iter().next() {
            return Err(error);
        }

        let mut results = processed.results;
        results.sort_by_key(|entry| entry.circuit.data.sequence_position);
        Ok(results)
    }

    /// Returns `true` if the participant contributed to every circuit of the ceremony.
    pub async fn has_participant_contributed(&self, ceremony_id: &str, participant_id: &str) -> Result<bool, StoreError> {
        let contributions = self.all_contributions(ceremony_id, participant_id).await?;
        debug!(
            "Participant {} contributed to {} of {} circuits",
            participant_id,
            contributions.iter().filter(|entry| !entry.contributions.is_empty()).count(),
            contributions.len()
        );
        Ok(contributions.iter().all(|entry| !entry.contributions.is_empty()))
    }

    pub async fn waiting_queue_summary(&self, ceremony_id: &str) -> Result<Vec<WaitingQueueSummary>, StoreError> {
        let ceremony = self.ceremony(ceremony_id).await?;
        let circuits = self.list_circuits(ceremony_id).await?;

        Ok(circuits
            .into_iter()
            .map(|circuit| WaitingQueueSummary {
                ceremony_name: ceremony.data.title.clone(),
                waiting_queue: circuit
                    .data
                    .waiting_queue
                    .as_ref()
                    .map(|queue| queue.contributors.len())
                    .unwrap_or(0),
                circuit_name: circuit.data.name,
            })
            .collect())
    }

    /// Returns the beacon of the coordinator's final contribution, once the ceremony is finalized.
    pub async fn final_beacon(&self, ceremony_id: &str) -> Result<Option<Beacon>, StoreError> {
        for circuit in self.list_circuits(ceremony_id).await? {
            let final_contributions = self
                .query::<Contribution>(
                    &contributions_path(ceremony_id, &circuit.id),
                    &[FieldFilter::equal("zkeyIndex", FINAL_CONTRIBUTION_INDEX)],
                )
                .await?;

            if let Some(beacon) = final_contributions
                .into_iter()
                .find_map(|contribution| contribution.data.beacon)
            {
                return Ok(Some(beacon));
            }
        }
        Ok(None)
    }

    /// Returns the circuit at the given sequence position.
    pub async fn circuit_by_sequence_position(
        &self,
        ceremony_id: &str,
        sequence_position: u64,
    ) -> Result<DocumentInfo<Circuit>, StoreError> {
        let circuits = self.list_circuits(ceremony_id).await?;
        circuit_by_sequence_position(&circuits, sequence_position).cloned()
    }

    pub async fn subscribe_participant(&self, ceremony_id: &str, participant_id: &str) -> Result<Subscription, StoreError> {
        self.store.subscribe(&participant_path(ceremony_id, participant_id)).await
    }

    pub async fn subscribe_circuit(&self, ceremony_id: &str, circuit_id: &str) -> Result<Subscription, StoreError> {
        self.store.subscribe(&circuit_path(ceremony_id, circuit_id)).await
    }
}

/// Returns the only circuit at `sequence_position`.
pub fn circuit_by_sequence_position(
    circuits: &[DocumentInfo<Circuit>],
    sequence_position: u64,
) -> Result<&DocumentInfo<Circuit>, StoreError> {
    let mut matching = circuits
        .iter()
        .filter(|circuit| circuit.data.sequence_position == sequence_position);

    match (matching.next(), matching.next()) {
        (Some(circuit), None) => Ok(circuit),
        _ => Err(StoreError::MissingCircuit(sequence_position)),
    }
}

/// Returns the public urls of the final and the latest zkey of every circuit.
pub fn zkey_download_links(
    ceremony: &Ceremony,
    circuits: &[DocumentInfo<Circuit>],
    bucket_postfix: &str,
    region: &str,
) -> Vec<ZkeyDownloadLinks> {
    let bucket = get_bucket_name(&ceremony.prefix, bucket_postfix);

    circuits
        .iter()
        .map(|circuit| {
            let prefix = &circuit.data.prefix;
            let completed = circuit
                .data
                .waiting_queue
                .as_ref()
                .map(|queue| queue.completed_contributions)
                .unwrap_or(0);
            let final_filename = format!("{}_{}.zkey", prefix, FINAL_CONTRIBUTION_INDEX);

            ZkeyDownloadLinks {
                circuit_prefix: prefix.clone(),
                final_zkey_url: get_public_object_url(&bucket, region, &get_zkey_storage_path(prefix, &final_filename)),
                latest_zkey_url: get_public_object_url(
                    &bucket,
                    region,
                    &get_zkey_storage_path(prefix, &zkey_filename(prefix, completed)),
                ),
            }
        })
        .collect()
}

/// Returns the number of constraints of the largest circuit.
pub fn largest_circuit_constraints(circuits: &[DocumentInfo<Circuit>]) -> u64 {
    circuits
        .iter()
        .filter_map(|circuit| circuit.data.metadata.constraints)
        .max()
        .unwrap_or(0)
}
