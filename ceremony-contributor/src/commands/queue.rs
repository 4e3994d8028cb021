use crate::{
    directory::{decode, CeremonyDirectory},
    errors::StoreError,
    status::{Status, StatusSink},
    store::Subscription,
};

use ceremony_shared::{
    structures::{AvgTimings, Circuit},
    time::get_seconds_minutes_hours_from_millis,
};

use std::sync::Arc;
use tracing::{debug, info};

/// What changed for the participant in a new circuit snapshot.
#[derive(Clone, Debug, PartialEq)]
pub enum QueueUpdate {
    /// The participant is first in the queue.
    Ready,
    /// The participant moved to a new position.
    Moved { position: usize, estimate_millis: u64 },
    /// The participant is not in the queue.
    NotQueued,
    Unchanged,
}

///
/// Returns the expected time until `contributors_ahead` contributions and
/// their verifications are done, zero when the circuit has no averages yet.
///
pub fn estimated_waiting_millis(avg_timings: &AvgTimings, contributors_ahead: usize) -> u64 {
    let full_contribution = avg_timings.full_contribution.max(0.0);
    let verification = avg_timings.verify_cloud_function.max(0.0);
    ((full_contribution + verification) * contributors_ahead as f64) as u64
}

/// Tracks the position of a participant in the waiting queue of a circuit.
#[derive(Clone, Debug)]
pub struct QueuePositionTracker {
    participant_id: String,
    last_position: Option<usize>,
}

impl QueuePositionTracker {
    pub fn new(participant_id: &str) -> Self {
        Self {
            participant_id: participant_id.to_string(),
            last_position: None,
        }
    }

    pub fn observe(&mut self, circuit: &Circuit) -> QueueUpdate {
        let position = circuit
            .waiting_queue
            .as_ref()
            .and_then(|queue| queue.position_of(&self.participant_id))
            .unwrap_or(0);

        if self.last_position == Some(position) {
            return QueueUpdate::Unchanged;
        }
        self.last_position = Some(position);

        match position {
            0 => QueueUpdate::NotQueued,
            1 => QueueUpdate::Ready,
            position => QueueUpdate::Moved {
                position,
                estimate_millis: estimated_waiting_millis(&circuit.avg_timings, position - 1),
            },
        }
    }
}

fn moved_message(position: usize, estimate_millis: u64) -> String {
    let estimate = match estimate_millis {
        0 => "no time estimate available".to_string(),
        millis => format!("~{}", get_seconds_minutes_hours_from_millis(millis as i64)),
    };
    format!(
        "You are at position {} in the queue. You will have to wait for {} contributors ({})",
        position,
        position - 1,
        estimate
    )
}

///
/// Reports every change of the participant's position carried by the
/// circuit subscription. Returns once the participant is first in the
/// queue or the subscription ends.
///
pub async fn follow_queue_position(
    mut subscription: Subscription,
    participant_id: &str,
    sink: &dyn StatusSink,
) -> Result<(), StoreError> {
    let mut tracker = QueuePositionTracker::new(participant_id);

    while let Some(document) = subscription.next().await {
        let circuit = decode::<Circuit>(document)?;

        match tracker.observe(&circuit.data) {
            QueueUpdate::Ready => {
                info!("{} is first in the queue of {}", participant_id, circuit.data.prefix);
                sink.report(Status::loading(
                    "You are now the first in the queue, getting ready for contributing.",
                ));
                subscription.unsubscribe();
                return Ok(());
            }
            QueueUpdate::Moved {
                position,
                estimate_millis,
            } => sink.report(Status::message(moved_message(position, estimate_millis))),
            QueueUpdate::NotQueued => sink.report(Status::message(format!(
                "You are not in the waiting queue of circuit {}",
                circuit.data.prefix
            ))),
            QueueUpdate::Unchanged => debug!("Queue position of {} unchanged", participant_id),
        }
    }

    Ok(())
}

/// Subscribes to the circuit and reports the participant's position until it is first in the queue.
pub async fn listen_to_queue_position(
    directory: CeremonyDirectory,
    ceremony_id: String,
    circuit_id: String,
    participant_id: String,
    sink: Arc<dyn StatusSink>,
) -> Result<(), StoreError> {
    let subscription = directory.subscribe_circuit(&ceremony_id, &circuit_id).await?;
    follow_queue_position(subscription, &participant_id, sink.as_ref()).await
}
