use crate::{
    directory::{decode, CeremonyDirectory},
    environment::Environment,
    errors::VerificationError,
    functions::CeremonyFunctions,
};

use ceremony_shared::structures::{Circuit, DocumentInfo};

use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// How the end of a verification was observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// The verification function answered.
    Responded,
    /// The circuit recorded one more completed contribution.
    ObservedCompleted,
    /// The circuit recorded one more failed contribution.
    ObservedFailed,
}

///
/// Returns the outcome a circuit snapshot reveals, compared to the
/// snapshot taken before the verification started. Both the contribution
/// counters and every average timing must have moved.
///
pub fn observed_outcome(before: &Circuit, after: &Circuit) -> Option<VerificationOutcome> {
    let (before_queue, after_queue) = match (&before.waiting_queue, &after.waiting_queue) {
        (Some(before_queue), Some(after_queue)) => (before_queue, after_queue),
        _ => return None,
    };
    if !after.avg_timings.all_changed_from(&before.avg_timings) {
        return None;
    }

    if after_queue.failed_contributions == before_queue.failed_contributions + 1 {
        Some(VerificationOutcome::ObservedFailed)
    } else if after_queue.completed_contributions == before_queue.completed_contributions + 1 {
        Some(VerificationOutcome::ObservedCompleted)
    } else {
        None
    }
}

async fn observe_verification(
    directory: &CeremonyDirectory,
    environment: &Environment,
    ceremony_id: &str,
    before: &DocumentInfo<Circuit>,
) -> Result<VerificationOutcome, VerificationError> {
    sleep(environment.verification_fallback_delay()).await;
    warn!(
        "No answer from the verification of {} yet, watching the circuit instead",
        before.data.prefix
    );

    let mut subscription = directory.subscribe_circuit(ceremony_id, &before.id).await?;
    let observed = timeout(environment.verification_grace, async {
        while let Some(document) = subscription.next().await {
            let after = decode::<Circuit>(document)?;
            if let Some(outcome) = observed_outcome(&before.data, &after.data) {
                return Ok(Some(outcome));
            }
            debug!("Circuit {} changed without a verification result", before.data.prefix);
        }
        Ok::<_, VerificationError>(None)
    })
    .await;
    subscription.unsubscribe();

    match observed {
        Ok(Ok(Some(outcome))) => Ok(outcome),
        Ok(Ok(None)) | Err(_) => Err(VerificationError::Inconclusive),
        Ok(Err(error)) => Err(error),
    }
}

///
/// Requests the verification of the participant's contribution to `circuit`.
///
/// The request races a timer ending just before the execution ceiling of
/// the verification function. If the timer ends first, the circuit document
/// decides: the verification is over once it records one more completed or
/// failed contribution than `circuit`, the snapshot taken before verifying.
///
/// Whichever side loses the race is dropped. A dropped request is only
/// abandoned by this client, the verification function keeps running on the
/// coordinator and still records its result.
///
pub async fn verify_contribution(
    functions: &dyn CeremonyFunctions,
    directory: &CeremonyDirectory,
    environment: &Environment,
    ceremony_id: &str,
    circuit: &DocumentInfo<Circuit>,
    participant_id: &str,
    bucket: &str,
) -> Result<VerificationOutcome, VerificationError> {
    info!("Verifying the contribution to {}", circuit.data.prefix);

    tokio::select! {
        response = functions.verify_contribution(ceremony_id, &circuit.id, participant_id, bucket) => {
            response?;
            Ok(VerificationOutcome::Responded)
        }
        observed = observe_verification(directory, environment, ceremony_id, circuit) => observed,
    }
}
