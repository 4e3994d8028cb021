use crate::{
    cli::commands::{read_token, status::StatusOptions, ID_TOKEN_VARIABLE},
    directory::{largest_circuit_constraints, zkey_download_links, CeremonyDirectory},
    environment::Environment,
    errors::StoreError,
    store::HttpDocumentStore,
};

use ceremony_shared::structures::CeremonyState;

use std::{fmt::Write, sync::Arc};

///
/// Describes a ceremony: its circuits and their queues, where their zkeys
/// can be downloaded and, once finalized, the beacon of the final
/// contribution. With a participant id the participant's progress follows.
///
pub async fn describe_ceremony(
    directory: &CeremonyDirectory,
    environment: &Environment,
    ceremony_id: &str,
    participant_id: Option<&str>,
) -> Result<String, StoreError> {
    let ceremony = directory.ceremony(ceremony_id).await?;
    let circuits = directory.list_circuits(ceremony_id).await?;
    let queues = directory.waiting_queue_summary(ceremony_id).await?;
    let participants = directory.list_participants(ceremony_id).await?;

    let mut description = String::new();
    let _ = writeln!(
        description,
        "{} ({:?}, {} participants)",
        ceremony.data.title,
        ceremony.data.state,
        participants.len()
    );
    if !ceremony.data.description.is_empty() {
        let _ = writeln!(description, "{}", ceremony.data.description);
    }

    for (circuit, queue) in circuits.iter().zip(queues.iter()) {
        let contributions = directory.list_circuit_contributions(ceremony_id, &circuit.id).await?;
        let _ = writeln!(
            description,
            "Circuit #{} {}: {} waiting, {} valid contributions",
            circuit.data.sequence_position,
            queue.circuit_name,
            queue.waiting_queue,
            contributions.iter().filter(|contribution| contribution.data.valid).count()
        );
    }
    let _ = writeln!(
        description,
        "Largest circuit: {} constraints",
        largest_circuit_constraints(&circuits)
    );

    let finalized = ceremony.data.state == CeremonyState::Finalized;
    for links in zkey_download_links(&ceremony.data, &circuits, &environment.bucket_postfix, &environment.aws_region) {
        let url = if finalized { links.final_zkey_url } else { links.latest_zkey_url };
        let _ = writeln!(description, "{}: {}", links.circuit_prefix, url);
    }
    if finalized {
        if let Some(beacon) = directory.final_beacon(ceremony_id).await? {
            let _ = writeln!(description, "Final beacon: {} (hash {})", beacon.value, beacon.hash);
        }
    }

    if let Some(participant_id) = participant_id {
        match directory.participant(ceremony_id, participant_id).await? {
            Some(participant) => {
                let contributed = directory.has_participant_contributed(ceremony_id, participant_id).await?;
                let _ = writeln!(
                    description,
                    "Participant {}: {:?} at circuit {} of {}, step {:?}, contributed to every circuit: {}",
                    participant.id,
                    participant.data.status,
                    participant.data.contribution_progress,
                    circuits.len(),
                    participant.data.contribution_step,
                    contributed
                );
            }
            None => {
                let _ = writeln!(description, "Participant {} has not joined this ceremony", participant_id);
            }
        }
    }

    Ok(description)
}

/// Lists every ceremony known to the coordinator.
pub async fn describe_ceremonies(directory: &CeremonyDirectory) -> Result<String, StoreError> {
    let mut description = String::new();
    for ceremony in directory.list_ceremonies().await? {
        let _ = writeln!(
            description,
            "{}: {} ({:?})",
            ceremony.id, ceremony.data.title, ceremony.data.state
        );
    }
    Ok(description)
}

pub async fn status_subcommand(opts: &StatusOptions) -> anyhow::Result<()> {
    let environment = opts.coordinator.environment()?;
    let store = HttpDocumentStore::new(
        environment.store_url.clone(),
        read_token(ID_TOKEN_VARIABLE)?,
        environment.poll_interval,
    );
    let directory = CeremonyDirectory::new(Arc::new(store)).with_max_concurrency(environment.max_concurrency);

    let description = match &opts.ceremony_id {
        Some(ceremony_id) => {
            describe_ceremony(&directory, &environment, ceremony_id, opts.participant_id.as_deref()).await?
        }
        None => describe_ceremonies(&directory).await?,
    };
    print!("{}", description);

    Ok(())
}
