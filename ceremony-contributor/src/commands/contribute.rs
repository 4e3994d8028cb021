use crate::{
    attestation::{publish_attestation, resolve_github_identity, GistPublisher, GithubGistPublisher, PublishedAttestation},
    cli::commands::{contribute::ContributeOptions, read_token, GITHUB_TOKEN_VARIABLE, ID_TOKEN_VARIABLE},
    commands::{
        queue::listen_to_queue_position,
        verify::{verify_contribution, VerificationOutcome},
    },
    directory::{circuit_by_sequence_position, decode, CeremonyDirectory},
    entropy::read_or_generate_entropy,
    environment::Environment,
    errors::ContributeError,
    functions::{CeremonyFunctions, HttpCeremonyFunctions},
    logger::init_logger,
    status::{ProgressBarStatusSink, Status, StatusSink, TracingStatusSink},
    store::{DocumentStore, HttpDocumentStore},
    transfer::{ObjectTransport, ReqwestTransport, TransferEngine},
    utils::{
        calculate_hash,
        format_hash,
        get_bucket_name,
        get_zkey_storage_path,
        now_millis,
        pretty_hash,
        read_from_file,
        remove_file_if_exists,
        write_to_file,
        zkey_filename,
    },
};

use ceremony_shared::{
    structures::{Ceremony, Circuit, ContributionStep, DocumentInfo, Participant, ParticipantStatus},
    time::{get_seconds_minutes_hours_from_millis, remaining_millis, Countdown},
};

use anyhow::Context;
use secrecy::{ExposeSecret, SecretString};
use std::{
    collections::HashMap,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    process::{Command, Stdio},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    task::JoinHandle,
    time::{sleep, Instant},
};
use tracing::{debug, error, info, warn, Level};

const CONTRIBUTION_HASH_TITLE: &str = "Contribution Hash: ";

/// The contributor on whose behalf the contribution runs.
#[derive(Clone, Debug)]
pub struct Identity {
    /// The participant document id, assigned by the coordinator at sign-in.
    pub participant_id: String,
    /// The name the contribution is signed with, e.g. the GitHub login.
    pub contributor_identifier: String,
    pub display_name: String,
    /// A GitHub token allowed to create gists.
    pub gist_token: SecretString,
}

///
/// Computes a contribution on top of the latest zkey of a circuit.
/// Runs on a blocking thread.
///
pub trait ContributionComputer: Send + Sync {
    fn compute(&self, input: &[u8], entropy: &SecretString, identity: &str) -> Result<Vec<u8>, ContributeError>;
}

///
/// Delegates the computation to an external program, invoked as
/// `<program> [arguments...] <input> <output> <identity>` with the
/// entropy written to its standard input.
///
#[derive(Clone, Debug)]
pub struct ExternalCommandComputer {
    pub program: PathBuf,
    pub arguments: Vec<String>,
    pub working_directory: PathBuf,
}

impl ContributionComputer for ExternalCommandComputer {
    fn compute(&self, input: &[u8], entropy: &SecretString, identity: &str) -> Result<Vec<u8>, ContributeError> {
        let input_path = self.working_directory.join("input.zkey");
        let output_path = self.working_directory.join("output.zkey");
        write_to_file(&input_path, input)?;
        remove_file_if_exists(&output_path)?;

        let mut child = Command::new(&self.program)
            .args(&self.arguments)
            .arg(&input_path)
            .arg(&output_path)
            .arg(identity)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            // A program exiting early closes its end, its exit status tells why.
            if let Err(error) = stdin.write_all(entropy.expose_secret().as_bytes()) {
                if error.kind() != ErrorKind::BrokenPipe {
                    return Err(error.into());
                }
            }
        }

        let output = child.wait_with_output()?;
        remove_file_if_exists(&input_path)?;
        if !output.status.success() {
            remove_file_if_exists(&output_path)?;
            return Err(ContributeError::FailedComputation(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let contribution = read_from_file(&output_path)?.ok_or_else(|| {
            ContributeError::FailedComputation(format!(
                "{} did not write {}",
                self.program.display(),
                output_path.display()
            ))
        })?;
        remove_file_if_exists(&output_path)?;
        Ok(contribution)
    }
}

/// How a contribution session ended.
#[derive(Clone, Debug, PartialEq)]
pub enum ContributionOutcome {
    AlreadyContributed,
    TimedOut { remaining: Countdown },
    Denied,
    Completed { attestation: PublishedAttestation },
    /// The participant document stopped delivering snapshots.
    Interrupted,
}

/// A reaction to a participant snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    ProgressToNextCircuit,
    ExecuteSteps { circuit_index: usize },
    WatchQueue { circuit_index: usize },
    NotifyVerifying,
    ReportLatestResult { circuit_index: usize },
    ReportTimeout,
    AdvanceAfterContribution { circuit_index: usize },
    ResumeAfterTimeout { sequence_position: u64 },
    Finish { circuit_index: usize },
}

///
/// Returns `true` if the steps can be entered at the current step. Computing
/// needs an unchanged contribution count, a started upload needs unchanged
/// upload bookkeeping.
///
fn is_resumable(previous: Option<&Participant>, current: &Participant) -> bool {
    match current.contribution_step {
        Some(ContributionStep::Downloading) => true,
        Some(ContributionStep::Computing) => {
            previous.map_or(true, |previous| previous.contributions.len() == current.contributions.len())
        }
        Some(ContributionStep::Uploading) => {
            let previous_upload_id = previous.and_then(|previous| previous.upload_id());
            match (previous_upload_id, current.upload_id()) {
                (None, None) => true,
                _ => previous.map_or(true, |previous| {
                    previous.temp_contribution_data == current.temp_contribution_data
                }),
            }
        }
        _ => false,
    }
}

///
/// Decides how to react to a new snapshot of the participant document.
///
/// `previous` is the snapshot handled before, `None` on the first one. The
/// first snapshot counts as resuming every step and as a change to its
/// status, so a contribution picks up where the coordinator left it.
///
pub fn plan_actions(
    previous: Option<&Participant>,
    current: &Participant,
    circuits: &[DocumentInfo<Circuit>],
    participant_id: &str,
) -> Result<Vec<Action>, ContributeError> {
    let status = current.status;
    let step = current.contribution_step;
    let progress = current.contribution_progress;

    if status == ParticipantStatus::Waiting && step.is_none() && current.contributions.is_empty() && progress == 0 {
        return Ok(vec![Action::ProgressToNextCircuit]);
    }
    if progress == 0 || progress > circuits.len() as u64 {
        return Ok(vec![]);
    }

    let circuit_index = (progress - 1) as usize;
    let circuit = &circuits[circuit_index];
    let waiting_queue = circuit.data.waiting_queue.as_ref().ok_or_else(|| {
        ContributeError::UnexpectedDocument(format!("circuit {} has no waiting queue", circuit.id))
    })?;

    let same_status = previous.map_or(true, |previous| previous.status == status);
    let resuming = previous.map_or(true, |previous| {
        previous.contribution_step == step && previous.status == status && previous.contribution_progress == progress
    });
    let became = |target: ParticipantStatus| status == target && previous.map_or(true, |previous| previous.status != target);

    let is_current_contributor =
        status == ParticipantStatus::Contributing && waiting_queue.is_current_contributor(participant_id);
    let in_transfer_step = matches!(
        step,
        Some(ContributionStep::Downloading) | Some(ContributionStep::Computing) | Some(ContributionStep::Uploading)
    );

    let advance = if step == Some(ContributionStep::Completed) && became(ParticipantStatus::Contributed) {
        Some(Action::AdvanceAfterContribution { circuit_index })
    } else if became(ParticipantStatus::Exhumed) {
        Some(Action::ResumeAfterTimeout {
            sequence_position: progress,
        })
    } else {
        None
    };
    let finish = status == ParticipantStatus::Done
        && step == Some(ContributionStep::Completed)
        && progress == circuits.len() as u64
        && current.contributions.len() == circuits.len();

    let mut actions = vec![];

    if is_current_contributor && in_transfer_step && is_resumable(previous, current) {
        actions.push(Action::ExecuteSteps { circuit_index });
    } else if status == ParticipantStatus::Waiting {
        actions.push(Action::WatchQueue { circuit_index });
    } else if is_current_contributor && resuming && step == Some(ContributionStep::Verifying) {
        actions.push(Action::NotifyVerifying);
    } else if step == Some(ContributionStep::Completed)
        && same_status
        && matches!(status, ParticipantStatus::Done | ParticipantStatus::Contributed)
        && advance.is_none()
        && !finish
    {
        actions.push(Action::ReportLatestResult { circuit_index });
    }

    if became(ParticipantStatus::Timedout) && step != Some(ContributionStep::Completed) {
        actions.push(Action::ReportTimeout);
    }
    if let Some(advance) = advance {
        actions.push(advance);
    }
    if finish {
        actions.push(Action::Finish { circuit_index });
    }

    Ok(actions)
}

/// The queue listeners spawned for the circuits, at most one running per circuit.
#[derive(Default)]
struct QueueListeners {
    listeners: HashMap<String, (JoinHandle<()>, Arc<AtomicBool>)>,
}

impl QueueListeners {
    fn is_running(&self, circuit_id: &str) -> bool {
        self.listeners
            .get(circuit_id)
            .map(|(_, finished)| !finished.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    fn insert(&mut self, circuit_id: &str, listener: JoinHandle<()>, finished: Arc<AtomicBool>) {
        if let Some((previous, _)) = self.listeners.insert(circuit_id.to_string(), (listener, finished)) {
            previous.abort();
        }
    }

    fn abort_all(&mut self) {
        for (_, (listener, _)) in self.listeners.drain() {
            listener.abort();
        }
    }
}

///
/// Drives a participant through the contribution to every circuit of a
/// ceremony. The coordinator owns the state of the participant; this only
/// reacts to the snapshots of the participant document and requests the
/// next transitions.
///
pub struct Contribute {
    identity: Identity,
    entropy: Arc<SecretString>,
    environment: Environment,
    directory: CeremonyDirectory,
    functions: Arc<dyn CeremonyFunctions>,
    transfer: TransferEngine,
    computer: Arc<dyn ContributionComputer>,
    publisher: Arc<dyn GistPublisher>,
    sink: Arc<dyn StatusSink>,
}

impl Contribute {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identity: Identity,
        entropy: SecretString,
        environment: Environment,
        store: Arc<dyn DocumentStore>,
        functions: Arc<dyn CeremonyFunctions>,
        transport: Arc<dyn ObjectTransport>,
        computer: Arc<dyn ContributionComputer>,
        publisher: Arc<dyn GistPublisher>,
        sink: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            directory: CeremonyDirectory::new(store).with_max_concurrency(environment.max_concurrency),
            transfer: TransferEngine::new(functions.clone(), transport, environment.chunk_size),
            identity,
            entropy: Arc::new(entropy),
            environment,
            functions,
            computer,
            publisher,
            sink,
        }
    }

    fn participant_id(&self) -> &str {
        &self.identity.participant_id
    }

    fn zkeys_directory(&self) -> PathBuf {
        self.environment.output_directory.join("contribute").join("zkeys")
    }

    ///
    /// Checks whether the participant can contribute to the ceremony and, if
    /// so, follows the participant document until every circuit received a
    /// contribution. Every error is also reported to the status sink.
    ///
    pub async fn begin_contribution(&self, ceremony_id: &str) -> Result<ContributionOutcome, ContributeError> {
        match self.try_begin_contribution(ceremony_id).await {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                error!("Contribution to {} failed: {}", ceremony_id, error);
                self.sink.report(Status::done(error.to_string()));
                Err(error)
            }
        }
    }

    async fn try_begin_contribution(&self, ceremony_id: &str) -> Result<ContributionOutcome, ContributeError> {
        if !self.functions.check_participant_for_ceremony(ceremony_id).await? {
            return self.report_ineligibility(ceremony_id).await;
        }

        let ceremony = self.directory.ceremony(ceremony_id).await?;
        if self.directory.participant(ceremony_id, self.participant_id()).await?.is_none() {
            return Err(ContributeError::UnexpectedDocument(format!(
                "participant {} of ceremony {} does not exist",
                self.participant_id(),
                ceremony_id
            )));
        }

        info!("Contributing to {} as {}", ceremony.data.title, self.identity.display_name);
        self.listen_for_contribution(&ceremony).await
    }

    async fn report_ineligibility(&self, ceremony_id: &str) -> Result<ContributionOutcome, ContributeError> {
        let contributions = self
            .directory
            .all_contributions(ceremony_id, self.participant_id())
            .await?;
        if !contributions.is_empty() && contributions.iter().all(|entry| !entry.contributions.is_empty()) {
            self.sink
                .report(Status::done("You have already contributed to all circuits of this ceremony"));
            return Ok(ContributionOutcome::AlreadyContributed);
        }

        let now = now_millis();
        let timeouts = self
            .directory
            .active_timeouts(ceremony_id, self.participant_id(), now)
            .await?;
        if let Some(timeout) = timeouts.first() {
            let remaining = get_seconds_minutes_hours_from_millis(remaining_millis(timeout.data.end_date, now));
            self.sink.report(Status::done(format!(
                "You are timed out. You can contribute again in {}",
                remaining
            )));
            return Ok(ContributionOutcome::TimedOut { remaining });
        }

        warn!(
            "{} cannot participate in {} but has neither contributed nor timed out",
            self.participant_id(),
            ceremony_id
        );
        self.sink
            .report(Status::done("You cannot participate in this ceremony right now"));
        Ok(ContributionOutcome::Denied)
    }

    async fn listen_for_contribution(
        &self,
        ceremony: &DocumentInfo<Ceremony>,
    ) -> Result<ContributionOutcome, ContributeError> {
        let mut subscription = self
            .directory
            .subscribe_participant(&ceremony.id, self.participant_id())
            .await?;
        let mut listeners = QueueListeners::default();
        let mut previous: Option<Participant> = None;

        while let Some(document) = subscription.next_latest().await {
            let current = decode::<Participant>(document)?;
            let circuits = self.directory.list_circuits(&ceremony.id).await?;
            debug!(
                "Participant is {:?} at {:?} of circuit {}",
                current.data.status, current.data.contribution_step, current.data.contribution_progress
            );
            if !current.data.is_consistent_with(circuits.len()) {
                warn!(
                    "Participant progress {} is inconsistent with {} contributions and {} circuits",
                    current.data.contribution_progress,
                    current.data.contributions.len(),
                    circuits.len()
                );
            }

            let actions = match plan_actions(previous.as_ref(), &current.data, &circuits, self.participant_id()) {
                Ok(actions) => actions,
                Err(error) => {
                    listeners.abort_all();
                    return Err(error);
                }
            };

            for action in actions {
                match self.perform(action, ceremony, &circuits, &current, &mut listeners).await {
                    Ok(Some(outcome)) => {
                        listeners.abort_all();
                        subscription.unsubscribe();
                        return Ok(outcome);
                    }
                    Ok(None) => {}
                    Err(error) if error.is_recoverable() => {
                        warn!("{}", error);
                        self.sink.report(Status::done(error.to_string()));
                    }
                    Err(error) => {
                        listeners.abort_all();
                        return Err(error);
                    }
                }
            }

            previous = Some(current.data);
        }

        listeners.abort_all();
        Ok(ContributionOutcome::Interrupted)
    }

    async fn perform(
        &self,
        action: Action,
        ceremony: &DocumentInfo<Ceremony>,
        circuits: &[DocumentInfo<Circuit>],
        participant: &DocumentInfo<Participant>,
        listeners: &mut QueueListeners,
    ) -> Result<Option<ContributionOutcome>, ContributeError> {
        debug!("Performing {:?}", action);

        match action {
            Action::ProgressToNextCircuit => {
                self.sink.report(Status::loading("Progressing to the next circuit"));
                self.functions
                    .progress_to_next_circuit_for_contribution(&ceremony.id)
                    .await?;
                sleep(self.environment.delay_after_step).await;
            }
            Action::ExecuteSteps { circuit_index } => {
                self.sink.report(Status::loading("Starting or resuming contribution"));
                self.execute_steps(ceremony, &circuits[circuit_index]).await?;
            }
            Action::WatchQueue { circuit_index } => {
                let circuit = &circuits[circuit_index];
                if !listeners.is_running(&circuit.id) {
                    let (listener, finished) = self.spawn_queue_listener(&ceremony.id, &circuit.id);
                    listeners.insert(&circuit.id, listener, finished);
                }
            }
            Action::NotifyVerifying => {
                self.sink.report(Status::loading("Resuming and verifying"));
                self.sink.report(Status::loading(
                    "Verifying might have not started if you are in this step. Please wait for a confirmation or timeout",
                ));
            }
            Action::ReportLatestResult { circuit_index } => {
                let valid = self.latest_verification_result(ceremony, &circuits[circuit_index]).await?;
                self.sink
                    .report(Status::message(format!("Result of previous contribution - verified = {}", valid)));
            }
            Action::ReportTimeout => {
                let now = now_millis();
                let timeouts = self
                    .directory
                    .active_timeouts(&ceremony.id, self.participant_id(), now)
                    .await?;
                if timeouts.len() != 1 {
                    return Err(ContributeError::UnexpectedDocument(format!(
                        "expected one active timeout, found {}",
                        timeouts.len()
                    )));
                }

                let remaining =
                    get_seconds_minutes_hours_from_millis(remaining_millis(timeouts[0].data.end_date, now));
                self.sink.report(Status::done(format!(
                    "You are timed out. Timeout will end in {}",
                    remaining
                )));
            }
            Action::AdvanceAfterContribution { circuit_index } => {
                let valid = self.latest_verification_result(ceremony, &circuits[circuit_index]).await?;
                self.sink
                    .report(Status::message(format!("The latest contribution was verified as {}", valid)));

                match circuits.get(circuit_index + 1) {
                    Some(next) => self.sink.report(Status::loading(format!(
                        "Progressing to the next circuit at position {}",
                        next.data.sequence_position
                    ))),
                    None => self.sink.report(Status::loading("Progressing to the next circuit")),
                }
                self.functions
                    .progress_to_next_circuit_for_contribution(&ceremony.id)
                    .await?;
                sleep(self.environment.delay_after_step).await;
            }
            Action::ResumeAfterTimeout { sequence_position } => {
                let circuit = circuit_by_sequence_position(circuits, sequence_position)?;
                self.sink.report(Status::loading(format!(
                    "Resuming with circuit at {}",
                    circuit.data.sequence_position
                )));
                self.functions
                    .resume_contribution_after_timeout_expiration(&ceremony.id)
                    .await?;
            }
            Action::Finish { circuit_index } => {
                let valid = self.latest_verification_result(ceremony, &circuits[circuit_index]).await?;
                self.sink
                    .report(Status::message(format!("The latest contribution was verified as {}", valid)));
                self.sink.report(Status::loading("You have contributed to all circuits"));

                let attestation = publish_attestation(
                    &self.directory,
                    self.publisher.as_ref(),
                    &self.identity.gist_token,
                    &self.identity.contributor_identifier,
                    ceremony,
                    participant,
                    &self.environment.output_directory,
                )
                .await?;
                self.sink.report(Status::attestation(
                    "You can share your attestation at",
                    attestation.share_url.clone(),
                ));
                return Ok(Some(ContributionOutcome::Completed { attestation }));
            }
        }

        Ok(None)
    }

    fn spawn_queue_listener(&self, ceremony_id: &str, circuit_id: &str) -> (JoinHandle<()>, Arc<AtomicBool>) {
        let finished = Arc::new(AtomicBool::new(false));
        let listener = listen_to_queue_position(
            self.directory.clone(),
            ceremony_id.to_string(),
            circuit_id.to_string(),
            self.participant_id().to_string(),
            self.sink.clone(),
        );

        let done = finished.clone();
        let sink = self.sink.clone();
        let handle = tokio::spawn(async move {
            if let Err(error) = listener.await {
                warn!("Stopped following the waiting queue: {}", error);
                sink.report(Status::message(error.to_string()));
            }
            done.store(true, Ordering::SeqCst);
        });
        (handle, finished)
    }

    async fn latest_verification_result(
        &self,
        ceremony: &DocumentInfo<Ceremony>,
        circuit: &DocumentInfo<Circuit>,
    ) -> Result<String, ContributeError> {
        let result = self
            .directory
            .latest_verification_result(&ceremony.id, &circuit.id, self.participant_id())
            .await?;
        Ok(match result {
            Some(valid) => valid.to_string(),
            None => "unknown".to_string(),
        })
    }

    async fn fetch_participant(&self, ceremony_id: &str) -> Result<Participant, ContributeError> {
        self.directory
            .participant(ceremony_id, self.participant_id())
            .await?
            .map(|participant| participant.data)
            .ok_or_else(|| ContributeError::UnexpectedDocument(format!("participant {} vanished", self.participant_id())))
    }

    /// Requests the next contribution step and returns the participant once the change propagated.
    async fn advance_step(&self, ceremony_id: &str, before: Duration, after: Duration) -> Result<Participant, ContributeError> {
        sleep(before).await;
        self.functions.progress_to_next_contribution_step(ceremony_id).await?;
        sleep(after).await;
        self.fetch_participant(ceremony_id).await
    }

    ///
    /// Runs the remaining contribution steps of the circuit, starting from the
    /// step recorded in the participant document. Every artifact is cached in
    /// the output directory so an interrupted contribution can be resumed.
    ///
    async fn execute_steps(&self, ceremony: &DocumentInfo<Ceremony>, circuit: &DocumentInfo<Circuit>) -> Result<(), ContributeError> {
        let completed = circuit
            .data
            .waiting_queue
            .as_ref()
            .map(|queue| queue.completed_contributions)
            .ok_or_else(|| ContributeError::UnexpectedDocument(format!("circuit {} has no waiting queue", circuit.id)))?;

        let prefix = &circuit.data.prefix;
        let bucket = get_bucket_name(&ceremony.data.prefix, &self.environment.bucket_postfix);
        let last_zkey = zkey_filename(prefix, completed);
        let next_zkey = zkey_filename(prefix, completed + 1);
        let last_zkey_path = self.zkeys_directory().join(&last_zkey);
        let next_zkey_path = self.zkeys_directory().join(&next_zkey);

        self.sink.report(Status::loading(format!(
            "You are contributing at circuit #{}",
            circuit.data.sequence_position
        )));
        if let Some(constraints) = circuit.data.metadata.constraints {
            if constraints > self.environment.max_constraints {
                warn!("Circuit {} has {} constraints, computing may take a while", prefix, constraints);
            }
        }

        let mut participant = self.fetch_participant(&ceremony.id).await?;
        let mut last_zkey_bytes = None;
        let mut next_zkey_bytes = None;

        if participant.contribution_step == Some(ContributionStep::Downloading) {
            self.sink.report(Status::loading("Downloading zKey"));
            let bytes = self
                .transfer
                .download_artifact(&bucket, &get_zkey_storage_path(prefix, &last_zkey), self.sink.as_ref())
                .await?;
            write_to_file(&last_zkey_path, &bytes)?;
            last_zkey_bytes = Some(bytes);
            self.sink.report(Status::loading("Downloaded zKey"));

            participant = self
                .advance_step(&ceremony.id, Duration::from_secs(0), self.environment.delay_after_download)
                .await?;
        }

        if participant.contribution_step == Some(ContributionStep::Computing) {
            let input = match last_zkey_bytes.take() {
                Some(bytes) => bytes,
                None => match read_from_file(&last_zkey_path)? {
                    Some(bytes) => bytes,
                    None => {
                        self.transfer
                            .download_artifact(&bucket, &get_zkey_storage_path(prefix, &last_zkey), self.sink.as_ref())
                            .await?
                    }
                },
            };

            self.sink.report(Status::loading("Computing contribution"));
            let (computation_time, contribution) = self.compute(input).await?;
            let digest = calculate_hash(&contribution);
            debug!("Contribution hash of {}: {}", prefix, pretty_hash(&digest));
            let hash = format_hash(&digest, CONTRIBUTION_HASH_TITLE);
            self.sink
                .report(Status::loading(format!("Computed zKey in: {}ms", computation_time)));

            write_to_file(&next_zkey_path, &contribution)?;
            self.functions
                .permanently_store_contribution_time_and_hash(&ceremony.id, computation_time, &hash)
                .await?;
            next_zkey_bytes = Some(contribution);

            participant = self
                .advance_step(
                    &ceremony.id,
                    self.environment.delay_after_computation,
                    self.environment.delay_after_step,
                )
                .await?;
        }

        if participant.contribution_step == Some(ContributionStep::Uploading) {
            let contribution = match next_zkey_bytes.take() {
                Some(bytes) => bytes,
                None => read_from_file(&next_zkey_path)?
                    .ok_or_else(|| ContributeError::MissingArtifact(next_zkey_path.display().to_string()))?,
            };

            self.sink.report(Status::loading("Uploading contribution"));
            self.transfer
                .multi_part_upload(
                    &ceremony.id,
                    &bucket,
                    &get_zkey_storage_path(prefix, &next_zkey),
                    &contribution,
                    participant.temp_contribution_data.as_ref(),
                )
                .await?;
            self.sink.report(Status::loading("Uploaded contribution"));

            participant = self
                .advance_step(&ceremony.id, self.environment.delay_after_step, self.environment.delay_after_step)
                .await?;
        }

        if participant.contribution_step == Some(ContributionStep::Verifying) {
            self.sink.report(Status::loading("Verifying contribution"));
            self.verify(ceremony, circuit, &bucket).await;
            remove_cached_zkey(&last_zkey_path);
            remove_cached_zkey(&next_zkey_path);
        }

        Ok(())
    }

    async fn compute(&self, input: Vec<u8>) -> Result<(u64, Vec<u8>), ContributeError> {
        let computer = self.computer.clone();
        let entropy = self.entropy.clone();
        let identity = self.identity.contributor_identifier.clone();

        let started = Instant::now();
        let contribution = tokio::task::spawn_blocking(move || computer.compute(&input, &entropy, &identity)).await??;
        Ok((started.elapsed().as_millis() as u64, contribution))
    }

    /// Verifies the contribution and reports the result. Failures are reported, not returned.
    async fn verify(&self, ceremony: &DocumentInfo<Ceremony>, circuit: &DocumentInfo<Circuit>, bucket: &str) {
        let verified = async {
            let before = self.directory.circuit(&ceremony.id, &circuit.id).await?;
            let outcome = verify_contribution(
                self.functions.as_ref(),
                &self.directory,
                &self.environment,
                &ceremony.id,
                &before,
                self.participant_id(),
                bucket,
            )
            .await?;
            info!("Verification of {} ended: {:?}", circuit.data.prefix, outcome);

            let valid = self
                .directory
                .latest_verification_result(&ceremony.id, &circuit.id, self.participant_id())
                .await?;
            Ok::<_, ContributeError>(match (valid, outcome) {
                (Some(valid), _) => Some(valid),
                (None, VerificationOutcome::ObservedFailed) => Some(false),
                (None, _) => None,
            })
        };

        match verified.await {
            Ok(Some(true)) => self.sink.report(Status::done("Contribution valid")),
            Ok(Some(false)) => self.sink.report(Status::done("Contribution invalid")),
            Ok(None) => self
                .sink
                .report(Status::done("Contribution verified, waiting for the coordinator to record the result")),
            Err(error) => {
                warn!("Verification of {} failed: {}", circuit.data.prefix, error);
                self.sink
                    .report(Status::done(format!("Error verifying, {}", error)));
            }
        }
    }
}

fn remove_cached_zkey(path: &Path) {
    if let Err(error) = remove_file_if_exists(path) {
        warn!("Failed to remove {}: {}", path.display(), error);
    }
}

pub async fn contribute_subcommand(opts: &ContributeOptions, verbosity: Level) -> anyhow::Result<()> {
    let mut environment = opts.coordinator.environment()?;
    if let Some(chunk_size) = opts.chunk_size {
        environment.chunk_size = chunk_size;
    }
    fs_err::create_dir_all(&environment.output_directory)?;
    init_logger(verbosity, Some(&environment.output_directory));

    let id_token = read_token(ID_TOKEN_VARIABLE)?;
    let gist_token = read_token(GITHUB_TOKEN_VARIABLE)?;
    let github_user = resolve_github_identity(&gist_token)
        .await
        .with_context(|| format!("Failed to resolve the GitHub account owning {}", GITHUB_TOKEN_VARIABLE))?;
    let identity = Identity {
        participant_id: opts.participant_id.clone(),
        display_name: github_user.name.clone().unwrap_or_else(|| github_user.login.clone()),
        contributor_identifier: github_user.login,
        gist_token,
    };
    let entropy = read_or_generate_entropy(opts.entropy.clone(), !opts.non_interactive)?;

    let store = Arc::new(HttpDocumentStore::new(
        environment.store_url.clone(),
        id_token.clone(),
        environment.poll_interval,
    ));
    let functions = Arc::new(HttpCeremonyFunctions::new(
        environment.functions_url.clone(),
        environment.verify_contribution_url.clone(),
        environment.verification_ceiling,
        id_token,
    ));
    let computer = Arc::new(ExternalCommandComputer {
        program: opts.computer.clone(),
        arguments: opts.computer_args.clone(),
        working_directory: environment.output_directory.join("contribute").join("computation"),
    });
    let sink: Arc<dyn StatusSink> = if opts.non_interactive {
        Arc::new(TracingStatusSink)
    } else {
        Arc::new(ProgressBarStatusSink::new())
    };

    let contribute = Contribute::new(
        identity,
        entropy,
        environment,
        store,
        functions,
        Arc::new(ReqwestTransport::new()),
        computer,
        Arc::new(GithubGistPublisher::new()),
        sink,
    );

    match contribute.begin_contribution(&opts.ceremony_id).await? {
        ContributionOutcome::Completed { attestation } => {
            println!("Your attestation: {}\nShare it: {}", attestation.gist_url, attestation.share_url);
        }
        ContributionOutcome::Interrupted => {
            anyhow::bail!("Stopped receiving updates from the coordinator, run the command again to resume")
        }
        outcome => info!("Contribution to {} ended: {:?}", opts.ceremony_id, outcome),
    }

    Ok(())
}
