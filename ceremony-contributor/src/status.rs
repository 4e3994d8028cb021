//! Progress reporting of a contribution.

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// An update on the state of a contribution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    pub message: String,
    pub loading: Option<bool>,
    pub attestation_link: Option<String>,
}

impl Status {
    pub fn message<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            loading: None,
            attestation_link: None,
        }
    }

    /// A status shown while an operation is still running.
    pub fn loading<S: Into<String>>(message: S) -> Self {
        Self {
            loading: Some(true),
            ..Self::message(message)
        }
    }

    pub fn done<S: Into<String>>(message: S) -> Self {
        Self {
            loading: Some(false),
            ..Self::message(message)
        }
    }

    pub fn attestation<S: Into<String>>(message: S, link: String) -> Self {
        Self {
            attestation_link: Some(link),
            ..Self::done(message)
        }
    }
}

/// Receives every status update of a contribution.
pub trait StatusSink: Send + Sync {
    fn report(&self, status: Status);
}

/// Writes every status to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingStatusSink;

impl StatusSink for TracingStatusSink {
    fn report(&self, status: Status) {
        match status.attestation_link {
            Some(link) => info!("{} {}", status.message, link),
            None => info!("{}", status.message),
        }
    }
}

/// Shows the latest status next to a spinner.
#[derive(Clone)]
pub struct ProgressBarStatusSink {
    progress_bar: ProgressBar,
}

impl ProgressBarStatusSink {
    pub fn new() -> Self {
        let progress_bar = ProgressBar::new_spinner();
        let progress_style = ProgressStyle::default_spinner().template("[{elapsed_precise}] {spinner:.cyan} {wide_msg}");
        progress_bar.enable_steady_tick(1000);
        progress_bar.set_style(progress_style);
        progress_bar.set_message("Getting initial data from the server...");
        Self { progress_bar }
    }
}

impl Default for ProgressBarStatusSink {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusSink for ProgressBarStatusSink {
    fn report(&self, status: Status) {
        TracingStatusSink.report(status.clone());

        match status.attestation_link {
            Some(link) => self
                .progress_bar
                .finish_with_message(&format!("{} {}", status.message, link)),
            None => self.progress_bar.set_message(&status.message),
        }
    }
}

/// Keeps every reported status in memory.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingStatusSink {
    statuses: std::sync::Mutex<Vec<Status>>,
}

#[cfg(test)]
impl RecordingStatusSink {
    pub fn statuses(&self) -> Vec<Status> {
        self.statuses.lock().expect("Should have locked the statuses").clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.statuses().into_iter().map(|status| status.message).collect()
    }

    pub fn contains(&self, text: &str) -> bool {
        self.messages().iter().any(|message| message.contains(text))
    }
}

#[cfg(test)]
impl StatusSink for RecordingStatusSink {
    fn report(&self, status: Status) {
        self.statuses
            .lock()
            .expect("Should have locked the statuses")
            .push(status);
    }
}
