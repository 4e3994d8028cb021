use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{}: {}", _0, _1)]
    Crate(&'static str, String),

    #[error("Document {} does not exist", _0)]
    MissingDocument(String),

    #[error("Expected exactly one circuit at sequence position {}", _0)]
    MissingCircuit(u64),

    #[error("Request {} sent to {} errored", _0, _1)]
    FailedRequest(String, String),
}

impl From<reqwest::Error> for StoreError {
    fn from(error: reqwest::Error) -> Self {
        StoreError::Crate("reqwest", format!("{:?}", error))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        StoreError::Crate("serde_json", format!("{:?}", error))
    }
}

impl From<url::ParseError> for StoreError {
    fn from(error: url::ParseError) -> Self {
        StoreError::Crate("url", format!("{:?}", error))
    }
}

#[derive(Debug, Error)]
pub enum FunctionError {
    #[error("{}: {}", _0, _1)]
    Crate(&'static str, String),

    #[error("Function {} failed: {}", _0, _1)]
    FailedCall(String, String),

    #[error("Function {} returned an unexpected result: {}", _0, _1)]
    UnexpectedResult(String, String),
}

impl From<reqwest::Error> for FunctionError {
    fn from(error: reqwest::Error) -> Self {
        FunctionError::Crate("reqwest", format!("{:?}", error))
    }
}

impl From<serde_json::Error> for FunctionError {
    fn from(error: serde_json::Error) -> Self {
        FunctionError::Crate("serde_json", format!("{:?}", error))
    }
}

impl From<url::ParseError> for FunctionError {
    fn from(error: url::ParseError) -> Self {
        FunctionError::Crate("url", format!("{:?}", error))
    }
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("The transport does not support streaming downloads")]
    StreamUnsupported,

    #[error("Network error: {}", _0)]
    Network(String),

    #[error("Upload of part {} failed ({}), run the contribution again to resume the upload", part_number, reason)]
    ResumeRequired { part_number: u64, reason: String },

    #[error("Chunk size must be greater than zero")]
    InvalidChunkSize,

    #[error("Expected {} presigned urls, got {}", _0, _1)]
    MismatchedPresignedUrls(usize, usize),

    #[error("{}", _0)]
    Function(#[from] FunctionError),
}

impl From<reqwest::Error> for TransferError {
    fn from(error: reqwest::Error) -> Self {
        TransferError::Network(error.to_string())
    }
}

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("Could not determine the verification result before the time limit")]
    Inconclusive,

    #[error("{}", _0)]
    Function(#[from] FunctionError),

    #[error("{}", _0)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum AttestationError {
    #[error("{}: {}", _0, _1)]
    Crate(&'static str, String),

    #[error("Request {} sent to {} errored", _0, _1)]
    FailedRequest(String, String),

    #[error("No valid contributions to attest")]
    NoValidContributions,

    #[error("{}", _0)]
    Store(#[from] StoreError),
}

impl From<reqwest::Error> for AttestationError {
    fn from(error: reqwest::Error) -> Self {
        AttestationError::Crate("reqwest", format!("{:?}", error))
    }
}

impl From<std::io::Error> for AttestationError {
    fn from(error: std::io::Error) -> Self {
        AttestationError::Crate("std::io", format!("{:?}", error))
    }
}

#[derive(Debug, Error)]
pub enum ContributeError {
    #[error("{}: {}", _0, _1)]
    Crate(&'static str, String),

    #[error("Unexpected document: {}", _0)]
    UnexpectedDocument(String),

    #[error("Missing local artifact {}, wait for the timeout to expire and contribute again", _0)]
    MissingArtifact(String),

    #[error("Authentication failed: {}", _0)]
    Authentication(String),

    #[error("Failed computing contribution: {}", _0)]
    FailedComputation(String),

    #[error("{}", _0)]
    Store(#[from] StoreError),

    #[error("{}", _0)]
    Function(#[from] FunctionError),

    #[error("{}", _0)]
    Transfer(#[from] TransferError),

    #[error("{}", _0)]
    Verification(#[from] VerificationError),

    #[error("{}", _0)]
    Attestation(#[from] AttestationError),
}

impl From<std::io::Error> for ContributeError {
    fn from(error: std::io::Error) -> Self {
        ContributeError::Crate("std::io", format!("{:?}", error))
    }
}

impl From<tokio::task::JoinError> for ContributeError {
    fn from(error: tokio::task::JoinError) -> Self {
        ContributeError::Crate("tokio", format!("{:?}", error))
    }
}

impl From<reqwest::Error> for ContributeError {
    fn from(error: reqwest::Error) -> Self {
        ContributeError::Crate("reqwest", format!("{:?}", error))
    }
}

impl ContributeError {
    /// Returns `true` if the contribution can continue after reporting the error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ContributeError::Transfer(_)
                | ContributeError::Verification(_)
                | ContributeError::MissingArtifact(_)
                | ContributeError::FailedComputation(_)
        )
    }
}
