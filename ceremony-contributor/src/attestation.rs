//! Public attestations of a completed contribution.

use crate::{
    directory::CeremonyDirectory,
    errors::AttestationError,
    objects::{GistFile, GistRequest, GistResponse, GithubUser},
    utils::write_to_file,
};

use ceremony_shared::structures::{Ceremony, DocumentInfo, Participant};

use secrecy::{ExposeSecret, SecretString};
use std::{collections::HashMap, path::Path};
use tracing::info;
use url::Url;

const GITHUB_API_URL: &str = "https://api.github.com";
const TWEET_INTENT_URL: &str = "https://twitter.com/intent/tweet";
const USER_AGENT: &str = "ceremony-contributor";

/// The signature of a single circuit contribution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttestationEntry {
    pub sequence_position: u64,
    pub circuit_prefix: String,
    pub contributor_number: u64,
    pub hash: String,
}

/// A published attestation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishedAttestation {
    pub gist_url: String,
    pub share_url: String,
    pub content: String,
}

///
/// Composes the attestation text: a preamble naming the contributor and the
/// ceremony, then one paragraph per circuit in the given order.
///
pub fn compose_attestation(identifier: &str, ceremony_name: &str, entries: &[AttestationEntry]) -> String {
    let mut attestation = format!(
        "Hey, I'm {} and I have contributed to the {} MPC Phase2 Trusted Setup ceremony.\nThe following are my contribution signatures:",
        identifier, ceremony_name
    );
    for entry in entries {
        attestation += &format!(
            "\n\nCircuit # {} ({})\nContributor # {}\n{}",
            entry.sequence_position, entry.circuit_prefix, entry.contributor_number, entry.hash
        );
    }
    attestation
}

/// Returns the filename of the published attestation of a ceremony.
pub fn attestation_filename(ceremony_prefix: &str) -> String {
    format!("{}_final_attestation.log", ceremony_prefix)
}

/// Returns a pre-filled share link for the published attestation.
pub fn tweet_url(ceremony_name: &str, gist_url: &str) -> Result<String, AttestationError> {
    let text = format!(
        "I contributed to the {} Phase 2 Trusted Setup ceremony! You can contribute here: {}\n#Ethereum #ZKP",
        ceremony_name, gist_url
    );
    Url::parse_with_params(TWEET_INTENT_URL, &[("text", text)])
        .map(|url| url.to_string())
        .map_err(|error| AttestationError::Crate("url", format!("{:?}", error)))
}

///
/// Collects the signatures of the participant's valid contributions, one per
/// circuit in contribution order. A contribution counts only if the
/// participant document lists it and the coordinator marked it valid.
///
pub async fn collect_attestation_entries(
    directory: &CeremonyDirectory,
    ceremony_id: &str,
    participant: &DocumentInfo<Participant>,
) -> Result<Vec<AttestationEntry>, AttestationError> {
    let hashes = participant
        .data
        .contributions
        .iter()
        .map(|contribution| (contribution.doc.as_str(), contribution.hash.as_str()))
        .collect::<HashMap<_, _>>();

    let mut entries = vec![];
    for entry in directory.all_contributions(ceremony_id, &participant.id).await? {
        let valid = entry
            .contributions
            .iter()
            .filter(|contribution| contribution.data.valid)
            .find_map(|contribution| {
                let hash = hashes.get(contribution.id.as_str())?;
                Some((contribution.data.contributor_number()?, hash.to_string()))
            });

        if let Some((contributor_number, hash)) = valid {
            entries.push(AttestationEntry {
                sequence_position: entry.circuit.data.sequence_position,
                circuit_prefix: entry.circuit.data.prefix.clone(),
                contributor_number,
                hash,
            });
        }
    }

    Ok(entries)
}

#[async_trait::async_trait]
pub trait GistPublisher: Send + Sync {
    /// Publishes `content` as a single-file public gist and returns its html url.
    async fn publish(
        &self,
        token: &SecretString,
        content: &str,
        filename: &str,
        description: &str,
    ) -> Result<String, AttestationError>;
}

#[derive(Clone)]
pub struct GithubGistPublisher {
    client: reqwest::Client,
    api_url: String,
}

impl GithubGistPublisher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: GITHUB_API_URL.to_string(),
        }
    }
}

impl Default for GithubGistPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl GistPublisher for GithubGistPublisher {
    async fn publish(
        &self,
        token: &SecretString,
        content: &str,
        filename: &str,
        description: &str,
    ) -> Result<String, AttestationError> {
        let mut files = HashMap::new();
        files.insert(filename.to_string(), GistFile {
            content: content.to_string(),
        });
        let request = GistRequest {
            description: description.to_string(),
            public: true,
            files,
        };

        let gists_url = format!("{}/gists", self.api_url);
        let response = self
            .client
            .post(&gists_url)
            .header(http::header::USER_AGENT, USER_AGENT)
            .header(http::header::ACCEPT, "application/vnd.github+json")
            .header(http::header::AUTHORIZATION, format!("token {}", token.expose_secret()))
            .json(&request)
            .send()
            .await?
            .error_for_status()
            .map_err(|_| AttestationError::FailedRequest("publish gist".to_string(), gists_url.clone()))?;

        let data = response.bytes().await?;
        let gist = serde_json::from_slice::<GistResponse>(&*data)
            .map_err(|error| AttestationError::Crate("serde_json", format!("{:?}", error)))?;
        Ok(gist.html_url)
    }
}

/// Returns the GitHub account owning the token.
pub async fn resolve_github_identity(token: &SecretString) -> Result<GithubUser, AttestationError> {
    let user_url = format!("{}/user", GITHUB_API_URL);
    let response = reqwest::Client::new()
        .get(&user_url)
        .header(http::header::USER_AGENT, USER_AGENT)
        .header(http::header::AUTHORIZATION, format!("token {}", token.expose_secret()))
        .send()
        .await?
        .error_for_status()
        .map_err(|_| AttestationError::FailedRequest("resolve identity".to_string(), user_url.clone()))?;

    let data = response.bytes().await?;
    serde_json::from_slice::<GithubUser>(&*data).map_err(|error| AttestationError::Crate("serde_json", format!("{:?}", error)))
}

///
/// Composes, stores and publishes the attestation of the participant's
/// contributions to the ceremony. A local copy is written to
/// `{output_directory}/contribute/attestation/`.
///
pub async fn publish_attestation(
    directory: &CeremonyDirectory,
    publisher: &dyn GistPublisher,
    token: &SecretString,
    identifier: &str,
    ceremony: &DocumentInfo<Ceremony>,
    participant: &DocumentInfo<Participant>,
    output_directory: &Path,
) -> Result<PublishedAttestation, AttestationError> {
    let entries = collect_attestation_entries(directory, &ceremony.id, participant).await?;
    if entries.is_empty() {
        return Err(AttestationError::NoValidContributions);
    }

    let content = compose_attestation(identifier, &ceremony.data.title, &entries);
    let local_copy = output_directory
        .join("contribute")
        .join("attestation")
        .join(format!("{}_attestation.log", ceremony.data.prefix));
    write_to_file(&local_copy, content.as_bytes())?;

    let description = format!(
        "Attestation for {} MPC Phase 2 Trusted Setup ceremony",
        ceremony.data.title
    );
    let gist_url = publisher
        .publish(token, &content, &attestation_filename(&ceremony.data.prefix), &description)
        .await?;
    info!("Published the attestation at {}", gist_url);

    Ok(PublishedAttestation {
        share_url: tweet_url(&ceremony.data.title, &gist_url)?,
        gist_url,
        content,
    })
}
