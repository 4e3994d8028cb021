pub mod contribute;
pub mod status;

use crate::{
    environment::{Environment, EnvironmentKind},
    errors::ContributeError,
};

use secrecy::SecretString;
use std::path::PathBuf;
use structopt::StructOpt;
use url::Url;

/// Environment variable holding the coordinator id token.
pub const ID_TOKEN_VARIABLE: &str = "CEREMONY_ID_TOKEN";
/// Environment variable holding the GitHub token used to publish attestations.
pub const GITHUB_TOKEN_VARIABLE: &str = "CEREMONY_GITHUB_TOKEN";

/// Where the coordinator lives, shared by every subcommand.
#[derive(StructOpt, Debug, Clone)]
pub struct CoordinatorOptions {
    /// Specify the coordinator environment.
    #[structopt(
        long,
        env = "CEREMONY_ENVIRONMENT",
        possible_values = EnvironmentKind::variants(),
        default_value = "production"
    )]
    pub environment: EnvironmentKind,

    /// Specify the project hosting a production coordinator.
    #[structopt(long, env = "CEREMONY_PROJECT_ID")]
    pub project_id: Option<String>,

    /// Override the base URL of the coordinator functions.
    #[structopt(long, env = "CEREMONY_FUNCTIONS_URL")]
    pub functions_url: Option<Url>,

    /// Override the URL of the verification function.
    #[structopt(long, env = "CEREMONY_VERIFY_CONTRIBUTION_URL")]
    pub verify_contribution_url: Option<Url>,

    /// Override the base URL of the document gateway.
    #[structopt(long, env = "CEREMONY_STORE_URL")]
    pub store_url: Option<Url>,

    /// Override the postfix appended to the ceremony prefix to name its bucket.
    #[structopt(long, env = "CEREMONY_BUCKET_POSTFIX")]
    pub bucket_postfix: Option<String>,

    #[structopt(long, env = "CEREMONY_AWS_REGION")]
    pub aws_region: Option<String>,

    /// Store downloaded and computed artifacts, attestations and logs at the given path.
    #[structopt(long, env = "CEREMONY_OUTPUT_DIRECTORY", parse(from_os_str))]
    pub output_directory: Option<PathBuf>,

    /// Specify the maximum number of concurrent directory requests.
    #[structopt(long, env = "CEREMONY_MAX_CONCURRENCY")]
    pub max_concurrency: Option<usize>,
}

impl CoordinatorOptions {
    /// Returns the preset of the selected environment with the overrides applied.
    pub fn environment(&self) -> anyhow::Result<Environment> {
        let mut environment = match (self.environment, &self.project_id) {
            (EnvironmentKind::Development, _) => Environment::development(),
            (EnvironmentKind::Production, Some(project_id)) => Environment::production(project_id),
            (EnvironmentKind::Production, None) => {
                anyhow::bail!("A production coordinator requires --project-id or CEREMONY_PROJECT_ID")
            }
        };

        if let Some(functions_url) = &self.functions_url {
            environment.functions_url = functions_url.clone();
        }
        if let Some(verify_contribution_url) = &self.verify_contribution_url {
            environment.verify_contribution_url = verify_contribution_url.clone();
        }
        if let Some(store_url) = &self.store_url {
            environment.store_url = store_url.clone();
        }
        if let Some(bucket_postfix) = &self.bucket_postfix {
            environment.bucket_postfix = bucket_postfix.clone();
        }
        if let Some(aws_region) = &self.aws_region {
            environment.aws_region = aws_region.clone();
        }
        if let Some(output_directory) = &self.output_directory {
            environment.output_directory = output_directory.clone();
        }
        if let Some(max_concurrency) = self.max_concurrency {
            environment.max_concurrency = max_concurrency.max(1);
        }

        Ok(environment)
    }
}

/// Reads a token from the environment. Tokens are never accepted as arguments.
pub fn read_token(variable: &str) -> Result<SecretString, ContributeError> {
    match std::env::var(variable) {
        Ok(token) if !token.is_empty() => Ok(SecretString::new(token)),
        _ => Err(ContributeError::Authentication(format!("{} is not set", variable))),
    }
}

pub fn parse_secret(text: &str) -> SecretString {
    SecretString::new(text.to_string())
}
