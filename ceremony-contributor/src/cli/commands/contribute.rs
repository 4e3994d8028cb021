use super::{parse_secret, CoordinatorOptions};

use clap::AppSettings;
use secrecy::SecretString;
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(
    name = "Contribute",
    about = "Contribute to every circuit of a phase 2 trusted setup ceremony",
    setting(AppSettings::ColoredHelp),
    setting(AppSettings::DisableHelpSubcommand),
    setting(AppSettings::DisableVersion)
)]
pub struct ContributeOptions {
    /// Specify the ceremony to contribute to.
    #[structopt(long, env = "CEREMONY_ID")]
    pub ceremony_id: String,

    /// Specify the participant id assigned by the coordinator at sign-in.
    #[structopt(long, env = "CEREMONY_PARTICIPANT_ID")]
    pub participant_id: String,

    #[structopt(flatten)]
    pub coordinator: CoordinatorOptions,

    /// Compute contributions with the given program, invoked as
    /// `<program> [computer-arg...] <input> <output> <identity>` with the entropy on stdin.
    #[structopt(long, env = "CEREMONY_COMPUTER", parse(from_os_str))]
    pub computer: PathBuf,

    /// Pass an extra argument to the computer. Can be repeated.
    #[structopt(long = "computer-arg", number_of_values = 1, allow_hyphen_values = true)]
    pub computer_args: Vec<String>,

    /// Use the given entropy instead of asking for it.
    #[structopt(long, env = "CEREMONY_ENTROPY", hide_env_values = true, parse(from_str = parse_secret))]
    pub entropy: Option<SecretString>,

    /// Never prompt, generating the entropy when it is not given. Status updates
    /// are logged instead of shown next to a spinner.
    #[structopt(long)]
    pub non_interactive: bool,

    /// Specify the size of every part of an upload, in bytes.
    #[structopt(long, env = "CEREMONY_CHUNK_SIZE")]
    pub chunk_size: Option<usize>,
}
