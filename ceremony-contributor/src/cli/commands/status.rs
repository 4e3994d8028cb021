use super::CoordinatorOptions;

use clap::AppSettings;
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(
    name = "Status",
    about = "Show the ceremonies of a coordinator or the state of one ceremony",
    setting(AppSettings::ColoredHelp),
    setting(AppSettings::DisableHelpSubcommand),
    setting(AppSettings::DisableVersion)
)]
pub struct StatusOptions {
    /// Show the given ceremony. Without it, every ceremony is listed.
    #[structopt(long, env = "CEREMONY_ID")]
    pub ceremony_id: Option<String>,

    /// Also show the progress of the given participant.
    #[structopt(long, env = "CEREMONY_PARTICIPANT_ID")]
    pub participant_id: Option<String>,

    #[structopt(flatten)]
    pub coordinator: CoordinatorOptions,
}
