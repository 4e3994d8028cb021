pub mod commands;

use clap::AppSettings;
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
pub enum Command {
    Contribute(commands::contribute::ContributeOptions),
    Status(commands::status::StatusOptions),
}

#[derive(StructOpt, Debug)]
#[structopt(
    name = "Ceremony Contributor",
    about = "Contribute to phase 2 trusted setup ceremonies",
    setting(AppSettings::ColoredHelp),
    setting(AppSettings::DisableHelpSubcommand),
    setting(AppSettings::DisableVersion),
    setting(AppSettings::SubcommandRequiredElseHelp)
)]
pub struct Options {
    /// Log debug events.
    #[structopt(long, short)]
    pub verbose: bool,

    #[structopt(subcommand)]
    pub subcommand: Command,
}
