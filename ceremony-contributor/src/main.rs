use ceremony_contributor::{
    cli::{Command, Options},
    commands::{contribute_subcommand, status_subcommand},
    logger::init_logger,
};

use structopt::StructOpt;
use tracing::Level;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let options = Options::from_args();
    let verbosity = if options.verbose { Level::DEBUG } else { Level::INFO };

    match options.subcommand {
        Command::Contribute(opts) => contribute_subcommand(&opts, verbosity).await,
        Command::Status(opts) => {
            init_logger(verbosity, None);
            status_subcommand(&opts).await
        }
    }
}
