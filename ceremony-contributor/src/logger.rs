use once_cell::sync::OnceCell;
use std::path::Path;
use tracing::Level;
use tracing_subscriber::{
    filter::{Directive, LevelFilter},
    fmt,
    layer::SubscriberExt,
    EnvFilter,
    FmtSubscriber,
};

pub const LOG_FILENAME: &str = "ceremony-contributor.log";

pub struct LogGuard(Option<tracing_appender::non_blocking::WorkerGuard>);

static LOGGER: OnceCell<LogGuard> = OnceCell::new();

fn directive(text: &str) -> Directive {
    text.parse()
        .unwrap_or_else(|_| panic!("Failed to parse log filter directive: {}", text))
}

///
/// Initialize the logger with the given verbosity, refined by the `RUST_LOG`
/// environment variable. When `log_directory` is given, every event is also
/// written to `ceremony-contributor.log` inside it.
///
pub fn init_logger(verbosity: Level, log_directory: Option<&Path>) {
    LOGGER.get_or_init(|| {
        let filter = EnvFilter::from_default_env()
            .add_directive(LevelFilter::from_level(verbosity).into())
            .add_directive(directive("hyper=off"))
            .add_directive(directive("reqwest=warn"));

        let console_output = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_target(false)
            .finish();

        match log_directory {
            Some(directory) => {
                let appender = tracing_appender::rolling::never(directory, LOG_FILENAME);
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);
                let file_output = fmt::Layer::default().with_writer(non_blocking).with_ansi(false);

                tracing::subscriber::set_global_default(console_output.with(file_output))
                    .expect("Failed to initialize logger. Unable to set the global tracing subscriber");

                // The guard flushes the file writer when dropped, so it lives in `LOGGER`.
                LogGuard(Some(guard))
            }
            None => {
                tracing::subscriber::set_global_default(console_output).expect("setting default subscriber failed");
                LogGuard(None)
            }
        }
    });
}
