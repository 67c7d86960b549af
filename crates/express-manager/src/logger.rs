use std::fs::OpenOptions;

use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{FormatFields, format::Writer},
    layer::{Context, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::ExpressManagerError;

const DEFAULT_LOG_FILTER: &str = "debug,h2=warn,rustls=warn,hyper=warn,hyper_util=warn,reqwest=warn";

#[derive(Clone, Debug)]
pub struct LogEntry {
    pub line: String,
    pub level: String,
}

/// Receiver of the log statements of the manager, usually the host application.
pub trait Logger: Send + Sync {
    fn log(&self, l: LogEntry);
}

struct AppLogLayer {
    log_listener: Option<Box<dyn Logger>>,
}

impl<S> Layer<S> for AppLogLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if event.metadata().level() > &Level::INFO {
            return;
        }
        let Some(listener) = self.log_listener.as_ref() else {
            return;
        };
        let mut buf = String::new();
        if tracing_subscriber::fmt::format::DefaultFields::new()
            .format_fields(Writer::new(&mut buf), event)
            .is_ok()
        {
            listener.log(LogEntry {
                line: buf,
                level: event.metadata().level().to_string(),
            });
        }
    }
}

/// Installs the global subscriber, appending to `{log_dir}/express.log`.
///
/// `log_filter` uses the `EnvFilter` syntax. Fails if the log file cannot be
/// opened or a global subscriber is already installed.
pub fn init_logging(
    log_dir: &str,
    app_logger: Option<Box<dyn Logger>>,
    log_filter: Option<String>,
) -> Result<(), ExpressManagerError> {
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(format!("{log_dir}/express.log"))
        .map_err(|e| ExpressManagerError::invalid_input(e.to_string()))?;

    let filter = log_filter.unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
    tracing_subscriber::registry()
        .with(EnvFilter::new(filter))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_line_number(true)
                .with_writer(log_file),
        )
        .with(AppLogLayer {
            log_listener: app_logger,
        })
        .try_init()
        .map_err(|e| ExpressManagerError::invalid_input(e.to_string()))
}
