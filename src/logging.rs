//! Logging setup for the classifier binary.
//!
//! Diagnostics go to journald on Linux and to a daily log file elsewhere, so
//! stdout stays reserved for the JSON report. `--verbose` mirrors them to
//! stderr as well.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Environment variable holding the log filter directive.
pub const LOG_ENV: &str = "GARMENT_LENS_LOG";

static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Directory for the file backend. Defaults to the local data dir.
    pub log_dir: Option<PathBuf>,
    /// Also write to stderr, and lower the default level to `debug`.
    pub verbose: bool,
}

impl LogOptions {
    /// Filter used when `GARMENT_LENS_LOG` is unset or invalid.
    pub fn default_directive(&self) -> &'static str {
        if self.verbose {
            "garment_lens=debug,info"
        } else {
            "info"
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(self.default_directive()))
    }

    fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("garment-lens")
                .join("logs")
        })
    }
}

fn stderr_layer<S>(verbose: bool) -> Option<Box<dyn Layer<S> + Send + Sync>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    verbose.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .boxed()
    })
}

/// Initialize the logging system.
///
/// Log level is read from `GARMENT_LENS_LOG` (e.g. `debug`, `warn`,
/// `garment_lens::embedding=trace`), falling back to
/// [`LogOptions::default_directive`].
pub fn init(options: LogOptions) -> Result<()> {
    #[cfg(target_os = "linux")]
    {
        if let Ok(journald_layer) = tracing_journald::layer() {
            tracing_subscriber::registry()
                .with(options.env_filter())
                .with(journald_layer)
                .with(stderr_layer(options.verbose))
                .try_init()?;

            tracing::debug!(verbose = options.verbose, "Logging to journald");
            return Ok(());
        }
    }

    let log_dir = options.log_dir();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "garment-lens.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Dropping the guard stops the writer thread
    let _ = GUARD.set(guard);

    tracing_subscriber::registry()
        .with(options.env_filter())
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(stderr_layer(options.verbose))
        .try_init()?;

    tracing::debug!(verbose = options.verbose, log_dir = %log_dir.display(), "Logging to file");
    Ok(())
}
