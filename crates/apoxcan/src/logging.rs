use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a filter directive that replaces `--log-level`.
pub const LOG_ENV: &str = "APOXCAN_LOG";

/// Crates whose logs follow `--log-level`. Everything else stays at `warn`.
const OWN_TARGETS: [&str; 4] = [
    "apoxcan",
    "apoxcan_transport",
    "apoxcan_frame",
    "apoxcan_session",
];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    /// Includes every frame and raw chunk read from the adapter.
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Filter directive for `level`: our crates at `level`, dependencies capped at `warn`.
fn directives(level: LogLevel) -> String {
    let level = level.as_filter();
    let base = level.min(LevelFilter::WARN);
    let mut directive = base.to_string().to_lowercase();
    for target in OWN_TARGETS {
        directive.push_str(&format!(",{target}={}", level.to_string().to_lowercase()));
    }
    directive
}

/// `APOXCAN_LOG` when it holds a valid directive, otherwise the `--log-level` default.
fn build_filter(level: LogLevel, env: Option<&str>) -> EnvFilter {
    env.filter(|value| !value.trim().is_empty())
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new(directives(level)))
}

pub fn init_logging(format: LogFormat, level: LogLevel) {
    let env = std::env::var(LOG_ENV).ok();
    let filter = build_filter(level, env.as_deref());

    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(matches!(level, LogLevel::Debug | LogLevel::Trace));

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}
