use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{env_bool, env_string};

const LOG_FILE_PREFIX: &str = "forgestudy.log";

/// Keeps the non-blocking file writer alive; dropping it flushes pending lines.
pub struct FileLogGuard {
    _guard: WorkerGuard,
}

#[derive(Debug, Clone)]
pub struct LogSettings {
    pub level: String,
    pub file_dir: Option<String>,
}

impl LogSettings {
    pub fn from_env(level: &str) -> Self {
        let file_dir = if env_bool("ENABLE_FILE_LOGS").unwrap_or(false) {
            Some(env_string("LOG_DIR").unwrap_or_else(|| "./logs".to_string()))
        } else {
            None
        };
        Self {
            level: level.to_string(),
            file_dir,
        }
    }
}

pub fn init_tracing(settings: &LogSettings) -> Option<FileLogGuard> {
    let env_filter =
        EnvFilter::try_new(&settings.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(true);

    if let Some(dir) = settings.file_dir.as_deref() {
        match std::fs::create_dir_all(dir) {
            Ok(()) => {
                let appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_PREFIX);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let file_layer = fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(stdout_layer)
                    .with(file_layer)
                    .init();

                return Some(FileLogGuard { _guard: guard });
            }
            Err(err) => eprintln!("failed to create log directory {dir}: {err}"),
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .init();

    None
}
