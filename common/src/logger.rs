use std::{
    fs::{self, OpenOptions},
    path::PathBuf,
    sync::{Arc, OnceLock},
};

use chrono::Local;
use tracing_subscriber::{
    fmt, fmt::writer::BoxMakeWriter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
    Layer,
};

static LOGGER_ONCE: OnceLock<()> = OnceLock::new();
const LOG_DIR: &str = "logs";
const DEFAULT_FILTER: &str = "info";

/// Initialize the global tracing subscriber. Idempotent, safe to call from
/// every entry point.
pub fn init_logging() {
    LOGGER_ONCE.get_or_init(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_ansi(false)
            .with_writer(prepare_log_writer())
            .with_filter(env_filter);
        tracing_subscriber::registry().with(fmt_layer).init();
    });
}

fn prepare_log_writer() -> BoxMakeWriter {
    let log_dir = PathBuf::from(LOG_DIR);
    fs::create_dir_all(&log_dir).expect("failed to create logs directory");
    let date_prefix = Local::now().format("%Y-%m-%d").to_string();
    let log_path = Arc::new(log_dir.join(format!("{date_prefix}.log")));
    BoxMakeWriter::new({
        let log_path = Arc::clone(&log_path);
        move || {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&*log_path)
                .expect("failed to open log file")
        }
    })
}
