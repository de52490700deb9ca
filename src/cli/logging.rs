//! Logging initialization

use std::path::PathBuf;

/// Initialize logging based on the debug flags
///
/// Without `debug` nothing is emitted. With `debug` the filter defaults to
/// `debug` (overridable through `RUST_LOG`) and output goes to stderr, or to
/// a temporary file when `log_to_file` is set. Returns that file's path.
pub fn init_logging(debug: bool, log_to_file: bool) -> Option<PathBuf> {
    if !debug {
        return None;
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"));

    if !log_to_file {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .with_target(true)
            .init();
        return None;
    }

    // Named temp file that outlives the process so it can be inspected afterwards
    let temp_file = tempfile::Builder::new()
        .prefix("kscout-")
        .suffix(".log")
        .tempfile()
        .and_then(|f| f.keep().map_err(|e| e.error))
        .map(|(_, path)| path)
        .unwrap_or_else(|_| std::env::temp_dir().join(format!("kscout-{}.log", std::process::id())));

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(&temp_file)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!(
                "Failed to open log file {}: {}; logging to stderr",
                temp_file.display(),
                e
            );
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .init();
            return None;
        }
    };

    tracing_subscriber::fmt()
        .with_writer(file)
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    Some(temp_file)
}
