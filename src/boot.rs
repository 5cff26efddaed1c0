use chrono::Local;
use env_logger::{Builder, Target};
use log::LevelFilter;
use std::io::{self, Write};

/// Environment variable naming a file that receives the log instead of stderr.
pub const LOG_FILE_ENV: &str = "MODBUS_DEV_LOG_FILE";

/// Initialize logging for the CLI.
///
/// Logs go to stderr unless `MODBUS_DEV_LOG_FILE` names a file. `RUST_LOG`
/// overrides `default_level` either way.
pub fn init_logger(default_level: LevelFilter) {
    if let Ok(path) = std::env::var(LOG_FILE_ENV) {
        if let Err(err) = init_file_logger(&path, default_level) {
            eprintln!("Failed to initialize file logger at '{path}': {err}");
            init_stderr_logger(default_level);
        }
    } else {
        init_stderr_logger(default_level);
    }
}

fn init_stderr_logger(default_level: LevelFilter) {
    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .target(Target::Stderr)
        .filter_level(default_level)
        .parse_default_env();
    // A logger may already be installed, e.g. by a test harness.
    let _ = builder.try_init();
}

fn init_file_logger(path: &str, default_level: LevelFilter) -> io::Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;

    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{}:{} {} [{}] - {}",
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        })
        .target(Target::Pipe(Box::new(file)))
        .filter_level(default_level)
        .parse_default_env();
    let _ = builder.try_init();

    log::info!("File logger initialized at {path}");

    Ok(())
}
