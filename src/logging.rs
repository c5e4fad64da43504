//! Logging setup for the thumbcache binary.
//!
//! The library only talks to the `log` facade; this module installs the
//! `env_logger` backend. The level comes from, in priority order:
//!
//! 1. the `RUST_LOG` environment variable
//! 2. `--quiet` (errors only) or `-v` / `-vv` (debug / trace)
//! 3. info
//!
//! Debug builds prefix records with a timestamp (and the module path when
//! verbose); release builds print level and message only.
//!
//! ```rust,no_run
//! use thumbcache::logging::init_logging;
//!
//! init_logging(1, false);
//! log::debug!("hasher queue drained");
//! ```

use env_logger::Builder;
use log::LevelFilter;
use std::env;
use std::io::Write;

/// Install the logger. Later calls are ignored.
pub fn init_logging(verbose: u8, quiet: bool) {
    let from_env = env::var("RUST_LOG").is_ok();
    let level = level_for(verbose, quiet);

    let mut builder = Builder::new();
    if from_env {
        builder.parse_default_env();
    } else {
        builder.filter_level(level);
    }
    configure_format(&mut builder, verbose);

    if builder.try_init().is_err() {
        return;
    }
    if from_env {
        log::debug!("Logging configured from RUST_LOG");
    } else {
        log::debug!("Logging initialized at level: {:?}", level);
    }
}

fn level_for(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn configure_format(builder: &mut Builder, verbose: u8) {
    #[cfg(debug_assertions)]
    {
        builder.format(move |buf, record| {
            let timestamp = buf.timestamp_millis();
            let level = record.level();
            let style = buf.default_level_style(level);
            if verbose >= 1 {
                // Thread names tell the hasher, extractor and dispatcher apart.
                writeln!(
                    buf,
                    "{} {style}{:<5}{style:#} [{}] [{}] {}",
                    timestamp,
                    level,
                    std::thread::current().name().unwrap_or("-"),
                    record.module_path().unwrap_or("unknown"),
                    record.args()
                )
            } else {
                writeln!(buf, "{} {style}{:<5}{style:#} {}", timestamp, level, record.args())
            }
        });
    }

    #[cfg(not(debug_assertions))]
    {
        let _ = verbose;
        builder.format(|buf, record| {
            let level = record.level();
            let style = buf.default_level_style(level);
            writeln!(buf, "{style}{:<5}{style:#} {}", level, record.args())
        });
    }
}
