//! thumbcache - on-disk thumbnail, mimetype and icon cache
//!
//! Files are identified by a MurmurHash2 of their content plus their size.
//! Background threads hash requested files, derive the mimetype and a
//! thumbnail chain once per distinct content, and append the result to an
//! index + data file pair so later requests are served from disk. A second
//! cache does the same for theme icons.
//!
//! ```no_run
//! use thumbcache::cache::{CacheConfig, ContentCache};
//! use std::time::Duration;
//!
//! let cache = ContentCache::open("/tmp/thumbs", &CacheConfig::default());
//! cache.process("photo.jpg");
//! let finished = cache.finished().recv_timeout(Duration::from_secs(5)).unwrap();
//! println!("{} is {}", finished.path.display(), finished.entry.mime_type);
//! ```

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod hashing;
pub mod logging;
pub mod media;
pub mod output;
pub mod progress;
pub mod signal;
pub mod stream;
pub mod worker;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use walkdir::WalkDir;

use crate::cache::{content, icon, ContentCache, ContentStore, IconCache, IconEvent, IconStore};
use crate::cli::{Cli, Commands, IconsArgs, OutputFormat, ProcessArgs, StatsArgs};
use crate::config::Config;
use crate::error::{AppError, ExitCode};
use crate::output::{json, JsonCacheStats, JsonFinished, JsonIcon, JsonStats};
use crate::progress::{Progress, ProgressCallback};
use crate::signal::ShutdownHandler;

/// How often the binary checks for Ctrl+C while waiting on a cache.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Run the application with parsed arguments.
///
/// # Errors
///
/// Returns an error for invalid configuration, unusable caches, output
/// failures and Ctrl+C. [`AppError`] carries the matching exit code.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.cache_dir {
        config.cache_dir = Some(dir);
    }
    if let Some(size) = cli.max_hash_size {
        config.max_hash_size = size;
    }

    match cli.command {
        Commands::Process(args) => run_process(&config, args, cli.quiet),
        Commands::Icons(args) => run_icons(&config, args, cli.quiet),
        Commands::Stats(args) => run_stats(&config, &args),
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(ExitCode::Success)
        }
    }
}

fn run_process(config: &Config, args: ProcessArgs, quiet: bool) -> Result<ExitCode> {
    let dir = config.cache_dir()?;
    let (files, skipped) = collect_files(args.paths);
    let shutdown = signal::install_handler()?;

    let cache = ContentCache::open(&dir, &config.cache_config());
    if !cache.is_valid() {
        return Err(AppError::CacheInvalid(dir).into());
    }
    log::info!("Processing {} files with cache in {}", files.len(), dir.display());

    let as_json = args.output == OutputFormat::Json;
    let progress = Progress::new("Caching", quiet || as_json);
    let total = files.len();
    progress.on_start(total);
    cache.process_all(files);

    let mut out = io::stdout().lock();
    let done = wait_for(
        cache.finished(),
        total,
        Duration::from_secs(args.timeout),
        &shutdown,
        || cache.pending() == 0,
        |finished| {
            progress.on_item(&finished.path.to_string_lossy());
            if as_json {
                json::write_line(&mut out, &JsonFinished::from(&finished))?;
            } else {
                writeln!(out, "{}", output::finished_line(&finished))?;
            }
            Ok(true)
        },
    )?;
    progress.on_finish(done);

    Ok(completion_code(done, total, skipped))
}

fn run_icons(config: &Config, args: IconsArgs, quiet: bool) -> Result<ExitCode> {
    let dir = config.cache_dir()?;
    let shutdown = signal::install_handler()?;
    let timeout = Duration::from_secs(args.timeout);

    let cache = IconCache::open(&dir, Box::new(config.icons.resolver()), &config.cache_config());
    if !cache.is_valid() {
        return Err(AppError::CacheInvalid(dir).into());
    }

    let total = if args.all {
        cache.request_update();
        wait_for(cache.events(), 1, timeout, &shutdown, || false, |event| {
            Ok(matches!(event, IconEvent::UpdateRequested))
        })?;
        cache.prefetch_all()
    } else {
        // Reversed so the first name is served first.
        args.names
            .iter()
            .rev()
            .filter(|name| cache.process(name, args.scale))
            .count()
    };
    log::info!("Fetching {} icons with cache in {}", total, dir.display());

    let as_json = args.output == OutputFormat::Json;
    let progress = Progress::new("Fetching icons", quiet || as_json);
    progress.on_start(total);
    let mut out = io::stdout().lock();
    let done = wait_for(
        cache.events(),
        total,
        timeout,
        &shutdown,
        || cache.pending() == 0,
        |event| {
            let IconEvent::Fetched(item) = event else {
                return Ok(false);
            };
            progress.on_item(&item.key.name);
            if as_json {
                json::write_line(&mut out, &JsonIcon::from(&item))?;
            } else {
                writeln!(out, "{}", output::icon_line(&item))?;
            }
            Ok(true)
        },
    )?;
    progress.on_finish(done);

    Ok(completion_code(done, total, 0))
}

fn run_stats(config: &Config, args: &StatsArgs) -> Result<ExitCode> {
    let dir = config.cache_dir()?;
    let invalid = |e: cache::CacheError| {
        log::error!("Cannot open cache in {}: {}", dir.display(), e);
        AppError::CacheInvalid(dir.clone())
    };
    let content_store = ContentStore::open(&dir).map_err(invalid)?;
    let icon_store = IconStore::open(&dir).map_err(invalid)?;

    let stats = JsonStats {
        cache_dir: dir.display().to_string(),
        content: JsonCacheStats {
            entries: content_store.len(),
            index_bytes: file_len(&dir.join(content::INDEX_FILE)),
            data_bytes: file_len(&dir.join(content::DATA_FILE)),
        },
        icons: JsonCacheStats {
            entries: icon_store.len(),
            index_bytes: file_len(&dir.join(icon::ICON_INDEX_FILE)),
            data_bytes: file_len(&dir.join(icon::ICON_DATA_FILE)),
        },
    };

    let mut out = io::stdout().lock();
    match args.output {
        OutputFormat::Json => json::write_pretty(&mut out, &stats)?,
        OutputFormat::Text => output::write_stats(&mut out, &stats).context("Failed to write stats")?,
    }
    Ok(ExitCode::Success)
}

/// Expand directories into the regular files below them.
///
/// Returns the files and the number of arguments that were skipped.
fn collect_files(paths: Vec<PathBuf>) -> (Vec<PathBuf>, usize) {
    let mut files = Vec::new();
    let mut skipped = 0;
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(&path).sort_by_file_name() {
                match entry {
                    Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
                    Ok(_) => {}
                    Err(e) => {
                        log::warn!("Skipping entry under {}: {}", path.display(), e);
                        skipped += 1;
                    }
                }
            }
        } else if path.is_file() {
            files.push(path);
        } else {
            log::warn!("Skipping {}: not a file", path.display());
            skipped += 1;
        }
    }
    (files, skipped)
}

/// Receive events until `total` were counted, the deadline passes or
/// `settled` reports that nothing else will arrive.
///
/// `on_event` returns whether an event counts towards `total`.
fn wait_for<T>(
    events: &Receiver<T>,
    total: usize,
    timeout: Duration,
    shutdown: &ShutdownHandler,
    settled: impl Fn() -> bool,
    mut on_event: impl FnMut(T) -> Result<bool>,
) -> Result<usize> {
    let deadline = Instant::now() + timeout;
    let mut done = 0;
    while done < total {
        if shutdown.is_shutdown_requested() {
            return Err(AppError::Interrupted.into());
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            log::warn!("Timed out with {} of {} requests outstanding", total - done, total);
            break;
        }
        match events.recv_timeout(remaining.min(POLL_INTERVAL)) {
            Ok(event) => {
                if on_event(event)? {
                    done += 1;
                }
            }
            Err(RecvTimeoutError::Timeout) if settled() => {
                for event in events.try_iter() {
                    if on_event(event)? {
                        done += 1;
                    }
                }
                log::debug!("Nothing left in flight, {} of {} served", done, total);
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    Ok(done)
}

fn completion_code(done: usize, total: usize, skipped: usize) -> ExitCode {
    if done < total || skipped > 0 {
        ExitCode::PartialSuccess
    } else {
        ExitCode::Success
    }
}

fn file_len(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}
