//! Command-line interface definitions for thumbcache.
//!
//! Global options control verbosity, configuration and the cache location;
//! each subcommand drives one of the caches.
//!
//! # Example
//!
//! ```bash
//! # Warm the content cache for some photos
//! thumbcache process ~/Pictures/*.jpg
//!
//! # Same, one JSON object per finished file
//! thumbcache process ~/Pictures/*.jpg --output json
//!
//! # Fetch theme icons at 32px
//! thumbcache icons folder text-x-generic --scale 32
//!
//! # Show what is cached
//! thumbcache stats
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::cache::ICON_SCALES;

/// On-disk thumbnail, mimetype and icon cache.
///
/// thumbcache hashes file content in the background, derives mimetypes and
/// thumbnails once per distinct content, and keeps them in an append-only
/// cache next to the theme icons it has resolved.
#[derive(Debug, Parser)]
#[command(name = "thumbcache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file (default: platform config directory)
    #[arg(long, value_name = "PATH", global = true, env = "THUMBCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Cache directory (overrides the configuration)
    #[arg(long, value_name = "PATH", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Largest file to hash and sniff (e.g. 10MiB)
    ///
    /// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB
    #[arg(long, value_name = "SIZE", value_parser = parse_size, global = true)]
    pub max_hash_size: Option<u64>,

    /// Print errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Hash files and cache their mimetype and thumbnails
    Process(ProcessArgs),
    /// Resolve theme icons through the icon cache
    Icons(IconsArgs),
    /// Show cache entry counts and file sizes
    Stats(StatsArgs),
    /// Print the effective configuration as TOML
    Config,
}

/// Arguments for the process subcommand.
#[derive(Debug, Args)]
pub struct ProcessArgs {
    /// Files to process; the first one is served first
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,

    /// Output format for finished files
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Give up waiting after this many seconds
    #[arg(long, value_name = "SECS", default_value = "60")]
    pub timeout: u64,
}

/// Arguments for the icons subcommand.
#[derive(Debug, Args)]
pub struct IconsArgs {
    /// Icon names to fetch
    #[arg(value_name = "NAME", required_unless_present = "all")]
    pub names: Vec<String>,

    /// Icon edge length in pixels (64, 48, 32 or 16)
    #[arg(short, long, value_name = "N", default_value = "32", value_parser = parse_scale)]
    pub scale: u32,

    /// Refetch every icon of the theme at every scale
    #[arg(long, conflicts_with = "names")]
    pub all: bool,

    /// Output format for fetched icons
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Give up waiting after this many seconds
    #[arg(long, value_name = "SECS", default_value = "60")]
    pub timeout: u64,
}

/// Arguments for the stats subcommand.
#[derive(Debug, Args)]
pub struct StatsArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines
    Text,
    /// JSON for scripting
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Parse a human-readable size string into bytes.
///
/// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB
/// Case-insensitive. Numbers without suffix are treated as bytes.
///
/// # Examples
///
/// ```
/// use thumbcache::cli::parse_size;
///
/// assert_eq!(parse_size("1024").unwrap(), 1024);
/// assert_eq!(parse_size("1KB").unwrap(), 1000);
/// assert_eq!(parse_size("10MiB").unwrap(), 10_485_760);
/// ```
/// # Errors
///
/// Returns an error if the string is empty, contains an invalid number
/// or an unknown size suffix.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => (&s[..idx], s[idx..].trim().to_uppercase()),
        None => (s, String::new()),
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;

    let multiplier: u64 = match suffix.as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1_000,
        "KIB" => 1_024,
        "MB" | "M" => 1_000_000,
        "MIB" => 1_048_576,
        "GB" | "G" => 1_000_000_000,
        "GIB" => 1_073_741_824,
        _ => return Err(format!("Unknown size suffix: '{suffix}'")),
    };

    Ok((num * multiplier as f64) as u64)
}

/// Parse an icon scale, accepting only the cached edge lengths.
///
/// # Errors
///
/// Returns an error for non-numbers and unsupported scales.
pub fn parse_scale(s: &str) -> Result<u32, String> {
    let scale: u32 = s
        .trim()
        .parse()
        .map_err(|_| format!("Invalid scale: '{s}'"))?;
    if ICON_SCALES.contains(&scale) {
        Ok(scale)
    } else {
        Err(format!("Scale must be one of {ICON_SCALES:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size("1KiB").unwrap(), 1_024);
        assert_eq!(parse_size("1.5MB").unwrap(), 1_500_000);
        assert_eq!(parse_size(" 10 mib ").unwrap(), 10 * 1024 * 1024);
    }

    #[test]
    fn test_parse_size_errors() {
        assert!(parse_size("").is_err());
        assert!(parse_size("abc").is_err());
        assert!(parse_size("1XB").is_err());
        assert!(parse_size("-1MB").is_err());
    }

    #[test]
    fn test_parse_scale() {
        assert_eq!(parse_scale("48").unwrap(), 48);
        assert!(parse_scale("24").is_err());
        assert!(parse_scale("big").is_err());
    }

    #[test]
    fn test_cli_parse_process() {
        let cli = Cli::try_parse_from(["thumbcache", "-v", "process", "a.jpg", "b.png"]).unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Process(args) => {
                assert_eq!(args.paths, vec![PathBuf::from("a.jpg"), PathBuf::from("b.png")]);
                assert_eq!(args.output, OutputFormat::Text);
                assert_eq!(args.timeout, 60);
            }
            _ => panic!("Expected Process command"),
        }
    }

    #[test]
    fn test_cli_parse_global_options() {
        let cli = Cli::try_parse_from([
            "thumbcache",
            "process",
            "a.jpg",
            "--cache-dir",
            "/tmp/c",
            "--max-hash-size",
            "1MiB",
            "--output",
            "json",
            "--json-errors",
        ])
        .unwrap();
        assert_eq!(cli.cache_dir, Some(PathBuf::from("/tmp/c")));
        assert_eq!(cli.max_hash_size, Some(1_048_576));
        assert!(cli.json_errors);
        match cli.command {
            Commands::Process(args) => assert_eq!(args.output, OutputFormat::Json),
            _ => panic!("Expected Process command"),
        }
    }

    #[test]
    fn test_cli_process_requires_paths() {
        assert!(Cli::try_parse_from(["thumbcache", "process"]).is_err());
    }

    #[test]
    fn test_cli_parse_icons() {
        let cli = Cli::try_parse_from(["thumbcache", "icons", "folder", "--scale", "16"]).unwrap();
        match cli.command {
            Commands::Icons(args) => {
                assert_eq!(args.names, vec!["folder"]);
                assert_eq!(args.scale, 16);
                assert!(!args.all);
            }
            _ => panic!("Expected Icons command"),
        }

        let cli = Cli::try_parse_from(["thumbcache", "icons", "--all"]).unwrap();
        assert!(matches!(cli.command, Commands::Icons(IconsArgs { all: true, .. })));

        assert!(Cli::try_parse_from(["thumbcache", "icons"]).is_err());
        assert!(Cli::try_parse_from(["thumbcache", "icons", "folder", "--scale", "20"]).is_err());
    }

    #[test]
    fn test_cli_quiet_conflicts_with_verbose() {
        let result = Cli::try_parse_from(["thumbcache", "-v", "-q", "stats"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_parse_config_and_stats() {
        let cli = Cli::try_parse_from(["thumbcache", "config"]).unwrap();
        assert!(matches!(cli.command, Commands::Config));
        let cli = Cli::try_parse_from(["thumbcache", "stats", "-o", "json"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Stats(StatsArgs {
                output: OutputFormat::Json
            })
        ));
    }
}
