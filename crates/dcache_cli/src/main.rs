//! dcache CLI: inspect and maintain a derived-object cache directory.
//!
//! Provides `dcache list` to show records in eviction order, `dcache show` to
//! look up the record for one source, `dcache verify` to report stale records,
//! `dcache evict` to enforce the size bound, and `dcache sweep` to delete
//! orphaned record files.

#![warn(missing_docs)]

mod evict;
#[cfg(test)]
mod fixtures;
mod list;
mod logging;
mod session;
mod show;
mod sweep;
mod verify;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

/// dcache: a disk-backed cache of derived objects.
#[derive(Parser, Debug)]
#[command(name = "dcache", version, about = "Derived-object cache maintenance")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Cache directory to operate on, overriding the configured root.
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Path to a custom `dcache.toml` configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List cache records, least recently accessed first.
    List(ListArgs),
    /// Look up the record for one source file.
    Show(ShowArgs),
    /// Report stale records without modifying the cache.
    Verify,
    /// Evict old records until the cache fits its size bound.
    Evict(EvictArgs),
    /// Delete record files the index does not know about.
    Sweep,
}

/// Arguments for the `dcache list` subcommand.
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Print records as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `dcache show` subcommand.
#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Source pathname whose record to look up.
    pub source: PathBuf,

    /// Extension of the cache filename (e.g. `bam`).
    #[arg(long, default_value = "bam")]
    pub ext: String,
}

/// Arguments for the `dcache evict` subcommand.
#[derive(Parser, Debug)]
pub struct EvictArgs {
    /// Size bound in kilobytes, overriding the configured one.
    #[arg(long)]
    pub max_kbytes: Option<u64>,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Optional cache directory override.
    pub cache_dir: Option<PathBuf>,
    /// Optional path to a custom config file.
    pub config: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init_logging(cli.verbose, cli.quiet) {
        eprintln!("warning: {e}");
    }

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        cache_dir: cli.cache_dir,
        config: cli.config,
    };

    let result = match cli.command {
        Command::List(ref args) => list::run(args, &global),
        Command::Show(ref args) => show::run(args, &global),
        Command::Verify => verify::run(&global),
        Command::Evict(ref args) => evict::run(args, &global),
        Command::Sweep => sweep::run(&global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_list_default() {
        let cli = Cli::parse_from(["dcache", "list"]);
        match cli.command {
            Command::List(ref args) => assert!(!args.json),
            _ => panic!("expected List command"),
        }
    }

    #[test]
    fn parse_list_json() {
        let cli = Cli::parse_from(["dcache", "list", "--json"]);
        match cli.command {
            Command::List(ref args) => assert!(args.json),
            _ => panic!("expected List command"),
        }
    }

    #[test]
    fn parse_show() {
        let cli = Cli::parse_from(["dcache", "show", "models/teapot.egg", "--ext", "bvol"]);
        match cli.command {
            Command::Show(ref args) => {
                assert_eq!(args.source, PathBuf::from("models/teapot.egg"));
                assert_eq!(args.ext, "bvol");
            }
            _ => panic!("expected Show command"),
        }
    }

    #[test]
    fn parse_show_default_ext() {
        let cli = Cli::parse_from(["dcache", "show", "a.egg"]);
        match cli.command {
            Command::Show(ref args) => assert_eq!(args.ext, "bam"),
            _ => panic!("expected Show command"),
        }
    }

    #[test]
    fn parse_evict() {
        let cli = Cli::parse_from(["dcache", "evict"]);
        match cli.command {
            Command::Evict(ref args) => assert!(args.max_kbytes.is_none()),
            _ => panic!("expected Evict command"),
        }

        let cli = Cli::parse_from(["dcache", "evict", "--max-kbytes", "512"]);
        match cli.command {
            Command::Evict(ref args) => assert_eq!(args.max_kbytes, Some(512)),
            _ => panic!("expected Evict command"),
        }
    }

    #[test]
    fn parse_verify_and_sweep() {
        assert!(matches!(
            Cli::parse_from(["dcache", "verify"]).command,
            Command::Verify
        ));
        assert!(matches!(
            Cli::parse_from(["dcache", "sweep"]).command,
            Command::Sweep
        ));
    }

    #[test]
    fn parse_global_flags() {
        let cli = Cli::parse_from([
            "dcache",
            "--quiet",
            "--cache-dir",
            "/tmp/cache",
            "--config",
            "/etc/dcache.toml",
            "verify",
        ]);
        assert!(cli.quiet);
        assert!(!cli.verbose);
        assert_eq!(cli.cache_dir, Some(PathBuf::from("/tmp/cache")));
        assert_eq!(cli.config, Some(PathBuf::from("/etc/dcache.toml")));
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["dcache", "sweep", "-v", "--cache-dir", "c"]);
        assert!(cli.verbose);
        assert_eq!(cli.cache_dir, Some(PathBuf::from("c")));
    }

    #[test]
    fn missing_subcommand_is_error() {
        assert!(Cli::try_parse_from(["dcache"]).is_err());
    }

    #[test]
    fn show_requires_source() {
        assert!(Cli::try_parse_from(["dcache", "show"]).is_err());
    }
}
