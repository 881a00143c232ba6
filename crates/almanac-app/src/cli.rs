//! CLI argument definitions for the Almanac binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use almanac_search::SearchScope;

/// Almanac: search and question a directory of notes as one knowledge space.
#[derive(Parser, Debug)]
#[command(name = "almanac", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Rank the files of a directory against a query.
    Search {
        /// Directory of `.txt` / `.md` files.
        dir: PathBuf,
        query: String,
        #[arg(short = 's', long = "scope", value_enum, default_value_t = ScopeArg::All)]
        scope: ScopeArg,
        /// Maximum number of results (0 uses the configured default).
        #[arg(short = 'n', long = "limit", default_value_t = 0)]
        limit: usize,
        /// Print results as JSON.
        #[arg(long = "json")]
        json: bool,
    },
    /// Aggregate counts over the files of a directory.
    Stats {
        dir: PathBuf,
        /// Summarize every file before counting.
        #[arg(long = "summarize")]
        summarize: bool,
    },
    /// Answer a question from the files of a directory, with citations.
    Ask { dir: PathBuf, question: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScopeArg {
    All,
    Transcripts,
    Summaries,
}

impl From<ScopeArg> for SearchScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::All => SearchScope::All,
            ScopeArg::Transcripts => SearchScope::Transcripts,
            ScopeArg::Summaries => SearchScope::Summaries,
        }
    }
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > ALMANAC_CONFIG env var > ~/.almanac/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("ALMANAC_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the log filter directive.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".almanac").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".almanac").join("config.toml");
    }
    PathBuf::from("config.toml")
}
