//! CLI argument definitions for the Ember binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

/// Ember - a restaurant booking and question-answering conversation engine.
#[derive(Parser, Debug)]
#[command(name = "ember", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// JSON file of {query, answer, source} entries replacing the bundled knowledge base.
    #[arg(short = 'k', long = "knowledge-base")]
    pub knowledge_base: Option<PathBuf>,

    /// JSON-lines file receiving completion events.
    #[arg(long = "completion-log")]
    pub completion_log: Option<PathBuf>,

    /// Read one turn request per stdin line and answer with one JSON turn per line.
    #[arg(long = "json")]
    pub json: bool,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > EMBER_CONFIG env var > ~/.ember/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("EMBER_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the log level: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }

    /// Resolve the knowledge base path. `None` means the bundled base.
    pub fn resolve_knowledge_base(&self, config_path: Option<&str>) -> Option<PathBuf> {
        self.knowledge_base
            .clone()
            .or_else(|| config_path.map(expand_home))
    }

    /// Resolve the completion log path: --completion-log flag > config file value.
    pub fn resolve_completion_log(&self, config_path: &str) -> PathBuf {
        self.completion_log
            .clone()
            .unwrap_or_else(|| expand_home(config_path))
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        if let Some(home) = home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    let home = std::env::var("USERPROFILE");
    #[cfg(not(target_os = "windows"))]
    let home = std::env::var("HOME");
    home.ok().map(PathBuf::from)
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    match home_dir() {
        Some(home) => home.join(".ember").join("config.toml"),
        None => PathBuf::from("config.toml"),
    }
}
