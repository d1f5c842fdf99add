//! Cursor configuration.
//!
//! Precedence: values set in code > environment > config file > defaults.
//! Config files are searched in order: an explicit path, `NEXUS_CURSOR_CONFIG`,
//! `./nexus_cursor.toml`. The first one that exists is used.

use crate::cursor::RetryPolicy;
use crate::errors::{CursorError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CursorConfig {
    /// Retry bound for guarded cursor operations; 0 disables retry.
    pub retries: u32,
    /// Key records by `_id` instead of by position.
    pub use_identifier_keys: bool,
    pub log_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_retention: Option<usize>,
    /// Route cursor events to their own log file.
    pub capture_events: bool,
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            retries: 0,
            use_identifier_keys: true,
            log_dir: None,
            log_level: None,
            log_retention: None,
            capture_events: false,
        }
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl CursorConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str::<Self>(s)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .map_err(|e| CursorError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&s)
    }

    /// Candidate config files, highest priority first.
    #[must_use]
    pub fn candidate_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(p) = explicit {
            paths.push(p.to_path_buf());
        }
        if let Ok(p) = std::env::var("NEXUS_CURSOR_CONFIG") {
            paths.push(PathBuf::from(p));
        }
        if let Ok(cur) = std::env::current_dir() {
            paths.push(cur.join("nexus_cursor.toml"));
        }
        paths
    }

    /// Defaults, overlaid by the first config file found, overlaid by the environment.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(path) = Self::candidate_paths(explicit).into_iter().find(|p| p.exists()) {
            log::debug!("loading cursor config from {}", path.display());
            cfg = Self::from_file(&path)?;
        } else if let Some(p) = explicit {
            return Err(CursorError::Config(format!("config file not found: {}", p.display())));
        }
        cfg.apply_env_from(|k| std::env::var(k).ok())?;
        Ok(cfg)
    }

    /// Overlay values from an environment-like lookup:
    /// - NEXUS_CURSOR_RETRIES
    /// - NEXUS_CURSOR_IDENTIFIER_KEYS
    /// - NEXUS_CURSOR_LOG_DIR / NEXUS_CURSOR_LOG_LEVEL / NEXUS_CURSOR_LOG_RETENTION
    /// - NEXUS_CURSOR_EVENTS
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("NEXUS_CURSOR_RETRIES") {
            self.retries = v
                .trim()
                .parse()
                .map_err(|_| CursorError::Config(format!("NEXUS_CURSOR_RETRIES: not a count: '{v}'")))?;
        }
        if let Some(v) = lookup("NEXUS_CURSOR_IDENTIFIER_KEYS") {
            self.use_identifier_keys = parse_flag(&v)
                .ok_or_else(|| CursorError::Config(format!("NEXUS_CURSOR_IDENTIFIER_KEYS: '{v}'")))?;
        }
        if let Some(v) = lookup("NEXUS_CURSOR_LOG_DIR") {
            self.log_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("NEXUS_CURSOR_LOG_LEVEL") {
            self.log_level = Some(v);
        }
        if let Some(v) = lookup("NEXUS_CURSOR_LOG_RETENTION") {
            self.log_retention = v.trim().parse().ok();
        }
        if let Some(v) = lookup("NEXUS_CURSOR_EVENTS") {
            self.capture_events = parse_flag(&v).unwrap_or(false);
        }
        Ok(())
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries)
    }

    /// Install logging as configured.
    pub fn init_logging(&self) -> std::result::Result<(), Box<dyn std::error::Error>> {
        crate::utils::logger::configure_logging(
            self.log_dir.as_deref(),
            self.log_level.as_deref(),
            self.log_retention,
            self.capture_events,
        )
    }
}
