/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! User preferences, read from `retitle.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::launch_context::DEFAULT_LAUNCH_CONTEXT_TTL;
use crate::persistence::RedbDatabase;
use crate::title_lock::DEFAULT_REASSERT_INTERVAL;

pub const PREFS_FILE_NAME: &str = "retitle.toml";

#[derive(Debug)]
pub enum PrefsError {
    Io(String),
    Parse(String),
    Invalid(String),
    NoDataDir,
}

impl std::fmt::Display for PrefsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrefsError::Io(e) => write!(f, "preferences I/O error: {e}"),
            PrefsError::Parse(e) => write!(f, "preferences parse error: {e}"),
            PrefsError::Invalid(e) => write!(f, "invalid preference: {e}"),
            PrefsError::NoDataDir => write!(f, "no data directory available; pass --data-dir"),
        }
    }
}

impl std::error::Error for PrefsError {}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Preferences {
    pub data_dir: Option<PathBuf>,
    pub reassert_interval_ms: u64,
    pub launch_context_ttl_secs: u64,
    pub session_storage: bool,
    pub log_filter: Option<String>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            data_dir: None,
            reassert_interval_ms: DEFAULT_REASSERT_INTERVAL.as_millis() as u64,
            launch_context_ttl_secs: DEFAULT_LAUNCH_CONTEXT_TTL.as_secs(),
            session_storage: true,
            log_filter: None,
        }
    }
}

/// `<config_dir>/retitle/retitle.toml`, when the platform has a config dir.
pub fn default_prefs_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("retitle").join(PREFS_FILE_NAME))
}

impl Preferences {
    /// Read `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, PrefsError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("prefs: {} not found, using defaults", path.display());
                return Ok(Self::default());
            },
            Err(e) => return Err(PrefsError::Io(format!("{}: {e}", path.display()))),
        };
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, PrefsError> {
        let prefs: Self = toml::from_str(raw).map_err(|e| PrefsError::Parse(e.to_string()))?;
        prefs.validate()?;
        Ok(prefs)
    }

    fn validate(&self) -> Result<(), PrefsError> {
        if self.reassert_interval_ms == 0 {
            return Err(PrefsError::Invalid(
                "reassert_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.launch_context_ttl_secs == 0 {
            return Err(PrefsError::Invalid(
                "launch_context_ttl_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn reassert_interval(&self) -> Duration {
        Duration::from_millis(self.reassert_interval_ms)
    }

    pub fn launch_context_ttl(&self) -> Duration {
        Duration::from_secs(self.launch_context_ttl_secs)
    }

    /// Configured data directory, else the platform default.
    pub fn resolved_data_dir(&self) -> Result<PathBuf, PrefsError> {
        self.data_dir
            .clone()
            .or_else(RedbDatabase::default_data_dir)
            .ok_or(PrefsError::NoDataDir)
    }

    /// Apply command-line overrides on top of the file values.
    pub fn with_overrides(mut self, data_dir: Option<PathBuf>, log_filter: Option<String>) -> Self {
        if data_dir.is_some() {
            self.data_dir = data_dir;
        }
        if log_filter.is_some() {
            self.log_filter = log_filter;
        }
        self
    }
}
