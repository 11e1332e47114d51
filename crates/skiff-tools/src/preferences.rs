use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use strum::Display;
use thiserror::Error;

/// Which execution tools the agent offers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum PythonToolMode {
    /// Kernel-backed python when available, bash as the fallback
    #[default]
    Both,
    /// Python kernel only; unavailability is surfaced rather than masked
    IpyOnly,
    /// Never offer the python kernel
    BashOnly,
}

/// Kernel lifetime policy for python executions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum KernelMode {
    /// One reusable kernel per session key
    #[default]
    Session,
    /// Fresh kernel per call, disposed afterward
    PerCall,
}

#[derive(Debug, Error)]
pub enum PreferencesError {
    #[error("could not determine config directory")]
    NoConfigDir,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize preferences: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Preferences {
    #[serde(default)]
    pub python: PythonPreferences,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PythonPreferences {
    #[serde(default)]
    pub mode: PythonToolMode,

    #[serde(default)]
    pub kernel_mode: KernelMode,

    /// Interpreter executable to probe and spawn instead of `python3`.
    pub interpreter: Option<String>,
}

impl Preferences {
    /// Get the path to the preferences file
    pub fn config_path() -> Result<PathBuf, PreferencesError> {
        let config_dir = dirs::config_dir().ok_or(PreferencesError::NoConfigDir)?;
        Ok(config_dir.join("skiff").join("preferences.toml"))
    }

    /// Load preferences from disk, or return defaults if not found
    pub fn load() -> Result<Self, PreferencesError> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            match toml::from_str(&contents) {
                Ok(prefs) => Ok(prefs),
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse preferences file at {:?}: {}. Using defaults.",
                        path,
                        e
                    );
                    Ok(Self::default())
                }
            }
        } else {
            Ok(Self::default())
        }
    }

    /// Save preferences to disk
    pub fn save(&self) -> Result<(), PreferencesError> {
        let path = Self::config_path()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        Ok(())
    }
}
