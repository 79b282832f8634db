//! XDG-compliant path resolution for wayfarer.
//!
//! Configuration (action definitions, state defaults, goal templates) lives
//! under the XDG config dir; persisted agent state (character cache,
//! knowledge base, map state) lives under the XDG state dir.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Errors from path resolution.
#[derive(Debug, Error, Diagnostic)]
pub enum PathError {
    #[error("cannot determine home directory")]
    #[diagnostic(
        code(wayfarer::paths::no_home),
        help("Set the HOME environment variable or ensure a valid user profile exists.")
    )]
    NoHome,

    #[error("failed to create directory: {path}")]
    #[diagnostic(
        code(wayfarer::paths::create_dir),
        help("Check that the parent directory exists and you have write permissions.")
    )]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type PathResult<T> = std::result::Result<T, PathError>;

/// XDG-compliant directories for wayfarer.
#[derive(Debug, Clone)]
pub struct WayfarerPaths {
    /// `$XDG_CONFIG_HOME/wayfarer/`
    pub config_dir: PathBuf,
    /// `$XDG_DATA_HOME/wayfarer/`
    pub data_dir: PathBuf,
    /// `$XDG_STATE_HOME/wayfarer/`
    pub state_dir: PathBuf,
    /// `$XDG_CACHE_HOME/wayfarer/`
    pub cache_dir: PathBuf,
}

impl WayfarerPaths {
    /// Resolve XDG directories from environment variables with standard
    /// fallbacks.
    pub fn resolve() -> PathResult<Self> {
        let home = std::env::var("HOME")
            .map(PathBuf::from)
            .map_err(|_| PathError::NoHome)?;

        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".config"))
            .join("wayfarer");

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".local/share"))
            .join("wayfarer");

        let state_dir = std::env::var("XDG_STATE_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".local/state"))
            .join("wayfarer");

        let cache_dir = std::env::var("XDG_CACHE_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".cache"))
            .join("wayfarer");

        Ok(Self {
            config_dir,
            data_dir,
            state_dir,
            cache_dir,
        })
    }

    /// Create all base directories. Idempotent.
    pub fn ensure_dirs(&self) -> PathResult<()> {
        for dir in [
            &self.config_dir,
            &self.data_dir,
            &self.state_dir,
            &self.cache_dir,
        ] {
            std::fs::create_dir_all(dir).map_err(|e| PathError::CreateDir {
                path: dir.display().to_string(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Declarative action definitions.
    pub fn actions_file(&self) -> PathBuf {
        self.config_dir.join("actions.toml")
    }

    /// Initial values for every recognized state key.
    pub fn state_defaults_file(&self) -> PathBuf {
        self.config_dir.join("state_defaults.toml")
    }

    /// Named goal templates.
    pub fn goals_file(&self) -> PathBuf {
        self.config_dir.join("goals.toml")
    }

    /// Per-character snapshot cache.
    pub fn character_cache_file(&self) -> PathBuf {
        self.state_dir.join("characters.json")
    }

    /// Learned game knowledge (recipes, workshops, monster locations).
    pub fn knowledge_file(&self) -> PathBuf {
        self.state_dir.join("knowledge.json")
    }

    /// Explored map tiles.
    pub fn map_file(&self) -> PathBuf {
        self.state_dir.join("map.json")
    }
}
