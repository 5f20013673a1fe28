//! Process configuration: defaults, an optional TOML file layer, and
//! env/CLI overrides — in that priority order, following the same
//! env-overrides-file-overrides-defaults discipline as the teacher's
//! configuration crate.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;

use crate::error::TaskdError;

/// `MAX_TASKS` floor from §5.B.
const MIN_MAX_TASKS: usize = 20;
/// `Q` floor from §4.F.
const MIN_QUEUE_CAPACITY: usize = 20;
/// `LINE_MAX` floor from §4.G.
const MIN_LINE_MAX: usize = 4096;
/// `MAX_CLIENTS` floor from §4.G.
const MIN_MAX_CLIENTS: usize = 50;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub bind: SocketAddr,
    pub max_tasks: usize,
    pub queue_capacity: usize,
    pub line_max: usize,
    pub max_clients: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            bind: "0.0.0.0:8080".parse().expect("valid default bind address"),
            max_tasks: MIN_MAX_TASKS,
            queue_capacity: MIN_QUEUE_CAPACITY,
            line_max: MIN_LINE_MAX,
            max_clients: MIN_MAX_CLIENTS,
        }
    }
}

impl EngineConfig {
    fn validate(&self) -> Result<(), TaskdError> {
        if self.max_tasks < MIN_MAX_TASKS {
            return Err(TaskdError::InvalidConfig(format!(
                "max_tasks must be >= {MIN_MAX_TASKS}, got {}",
                self.max_tasks
            )));
        }
        if self.queue_capacity < MIN_QUEUE_CAPACITY {
            return Err(TaskdError::InvalidConfig(format!(
                "queue_capacity must be >= {MIN_QUEUE_CAPACITY}, got {}",
                self.queue_capacity
            )));
        }
        if self.line_max < MIN_LINE_MAX {
            return Err(TaskdError::InvalidConfig(format!(
                "line_max must be >= {MIN_LINE_MAX}, got {}",
                self.line_max
            )));
        }
        if self.max_clients < MIN_MAX_CLIENTS {
            return Err(TaskdError::InvalidConfig(format!(
                "max_clients must be >= {MIN_MAX_CLIENTS}, got {}",
                self.max_clients
            )));
        }
        Ok(())
    }
}

/// The optional TOML overlay. Every field is optional so a partial file
/// only overrides what it names, leaving the rest at their defaults.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    bind: Option<SocketAddr>,
    max_tasks: Option<usize>,
    queue_capacity: Option<usize>,
    line_max: Option<usize>,
    max_clients: Option<usize>,
}

impl FileConfig {
    fn load(path: &Path) -> Result<Self, TaskdError> {
        let text = std::fs::read_to_string(path).map_err(|source| TaskdError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| TaskdError::ConfigParse {
            path: path.display().to_string(),
            source,
        })
    }

    fn apply_to(self, cfg: &mut EngineConfig) {
        if let Some(v) = self.bind {
            cfg.bind = v;
        }
        if let Some(v) = self.max_tasks {
            cfg.max_tasks = v;
        }
        if let Some(v) = self.queue_capacity {
            cfg.queue_capacity = v;
        }
        if let Some(v) = self.line_max {
            cfg.line_max = v;
        }
        if let Some(v) = self.max_clients {
            cfg.max_clients = v;
        }
    }
}

/// Command-line / environment overrides. Every knob (but the config file
/// path itself) is `Option` with no `default_value`: `None` means "not
/// supplied on the CLI or via its env var", so the file layer and the
/// built-in defaults underneath it are left alone.
#[derive(Debug, Parser)]
#[command(name = "taskd", about = "Network-controlled dynamic periodic task engine")]
pub struct Cli {
    /// TCP address to accept control connections on.
    #[arg(long, env = "TASKD_BIND")]
    bind: Option<SocketAddr>,

    /// Maximum concurrent active task instances (must be >= 20).
    #[arg(long, env = "TASKD_MAX_TASKS")]
    max_tasks: Option<usize>,

    /// Event queue capacity (must be >= 20).
    #[arg(long, env = "TASKD_QUEUE_CAPACITY")]
    queue_capacity: Option<usize>,

    /// Maximum bytes in one protocol line (must be >= 4096).
    #[arg(long, env = "TASKD_LINE_MAX")]
    line_max: Option<usize>,

    /// Maximum concurrent client connections (must be >= 50).
    #[arg(long, env = "TASKD_MAX_CLIENTS")]
    max_clients: Option<usize>,

    /// Optional TOML file providing defaults beneath CLI/env overrides.
    #[arg(long, env = "TASKD_CONFIG_FILE")]
    config_file: Option<PathBuf>,
}

impl Cli {
    fn apply_to(self, cfg: &mut EngineConfig) {
        if let Some(v) = self.bind {
            cfg.bind = v;
        }
        if let Some(v) = self.max_tasks {
            cfg.max_tasks = v;
        }
        if let Some(v) = self.queue_capacity {
            cfg.queue_capacity = v;
        }
        if let Some(v) = self.line_max {
            cfg.line_max = v;
        }
        if let Some(v) = self.max_clients {
            cfg.max_clients = v;
        }
    }
}

/// Loads the effective configuration: defaults, overlaid by an optional
/// TOML file, overlaid by CLI flags/their env vars (clap resolves the
/// CLI-vs-env precedence for each flag on its own), then validated.
pub fn load() -> Result<EngineConfig, TaskdError> {
    let cli = Cli::parse();
    let mut cfg = EngineConfig::default();

    if let Some(path) = &cli.config_file {
        FileConfig::load(path)?.apply_to(&mut cfg);
    }

    cli.apply_to(&mut cfg);
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_satisfy_their_own_floors() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn below_floor_max_tasks_is_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.max_tasks = 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn file_overlay_applies_only_named_fields() {
        let mut cfg = EngineConfig::default();
        let file = FileConfig {
            max_tasks: Some(30),
            ..Default::default()
        };
        let default_bind = cfg.bind;
        file.apply_to(&mut cfg);
        assert_eq!(cfg.max_tasks, 30);
        assert_eq!(cfg.bind, default_bind);
    }

    #[test]
    fn file_config_parses_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taskd.toml");
        std::fs::write(&path, "max_tasks = 42\nmax_clients = 75\n").unwrap();

        let file = FileConfig::load(&path).unwrap();
        assert_eq!(file.max_tasks, Some(42));
        assert_eq!(file.max_clients, Some(75));
        assert_eq!(file.bind, None);
    }
}
