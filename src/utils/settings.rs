//! Layered settings
//!
//! Precedence, lowest first: built-in defaults, the TOML config file
//! (`~/.srvw/config.toml` or `--config`), `SRVW_*` environment variables with
//! `__` between nesting levels, then command-line flags.

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::config::{
    APP_DIRECTORY, CONFIG_FILE_NAME, DEFAULT_GRACE_PERIOD, DEFAULT_POLL_INTERVAL,
    DEFAULT_SERVER_NAME, ENV_PREFIX, LOG_DIRECTORY, STATE_DIRECTORY,
};
use crate::core::models::{log_file_for, SpawnRequest, StopPolicy};
use crate::error::{errors, WardenResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WardenSettings {
    pub server: ServerSettings,
    pub stop: StopSettings,
    pub paths: PathSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub name: String,
    pub command: Option<String>,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            name: DEFAULT_SERVER_NAME.to_string(),
            command: None,
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopSettings {
    pub grace_period_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for StopSettings {
    fn default() -> Self {
        Self {
            grace_period_ms: DEFAULT_GRACE_PERIOD.as_millis() as u64,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

/// Unset directories resolve to `~/.srvw/state` and `<tmp>/.srvw/logs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PathSettings {
    pub state_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

/// Values given on the command line; `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub name: Option<String>,
    pub command: Option<String>,
    pub args: Option<Vec<String>>,
    pub state_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub grace_period_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
}

/// `~/.srvw/config.toml`, when a home directory exists.
pub fn default_config_file() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(APP_DIRECTORY).join(CONFIG_FILE_NAME))
}

fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

impl WardenSettings {
    /// Load from the real environment.
    pub fn load(config_file: Option<&Path>) -> WardenResult<Self> {
        Self::load_with_env(config_file, None)
    }

    /// Load with an explicit environment map instead of the process
    /// environment. An explicitly named config file must exist; the default
    /// one is optional.
    pub fn load_with_env(
        config_file: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> WardenResult<Self> {
        let mut builder = Config::builder();

        let file = match config_file {
            Some(path) => Some((path.to_path_buf(), true)),
            None => default_config_file().map(|path| (path, false)),
        };
        if let Some((path, required)) = file {
            debug!(path = %path.display(), required, "reading config file");
            builder = builder.add_source(
                File::new(&path.to_string_lossy(), FileFormat::Toml).required(required),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(" ")
                .with_list_parse_key("server.args")
                .source(env),
        );

        let settings: WardenSettings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    pub fn apply(&mut self, overrides: SettingsOverrides) {
        if let Some(name) = overrides.name {
            self.server.name = name;
        }
        if let Some(command) = overrides.command {
            self.server.command = Some(command);
        }
        if let Some(args) = overrides.args {
            self.server.args = args;
        }
        if let Some(dir) = overrides.state_dir {
            self.paths.state_dir = Some(dir);
        }
        if let Some(dir) = overrides.log_dir {
            self.paths.log_dir = Some(dir);
        }
        if let Some(ms) = overrides.grace_period_ms {
            self.stop.grace_period_ms = ms;
        }
        if let Some(ms) = overrides.poll_interval_ms {
            self.stop.poll_interval_ms = ms;
        }
    }

    pub fn validate(&self) -> WardenResult<()> {
        let name = self.server.name.trim();
        if name.is_empty() {
            return Err(errors::config_error("server.name must not be empty"));
        }
        if name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(errors::config_error(format!(
                "server.name '{name}' must not contain path separators"
            )));
        }
        if self.stop.poll_interval_ms == 0 {
            return Err(errors::config_error("stop.poll_interval_ms must be greater than 0"));
        }
        if self.stop.poll_interval_ms > self.stop.grace_period_ms {
            return Err(errors::config_error(format!(
                "stop.poll_interval_ms ({}) must not exceed stop.grace_period_ms ({})",
                self.stop.poll_interval_ms, self.stop.grace_period_ms
            )));
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        self.server.name.trim()
    }

    pub fn stop_policy(&self) -> StopPolicy {
        StopPolicy::new(
            Duration::from_millis(self.stop.grace_period_ms),
            Duration::from_millis(self.stop.poll_interval_ms),
        )
    }

    pub fn state_dir(&self) -> WardenResult<PathBuf> {
        match &self.paths.state_dir {
            Some(dir) => Ok(expand_home(dir)),
            None => dirs::home_dir()
                .map(|home| home.join(APP_DIRECTORY).join(STATE_DIRECTORY))
                .ok_or_else(|| {
                    errors::config_error("Cannot find home directory, set paths.state_dir")
                }),
        }
    }

    pub fn log_dir(&self) -> PathBuf {
        match &self.paths.log_dir {
            Some(dir) => expand_home(dir),
            None => std::env::temp_dir().join(APP_DIRECTORY).join(LOG_DIRECTORY),
        }
    }

    pub fn log_file(&self) -> PathBuf {
        log_file_for(&self.log_dir(), self.name())
    }

    /// Launch request for start/restart; fails when no command is configured.
    pub fn spawn_request(&self) -> WardenResult<SpawnRequest> {
        let command = self
            .server
            .command
            .as_deref()
            .map(str::trim)
            .filter(|command| !command.is_empty())
            .ok_or_else(|| {
                errors::config_error(
                    "No server command configured; set server.command or pass one after `--`",
                )
            })?;

        Ok(SpawnRequest::new(command, self.server.args.clone())
            .with_working_dir(self.server.working_dir.as_deref().map(expand_home))
            .with_env(self.server.env.clone())
            .with_log_file(self.log_file()))
    }
}
