use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tradewatch_core::Direction;
use tradewatch_engine::{ClientSettings, Endpoints, PollSettings};
use tradewatch_logging::watch_info;

use crate::logging::LogDestination;

pub const DEFAULT_CONFIG: &str = "tradewatch.ron";
pub const COOKIE_VAR: &str = "TRADEWATCH_COOKIE";
/// One year; longer periods overflow the timer's deadline arithmetic.
const MAX_RELOG_HOURS: u64 = 24 * 365;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tracked {
    #[default]
    Sales,
    Purchases,
}

impl Tracked {
    pub fn direction(self) -> Direction {
        match self {
            Tracked::Sales => Direction::Sale,
            Tracked::Purchases => Direction::Purchase,
        }
    }
}

/// Contents of the RON config file. Every field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Session cookie; `TRADEWATCH_COOKIE` wins when both are set.
    pub cookie: Option<String>,
    pub track: Tracked,
    pub poll_interval_ms: u64,
    pub page_limit: u32,
    /// Relog in the background every `relog_interval_hours`.
    pub maintain_session: bool,
    pub relog_interval_hours: u64,
    /// Send every request to this base instead of the public hosts.
    pub base_url: Option<String>,
    /// Where the last seen mark is kept between runs; `None` always starts fresh.
    pub state_file: Option<PathBuf>,
    pub log: LogDestination,
    pub verbose: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let client = ClientSettings::default();
        Self {
            cookie: None,
            track: Tracked::default(),
            poll_interval_ms: client.poll.interval.as_millis() as u64,
            page_limit: client.page_limit,
            maintain_session: false,
            relog_interval_hours: client.relog_interval.as_secs() / 3600,
            base_url: None,
            state_file: Some(PathBuf::from(".tradewatch_state.ron")),
            log: LogDestination::default(),
            verbose: false,
        }
    }
}

impl AppConfig {
    /// Reads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read config {:?}", path));
            }
        };
        let config: AppConfig =
            ron::from_str(&content).with_context(|| format!("failed to parse config {:?}", path))?;
        watch_info!("loaded config from {:?}", path);
        Ok(config)
    }

    /// Picks the session cookie, preferring the environment over the file.
    pub fn session_cookie(&self, from_env: Option<String>) -> Result<String> {
        let cookie = from_env
            .filter(|value| !value.trim().is_empty())
            .or_else(|| self.cookie.clone())
            .unwrap_or_default();
        if cookie.trim().is_empty() {
            bail!("no session cookie: set {COOKIE_VAR} or `cookie` in the config file");
        }
        Ok(cookie)
    }

    pub fn client_settings(&self) -> ClientSettings {
        let defaults = ClientSettings::default();
        let endpoints = match &self.base_url {
            Some(base) => Endpoints::all_at(base.clone()),
            None => Endpoints::default(),
        };
        let session = match &self.base_url {
            // A custom host would never match the public cookie domain.
            Some(_) => tradewatch_engine::SessionSettings {
                cookie_domain: None,
                ..defaults.session
            },
            None => defaults.session,
        };
        ClientSettings {
            session,
            endpoints,
            poll: PollSettings {
                interval: Duration::from_millis(self.poll_interval_ms.max(1)),
                ..defaults.poll
            },
            page_limit: self.page_limit.max(1),
            relog_interval: Duration::from_secs(
                self.relog_interval_hours
                    .clamp(1, MAX_RELOG_HOURS)
                    .saturating_mul(3600),
            ),
        }
    }
}
