//! Runtime configuration and the injected clock.
//!
//! Everything a job needs from the environment is read once into a
//! [`Config`] and handed to components at construction.

use std::path::PathBuf;
use std::time::Duration;

use time::{Date, OffsetDateTime};

pub const DEFAULT_FEED_URL: &str =
    "https://raw.githubusercontent.com/mhollingshead/billboard-hot-100/main/all.json";
pub const DEFAULT_CHART_URL: &str = "https://www.billboard.com/charts/hot-100/";
pub const DEFAULT_USER_AGENT: &str = "hot100/0.1 (catalog maintenance)";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";

/// Source of "today" for code that would otherwise read the system clock.
pub trait Clock: Send + Sync {
    fn today(&self) -> Date;

    fn now(&self) -> OffsetDateTime;
}

/// Wall-clock time in UTC.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> Date {
        OffsetDateTime::now_utc().date()
    }

    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A clock frozen at one instant, for tests and replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub OffsetDateTime);

impl FixedClock {
    /// Midnight UTC on the given date.
    pub fn on(date: Date) -> Self {
        Self(date.midnight().assume_utc())
    }
}

impl Clock for FixedClock {
    fn today(&self) -> Date {
        self.0.date()
    }

    fn now(&self) -> OffsetDateTime {
        self.0
    }
}

/// Client credentials for the streaming search API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotifyCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Resolved configuration for one run.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub feed_url: String,
    pub chart_url: String,
    pub user_agent: String,
    pub spotify: Option<SpotifyCredentials>,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub secondhandsongs_api_key: Option<String>,
    pub discogs_token: Option<String>,
    pub lastfm_api_key: Option<String>,
    /// Pause between consecutive calls to one external service.
    pub request_delay: Duration,
    /// Backoff schedule for transient failures; its length is the retry count.
    pub retry_delays: Vec<Duration>,
}

impl Config {
    /// Reads configuration from the environment (after loading `.env`).
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        ConfigBuilder::new().build()
    }
}

/// Builder for [`Config`]. Unset fields come from environment variables,
/// then from defaults.
///
/// | Field | Variable | Default |
/// | --- | --- | --- |
/// | database path | `HOT100_DB` | `{data_dir}/hot100/hot100.db` |
/// | feed URL | `HOT100_FEED_URL` | mhollingshead `all.json` |
/// | chart URL | `HOT100_CHART_URL` | billboard.com Hot 100 page |
/// | Spotify | `SPOTIFY_CLIENT_ID`, `SPOTIFY_CLIENT_SECRET` | disabled |
/// | OpenAI | `OPENAI_API_KEY`, `OPENAI_MODEL` | disabled, `gpt-3.5-turbo` |
/// | SecondHandSongs | `SHS_API_KEY` | anonymous |
/// | Discogs | `DISCOGS_TOKEN` | disabled |
/// | Last.fm | `LASTFM_API_KEY` | disabled |
/// | request delay | `HOT100_REQUEST_DELAY_MS` | 1000 ms |
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    database_path: Option<PathBuf>,
    feed_url: Option<String>,
    chart_url: Option<String>,
    spotify: Option<SpotifyCredentials>,
    openai_api_key: Option<String>,
    secondhandsongs_api_key: Option<String>,
    discogs_token: Option<String>,
    lastfm_api_key: Option<String>,
    request_delay: Option<Duration>,
    retry_delays: Option<Vec<Duration>>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn feed_url(mut self, url: impl Into<String>) -> Self {
        self.feed_url = Some(url.into());
        self
    }

    pub fn chart_url(mut self, url: impl Into<String>) -> Self {
        self.chart_url = Some(url.into());
        self
    }

    pub fn spotify(mut self, client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        self.spotify = Some(SpotifyCredentials {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        });
        self
    }

    pub fn openai_api_key(mut self, key: impl Into<String>) -> Self {
        self.openai_api_key = Some(key.into());
        self
    }

    pub fn secondhandsongs_api_key(mut self, key: impl Into<String>) -> Self {
        self.secondhandsongs_api_key = Some(key.into());
        self
    }

    pub fn discogs_token(mut self, token: impl Into<String>) -> Self {
        self.discogs_token = Some(token.into());
        self
    }

    pub fn lastfm_api_key(mut self, key: impl Into<String>) -> Self {
        self.lastfm_api_key = Some(key.into());
        self
    }

    pub fn request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = Some(delay);
        self
    }

    pub fn retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = Some(delays);
        self
    }

    pub fn build(self) -> anyhow::Result<Config> {
        let database_path = match self.database_path.or_else(|| env_var("HOT100_DB").map(PathBuf::from)) {
            Some(path) => path,
            None => default_database_path()?,
        };

        let spotify = self.spotify.or_else(|| {
            Some(SpotifyCredentials {
                client_id: env_var("SPOTIFY_CLIENT_ID")?,
                client_secret: env_var("SPOTIFY_CLIENT_SECRET")?,
            })
        });

        let request_delay = match self.request_delay {
            Some(delay) => delay,
            None => match env_var("HOT100_REQUEST_DELAY_MS") {
                Some(ms) => Duration::from_millis(ms.parse().map_err(|e| {
                    anyhow::anyhow!("HOT100_REQUEST_DELAY_MS must be milliseconds: {e}")
                })?),
                None => Duration::from_secs(1),
            },
        };

        Ok(Config {
            database_path,
            feed_url: self
                .feed_url
                .or_else(|| env_var("HOT100_FEED_URL"))
                .unwrap_or_else(|| DEFAULT_FEED_URL.to_string()),
            chart_url: self
                .chart_url
                .or_else(|| env_var("HOT100_CHART_URL"))
                .unwrap_or_else(|| DEFAULT_CHART_URL.to_string()),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            spotify,
            openai_api_key: self.openai_api_key.or_else(|| env_var("OPENAI_API_KEY")),
            openai_model: env_var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            secondhandsongs_api_key: self.secondhandsongs_api_key.or_else(|| env_var("SHS_API_KEY")),
            discogs_token: self.discogs_token.or_else(|| env_var("DISCOGS_TOKEN")),
            lastfm_api_key: self.lastfm_api_key.or_else(|| env_var("LASTFM_API_KEY")),
            request_delay,
            retry_delays: self.retry_delays.unwrap_or_else(|| {
                [1, 2, 4].into_iter().map(Duration::from_secs).collect()
            }),
        })
    }
}

/// Non-empty environment variable value.
fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// Returns `{data_dir}/hot100/hot100.db` where `data_dir` is:
/// - Linux: `~/.local/share`
/// - macOS: `~/Library/Application Support`
/// - Windows: `C:\Users\<user>\AppData\Roaming`
fn default_database_path() -> anyhow::Result<PathBuf> {
    let data_dir =
        dirs::data_dir().ok_or_else(|| anyhow::anyhow!("Failed to determine data directory"))?;
    Ok(data_dir.join("hot100").join("hot100.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use time::macros::date;

    fn clear_env() {
        for name in [
            "HOT100_DB",
            "HOT100_FEED_URL",
            "HOT100_CHART_URL",
            "HOT100_REQUEST_DELAY_MS",
            "SPOTIFY_CLIENT_ID",
            "SPOTIFY_CLIENT_SECRET",
            "OPENAI_API_KEY",
            "OPENAI_MODEL",
            "SHS_API_KEY",
            "DISCOGS_TOKEN",
            "LASTFM_API_KEY",
        ] {
            unsafe { std::env::remove_var(name) };
        }
    }

    #[test]
    fn fixed_clock_reports_its_date() {
        let clock = FixedClock::on(date!(2024 - 07 - 13));
        assert_eq!(clock.today(), date!(2024 - 07 - 13));
    }

    #[test]
    #[serial]
    fn defaults_apply_without_environment() {
        clear_env();
        let config = ConfigBuilder::new()
            .database_path("/tmp/hot100-test.db")
            .build()
            .unwrap();

        assert_eq!(config.feed_url, DEFAULT_FEED_URL);
        assert_eq!(config.chart_url, DEFAULT_CHART_URL);
        assert_eq!(config.openai_model, DEFAULT_OPENAI_MODEL);
        assert!(config.spotify.is_none());
        assert!(config.openai_api_key.is_none());
        assert_eq!(config.request_delay, Duration::from_secs(1));
        assert_eq!(config.retry_delays.len(), 3);
    }

    #[test]
    #[serial]
    fn environment_fills_unset_fields() {
        clear_env();
        unsafe {
            std::env::set_var("HOT100_DB", "/tmp/env.db");
            std::env::set_var("SPOTIFY_CLIENT_ID", "id");
            std::env::set_var("SPOTIFY_CLIENT_SECRET", "secret");
            std::env::set_var("HOT100_REQUEST_DELAY_MS", "250");
            std::env::set_var("DISCOGS_TOKEN", "discogs");
            std::env::set_var("LASTFM_API_KEY", " ");
        }

        let config = ConfigBuilder::new().build().unwrap();
        clear_env();

        assert_eq!(config.database_path, PathBuf::from("/tmp/env.db"));
        assert_eq!(
            config.spotify,
            Some(SpotifyCredentials {
                client_id: "id".into(),
                client_secret: "secret".into(),
            })
        );
        assert_eq!(config.request_delay, Duration::from_millis(250));
        assert_eq!(config.discogs_token.as_deref(), Some("discogs"));
        assert!(config.lastfm_api_key.is_none());
    }

    #[test]
    #[serial]
    fn spotify_requires_both_credentials() {
        clear_env();
        unsafe { std::env::set_var("SPOTIFY_CLIENT_ID", "id") };

        let config = ConfigBuilder::new().database_path("x.db").build().unwrap();
        clear_env();

        assert!(config.spotify.is_none());
    }

    #[test]
    #[serial]
    fn builder_values_win_over_environment() {
        clear_env();
        unsafe { std::env::set_var("OPENAI_API_KEY", "from-env") };

        let config = ConfigBuilder::new()
            .database_path("x.db")
            .openai_api_key("from-builder")
            .build()
            .unwrap();
        clear_env();

        assert_eq!(config.openai_api_key.as_deref(), Some("from-builder"));
    }

    #[test]
    #[serial]
    fn invalid_delay_is_reported() {
        clear_env();
        unsafe { std::env::set_var("HOT100_REQUEST_DELAY_MS", "soon") };

        let result = ConfigBuilder::new().database_path("x.db").build();
        clear_env();

        assert!(result.is_err());
    }
}
