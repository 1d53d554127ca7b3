use std::time::Duration;

use tidings::ScrollTrigger;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("could not read .env file")]
    DotEnv(#[from] dotenvy::Error),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    /// Root of the backend, e.g. `http://localhost:3300`. Static files and sockets hang off it.
    pub backend_url: String,
    pub access_token: Option<String>,
    /// `name=value` of the refresh cookie set at login, for clients that did not log in
    /// through this process.
    pub refresh_cookie: Option<String>,
    pub notifications_page_size: usize,
    pub messages_page_size: usize,
    pub scroll_threshold_px: f64,
    pub scroll_debounce: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:3300".to_string(),
            access_token: None,
            refresh_cookie: None,
            notifications_page_size: 15,
            messages_page_size: 15,
            scroll_threshold_px: 250.0,
            scroll_debounce: Duration::from_millis(50),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    pub const API_PREFIX: &'static str = "/api/v1";

    /// Read `KONSYLIUM_*` variables, loading a `.env` file first if there is one.
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => log::debug!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(e.into()),
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(url) = lookup("KONSYLIUM_BACKEND_URL") {
            config.backend_url = url.trim_end_matches('/').to_string();
        }
        config.access_token = lookup("KONSYLIUM_ACCESS_TOKEN").filter(|token| !token.is_empty());
        config.refresh_cookie = lookup("KONSYLIUM_REFRESH_COOKIE").filter(|cookie| cookie.contains('='));
        if let Some(value) = lookup("KONSYLIUM_PAGE_SIZE") {
            let size = parse_positive("KONSYLIUM_PAGE_SIZE", &value)?;
            config.notifications_page_size = size;
            config.messages_page_size = size;
        }
        if let Some(value) = lookup("KONSYLIUM_REQUEST_TIMEOUT_SECS") {
            let secs = parse_positive("KONSYLIUM_REQUEST_TIMEOUT_SECS", &value)?;
            config.request_timeout = Duration::from_secs(secs as u64);
        }
        Ok(config)
    }

    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}{path}", self.backend_url, Self::API_PREFIX)
    }

    pub fn static_url(&self, filename: &str) -> String {
        format!("{}/static/{filename}", self.backend_url)
    }

    pub fn socket_url(&self, namespace: &str) -> String {
        format!("{}{namespace}", self.backend_url)
    }

    /// Near-bottom trigger for infinite-scroll lists.
    pub fn scroll_trigger(&self) -> ScrollTrigger {
        ScrollTrigger::new(self.scroll_threshold_px, self.scroll_debounce)
    }

    /// Near-top trigger for the chat transcript, which loads older messages above.
    pub fn transcript_scroll_trigger(&self) -> ScrollTrigger {
        ScrollTrigger::at_top(self.scroll_threshold_px, self.scroll_debounce)
    }
}

fn parse_positive(name: &'static str, value: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| ConfigError::Invalid {
            name,
            expected: "a positive integer",
            value: value.to_string(),
        })
}
