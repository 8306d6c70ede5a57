use std::time::Duration;

const DEFAULT_BASE_URL: &str = "http://localhost:8080";

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl ClientOptions {
    /// Defaults, with the base URL taken from `FGALITE_API_URL` when set.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Ok(url) = std::env::var("FGALITE_API_URL")
            && !url.is_empty()
        {
            options.base_url = url;
        }
        options
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}
