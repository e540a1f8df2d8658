use std::time::Duration;

use reqwest::Client;

use crate::error::AppError;

/// Browser-like User-Agent; several mirrors refuse obvious bot agents.
pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0 Safari/537.36";

/// Settings shared by every outbound HTTP call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub accept_invalid_certs: bool,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            accept_invalid_certs: false,
        }
    }
}

/// Build the single `reqwest::Client` shared by sources, translator and
/// push channels. Every request made through it is bounded by `timeout`.
pub fn build_client(settings: HttpSettings) -> Result<Client, AppError> {
    Client::builder()
        .timeout(settings.timeout)
        .connect_timeout(settings.timeout)
        .user_agent(USER_AGENT)
        .danger_accept_invalid_certs(settings.accept_invalid_certs)
        .build()
        .map_err(|err| AppError::HttpClient(err.to_string()))
}
