//! Layered configuration: JSON file, then environment, then CLI flags.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cli::Cli;
use crate::diff::DEFAULT_BACKLOG_CAP;
use crate::error::ConfigError;
use crate::services::http::HttpSettings;
use crate::store::DEFAULT_STATE_FILE;
use crate::types::Account;

pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Credential placeholder meaning "read this from the environment".
pub const FROM_ENV: &str = "FROM_ENV";

pub const DEFAULT_MIRRORS: &[&str] = &[
    "https://nitter.net",
    "https://nitter.poast.org",
    "https://nitter.privacydev.net",
    "https://n.ramle.be",
];

pub const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 600;
pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 15;
pub const DEFAULT_TRANSLATE_TARGET: &str = "zh";

/// Raw shape of `config.json`. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    #[serde(alias = "users")]
    pub accounts: Option<Vec<String>>,
    #[serde(alias = "nitter_instances")]
    pub mirrors: Option<Vec<String>>,
    pub push: FilePush,
    pub translation: FileTranslation,
    pub state_file: Option<PathBuf>,
    #[serde(alias = "interval_seconds")]
    pub poll_interval_seconds: Option<u64>,
    pub http_timeout_seconds: Option<u64>,
    pub backlog_cap: Option<usize>,
    pub max_concurrent_accounts: Option<usize>,
    pub accept_invalid_certs: Option<bool>,
    pub metrics_textfile: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FilePush {
    pub method: Option<String>,
    pub wecom_webhook: Option<String>,
    pub serverchan_sendkey: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileTranslation {
    pub backend: Option<String>,
    pub url: Option<String>,
    pub target: Option<String>,
    pub api_key: Option<String>,
}

impl FileConfig {
    /// Read `path`. A missing file yields the empty config when
    /// `required` is false.
    pub fn read(path: &Path, required: bool) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound && !required => {
                return Ok(Self::default())
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Where notifications go.
#[derive(Clone, PartialEq, Eq)]
pub enum PushMethod {
    WeCom { webhook: String },
    ServerChan { sendkey: String },
}

impl std::fmt::Debug for PushMethod {
    // Credentials stay out of logs.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WeCom { .. } => f.write_str("WeCom { webhook: <redacted> }"),
            Self::ServerChan { .. } => f.write_str("ServerChan { sendkey: <redacted> }"),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum TranslatorBackend {
    Dictionary,
    LibreTranslate {
        url: String,
        target: String,
        api_key: Option<String>,
    },
    Disabled,
}

impl std::fmt::Debug for TranslatorBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dictionary => f.write_str("Dictionary"),
            Self::LibreTranslate { url, target, api_key } => f
                .debug_struct("LibreTranslate")
                .field("url", url)
                .field("target", target)
                .field("api_key", &api_key.as_ref().map(|_| "<redacted>"))
                .finish(),
            Self::Disabled => f.write_str("Disabled"),
        }
    }
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub accounts: Vec<Account>,
    pub mirrors: Vec<String>,
    pub push: PushMethod,
    pub translator: TranslatorBackend,
    pub state_file: PathBuf,
    pub poll_interval_seconds: u64,
    pub http: HttpSettings,
    pub backlog_cap: usize,
    pub max_concurrent_accounts: usize,
    pub metrics_textfile: Option<PathBuf>,
}

impl Config {
    /// Load from the config file named by `cli` (or the default), the
    /// process environment and the CLI flags.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => FileConfig::read(path, true)?,
            None => FileConfig::read(Path::new(DEFAULT_CONFIG_FILE), false)?,
        };

        Self::resolve(file, |key| env::var(key).ok(), cli)
    }

    /// Merge the three layers. `env` looks up one environment variable.
    pub fn resolve<E>(file: FileConfig, env: E, cli: &Cli) -> Result<Self, ConfigError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let accounts = match lookup("ACCOUNTS") {
            Some(list) => split_list(&list),
            None => file.accounts.unwrap_or_default(),
        };
        let accounts = parse_accounts(&accounts)?;

        let mirrors = match lookup("MIRRORS") {
            Some(list) => split_list(&list),
            None => file
                .mirrors
                .unwrap_or_else(|| DEFAULT_MIRRORS.iter().map(|m| m.to_string()).collect()),
        };
        let mirrors = normalize_mirrors(mirrors)?;

        let push = resolve_push(file.push, &lookup)?;
        let translator = resolve_translator(file.translation, &lookup)?;

        let state_file = cli
            .state_file
            .clone()
            .or_else(|| lookup("STATE_FILE").map(PathBuf::from))
            .or(file.state_file)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE));

        let poll_interval_seconds = match cli.poll_interval {
            Some(secs) => secs,
            None => parse_env(&lookup, "POLL_INTERVAL_SECONDS", "poll_interval_seconds")?
                .or(file.poll_interval_seconds)
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECONDS),
        };
        if poll_interval_seconds == 0 {
            return Err(ConfigError::invalid(
                "poll_interval_seconds",
                "must be greater than zero",
            ));
        }

        let timeout_secs = parse_env(&lookup, "HTTP_TIMEOUT_SECONDS", "http_timeout_seconds")?
            .or(file.http_timeout_seconds)
            .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECONDS);
        if timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "http_timeout_seconds",
                "must be greater than zero",
            ));
        }

        let accept_invalid_certs = match lookup("ACCEPT_INVALID_CERTS") {
            Some(raw) => parse_bool(&raw)
                .ok_or_else(|| ConfigError::invalid("accept_invalid_certs", format!("not a boolean: {raw}")))?,
            None => file.accept_invalid_certs.unwrap_or(false),
        };

        let backlog_cap = parse_env(&lookup, "BACKLOG_CAP", "backlog_cap")?
            .or(file.backlog_cap)
            .unwrap_or(DEFAULT_BACKLOG_CAP);
        if backlog_cap == 0 {
            return Err(ConfigError::invalid("backlog_cap", "must be at least 1"));
        }

        let max_concurrent_accounts =
            parse_env(&lookup, "MAX_CONCURRENT_ACCOUNTS", "max_concurrent_accounts")?
                .or(file.max_concurrent_accounts)
                .unwrap_or(1)
                .max(1);

        let metrics_textfile = lookup("METRICS_TEXTFILE")
            .map(PathBuf::from)
            .or(file.metrics_textfile);

        Ok(Self {
            accounts,
            mirrors,
            push,
            translator,
            state_file,
            poll_interval_seconds,
            http: HttpSettings {
                timeout: Duration::from_secs(timeout_secs),
                accept_invalid_certs,
            },
            backlog_cap,
            max_concurrent_accounts,
            metrics_textfile,
        })
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_accounts(raw: &[String]) -> Result<Vec<Account>, ConfigError> {
    let mut accounts: Vec<Account> = Vec::with_capacity(raw.len());
    for handle in raw {
        let account = Account::parse(handle)?;
        if !accounts.contains(&account) {
            accounts.push(account);
        }
    }

    if accounts.is_empty() {
        return Err(ConfigError::Missing { key: "accounts" });
    }
    Ok(accounts)
}

fn normalize_mirrors(raw: Vec<String>) -> Result<Vec<String>, ConfigError> {
    let mirrors: Vec<String> = raw
        .into_iter()
        .map(|m| m.trim().trim_end_matches('/').to_string())
        .filter(|m| !m.is_empty())
        .map(|m| {
            if m.contains("://") {
                m
            } else {
                format!("https://{m}")
            }
        })
        .collect();

    if mirrors.is_empty() {
        return Err(ConfigError::Missing { key: "mirrors" });
    }
    Ok(mirrors)
}

fn resolve_push<L>(file: FilePush, lookup: &L) -> Result<PushMethod, ConfigError>
where
    L: Fn(&str) -> Option<String>,
{
    let method = lookup("PUSH_METHOD")
        .or(file.method)
        .unwrap_or_else(|| "wecom".to_string());

    match method.trim().to_ascii_lowercase().as_str() {
        "wecom" => {
            let webhook = credential(file.wecom_webhook, "WECOM_WEBHOOK", "push.wecom_webhook", lookup)?
                .ok_or(ConfigError::Missing {
                    key: "push.wecom_webhook",
                })?;
            Ok(PushMethod::WeCom { webhook })
        }
        "serverchan" => {
            let sendkey = credential(
                file.serverchan_sendkey,
                "SERVERCHAN_SENDKEY",
                "push.serverchan_sendkey",
                lookup,
            )?
            .ok_or(ConfigError::Missing {
                key: "push.serverchan_sendkey",
            })?;
            Ok(PushMethod::ServerChan { sendkey })
        }
        other => Err(ConfigError::invalid(
            "push.method",
            format!("unknown push method {other:?} (expected wecom or serverchan)"),
        )),
    }
}

fn resolve_translator<L>(file: FileTranslation, lookup: &L) -> Result<TranslatorBackend, ConfigError>
where
    L: Fn(&str) -> Option<String>,
{
    let backend = lookup("TRANSLATOR")
        .or(file.backend)
        .unwrap_or_else(|| "dictionary".to_string());

    match backend.trim().to_ascii_lowercase().as_str() {
        "dictionary" => Ok(TranslatorBackend::Dictionary),
        "none" | "disabled" | "off" => Ok(TranslatorBackend::Disabled),
        "libretranslate" | "libre" => {
            let url = lookup("TRANSLATE_URL")
                .or(file.url)
                .ok_or(ConfigError::Missing {
                    key: "translation.url",
                })?;
            let target = lookup("TRANSLATE_TARGET")
                .or(file.target)
                .unwrap_or_else(|| DEFAULT_TRANSLATE_TARGET.to_string());
            let api_key = credential(file.api_key, "TRANSLATE_API_KEY", "translation.api_key", lookup)?;
            Ok(TranslatorBackend::LibreTranslate {
                url,
                target,
                api_key,
            })
        }
        other => Err(ConfigError::invalid(
            "translation.backend",
            format!("unknown translator {other:?} (expected dictionary, libretranslate or none)"),
        )),
    }
}

/// Resolve a secret: the environment wins, and a file value of
/// [`FROM_ENV`] requires the variable to be set.
fn credential<L>(
    file_value: Option<String>,
    env_key: &str,
    config_key: &'static str,
    lookup: &L,
) -> Result<Option<String>, ConfigError>
where
    L: Fn(&str) -> Option<String>,
{
    let from_env = lookup(env_key);
    let file_value = file_value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    match file_value.as_deref() {
        Some(FROM_ENV) => from_env.map(Some).ok_or_else(|| {
            ConfigError::invalid(config_key, format!("set to {FROM_ENV} but {env_key} is not set"))
        }),
        _ => Ok(from_env.or(file_value)),
    }
}

fn parse_env<L, T>(lookup: &L, env_key: &str, config_key: &'static str) -> Result<Option<T>, ConfigError>
where
    L: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(env_key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::invalid(config_key, format!("{env_key} must be a valid number"))),
        None => Ok(None),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
