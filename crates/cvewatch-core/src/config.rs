use std::{
    env, fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use serde::Deserialize;

use crate::{
    domain::RecipientId, errors::Error, feed::client::DEFAULT_BASE_URL, feed::FeedSettings,
    security, Result,
};

const DEFAULT_CONFIG_FILE: &str = "config.json";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    Telegram,
    Discord,
}

impl FromStr for TransportKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "telegram" => Ok(Self::Telegram),
            "discord" => Ok(Self::Discord),
            other => Err(Error::Config(format!(
                "unknown transport '{other}' (expected telegram or discord)"
            ))),
        }
    }
}

/// Typed configuration, resolved once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    // Credentials
    pub transport: TransportKind,
    pub bot_token: String,
    pub recipient_id: String,
    pub nvd_api_key: String,

    // Feed
    pub api_base_url: String,
    pub user_agent: Option<String>,
    pub results_per_page: u32,
    pub fetch_retries: u32,
    pub backoff_base: Duration,
    pub request_timeout: Duration,

    // Loop cadence
    pub check_interval: Duration,
    pub retry_interval: Duration,

    // State
    pub state_dir: PathBuf,
    pub watermark_file: PathBuf,

    // Delivery
    pub startup_greeting: bool,
    pub min_send_interval: Duration,
}

/// On-disk JSON shape. Key names follow the original `config.json`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub transport: Option<String>,
    pub bot_token: Option<String>,
    /// Accepts both `"123"` and `123`.
    pub user_id: Option<serde_json::Value>,
    pub nvd_api: Option<String>,
    pub api_base_url: Option<String>,
    pub user_agent: Option<String>,
    pub results_per_page: Option<u32>,
    pub fetch_retries: Option<u32>,
    pub backoff_base_ms: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub check_interval_secs: Option<u64>,
    pub retry_interval_secs: Option<u64>,
    pub state_dir: Option<PathBuf>,
    pub watermark_file: Option<PathBuf>,
    pub startup_greeting: Option<bool>,
    pub min_send_interval_ms: Option<u64>,
}

impl ConfigFile {
    pub fn read(path: &Path) -> Result<Option<Self>> {
        let txt = match fs::read_to_string(path) {
            Ok(txt) => txt,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::Config(format!(
                    "cannot read '{}': {e}",
                    path.display()
                )))
            }
        };
        serde_json::from_str(&txt)
            .map(Some)
            .map_err(|e| Error::Config(format!("error parsing '{}': {e}", path.display())))
    }
}

impl Config {
    /// Load `.env`, the JSON config file (`$CVEWATCH_CONFIG`, default
    /// `config.json`) and environment overrides, then validate.
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let path = env_str("CVEWATCH_CONFIG")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());
        let file = ConfigFile::read(Path::new(&path))?;

        Self::from_sources(file.unwrap_or_default(), env_str)
    }

    /// Build from an already-read file plus an environment lookup.
    /// Environment values win over file values.
    pub fn from_sources(file: ConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let lookup = |key: &str| env(key).and_then(non_empty);

        let transport = match lookup("CVEWATCH_TRANSPORT").or(file.transport) {
            Some(t) => t.parse()?,
            None => TransportKind::Telegram,
        };

        let bot_token = require(lookup("CVEWATCH_BOT_TOKEN").or(file.bot_token), "bot_token")?;
        let recipient_id = require(
            lookup("CVEWATCH_USER_ID").or(file.user_id.and_then(json_scalar)),
            "user_id",
        )?;
        let nvd_api_key = require(lookup("NVD_API_KEY").or(file.nvd_api), "nvd_api")?;
        validate_recipient(transport, &recipient_id)?;

        let api_base_url = file
            .api_base_url
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let user_agent = file.user_agent.and_then(non_empty);
        let results_per_page = file.results_per_page.unwrap_or(500).clamp(1, 2000);
        let fetch_retries = file.fetch_retries.unwrap_or(3).max(1);
        let backoff_base = Duration::from_millis(file.backoff_base_ms.unwrap_or(1000));
        let request_timeout = Duration::from_secs(file.request_timeout_secs.unwrap_or(45));

        let check_interval = Duration::from_secs(
            parse_u64(lookup("CVEWATCH_CHECK_INTERVAL_SECS"))
                .or(file.check_interval_secs)
                .unwrap_or(299),
        );
        let retry_interval = Duration::from_secs(
            parse_u64(lookup("CVEWATCH_RETRY_INTERVAL_SECS"))
                .or(file.retry_interval_secs)
                .unwrap_or(60),
        );

        let state_dir = lookup("CVEWATCH_STATE_DIR")
            .map(PathBuf::from)
            .or(file.state_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        let watermark_file = lookup("CVEWATCH_WATERMARK_FILE")
            .map(PathBuf::from)
            .or(file.watermark_file)
            .unwrap_or_else(|| PathBuf::from("last_cve_id.txt"));
        // Fail before the loop if the state path would escape its directory.
        security::resolve_within(&state_dir, &watermark_file)?;

        let startup_greeting = parse_bool(lookup("CVEWATCH_STARTUP_GREETING"))
            .or(file.startup_greeting)
            .unwrap_or(false);
        let min_send_interval = Duration::from_millis(file.min_send_interval_ms.unwrap_or(1050));

        Ok(Self {
            transport,
            bot_token,
            recipient_id,
            nvd_api_key,
            api_base_url,
            user_agent,
            results_per_page,
            fetch_retries,
            backoff_base,
            request_timeout,
            check_interval,
            retry_interval,
            state_dir,
            watermark_file,
            startup_greeting,
            min_send_interval,
        })
    }

    pub fn recipient(&self) -> RecipientId {
        RecipientId(self.recipient_id.clone())
    }

    pub fn feed_settings(&self) -> FeedSettings {
        let mut s = FeedSettings::new(self.nvd_api_key.clone());
        s.base_url = self.api_base_url.clone();
        if let Some(ua) = &self.user_agent {
            s.user_agent = ua.clone();
        }
        s.results_per_page = self.results_per_page;
        s.retries = self.fetch_retries;
        s.backoff_base = self.backoff_base;
        s.request_timeout = self.request_timeout;
        s
    }
}

/// Telegram chat ids are signed integers; Discord user ids are snowflakes.
fn validate_recipient(transport: TransportKind, id: &str) -> Result<()> {
    let ok = match transport {
        TransportKind::Telegram => id.parse::<i64>().is_ok(),
        TransportKind::Discord => id.parse::<u64>().is_ok(),
    };
    if ok {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "user_id '{id}' is not a valid {transport:?} recipient id"
        )))
    }
}

fn require(v: Option<String>, key: &str) -> Result<String> {
    v.and_then(non_empty)
        .ok_or_else(|| Error::Config(format!("missing required config value: {key}")))
}

fn json_scalar(v: serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn parse_bool(v: Option<String>) -> Option<bool> {
    v.map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn parse_u64(v: Option<String>) -> Option<u64> {
    v.and_then(|s| s.trim().parse::<u64>().ok())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.trim().to_string())
    }
}
