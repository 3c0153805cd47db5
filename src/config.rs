use std::{fmt::Display, str::FromStr, time::Duration};

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: String,
    pub database_url: String,
    pub search: SearchConfig,
    pub socket: SocketConfig,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub addresses: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Created with the default log mapping at startup when missing.
    pub index: Option<String>,
    pub timeout: Duration,
}

/// Per-connection limits for the websocket hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketConfig {
    pub send_buffer: usize,
    pub max_message_size: usize,
    pub pong_wait: Duration,
    pub ping_period: Duration,
    pub write_wait: Duration,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            send_buffer: 256,
            max_message_size: 512,
            pong_wait: Duration::from_secs(60),
            ping_period: Duration::from_secs(54),
            write_wait: Duration::from_secs(10),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            addresses: Vec::new(),
            username: None,
            password: None,
            index: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let text = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());
        let seconds = |key: &str, default: Duration| -> anyhow::Result<Duration> {
            let secs: u64 = parse_or(text(key), key, default.as_secs())?;
            if secs == 0 {
                anyhow::bail!("{key} must be at least one second");
            }
            Ok(Duration::from_secs(secs))
        };

        let defaults = SocketConfig::default();
        let socket = SocketConfig {
            send_buffer: parse_or(text("WS_SEND_BUFFER"), "WS_SEND_BUFFER", defaults.send_buffer)?,
            max_message_size: parse_or(
                text("WS_MAX_MESSAGE_SIZE"),
                "WS_MAX_MESSAGE_SIZE",
                defaults.max_message_size,
            )?,
            pong_wait: seconds("WS_PONG_WAIT", defaults.pong_wait)?,
            ping_period: seconds("WS_PING_PERIOD", defaults.ping_period)?,
            write_wait: seconds("WS_WRITE_WAIT", defaults.write_wait)?,
        };
        if socket.ping_period >= socket.pong_wait {
            anyhow::bail!("WS_PING_PERIOD must be shorter than WS_PONG_WAIT");
        }
        if socket.send_buffer == 0 {
            anyhow::bail!("WS_SEND_BUFFER must be positive");
        }
        if socket.max_message_size == 0 {
            anyhow::bail!("WS_MAX_MESSAGE_SIZE must be positive");
        }

        let search = SearchConfig {
            addresses: text("ES_ADDRESSES")
                .map(|list| {
                    list.split(',')
                        .map(str::trim)
                        .filter(|addr| !addr.is_empty())
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default(),
            username: text("ES_USERNAME"),
            password: text("ES_PASSWORD"),
            index: text("ES_INDEX"),
            timeout: seconds("ES_TIMEOUT", SearchConfig::default().timeout)?,
        };

        Ok(Self {
            listen_addr: text("LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:8888".to_owned()),
            database_url: text("DATABASE_URL").unwrap_or_else(|| "sqlite://gva.db?mode=rwc".to_owned()),
            search,
            socket,
        })
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match value {
        Some(value) => value
            .parse()
            .map_err(|err| anyhow::anyhow!("{err}"))
            .with_context(|| format!("invalid value {value:?} for {key}")),
        None => Ok(default),
    }
}
