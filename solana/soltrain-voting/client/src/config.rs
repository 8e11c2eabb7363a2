use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;

use crate::retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
use crate::rpc::SendOptions;
use crate::scanner::DEFAULT_PER_PAGE;

fn default_commitment() -> String {
    "confirmed".to_string()
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY.as_millis() as u64
}

fn default_page_size() -> u32 {
    DEFAULT_PER_PAGE
}

/// Read-back budget for transaction events.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EventRetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl Default for EventRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

/// Client configuration, usually read from a TOML file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    /// JSON-RPC endpoint of the cluster.
    pub rpc_url: String,
    /// Websocket endpoint. Derived from `rpc_url` when absent.
    #[serde(default)]
    pub ws_url: Option<String>,
    /// One of `processed`, `confirmed` or `finalized`.
    #[serde(default = "default_commitment")]
    pub commitment: String,
    #[serde(default)]
    pub skip_preflight: bool,
    /// Address of the voting program, the crate's declared id when absent.
    #[serde(default)]
    pub program_id: Option<String>,
    #[serde(default)]
    pub event_retry: EventRetryConfig,
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
}

impl ClientConfig {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            ws_url: None,
            commitment: default_commitment(),
            skip_preflight: false,
            program_id: None,
            event_retry: EventRetryConfig::default(),
            default_page_size: default_page_size(),
        }
    }

    pub fn commitment(&self) -> anyhow::Result<CommitmentConfig> {
        CommitmentConfig::from_str(&self.commitment)
            .map_err(|_| anyhow::anyhow!("unknown commitment level `{}`", self.commitment))
    }

    pub fn program_id(&self) -> anyhow::Result<Pubkey> {
        match &self.program_id {
            Some(id) => {
                Pubkey::from_str(id).with_context(|| format!("invalid program id `{id}`"))
            }
            None => Ok(crate::ID),
        }
    }

    /// The configured websocket endpoint, or the RPC endpoint with its scheme switched
    /// to `ws`/`wss` and its port, if any, incremented.
    pub fn websocket_url(&self) -> anyhow::Result<String> {
        if let Some(ws_url) = &self.ws_url {
            return Ok(ws_url.clone());
        }
        let (scheme, rest) = self
            .rpc_url
            .split_once("://")
            .with_context(|| format!("rpc url `{}` has no scheme", self.rpc_url))?;
        let ws_scheme = match scheme {
            "http" => "ws",
            "https" => "wss",
            other => anyhow::bail!("cannot derive a websocket url from `{other}` scheme"),
        };
        let (authority, path) = match rest.find('/') {
            Some(index) => rest.split_at(index),
            None => (rest, ""),
        };
        let authority = match authority
            .rsplit_once(':')
            .and_then(|(host, port)| Some((host, port.parse::<u16>().ok()?)))
        {
            Some((host, port)) => {
                let port = port
                    .checked_add(1)
                    .context("rpc port has no successor for the websocket port")?;
                format!("{host}:{port}")
            }
            None => authority.to_string(),
        };
        Ok(format!("{ws_scheme}://{authority}{path}"))
    }

    pub fn send_options(&self) -> anyhow::Result<SendOptions> {
        Ok(SendOptions {
            skip_preflight: self.skip_preflight,
            commitment: self.commitment()?,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.event_retry.max_attempts,
            Duration::from_millis(self.event_retry.delay_ms),
        )
    }
}

pub fn from_toml_path<P: AsRef<Path>, R: DeserializeOwned>(path: P) -> anyhow::Result<R> {
    let mut contents = String::new();
    {
        let mut file = File::open(path)?;
        file.read_to_string(&mut contents)?;
    }

    let result: R = toml::from_str(&contents)?;

    Ok(result)
}
