//! # Gateway Configuration
//!
//! One TOML file, read once at startup. A missing file is created with
//! every default filled in; missing keys take their defaults. A few
//! settings can be overridden from the environment (`GW_SECURE_PORT`,
//! `GW_UPSTREAM_BASE_URL`, `GW_LOG_LEVEL`) or the command line.

use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use gw_01_secure_session::{CipherSuite, EngineConfig, PskCipherSuites, PskEntry};
use gw_02_message_exchange::{ExchangeConfig, MAX_ACK_TIMEOUT, MAX_RETRANSMIT_LIMIT};
use gw_03_access_control::MalformedPayloadPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const FILE_HEADER: &str = "\
# Access gateway configuration.
# Created with default values; edit and restart the gateway to apply.
# RUST_LOG overrides logging.level when set.

";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration file: {0}")]
    Parse(String),

    #[error("cannot serialize configuration: {0}")]
    Serialize(String),

    #[error("environment variable {var} has invalid value {value:?}")]
    Env { var: &'static str, value: String },

    #[error("secure port must not be 0")]
    InvalidPort,

    #[error("at least one PSK identity must be configured")]
    NoPskIdentities,

    #[error("invalid PSK identity {identity:?}: {reason}")]
    InvalidPsk { identity: String, reason: String },

    #[error("no PSK cipher suite left after filtering the preselected suites")]
    NoPskCipherSuites,

    #[error("ack_random_factor must be a finite number of at least 1.0, got {0}")]
    InvalidAckRandomFactor(f64),

    #[error("max_retransmit must be at most {}, got {0}", MAX_RETRANSMIT_LIMIT)]
    InvalidMaxRetransmit(u32),

    #[error("ack_timeout_ms must be between 1 and {}, got {0}", MAX_ACK_TIMEOUT.as_millis())]
    InvalidAckTimeout(u64),

    #[error("upstream base URL {0:?} is not an http(s) URL")]
    InvalidUpstreamUrl(String),
}

/// Complete gateway configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub network: NetworkConfig,
    pub dtls: DtlsConfig,
    pub psk: PskConfig,
    pub coap: CoapConfig,
    pub upstream: UpstreamConfig,
    pub access_control: AccessControlConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub bind_address: IpAddr,
    pub secure_port: u16,
    /// Receive buffer size; longer datagrams are truncated and dropped.
    pub max_datagram_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            secure_port: 5684,
            max_datagram_size: 1500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DtlsConfig {
    /// Preference list; only the PSK suites in it are ever negotiated.
    pub preselected_cipher_suites: Vec<CipherSuite>,
    pub handshake_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_decrypt_failures: u32,
    pub max_sessions: usize,
    pub hello_verify_request: bool,
}

impl Default for DtlsConfig {
    fn default() -> Self {
        Self {
            preselected_cipher_suites: CipherSuite::STRONG_ENCRYPTION_PREFERENCE.to_vec(),
            handshake_timeout_secs: 30,
            idle_timeout_secs: 1800,
            max_decrypt_failures: 16,
            max_sessions: 10_000,
            hello_verify_request: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PskIdentityConfig {
    pub identity: String,
    pub secret: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PskConfig {
    pub identities: Vec<PskIdentityConfig>,
}

impl Default for PskConfig {
    fn default() -> Self {
        Self {
            identities: vec![PskIdentityConfig {
                identity: "Client_identity".into(),
                secret: "secretPSK".into(),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoapConfig {
    pub ack_timeout_ms: u64,
    pub ack_random_factor: f64,
    pub max_retransmit: u32,
    pub exchange_lifetime_secs: u64,
    pub piggyback_timeout_ms: u64,
}

impl Default for CoapConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 2000,
            ack_random_factor: 1.5,
            max_retransmit: 4,
            exchange_lifetime_secs: 247,
            piggyback_timeout_ms: 1500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8086/access-control".into(),
            timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessControlConfig {
    pub malformed_payload: MalformedPayloadPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `gw_02_message_exchange=debug,info`.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

impl GatewayConfig {
    /// Create a config suitable for testing (loopback, ephemeral port,
    /// short timers)
    pub fn for_testing() -> Self {
        let mut config = Self::default();
        config.network.bind_address = IpAddr::V4(Ipv4Addr::LOCALHOST);
        config.network.secure_port = 0;
        config.coap.ack_timeout_ms = 100;
        config.coap.max_retransmit = 2;
        config.coap.exchange_lifetime_secs = 5;
        config.coap.piggyback_timeout_ms = 500;
        config.upstream.timeout_ms = 1000;
        config
    }

    /// Load `path`, or write the defaults there if it does not exist.
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Self::default();
            let text = format!("{FILE_HEADER}{}", config.to_toml_string()?);
            fs::write(path, text).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
            return Ok(config);
        }
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Apply `GW_*` overrides; `lookup` is normally `std::env::var(..).ok()`.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup("GW_SECURE_PORT") {
            self.network.secure_port = value.trim().parse().map_err(|_| ConfigError::Env {
                var: "GW_SECURE_PORT",
                value,
            })?;
        }
        if let Some(value) = lookup("GW_UPSTREAM_BASE_URL") {
            self.upstream.base_url = value;
        }
        if let Some(value) = lookup("GW_LOG_LEVEL") {
            self.logging.level = value;
        }
        Ok(())
    }

    /// Reject configurations the gateway cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.secure_port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        self.validate_components()
    }

    /// Everything in [`validate`](Self::validate) except the port, which
    /// may be 0 (ephemeral) when binding in tests.
    pub fn validate_components(&self) -> Result<(), ConfigError> {
        if self.psk.identities.is_empty() {
            return Err(ConfigError::NoPskIdentities);
        }
        self.psk_entries()?;
        if self.cipher_suites().is_empty() {
            return Err(ConfigError::NoPskCipherSuites);
        }
        let factor = self.coap.ack_random_factor;
        if !factor.is_finite() || factor < 1.0 {
            return Err(ConfigError::InvalidAckRandomFactor(factor));
        }
        if self.coap.max_retransmit > MAX_RETRANSMIT_LIMIT {
            return Err(ConfigError::InvalidMaxRetransmit(self.coap.max_retransmit));
        }
        let ack_timeout = self.coap.ack_timeout_ms;
        if ack_timeout == 0 || u128::from(ack_timeout) > MAX_ACK_TIMEOUT.as_millis() {
            return Err(ConfigError::InvalidAckTimeout(ack_timeout));
        }
        match reqwest::Url::parse(&self.upstream.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
            _ => Err(ConfigError::InvalidUpstreamUrl(self.upstream.base_url.clone())),
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.network.bind_address, self.network.secure_port)
    }

    pub fn cipher_suites(&self) -> PskCipherSuites {
        PskCipherSuites::filter(&self.dtls.preselected_cipher_suites)
    }

    pub fn psk_entries(&self) -> Result<Vec<PskEntry>, ConfigError> {
        self.psk
            .identities
            .iter()
            .map(|p| {
                PskEntry::new(p.identity.as_bytes(), p.secret.as_bytes()).map_err(|e| {
                    ConfigError::InvalidPsk {
                        identity: p.identity.clone(),
                        reason: e.to_string(),
                    }
                })
            })
            .collect()
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            cipher_suites: self.cipher_suites(),
            handshake_timeout: Duration::from_secs(self.dtls.handshake_timeout_secs),
            idle_timeout: Duration::from_secs(self.dtls.idle_timeout_secs),
            max_decrypt_failures: self.dtls.max_decrypt_failures,
            max_sessions: self.dtls.max_sessions,
            hello_verify_request: self.dtls.hello_verify_request,
        }
    }

    pub fn exchange_config(&self) -> ExchangeConfig {
        ExchangeConfig {
            ack_timeout: Duration::from_millis(self.coap.ack_timeout_ms),
            ack_random_factor: self.coap.ack_random_factor,
            max_retransmit: self.coap.max_retransmit,
            exchange_lifetime: Duration::from_secs(self.coap.exchange_lifetime_secs),
            piggyback_timeout: Duration::from_millis(self.coap.piggyback_timeout_ms),
        }
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream.timeout_ms)
    }
}
