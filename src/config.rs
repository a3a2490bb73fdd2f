//! Runtime configuration.
//!
//! Read from `SIWX_*` environment variables with defaults, or from JSON.

use crate::error::AuthError;
use crate::principal::Principal;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_AUTHORITY_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CERTIFICATE_MAX_AGE_SECS: u64 = 300;
const DEFAULT_STORAGE_PREFIX: &str = "siwx:";
const DEFAULT_OISY_LOGIN_METHOD: &str = "siwx_login";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SiwxConfig {
    pub authority_timeout_secs: u64,
    pub certificate_max_age_secs: u64,
    pub storage_prefix: String,
    /// Reject certificates that carry no `time` leaf.
    pub require_certificate_time: bool,
    /// Hex DER of the trusted root key.
    pub root_key: Option<String>,
    /// Principal text of the canister the IC-signer login is relayed to.
    pub oisy_login_canister: Option<String>,
    pub oisy_login_method: String,
    pub redis_url: Option<String>,
}

impl Default for SiwxConfig {
    fn default() -> Self {
        Self {
            authority_timeout_secs: DEFAULT_AUTHORITY_TIMEOUT_SECS,
            certificate_max_age_secs: DEFAULT_CERTIFICATE_MAX_AGE_SECS,
            storage_prefix: DEFAULT_STORAGE_PREFIX.to_string(),
            require_certificate_time: true,
            root_key: None,
            oisy_login_canister: None,
            oisy_login_method: DEFAULT_OISY_LOGIN_METHOD.to_string(),
            redis_url: None,
        }
    }
}

impl SiwxConfig {
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_json(json: &str) -> Result<Self, AuthError> {
        serde_json::from_str(json).map_err(|e| AuthError::Configuration(e.to_string()))
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, AuthError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let number = |name: &str, default: u64| -> Result<u64, AuthError> {
            match lookup(name) {
                Some(value) => value
                    .parse()
                    .map_err(|e| AuthError::Configuration(format!("{}: {}", name, e))),
                None => Ok(default),
            }
        };

        Ok(Self {
            authority_timeout_secs: number(
                "SIWX_AUTHORITY_TIMEOUT_SECS",
                defaults.authority_timeout_secs,
            )?,
            certificate_max_age_secs: number(
                "SIWX_CERTIFICATE_MAX_AGE_SECS",
                defaults.certificate_max_age_secs,
            )?,
            storage_prefix: lookup("SIWX_STORAGE_PREFIX").unwrap_or(defaults.storage_prefix),
            require_certificate_time: lookup("SIWX_REQUIRE_CERTIFICATE_TIME")
                .map(|v| v.parse().unwrap_or(true))
                .unwrap_or(defaults.require_certificate_time),
            root_key: lookup("SIWX_ROOT_KEY"),
            oisy_login_canister: lookup("SIWX_OISY_LOGIN_CANISTER"),
            oisy_login_method: lookup("SIWX_OISY_LOGIN_METHOD").unwrap_or(defaults.oisy_login_method),
            redis_url: lookup("SIWX_REDIS_URL"),
        })
    }

    pub fn authority_timeout(&self) -> Duration {
        Duration::from_secs(self.authority_timeout_secs)
    }

    pub fn certificate_max_age(&self) -> Duration {
        Duration::from_secs(self.certificate_max_age_secs)
    }

    pub fn root_key_der(&self) -> Result<Option<Vec<u8>>, AuthError> {
        self.root_key
            .as_deref()
            .map(|key| {
                hex::decode(key.trim())
                    .map_err(|e| AuthError::Configuration(format!("SIWX_ROOT_KEY: {}", e)))
            })
            .transpose()
    }

    pub fn oisy_canister(&self) -> Result<Option<Principal>, AuthError> {
        self.oisy_login_canister
            .as_deref()
            .map(|text| {
                Principal::from_text(text)
                    .map_err(|e| AuthError::Configuration(format!("SIWX_OISY_LOGIN_CANISTER: {}", e)))
            })
            .transpose()
    }
}
