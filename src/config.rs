//! Environment-driven application configuration.
//!
//! Everything comes from `RAILGUARD_*` variables (a `.env` file is loaded by
//! the binary before this runs). Agency keys can also be mounted as a JSON
//! file mapping agency ids to keys, for deployments that ship secrets on
//! disk; an environment variable always wins over the file.

use crate::agencies::Agency;
use crate::fetch::RequestPolicy;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::time::Duration;

/// Per-agency API keys. Agencies without an entry still serve requests for
/// keyless upstreams and answer missing-credential errors otherwise.
#[derive(Debug, Default, Clone)]
pub struct AgencyKeys {
    entries: HashMap<&'static str, String>,
}

impl AgencyKeys {
    pub fn get(&self, agency: Agency) -> Option<&str> {
        self.entries.get(agency.id()).map(String::as_str)
    }

    pub fn set(&mut self, agency: Agency, key: String) {
        self.entries.insert(agency.id(), key);
    }

    fn env_var(agency: Agency) -> String {
        format!("RAILGUARD_{}_KEY", agency.id().to_ascii_uppercase())
    }

    /// Loads keys from the optional JSON key file, then lets env vars
    /// override per agency.
    pub fn from_env() -> Result<Self> {
        let mut keys = AgencyKeys::default();

        if let Ok(path) = std::env::var("RAILGUARD_KEY_FILE") {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("reading key file '{path}'"))?;
            let entries: HashMap<String, String> = serde_json::from_str(&content)
                .with_context(|| format!("parsing key file '{path}'"))?;
            for (id, key) in entries {
                if let Some(agency) = Agency::from_id(&id) {
                    keys.set(agency, key);
                }
            }
        }

        for agency in Agency::ALL {
            if let Ok(key) = std::env::var(Self::env_var(agency)) {
                if !key.is_empty() {
                    keys.set(agency, key);
                }
            }
        }

        Ok(keys)
    }
}

/// Connection details for the managed Postgres backend's REST surface.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub service_key: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: String,
    pub policy: RequestPolicy,
    pub keys: AgencyKeys,
    pub backend: Option<BackendConfig>,
    /// Secondary logging endpoint for the emergency failsafe.
    pub backup_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let bind =
            std::env::var("RAILGUARD_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());

        let mut policy = RequestPolicy::default();
        if let Ok(secs) = std::env::var("RAILGUARD_HTTP_TIMEOUT_SECS") {
            policy.timeout = Duration::from_secs(
                secs.parse()
                    .context("RAILGUARD_HTTP_TIMEOUT_SECS must be an integer")?,
            );
        }
        if let Ok(retries) = std::env::var("RAILGUARD_HTTP_RETRIES") {
            policy.retries = retries
                .parse()
                .context("RAILGUARD_HTTP_RETRIES must be an integer")?;
        }

        let backend = match (
            std::env::var("RAILGUARD_BACKEND_URL"),
            std::env::var("RAILGUARD_BACKEND_KEY"),
        ) {
            (Ok(base_url), Ok(service_key)) => Some(BackendConfig {
                base_url: base_url.trim_end_matches('/').to_string(),
                service_key,
            }),
            (Ok(_), Err(_)) => {
                anyhow::bail!("RAILGUARD_BACKEND_URL is set but RAILGUARD_BACKEND_KEY is not")
            }
            _ => None,
        };

        Ok(Self {
            bind,
            policy,
            keys: AgencyKeys::from_env()?,
            backend,
            backup_url: std::env::var("RAILGUARD_BACKUP_URL").ok(),
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            policy: RequestPolicy::default(),
            keys: AgencyKeys::default(),
            backend: None,
            backup_url: None,
        }
    }
}
