//! Service configuration, read from the environment at startup.
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `PORT` | `8080` | HTTP listen port |
//! | `AUTH_TOKEN` | unset | bearer secret; unset = development mode |
//! | `DEFAULT_COMPANY_ID` | nil UUID | development-mode tenant |
//! | `DATABASE_URL` | unset | Postgres; unset = in-memory only |
//! | `TAX_CATALOG_PATH` | unset | YAML/JSON catalog loaded at bootstrap |
//! | `TAX_CATALOG_LENIENT` | `false` | keep catalogs with validation errors |
//! | `TAX_API_URL` | unset | external enrichment provider |
//! | `TAX_API_TOKEN` | unset | bearer token for the provider |
//! | `TAX_API_TIMEOUT_MS` | `2000` | enrichment deadline |
//! | `LOG_FORMAT` | `text` | `json` for structured output |

use std::path::PathBuf;
use std::time::Duration;

use url::Url;
use uuid::Uuid;
use vtax_catalog::LoadMode;
use vtax_core::CompanyId;

pub const DEFAULT_ENRICHMENT_TIMEOUT_MS: u64 = 2000;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// External enrichment provider.
#[derive(Clone)]
pub struct EnrichmentConfig {
    pub base_url: Url,
    pub api_token: Option<String>,
    pub timeout: Duration,
}

impl std::fmt::Debug for EnrichmentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrichmentConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone)]
pub struct AppConfig {
    pub port: u16,
    /// If `None`, authentication is disabled.
    pub auth_token: Option<String>,
    pub default_company: CompanyId,
    pub database_url: Option<String>,
    pub catalog_path: Option<PathBuf>,
    pub catalog_mode: LoadMode,
    pub enrichment: Option<EnrichmentConfig>,
    pub log_format: LogFormat,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("default_company", &self.default_company)
            .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
            .field("catalog_path", &self.catalog_path)
            .field("catalog_mode", &self.catalog_mode)
            .field("enrichment", &self.enrichment)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            default_company: CompanyId::from_uuid(Uuid::nil()),
            database_url: None,
            catalog_path: None,
            catalog_mode: LoadMode::Strict,
            enrichment: None,
            log_format: LogFormat::Text,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let port = match get("PORT") {
            Some(raw) => raw.trim().parse().map_err(|e| ConfigError::Invalid {
                var: "PORT",
                reason: format!("{e}"),
            })?,
            None => 8080,
        };

        let default_company = match get("DEFAULT_COMPANY_ID") {
            Some(raw) => raw
                .trim()
                .parse::<Uuid>()
                .map(CompanyId::from_uuid)
                .map_err(|e| ConfigError::Invalid {
                    var: "DEFAULT_COMPANY_ID",
                    reason: e.to_string(),
                })?,
            None => CompanyId::from_uuid(Uuid::nil()),
        };

        let catalog_mode = match get("TAX_CATALOG_LENIENT").as_deref().map(str::trim) {
            Some("1") | Some("true") => LoadMode::Lenient,
            _ => LoadMode::Strict,
        };

        let enrichment = match get("TAX_API_URL") {
            Some(raw) => {
                let base_url = Url::parse(raw.trim()).map_err(|e| ConfigError::Invalid {
                    var: "TAX_API_URL",
                    reason: e.to_string(),
                })?;
                let timeout_ms = match get("TAX_API_TIMEOUT_MS") {
                    Some(ms) => ms.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
                        var: "TAX_API_TIMEOUT_MS",
                        reason: e.to_string(),
                    })?,
                    None => DEFAULT_ENRICHMENT_TIMEOUT_MS,
                };
                Some(EnrichmentConfig {
                    base_url,
                    api_token: get("TAX_API_TOKEN"),
                    timeout: Duration::from_millis(timeout_ms),
                })
            }
            None => None,
        };

        let log_format = match get("LOG_FORMAT").as_deref().map(str::trim) {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            port,
            auth_token: get("AUTH_TOKEN"),
            default_company,
            database_url: get("DATABASE_URL"),
            catalog_path: get("TAX_CATALOG_PATH").map(PathBuf::from),
            catalog_mode,
            enrichment,
            log_format,
        })
    }
}
