//! Environment variable layering.
//!
//! Every config section reads its variables under its own prefix, so several
//! deployments can share one environment (`MY_API_CLIENT_ID`, `AI_MODEL`, ...).
//! An empty prefix reads the bare key.

use std::str::FromStr;

use crate::config::settings::MainConfig;
use crate::error::{Result, RevosError};

pub const DEFAULT_AUTH_PREFIX: &str = "REVOS_";
pub const DEFAULT_LLM_PREFIX: &str = "LLM_";
pub const DEFAULT_LOGGING_PREFIX: &str = "LOG_";
pub const DEFAULT_TOKEN_PREFIX: &str = "TOKEN_";
pub const DEFAULT_SERVER_PREFIX: &str = "SERVER_";

/// Prefixes per config section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvPrefixes {
    pub auth: String,
    pub llm: String,
    pub logging: String,
    pub token: String,
    pub server: String,
}

impl Default for EnvPrefixes {
    fn default() -> Self {
        Self {
            auth: DEFAULT_AUTH_PREFIX.to_owned(),
            llm: DEFAULT_LLM_PREFIX.to_owned(),
            logging: DEFAULT_LOGGING_PREFIX.to_owned(),
            token: DEFAULT_TOKEN_PREFIX.to_owned(),
            server: DEFAULT_SERVER_PREFIX.to_owned(),
        }
    }
}

impl EnvPrefixes {
    pub fn with_auth(mut self, prefix: impl Into<String>) -> Self {
        self.auth = prefix.into();
        self
    }

    pub fn with_llm(mut self, prefix: impl Into<String>) -> Self {
        self.llm = prefix.into();
        self
    }

    pub fn with_logging(mut self, prefix: impl Into<String>) -> Self {
        self.logging = prefix.into();
        self
    }

    pub fn with_token(mut self, prefix: impl Into<String>) -> Self {
        self.token = prefix.into();
        self
    }

    pub fn with_server(mut self, prefix: impl Into<String>) -> Self {
        self.server = prefix.into();
        self
    }

    /// Overlay every variable found through `lookup` onto `config`.
    ///
    /// `lookup` receives full variable names. Values that fail to parse are
    /// reported with the variable name.
    pub fn apply<F>(&self, config: &mut MainConfig, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = PrefixedEnv { lookup: &lookup };

        let auth = &mut config.auth;
        env.string(&self.auth, "CLIENT_ID", &mut auth.client_id);
        env.string(&self.auth, "CLIENT_SECRET", &mut auth.client_secret);
        env.string(&self.auth, "TOKEN_URL", &mut auth.token_url);
        env.string(&self.auth, "BASE_URL", &mut auth.base_url);
        env.parsed(&self.auth, "TOKEN_BUFFER_MINUTES", &mut auth.token_buffer_minutes)?;
        env.parsed(&self.auth, "MAX_RETRIES", &mut auth.max_retries)?;
        env.parsed(&self.auth, "REQUEST_TIMEOUT", &mut auth.request_timeout)?;
        env.optional(&self.auth, "SCOPE", &mut auth.scope)?;
        env.parsed(&self.auth, "AUTH_METHOD", &mut auth.auth_method)?;

        let llm = &mut config.llm;
        env.string(&self.llm, "MODEL", &mut llm.model);
        env.parsed(&self.llm, "TEMPERATURE", &mut llm.temperature)?;
        env.optional(&self.llm, "MAX_TOKENS", &mut llm.max_tokens)?;
        env.parsed(&self.llm, "TOP_P", &mut llm.top_p)?;
        env.parsed(&self.llm, "FREQUENCY_PENALTY", &mut llm.frequency_penalty)?;
        env.parsed(&self.llm, "PRESENCE_PENALTY", &mut llm.presence_penalty)?;

        let logging = &mut config.logging;
        env.string(&self.logging, "LEVEL", &mut logging.level);
        env.parsed(&self.logging, "FORMAT", &mut logging.format)?;
        env.optional(&self.logging, "FILE", &mut logging.file)?;

        let token = &mut config.token_manager;
        env.parsed(
            &self.token,
            "REFRESH_INTERVAL_MINUTES",
            &mut token.refresh_interval_minutes,
        )?;
        env.parsed(
            &self.token,
            "MAX_FAILURES_BEFORE_FALLBACK",
            &mut token.max_failures_before_fallback,
        )?;
        env.flag(&self.token, "ENABLE_PERIODIC_REFRESH", &mut token.enable_periodic_refresh)?;
        env.flag(&self.token, "ENABLE_FALLBACK", &mut token.enable_fallback)?;

        let server = &mut config.server;
        env.string(&self.server, "HOST", &mut server.host);
        env.parsed(&self.server, "PORT", &mut server.port)?;
        env.string(&self.server, "METRICS_PATH", &mut server.metrics.path);
        env.flag(&self.server, "METRICS_ENABLED", &mut server.metrics.is_enabled)?;

        env.flag("", "DEBUG", &mut config.debug)?;

        Ok(())
    }
}

struct PrefixedEnv<'a, F> {
    lookup: &'a F,
}

impl<F> PrefixedEnv<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, prefix: &str, key: &str) -> Option<(String, String)> {
        let name = format!("{prefix}{key}");
        (self.lookup)(&name).map(|value| (name, value))
    }

    fn string(&self, prefix: &str, key: &str, target: &mut String) {
        if let Some((_, value)) = self.get(prefix, key) {
            *target = value;
        }
    }

    fn parsed<T>(&self, prefix: &str, key: &str, target: &mut T) -> Result<()>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        if let Some((name, value)) = self.get(prefix, key) {
            *target = parse_value(&name, &value)?;
        }
        Ok(())
    }

    fn optional<T>(&self, prefix: &str, key: &str, target: &mut Option<T>) -> Result<()>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        if let Some((name, value)) = self.get(prefix, key) {
            *target = match value.trim() {
                "" => None,
                value => Some(parse_value(&name, value)?),
            };
        }
        Ok(())
    }

    fn flag(&self, prefix: &str, key: &str, target: &mut bool) -> Result<()> {
        if let Some((name, value)) = self.get(prefix, key) {
            *target = parse_bool(&name, &value)?;
        }
        Ok(())
    }
}

fn parse_value<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| RevosError::config(format!("{name}='{value}' is invalid: {e}")))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(RevosError::config(format!(
            "{name}='{value}' is invalid: expected a boolean"
        ))),
    }
}
