//! Configuration validation with aggregated errors.
//! - Aggregates all issues into Vec<String>
//! - Credentials and endpoints must be usable
//! - Token manager timing invariants (buffer vs refresh interval)
//! - Logging / server / model parameter ranges

use reqwest::Url;
use tracing::{error, info, warn};

use crate::config::settings::{
    AuthConfig, LlmConfig, LoggingConfig, MainConfig, ServerConfig, TokenManagerConfig,
};

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Paths served by the status router; the metrics route must not shadow them.
const STATUS_PATHS: [&str; 4] = ["/health", "/token-status", "/force-refresh", "/config"];

/// Public entrypoint: returns Ok(()) or Err(Vec<String>) containing all issues.
pub fn validate_config(cfg: &MainConfig) -> Result<(), Vec<String>> {
    let mut errors: Vec<String> = Vec::new();

    validate_auth(&cfg.auth, &mut errors);
    validate_token_manager(&cfg.token_manager, &cfg.auth, &mut errors);
    validate_llm("llm", &cfg.llm, &mut errors);
    for (name, model) in &cfg.llm_models {
        validate_llm(&format!("llm_models.{name}"), model, &mut errors);
    }
    validate_logging(&cfg.logging, &mut errors);
    validate_server(&cfg.server, &mut errors);

    if errors.is_empty() {
        info!("config valid");
        Ok(())
    } else {
        error!("configuration validation errors ({}):", errors.len());
        for e in &errors {
            error!(" - {}", e);
        }
        Err(errors)
    }
}

fn validate_auth(auth: &AuthConfig, errors: &mut Vec<String>) {
    if auth.client_id.trim().is_empty() {
        errors.push("auth.client_id cannot be empty".to_string());
    }
    if auth.client_secret.trim().is_empty() {
        errors.push("auth.client_secret cannot be empty".to_string());
    }
    validate_url("auth.token_url", &auth.token_url, errors);
    validate_url("auth.base_url", &auth.base_url, errors);

    if auth.request_timeout == 0 {
        errors.push("auth.request_timeout must be > 0".to_string());
    }
    if auth.max_retries > 10 {
        errors.push(format!(
            "auth.max_retries ({}) is unreasonably large",
            auth.max_retries
        ));
    }
}

fn validate_url(path: &str, value: &str, errors: &mut Vec<String>) {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(format!(
            "{path} '{value}' must use http or https, got '{}'",
            url.scheme()
        )),
        Err(e) => errors.push(format!("{path} '{value}' is not a valid URL: {e}")),
    }
}

fn validate_token_manager(tm: &TokenManagerConfig, auth: &AuthConfig, errors: &mut Vec<String>) {
    if tm.max_failures_before_fallback == 0 {
        errors.push("token_manager.max_failures_before_fallback must be > 0".to_string());
    }
    if tm.enable_periodic_refresh && tm.refresh_interval_minutes == 0 {
        errors.push(
            "token_manager.refresh_interval_minutes must be > 0 when periodic refresh is enabled"
                .to_string(),
        );
    }
    // not fatal: the on-demand path still refreshes inside the buffer window
    if tm.enable_periodic_refresh && tm.refresh_interval_minutes > 24 * 60 {
        warn!(
            "token_manager.refresh_interval_minutes ({}) is longer than a day",
            tm.refresh_interval_minutes
        );
    }
    if auth.token_buffer_minutes > 24 * 60 {
        errors.push(format!(
            "auth.token_buffer_minutes ({}) is unreasonably large",
            auth.token_buffer_minutes
        ));
    }
}

fn validate_llm(path: &str, llm: &LlmConfig, errors: &mut Vec<String>) {
    if llm.model.trim().is_empty() {
        errors.push(format!("{path}.model cannot be empty"));
    }
    if !(0.0..=2.0).contains(&llm.temperature) {
        errors.push(format!(
            "{path}.temperature ({}) must be within 0.0..=2.0",
            llm.temperature
        ));
    }
    if !(0.0..=1.0).contains(&llm.top_p) {
        errors.push(format!("{path}.top_p ({}) must be within 0.0..=1.0", llm.top_p));
    }
    for (name, value) in [
        ("frequency_penalty", llm.frequency_penalty),
        ("presence_penalty", llm.presence_penalty),
    ] {
        if !(-2.0..=2.0).contains(&value) {
            errors.push(format!("{path}.{name} ({value}) must be within -2.0..=2.0"));
        }
    }
    if llm.max_tokens == Some(0) {
        errors.push(format!("{path}.max_tokens must be > 0"));
    }
}

fn validate_logging(logging: &LoggingConfig, errors: &mut Vec<String>) {
    if !VALID_LOG_LEVELS.contains(&logging.level.to_lowercase().as_str()) {
        errors.push(format!(
            "logging.level '{}' invalid; allowed: {:?}",
            logging.level, VALID_LOG_LEVELS
        ));
    }
}

fn validate_server(server: &ServerConfig, errors: &mut Vec<String>) {
    if server.host.trim().is_empty() {
        errors.push("server.host cannot be empty".to_string());
    }
    if !server.metrics.path.starts_with('/') {
        errors.push(format!(
            "server.metrics.path '{}' must start with '/'",
            server.metrics.path
        ));
    }
    if server.metrics.is_enabled && STATUS_PATHS.contains(&server.metrics.path.as_str()) {
        errors.push(format!(
            "server.metrics.path '{}' collides with a status route",
            server.metrics.path
        ));
    }
}
