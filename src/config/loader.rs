use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use regex::Regex;
use tracing::{debug, info};

use crate::config::prefixes::EnvPrefixes;
use crate::config::settings::{ConfigFormat, MainConfig};
use crate::config::validator;
use crate::error::{Result, RevosError};

type Override = Arc<dyn Fn(&mut MainConfig) + Send + Sync>;

/// Builds a [`MainConfig`] from layered sources.
///
/// Precedence, lowest first: defaults, config file, `.env` file, process
/// environment, programmatic overrides.
#[derive(Clone, Default)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env_file: Option<PathBuf>,
    prefixes: EnvPrefixes,
    skip_process_env: bool,
    overrides: Vec<Override>,
}

impl fmt::Debug for ConfigLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigLoader")
            .field("file", &self.file)
            .field("env_file", &self.env_file)
            .field("prefixes", &self.prefixes)
            .field("skip_process_env", &self.skip_process_env)
            .field("overrides", &self.overrides.len())
            .finish()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// YAML or JSON config file, picked by extension.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// `KEY=VALUE` file layered under the process environment.
    pub fn env_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.env_file = Some(path.into());
        self
    }

    pub fn prefixes(mut self, prefixes: EnvPrefixes) -> Self {
        self.prefixes = prefixes;
        self
    }

    /// Ignore the process environment; `.env` files still apply.
    pub fn without_process_env(mut self) -> Self {
        self.skip_process_env = true;
        self
    }

    /// Programmatic override applied after every other layer, in call order.
    pub fn with_override<F>(mut self, apply: F) -> Self
    where
        F: Fn(&mut MainConfig) + Send + Sync + 'static,
    {
        self.overrides.push(Arc::new(apply));
        self
    }

    /// Load and validate.
    pub fn load(&self) -> Result<MainConfig> {
        let config = self.load_unvalidated()?;
        validator::validate_config(&config).map_err(|errors| {
            RevosError::config(format!(
                "config is not valid, total errors: {}\n{}",
                errors.len(),
                errors.join("\n")
            ))
        })?;
        Ok(config)
    }

    /// Load every layer without running validation.
    pub fn load_unvalidated(&self) -> Result<MainConfig> {
        self.layer()
            .map_err(|e| RevosError::config(format!("Invalid config format: {e:#}")))
    }

    fn layer(&self) -> anyhow::Result<MainConfig> {
        let dotenv = match &self.env_file {
            Some(path) => read_env_file(path)?,
            None => HashMap::new(),
        };
        let skip_process_env = self.skip_process_env;
        let lookup = move |name: &str| {
            let from_process = if skip_process_env {
                None
            } else {
                std::env::var(name).ok()
            };
            from_process.or_else(|| dotenv.get(name).cloned())
        };

        let mut config = match &self.file {
            Some(path) => file_to_config(path, &lookup)?,
            None => MainConfig::default(),
        };

        self.prefixes.apply(&mut config, &lookup)?;

        for apply in &self.overrides {
            apply(&mut config);
        }
        debug!(overrides = self.overrides.len(), "configuration layers applied");
        Ok(config)
    }
}

/// Read a config file, expanding `${VAR}` / `${VAR:default}` first.
fn file_to_config<F>(path: &Path, lookup: &F) -> anyhow::Result<MainConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let expanded = expand_env_vars(&content, lookup)?;
    let config = MainConfig::from_str_with_format(&expanded, ConfigFormat::from_path(path))?;
    info!("configuration loaded from {}", path.display());
    Ok(config)
}

pub(crate) fn expand_env_vars<F>(input: &str, lookup: &F) -> anyhow::Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let re = Regex::new(r"\$\{(\w+)(?::([^\}]*))?\}")?;
    Ok(re
        .replace_all(input, |caps: &regex::Captures| {
            let var = &caps[1];
            let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            lookup(var).unwrap_or_else(|| default.to_string())
        })
        .to_string())
}

/// Parse a `.env` file: `KEY=VALUE` lines, `#` comments, optional `export`
/// and surrounding quotes.
pub fn read_env_file(path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let mut vars = HashMap::new();
    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| anyhow!("{}:{}: expected KEY=VALUE", path.display(), number + 1))?;
        vars.insert(key.trim().to_owned(), unquote(value.trim()).to_owned());
    }
    debug!("{} variables read from {}", vars.len(), path.display());
    Ok(vars)
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Defaults overlaid with the process environment under the default prefixes.
pub fn get_settings() -> Result<MainConfig> {
    ConfigLoader::new().load()
}

/// Defaults, then `path`, validated. The process environment is not consulted
/// beyond `${VAR}` expansion inside the file.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> Result<MainConfig> {
    let lookup = |name: &str| std::env::var(name).ok();
    let config = file_to_config(path.as_ref(), &lookup)
        .map_err(|e| RevosError::config(format!("Invalid config format: {e:#}")))?;
    validator::validate_config(&config)
        .map_err(|errors| RevosError::config(errors.join("\n")))?;
    Ok(config)
}

/// Defaults overlaid with the process environment under custom prefixes.
pub fn create_config_with_prefixes(prefixes: EnvPrefixes) -> Result<MainConfig> {
    ConfigLoader::new().prefixes(prefixes).load()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn expands_with_defaults() {
        let vars: HashMap<&str, &str> = HashMap::from([("TOKEN_HOST", "auth.local")]);
        let lookup = |name: &str| vars.get(name).map(|v| v.to_string());
        let out = expand_env_vars(
            "url: https://${TOKEN_HOST}/token\nid: ${MISSING:fallback}\nempty: '${NOPE}'",
            &lookup,
        )
        .unwrap();
        assert_eq!(
            out,
            "url: https://auth.local/token\nid: fallback\nempty: ''"
        );
    }

    #[test]
    fn env_file_parsing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let content = concat!(
            "# Auth\n",
            "REVOS_CLIENT_ID=env_file_client_id\n",
            "export REVOS_CLIENT_SECRET=\"quoted secret\"\n",
            "\n",
            "LOG_LEVEL='warn'"
        );
        writeln!(file, "{content}").unwrap();
        let vars = read_env_file(file.path()).unwrap();
        assert_eq!(vars["REVOS_CLIENT_ID"], "env_file_client_id");
        assert_eq!(vars["REVOS_CLIENT_SECRET"], "quoted secret");
        assert_eq!(vars["LOG_LEVEL"], "warn");
    }

    #[test]
    fn env_file_rejects_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "NOT A PAIR").unwrap();
        assert!(read_env_file(file.path()).is_err());
    }
}
