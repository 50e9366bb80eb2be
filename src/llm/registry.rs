use std::collections::BTreeMap;

use crate::config::settings::{LlmConfig, MainConfig};
use crate::error::{Result, RevosError};
use crate::llm::client::ChatClient;
use crate::llm::extractor::Extractor;
use crate::tokens::TokenManager;

/// Every configured model, sharing one chat client and token manager.
#[derive(Debug, Clone)]
pub struct ExtractorRegistry {
    models: BTreeMap<String, LlmConfig>,
    client: ChatClient,
}

impl ExtractorRegistry {
    pub fn new(config: &MainConfig, tokens: TokenManager) -> Result<Self> {
        let client = ChatClient::new(&config.auth, tokens)?;
        Ok(Self::with_client(config.models(), client))
    }

    pub fn with_client(models: BTreeMap<String, LlmConfig>, client: ChatClient) -> Self {
        Self { models, client }
    }

    /// Extractor for the model configured under `name`.
    pub fn get(&self, name: &str) -> Result<Extractor> {
        let config = self.models.get(name).ok_or_else(|| {
            RevosError::config(format!(
                "unknown model '{name}', available: {}",
                self.list_available().join(", ")
            ))
        })?;
        Ok(Extractor::new(name, config.clone(), self.client.clone()))
    }

    /// Model names, sorted.
    pub fn list_available(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    pub fn create_all(&self) -> BTreeMap<String, Extractor> {
        self.models
            .iter()
            .map(|(name, config)| {
                (
                    name.clone(),
                    Extractor::new(name.as_str(), config.clone(), self.client.clone()),
                )
            })
            .collect()
    }
}
