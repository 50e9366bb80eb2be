use std::collections::HashMap;

use tracing::{debug, info};

use crate::config::settings::LlmConfig;
use crate::error::Result;
use crate::llm::client::{ChatClient, ChatMessage};
use crate::llm::schema::{format_instructions, parse_output, ExtractionTarget};
use crate::llm::template::PromptTemplate;

const SYSTEM_PROMPT: &str =
    "You are a precise information extraction assistant. Answer only with the requested JSON.";

/// Template variable filled with [`format_instructions`] when the caller
/// leaves it out.
pub const FORMAT_INSTRUCTIONS_VAR: &str = "format_instructions";

/// Structured-data extraction against one configured model.
#[derive(Debug, Clone)]
pub struct Extractor {
    name: String,
    config: LlmConfig,
    client: ChatClient,
}

impl Extractor {
    pub fn new(name: impl Into<String>, config: LlmConfig, client: ChatClient) -> Self {
        Self {
            name: name.into(),
            config,
            client,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_current_model(&self) -> &str {
        &self.config.model
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Ask the model to describe `prompt` as a `T`.
    pub async fn extract_structured_data<T: ExtractionTarget>(&self, prompt: &str) -> Result<T> {
        let system = format!("{SYSTEM_PROMPT}\n\n{}", format_instructions::<T>());
        self.run(system, prompt.to_owned()).await
    }

    /// Render `template` with `vars` and parse the answer into `T`.
    ///
    /// `{format_instructions}` is supplied automatically; when the template
    /// does not use it the instructions go into the system message instead.
    pub async fn extract<T: ExtractionTarget>(
        &self,
        template: &PromptTemplate,
        vars: &HashMap<String, String>,
    ) -> Result<T> {
        let instructions = format_instructions::<T>();
        let system = if template.uses(FORMAT_INSTRUCTIONS_VAR) {
            SYSTEM_PROMPT.to_owned()
        } else {
            format!("{SYSTEM_PROMPT}\n\n{instructions}")
        };

        let mut vars = vars.clone();
        vars.entry(FORMAT_INSTRUCTIONS_VAR.to_owned())
            .or_insert(instructions);
        let prompt = template.render(&vars)?;
        self.run(system, prompt).await
    }

    async fn run<T: ExtractionTarget>(&self, system: String, prompt: String) -> Result<T> {
        let messages = [ChatMessage::system(system), ChatMessage::user(prompt)];
        debug!(
            extractor = %self.name,
            model = %self.config.model,
            target = T::name(),
            "extracting"
        );
        let content = self.client.complete(&self.config, &messages).await?;
        let parsed = parse_output::<T>(&content)?;
        info!(extractor = %self.name, target = T::name(), "extraction succeeded");
        Ok(parsed)
    }
}
