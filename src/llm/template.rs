use std::collections::HashMap;

use regex::{Captures, Regex};

use crate::error::{Result, RevosError};

const PLACEHOLDER: &str = r"\{\{|\}\}|\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}";

/// Prompt text with `{name}` placeholders.
/// `{{` and `}}` render as literal braces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Placeholder names in order of first appearance.
    pub fn input_variables(&self) -> Result<Vec<String>> {
        let re = placeholder_regex()?;
        let mut names: Vec<String> = Vec::new();
        for caps in re.captures_iter(&self.text) {
            if let Some(name) = caps.get(1) {
                if !names.iter().any(|n| n == name.as_str()) {
                    names.push(name.as_str().to_owned());
                }
            }
        }
        Ok(names)
    }

    pub fn uses(&self, name: &str) -> bool {
        self.input_variables()
            .map(|vars| vars.iter().any(|v| v == name))
            .unwrap_or(false)
    }

    /// Substitute every placeholder; any placeholder without a value fails.
    pub fn render(&self, vars: &HashMap<String, String>) -> Result<String> {
        let re = placeholder_regex()?;
        let mut missing: Vec<String> = Vec::new();

        let rendered = re.replace_all(&self.text, |caps: &Captures| match caps.get(1) {
            Some(name) => match vars.get(name.as_str()) {
                Some(value) => value.clone(),
                None => {
                    missing.push(name.as_str().to_owned());
                    String::new()
                }
            },
            None => caps[0][..1].to_owned(),
        });

        if !missing.is_empty() {
            missing.dedup();
            return Err(RevosError::extraction(format!(
                "prompt template is missing values for: {}",
                missing.join(", ")
            )));
        }
        Ok(rendered.into_owned())
    }
}

fn placeholder_regex() -> Result<Regex> {
    Regex::new(PLACEHOLDER)
        .map_err(|e| RevosError::extraction(format!("invalid placeholder pattern: {e}")))
}
