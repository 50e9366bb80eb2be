pub mod client;
pub mod extractor;
pub mod registry;
pub mod schema;
pub mod template;

pub use client::{ChatClient, ChatMessage};
pub use extractor::Extractor;
pub use registry::ExtractorRegistry;
pub use schema::{format_instructions, parse_output, ExtractionTarget};
pub use template::PromptTemplate;
