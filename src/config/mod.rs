pub mod loader;
pub mod prefixes;
pub mod settings;
pub mod validator;

pub use loader::{create_config_with_prefixes, get_settings, load_config_from_file, ConfigLoader};
pub use prefixes::EnvPrefixes;
pub use settings::{
    AuthConfig, ClientAuthMethod, ConfigFormat, LlmConfig, LogFormat, LoggingConfig, MainConfig,
    MetricsConfig, ServerConfig, TokenManagerConfig,
};
