#[cfg(test)]
mod test {
    use std::io::Write;

    use serial_test::serial;
    use tempfile::{Builder, NamedTempFile};

    use crate::config::{
        create_config_with_prefixes, load_config_from_file, ConfigLoader, EnvPrefixes, LogFormat,
    };
    use crate::error::RevosError;

    const YAML: &str = r#"
auth:
  client_id: file_client_id
  client_secret: file_client_secret
  token_url: "${LAYER_TOKEN_URL:https://auth.example.com/oauth/token}"
  base_url: https://api.example.com/v1
  token_buffer_minutes: 10
llm:
  model: gpt-4
  temperature: 0.3
logging:
  level: debug
  format: json
token_manager:
  max_failures_before_fallback: 5
"#;

    fn yaml_file(content: &str) -> NamedTempFile {
        let mut file = Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn env_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn layer_prefixes() -> EnvPrefixes {
        EnvPrefixes::default()
            .with_auth("LAYER_")
            .with_llm("LAYER_LLM_")
            .with_logging("LAYER_LOG_")
            .with_token("LAYER_TOKEN_")
            .with_server("LAYER_SERVER_")
    }

    fn clear(vars: &[&str]) {
        for var in vars {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn layers_apply_in_precedence_order() {
        let file = yaml_file(YAML);
        let dotenv = env_file(concat!(
            "LAYER_CLIENT_ID=dotenv_client_id\n",
            "LAYER_CLIENT_SECRET=dotenv_secret\n",
            "LAYER_LLM_MODEL=gpt-4o\n"
        ));
        std::env::set_var("LAYER_CLIENT_ID", "process_client_id");

        let config = ConfigLoader::new()
            .file(file.path())
            .env_file(dotenv.path())
            .prefixes(layer_prefixes())
            .with_override(|c| c.auth.max_retries = 7)
            .load();
        clear(&["LAYER_CLIENT_ID"]);
        let config = config.unwrap();

        // process env beats .env
        assert_eq!(config.auth.client_id, "process_client_id");
        // .env beats the file
        assert_eq!(config.auth.client_secret, "dotenv_secret");
        assert_eq!(config.llm.model, "gpt-4o");
        // file beats defaults
        assert_eq!(config.auth.token_buffer_minutes, 10);
        assert_eq!(config.token_manager.max_failures_before_fallback, 5);
        assert_eq!(config.logging.format, LogFormat::Json);
        // untouched keys keep their defaults
        assert_eq!(config.token_manager.refresh_interval_minutes, 45);
        // overrides beat everything
        assert_eq!(config.auth.max_retries, 7);
    }

    #[test]
    #[serial]
    fn file_placeholders_expand_from_environment() {
        let file = yaml_file(YAML);

        let defaulted = ConfigLoader::new()
            .file(file.path())
            .prefixes(layer_prefixes())
            .load()
            .unwrap();
        assert_eq!(defaulted.auth.token_url, "https://auth.example.com/oauth/token");

        std::env::set_var("LAYER_TOKEN_URL", "https://sso.internal/token");
        let expanded = ConfigLoader::new()
            .file(file.path())
            .prefixes(layer_prefixes())
            .load();
        clear(&["LAYER_TOKEN_URL"]);
        assert_eq!(expanded.unwrap().auth.token_url, "https://sso.internal/token");
    }

    #[test]
    #[serial]
    fn invalid_numbers_name_the_variable() {
        let file = yaml_file(YAML);
        std::env::set_var("LAYER_MAX_RETRIES", "three");
        let result = ConfigLoader::new()
            .file(file.path())
            .prefixes(layer_prefixes())
            .load();
        clear(&["LAYER_MAX_RETRIES"]);

        let err = result.unwrap_err();
        assert!(
            matches!(err, RevosError::Config(ref m) if m.contains("LAYER_MAX_RETRIES")),
            "{err}"
        );
    }

    #[test]
    #[serial]
    fn validation_reports_every_problem() {
        let err = ConfigLoader::new()
            .prefixes(layer_prefixes())
            .with_override(|c| c.llm.temperature = 5.0)
            .load()
            .unwrap_err();
        let RevosError::Config(message) = err else {
            panic!("expected a config error, got {err:?}");
        };
        assert!(message.contains("client_id"));
        assert!(message.contains("client_secret"));
        assert!(message.contains("token_url"));
        assert!(message.contains("temperature"));
    }

    #[test]
    #[serial]
    fn skipping_process_env_keeps_env_file() {
        let file = yaml_file(YAML);
        let dotenv = env_file("LAYER_CLIENT_ID=dotenv_client_id\n");
        std::env::set_var("LAYER_CLIENT_ID", "process_client_id");

        let config = ConfigLoader::new()
            .file(file.path())
            .env_file(dotenv.path())
            .prefixes(layer_prefixes())
            .without_process_env()
            .load();
        clear(&["LAYER_CLIENT_ID"]);
        assert_eq!(config.unwrap().auth.client_id, "dotenv_client_id");
    }

    #[test]
    #[serial]
    fn json_files_are_loaded_by_extension() {
        let mut file = Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"auth": {{"client_id": "json_id", "client_secret": "json_secret",
                "token_url": "https://auth.example.com/token",
                "base_url": "https://api.example.com/v1"}},
               "llm_models": {{"fast": {{"model": "gpt-4o-mini"}}}}}}"#
        )
        .unwrap();

        let config = load_config_from_file(file.path()).unwrap();
        assert_eq!(config.auth.client_id, "json_id");
        assert_eq!(config.models().keys().collect::<Vec<_>>(), vec!["fast"]);
    }

    #[test]
    #[serial]
    fn empty_prefix_reads_bare_names() {
        std::env::set_var("CLIENT_ID", "bare_id");
        std::env::set_var("CLIENT_SECRET", "bare_secret");
        std::env::set_var("TOKEN_URL", "https://auth.example.com/token");
        std::env::set_var("BASE_URL", "https://api.example.com/v1");
        let config = create_config_with_prefixes(layer_prefixes().with_auth(""));
        clear(&["CLIENT_ID", "CLIENT_SECRET", "TOKEN_URL", "BASE_URL"]);

        let config = config.unwrap();
        assert_eq!(config.auth.client_id, "bare_id");
        assert_eq!(config.auth.base_url, "https://api.example.com/v1");
    }

    #[test]
    #[serial]
    fn legacy_section_name_is_accepted() {
        let file = yaml_file(concat!(
            "revos:\n",
            "  client_id: legacy\n",
            "  client_secret: s\n",
            "  token_url: https://a.example/t\n",
            "  base_url: https://b.example\n"
        ));
        let config = load_config_from_file(file.path()).unwrap();
        assert_eq!(config.auth.client_id, "legacy");
    }
}
