// tests/common/mod.rs
pub use serde_json::json;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use httpmock::Method::POST;
use httpmock::{Mock, MockServer};

use crate::config::settings::MainConfig;
use crate::error::{Result, RevosError};
use crate::resilience::retry::RetrySettings;
use crate::tokens::{IssuedToken, TokenManager, TokenSettings, TokenSource};

pub const TOKEN_PATH: &str = "/oauth/token";

/// Config pointing at `server`, without retries or periodic refresh.
pub fn config_for(server: &MockServer) -> MainConfig {
    let mut config = MainConfig::default();
    config.auth.client_id = "test-client-id".into();
    config.auth.client_secret = "test-client-secret".into();
    config.auth.token_url = server.url(TOKEN_PATH);
    config.auth.base_url = server.url("/v1");
    config.auth.max_retries = 0;
    config.auth.request_timeout = 5;
    config.token_manager.enable_periodic_refresh = false;
    config
}

pub fn manager_for(config: &MainConfig) -> TokenManager {
    TokenManager::new(config).expect("token manager")
}

pub async fn mock_token<'a>(server: &'a MockServer, token: &str, expires_in: u64) -> Mock<'a> {
    let body = json!({
        "access_token": token,
        "expires_in": expires_in,
        "token_type": "Bearer"
    });
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path(TOKEN_PATH)
                .form_urlencoded_tuple("grant_type", "client_credentials");
            then.status(200).json_body(body);
        })
        .await
}

pub async fn mock_token_status(server: &MockServer, status: u16) -> Mock<'_> {
    server
        .mock_async(|when, then| {
            when.method(POST).path(TOKEN_PATH);
            then.status(status).body("token endpoint unavailable");
        })
        .await
}

/// Settings for a manager driven by a [`ScriptedSource`].
pub fn fast_settings() -> TokenSettings {
    TokenSettings {
        buffer: Duration::from_secs(300),
        refresh_interval: Duration::from_millis(50),
        max_failures_before_fallback: 3,
        enable_periodic_refresh: true,
        enable_fallback: true,
        retry: RetrySettings {
            attempts: 1,
            base_delay_ms: 1,
            max_delay_ms: 1,
        },
    }
}

/// Token source replaying queued results, then a steady token.
#[derive(Default)]
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<IssuedToken>>>,
    always_fail: bool,
    delay: Duration,
    started: AtomicUsize,
    finished: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    pub fn failing(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            always_fail: true,
            ..Self::default()
        })
    }

    pub fn push_token(&self, token: &str, expires_in: u64) {
        self.script.lock().unwrap().push_back(Ok(IssuedToken {
            access_token: token.to_owned(),
            expires_in,
            token_type: "Bearer".to_owned(),
        }));
    }

    pub fn push_error(&self, error: RevosError) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenSource for ScriptedSource {
    async fn fetch_token(&self) -> Result<IssuedToken> {
        self.started.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        self.finished.fetch_add(1, Ordering::SeqCst);
        match next {
            Some(result) => result,
            None if self.always_fail => Err(RevosError::api(Some(503), "unavailable")),
            None => Ok(IssuedToken {
                access_token: "steady-token".to_owned(),
                expires_in: 3600,
                token_type: "Bearer".to_owned(),
            }),
        }
    }
}
