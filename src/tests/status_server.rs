#[cfg(test)]
mod test {
    use axum::body::{to_bytes, Body};
    use axum::Router;
    use http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::config::settings::MainConfig;
    use crate::observability::metrics::Metrics;
    use crate::server::AppState;
    use crate::tests::common::*;
    use crate::tokens::{TokenManager, TokenSettings};

    fn app_with(tokens: TokenManager, config: MainConfig) -> (Router, Metrics) {
        let metrics = Metrics::new().unwrap();
        tokio::spawn(metrics.clone().observe(tokens.subscribe()));
        let state = AppState::new(tokens, config, metrics.clone());
        (state.router(), metrics)
    }

    async fn call(app: &Router, method: &str, uri: &str) -> (StatusCode, String) {
        let response = app
            .clone()
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    async fn call_json(app: &Router, method: &str, uri: &str) -> Value {
        let (status, body) = call(app, method, uri).await;
        assert_eq!(status, StatusCode::OK, "{uri}: {body}");
        serde_json::from_str(&body).unwrap()
    }

    #[tokio::test]
    async fn health_reports_healthy_with_a_token() {
        let tokens = TokenManager::with_source(fast_settings(), ScriptedSource::new());
        tokens.get_token().await.unwrap();
        let (app, _) = app_with(tokens, MainConfig::default());

        let health = call_json(&app, "GET", "/health").await;
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["token_available"], true);
        assert_eq!(health["background_service_running"], false);
    }

    #[tokio::test]
    async fn health_reports_degraded_in_fallback() {
        let settings = TokenSettings {
            max_failures_before_fallback: 1,
            ..fast_settings()
        };
        let tokens =
            TokenManager::with_source(settings, ScriptedSource::failing(std::time::Duration::ZERO));
        let (app, _) = app_with(tokens.clone(), MainConfig::default());

        assert_eq!(tokens.refresh_token().await, Ok(false));
        let health = call_json(&app, "GET", "/health").await;
        assert_eq!(health["status"], "degraded");
        assert_eq!(health["token_available"], false);

        let status = call_json(&app, "GET", "/token-status").await;
        assert_eq!(status["consecutive_failures"], 1);
        assert_eq!(status["fallback_active"], true);
        assert_eq!(status["health"], "degraded");
    }

    #[tokio::test]
    async fn force_refresh_endpoint_reports_outcome() {
        let source = ScriptedSource::new();
        let tokens = TokenManager::with_source(fast_settings(), source.clone());
        let (app, _) = app_with(tokens, MainConfig::default());

        let refreshed = call_json(&app, "POST", "/force-refresh").await;
        assert_eq!(refreshed["refresh_successful"], true);
        assert_eq!(source.started(), 1);

        let (status, _) = call(&app, "GET", "/force-refresh").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn config_endpoint_hides_the_secret() {
        let mut config = MainConfig::default();
        config.auth.client_id = "visible-id".into();
        config.auth.client_secret = "hidden-secret".into();
        let tokens = TokenManager::with_source(fast_settings(), ScriptedSource::new());
        let (app, _) = app_with(tokens, config);

        let (status, body) = call(&app, "GET", "/config").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("visible-id"));
        assert!(!body.contains("hidden-secret"));
    }

    #[tokio::test]
    async fn metrics_follow_token_events() {
        let tokens = TokenManager::with_source(fast_settings(), ScriptedSource::new());
        let (app, metrics) = app_with(tokens.clone(), MainConfig::default());

        tokens.refresh_token().await.unwrap();
        // let the observer task drain the event
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(metrics.consecutive_failures.get(), 0);
        assert!(metrics.token_expiry_unix.get() > 0);

        let (status, body) = call(&app, "GET", "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("revos_token_refreshes_total{outcome=\"success\"} 1"));
    }

    #[tokio::test]
    async fn metrics_route_can_be_disabled() {
        let mut config = MainConfig::default();
        config.server.metrics.is_enabled = false;
        let tokens = TokenManager::with_source(fast_settings(), ScriptedSource::new());
        let (app, _) = app_with(tokens, config);

        let (status, _) = call(&app, "GET", "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
