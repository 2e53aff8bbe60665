use std::any::Any;

use axum::Router;
use axum::http::{HeaderName, HeaderValue, Method};
use axum::response::Response;
use axum::routing::{get, post};
use regdesk_security::api_key::API_KEY_HEADER;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any as AnyOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::api;
use crate::error::internal_error_response;
use crate::state::SharedState;

pub fn build_router(state: SharedState) -> Router {
    let cors = cors_layer(&state.config.gateway.cors_allow_origins);

    Router::new()
        .route("/health", get(api::health))
        .route("/submit", post(api::submit))
        .route("/registrations", get(api::list_registrations))
        .layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::custom(panic_response))
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            HeaderName::from_static(API_KEY_HEADER),
        ]);

    if origins.iter().any(|o| o == "*") {
        return base.allow_origin(AnyOrigin);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("ignoring invalid cors origin: {o}");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(allowed))
}

fn panic_response(_: Box<dyn Any + Send + 'static>) -> Response {
    error!("request handler panicked");
    internal_error_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn exploding() -> &'static str {
        panic!("secret cause in handler")
    }

    #[tokio::test]
    async fn handler_panic_becomes_generic_500() {
        let app = Router::new()
            .route("/boom", get(exploding))
            .layer(CatchPanicLayer::custom(panic_response));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let resp = reqwest::get(format!("http://{addr}/boom")).await.unwrap();
        assert_eq!(resp.status(), 500);
        let body = resp.text().await.unwrap();
        assert_eq!(body, r#"{"detail":"Internal Server Error"}"#);
        assert!(!body.contains("secret cause"));
    }

    #[test]
    fn cors_wildcard_and_invalid_origins_build() {
        let _ = cors_layer(&["*".to_string()]);
        let _ = cors_layer(&["https://forms.example".to_string(), "bad\norigin".to_string()]);
    }
}
