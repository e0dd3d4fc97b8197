use std::time::Duration;

use axum::body::Body;
use axum::http::header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, Request, Response};
use axum::routing::get;
use axum::Router;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::normalize_path::NormalizePathLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultOnRequest, MakeSpan, OnResponse, TraceLayer};
use tracing::Span;

use crate::api::{ai_contexts, handlers, reviews, submissions};
use crate::core::{config::Settings, state::AppState};

const REQUEST_ID: &str = "x-request-id";

fn request_id_header() -> HeaderName {
    HeaderName::from_static(REQUEST_ID)
}

pub(crate) fn router(state: AppState) -> Router {
    let settings = state.settings();
    let api_v1 = Router::new()
        .nest("/submissions", submissions::router())
        .nest("/reviews", reviews::router())
        .nest("/ai-contexts", ai_contexts::router());

    let mut router: Router<AppState> = Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz).head(handlers::healthz))
        .nest(&settings.api().api_v1_str, api_v1);

    if settings.telemetry().prometheus_enabled {
        router = router.route("/metrics", get(handlers::metrics));
    }

    router
        .layer(NormalizePathLayer::trim_trailing_slash())
        .layer(PropagateRequestIdLayer::new(request_id_header()))
        .layer(SetRequestIdLayer::new(request_id_header(), MakeRequestUuid))
        .layer(trace_layer())
        .layer(cors_layer(settings))
        .with_state(state)
}

#[derive(Clone, Copy)]
struct RequestSpan;

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let request_id =
            request.headers().get(REQUEST_ID).and_then(|v| v.to_str().ok()).unwrap_or("-");
        tracing::info_span!(
            "request",
            method = %request.method(),
            path = %request.uri().path(),
            request_id = %request_id,
        )
    }
}

#[derive(Clone, Copy)]
struct RecordMetrics;

impl OnResponse<Body> for RecordMetrics {
    fn on_response(self, response: &Response<Body>, latency: Duration, _span: &Span) {
        let status = response.status().as_u16().to_string();
        metrics::counter!("http_requests_total", "status" => status.clone()).increment(1);
        metrics::histogram!("http_request_duration_seconds", "status" => status)
            .record(latency.as_secs_f64());
        if response.status().is_server_error() {
            tracing::warn!(status = response.status().as_u16(), "Request failed");
        }
    }
}

type HttpTrace = TraceLayer<
    SharedClassifier<ServerErrorsAsFailures>,
    RequestSpan,
    DefaultOnRequest,
    RecordMetrics,
>;

fn trace_layer() -> HttpTrace {
    TraceLayer::new_for_http().make_span_with(RequestSpan).on_response(RecordMetrics)
}

/// Learners post answers from the quiz front-end; reviewers read and decide.
/// Nothing here updates or deletes through CORS.
fn cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors()
        .origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT, request_id_header()])
        .expose_headers([request_id_header()])
        .max_age(Duration::from_secs(3600));

    if origins.is_empty() {
        // Credentials cannot be combined with a wildcard origin.
        layer.allow_origin(Any)
    } else {
        layer.allow_credentials(true).allow_origin(AllowOrigin::list(origins))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::router;
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    use crate::core::redis::RedisHandle;
    use crate::core::state::{AppState, Stores};
    use crate::core::{config::Settings, metrics};
    use crate::repositories::memory::MemoryStore;
    use crate::test_support::{self, FakeAiService, RecordingNotifier};

    fn build_state(settings: Settings) -> AppState {
        let db =
            sqlx::PgPool::connect_lazy(&settings.database().database_url()).expect("lazy pool");
        let redis = RedisHandle::new(settings.redis().redis_url());
        let store = Arc::new(MemoryStore::default());
        let stores = Stores {
            catalog: store.clone(),
            answers: store.clone(),
            contexts: store.clone(),
            retry_queue: store,
        };
        AppState::new(
            settings,
            db,
            redis,
            None,
            stores,
            Arc::new(FakeAiService::default()),
            Arc::new(RecordingNotifier::default()),
        )
    }

    #[tokio::test]
    async fn root_returns_message() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();

        let settings = Settings::load().expect("settings");
        let app = router(build_state(settings));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = test_support::read_json(response).await;
        assert_eq!(json["message"], "Quiz grader API");
        assert_eq!(json["api_prefix"], "/api/v1");
    }

    #[tokio::test]
    async fn metrics_disabled_returns_404() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();

        let settings = Settings::load().expect("settings");
        let app = router(build_state(settings));

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_enabled_returns_200() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("PROMETHEUS_ENABLED", "1");

        let settings = Settings::load().expect("settings");
        metrics::init(&settings).expect("metrics init");
        let app = router(build_state(settings));

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        std::env::set_var("PROMETHEUS_ENABLED", "0");
    }

    #[tokio::test]
    async fn unknown_token_is_unauthorized() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();

        let settings = Settings::load().expect("settings");
        let app = router(build_state(settings));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/submissions/pending-count")
                    .header("authorization", "Bearer not-a-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()["www-authenticate"], "Bearer");
    }
}
