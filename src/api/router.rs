use axum::{
    http::header::{HeaderValue, ACCEPT, CONTENT_TYPE, ORIGIN},
    http::{HeaderName, Method, Request, Response},
    routing::get,
    Router,
};
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    normalize_path::NormalizePath,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::Span;

use crate::api::{evaluation, feedback, handlers};
use crate::core::{config::Settings, state::AppState};

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Router of the script evaluation service.
pub(crate) fn evaluation_router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/health", get(handlers::evaluator_health))
        .merge(evaluation::router(state.settings()));

    finish(routes, state, "evaluator")
}

/// Router of the feedback chat service.
pub(crate) fn feedback_router(state: AppState) -> Router {
    let routes =
        Router::new().route("/health", get(handlers::feedback_health)).merge(feedback::router());

    finish(routes, state, "feedback-chat")
}

fn finish(routes: Router<AppState>, state: AppState, service: &'static str) -> Router {
    let cors = build_cors_layer(state.settings());

    let request_id_header = HeaderName::from_static(REQUEST_ID_HEADER);
    let request_id_header_for_span = request_id_header.clone();
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(move |request: &Request<_>| {
            let request_id = request
                .headers()
                .get(&request_id_header_for_span)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("-");
            tracing::info_span!(
                "request",
                service,
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id
            )
        })
        .on_response(
            move |response: &Response<axum::body::Body>, latency: Duration, _span: &Span| {
                let status_label = response.status().as_u16().to_string();
                metrics::counter!(
                    "http_requests_total",
                    "service" => service,
                    "status" => status_label.clone()
                )
                .increment(1);
                metrics::histogram!(
                    "http_request_duration_seconds",
                    "service" => service,
                    "status" => status_label
                )
                .record(latency.as_secs_f64());
            },
        );

    let mut router = routes;
    if state.settings().telemetry().prometheus_enabled {
        router = router.route("/metrics", get(handlers::metrics));
    }

    let router = router
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(trace_layer)
        .layer(cors)
        .with_state(state);

    // Trailing slashes must be trimmed before routing, so the whole router is
    // wrapped rather than layered.
    Router::new().fallback_service(NormalizePath::trim_trailing_slash(router))
}

fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins = settings
        .cors()
        .origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();

    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE, ORIGIN, HeaderName::from_static(REQUEST_ID_HEADER)])
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)])
        .max_age(Duration::from_secs(3600));

    if origins.is_empty() {
        base.allow_origin(Any)
    } else {
        base.allow_origin(AllowOrigin::list(origins))
    }
}
