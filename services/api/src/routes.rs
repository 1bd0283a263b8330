use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use electees::electees::{electee_router, ElecteePortal, ElecteeRepository};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_electee_routes<R>(portal: Arc<ElecteePortal<R>>) -> axum::Router
where
    R: ElecteeRepository + 'static,
{
    electee_router(portal)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{build_portal, SAMPLE_MANAGERS};
    use axum::body::Body;
    use axum::http::Request;
    use electees::config::PortalConfig;
    use electees::electees::USER_HEADER;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::collections::BTreeSet;
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt;

    fn app(ready: bool) -> axum::Router {
        let config = PortalConfig {
            current_term_id: 12,
            current_term_label: "Winter 2027".to_string(),
            roster_csv: None,
            managers: BTreeSet::new(),
        };
        let (portal, _storage) = build_portal(&config).expect("portal builds");
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        with_electee_routes(portal).layer(Extension(state))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn healthcheck_reports_ok() {
        let Json(body) = healthcheck().await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn readiness_tracks_the_startup_flag() {
        let response = app(false)
            .oneshot(Request::get("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("ready route");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = app(true)
            .oneshot(Request::get("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("ready route");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ready");
    }

    #[tokio::test]
    async fn electee_overview_is_mounted_alongside_probes() {
        let response = app(true)
            .oneshot(
                Request::get("/electees/")
                    .header(USER_HEADER, SAMPLE_MANAGERS[0])
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("overview route");
        assert_eq!(response.status(), StatusCode::OK);

        let page = body_json(response).await;
        assert_eq!(page["context"]["term"]["label"], "Winter 2027");
        assert_eq!(page["context"]["permissions"]["can_create_groups"], true);
    }
}
