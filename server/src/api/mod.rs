use axum::{
    extract::{DefaultBodyLimit, Request},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::Server;

mod http;
mod ws;

const REQUEST_ID: &str = "x-request-id";

pub struct Api {
    server: Arc<Server>,
}

#[derive(Clone)]
struct OriginConfig {
    allowed_origins: Arc<HashSet<String>>,
    allow_any_origin: bool,
    allow_no_origin: bool,
}

impl OriginConfig {
    fn new(allowed: &[String], require_origin: bool) -> Self {
        let allowed_origins: HashSet<String> = allowed
            .iter()
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();
        Self {
            allow_any_origin: allowed_origins.contains("*"),
            allowed_origins: Arc::new(allowed_origins),
            allow_no_origin: !require_origin,
        }
    }

    /// `None` when the request carries no usable origin header.
    fn permits(&self, origin: Option<&str>) -> bool {
        match origin {
            Some(origin) => self.allow_any_origin || self.allowed_origins.contains(origin),
            None => self.allow_no_origin,
        }
    }
}

impl Api {
    pub fn new(server: Arc<Server>) -> Self {
        Self { server }
    }

    pub fn router(&self) -> Router {
        let config = self.server.config();
        let origin_config = OriginConfig::new(&config.allowed_origins, config.require_origin);
        if origin_config.allowed_origins.is_empty() {
            tracing::warn!("allowed_origins is empty; all browser origins will be rejected");
        }
        let cors_origins = origin_config
            .allowed_origins
            .iter()
            .filter(|origin| *origin != "*")
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(%origin, "invalid origin in allowed_origins");
                    None
                }
            })
            .collect::<Vec<_>>();

        let cors = if origin_config.allow_any_origin {
            CorsLayer::new().allow_origin(AllowOrigin::any())
        } else {
            CorsLayer::new().allow_origin(AllowOrigin::list(cors_origins))
        }
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::HeaderName::from_static(REQUEST_ID)])
        .expose_headers([header::HeaderName::from_static(REQUEST_ID)]);

        let router = Router::new()
            .route("/healthz", get(http::healthz))
            .route("/metrics", get(http::metrics))
            .route("/matches", post(http::create_match).get(http::list_matches))
            .route("/matches/:id", get(http::get_match))
            .route("/matches/:id/join", post(http::join_match))
            .route("/matches/:id/leave", post(http::leave_match))
            .route("/matches/:id/actions", post(http::submit_action))
            .route("/matches/:id/result", get(http::get_result))
            .route("/matches/:id/updates", get(ws::updates_ws))
            .route("/ledger/:user", get(http::get_ledger))
            .route("/ledger/:user/withdrawals", post(http::withdraw));

        let router = router.layer(cors);
        let router = router.layer(middleware::from_fn(move |req, next| {
            let origin_config = origin_config.clone();
            async move { enforce_origin(origin_config, req, next).await }
        }));
        let router = router.layer(DefaultBodyLimit::max(config.http_body_limit_bytes));
        let router = router.layer(middleware::from_fn(request_id_middleware));
        let router = router.layer(TraceLayer::new_for_http());

        router.with_state(Arc::clone(&self.server))
    }
}

async fn enforce_origin(config: OriginConfig, req: Request, next: Next) -> Response {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok());
    if !config.permits(origin) {
        let message = if origin.is_some() {
            "Origin not allowed"
        } else {
            "Origin required"
        };
        return (StatusCode::FORBIDDEN, message).into_response();
    }
    next.run(req).await
}

async fn request_id_middleware(req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(header::HeaderName::from_static(REQUEST_ID))
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();
    let mut response = next.run(req).await;
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(header::HeaderName::from_static(REQUEST_ID), header_value);
    }
    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "http.request"
    );
    response
}
