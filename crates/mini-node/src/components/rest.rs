//! REST component: legacy `POST /query/<method>` and Prometheus `/metrics`.
//!
//! Last in the chain. A failure to start it is fatal to the node like any
//! other component.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tracing::warn;

use super::grpc::{parse_body, query_response};
use super::listener::HttpListener;
use super::{ComponentContext, ComponentError, ServiceComponent};
use crate::runtime::app::QueryFn;

pub const NAME: &str = "rest";

pub struct RestComponent {
    listener: HttpListener,
    app_query: QueryFn,
}

impl RestComponent {
    pub fn new(address: impl Into<String>, app_query: QueryFn) -> Self {
        Self {
            listener: HttpListener::new(NAME, address),
            app_query,
        }
    }

    pub fn listener(&self) -> &HttpListener {
        &self.listener
    }

    fn http_router(&self) -> Router {
        Router::new()
            .route("/query/*method", post(query))
            .route("/metrics", get(metrics))
            .with_state(self.app_query.clone())
    }
}

async fn query(State(app_query): State<QueryFn>, Path(method): Path<String>, body: Bytes) -> Response {
    let method = format!("/{}", method.trim_start_matches('/'));
    let result = parse_body(&body).and_then(|request| app_query(&method, &request));
    query_response(NAME, result)
}

async fn metrics() -> Response {
    match mini_telemetry::encode_metrics() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[async_trait::async_trait]
impl ServiceComponent for RestComponent {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn init(&self, _ctx: &ComponentContext) -> Result<(), ComponentError> {
        self.listener.validate_address()
    }

    async fn start(&self, _ctx: &ComponentContext) -> Result<(), ComponentError> {
        self.listener.serve(self.http_router()).await.map(|_| ())
    }

    async fn stop(&self, ctx: &ComponentContext) -> Result<(), ComponentError> {
        self.listener.shutdown(ctx.stop_timeout).await
    }
}
