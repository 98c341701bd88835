//! Query gRPC component.
//!
//! Serves the query router as `POST /<package.Service>/<Method>` with a JSON
//! request body. The router answers the application's module queries plus
//! any methods contributed by other components through a
//! [`ServiceRegistrar`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::bail;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use mini_telemetry::{metric_inc, QUERY_REQUESTS};
use serde_json::{json, Value};
use tracing::debug;

use super::listener::HttpListener;
use super::{ComponentContext, ComponentError, ServiceComponent};
use crate::runtime::app::{QueryError, QueryFn};

pub const NAME: &str = "query-grpc";

/// Handler of one service method.
pub type MethodHandler = Arc<dyn Fn(&Value) -> Result<Value, QueryError> + Send + Sync>;

/// Methods of one service, named `/<service>/<Method>`.
pub struct ServiceRegistrar {
    service: String,
    methods: BTreeMap<String, MethodHandler>,
}

impl ServiceRegistrar {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            methods: BTreeMap::new(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn method_path(&self, method: &str) -> String {
        format!("/{}/{}", self.service, method)
    }

    pub fn register<F>(&mut self, method: &str, handler: F) -> &mut Self
    where
        F: Fn(&Value) -> Result<Value, QueryError> + Send + Sync + 'static,
    {
        self.methods
            .insert(self.method_path(method), Arc::new(handler));
        self
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }
}

/// Routes a method name to the application or to a registered service.
pub struct QueryRouter {
    app_query: QueryFn,
    app_methods: BTreeSet<String>,
    services: BTreeMap<String, MethodHandler>,
}

impl QueryRouter {
    pub fn new(app_query: QueryFn, app_methods: impl IntoIterator<Item = String>) -> Self {
        Self {
            app_query,
            app_methods: app_methods.into_iter().collect(),
            services: BTreeMap::new(),
        }
    }

    /// Add every method of `registrar`. A method already served is rejected.
    pub fn merge(&mut self, registrar: ServiceRegistrar) -> anyhow::Result<()> {
        for method in registrar.methods.keys() {
            if self.has_method(method) {
                bail!("method {method} is registered twice");
            }
        }
        self.services.extend(registrar.methods);
        Ok(())
    }

    pub fn has_method(&self, method: &str) -> bool {
        self.app_methods.contains(method) || self.services.contains_key(method)
    }

    pub fn methods(&self) -> Vec<String> {
        self.app_methods
            .iter()
            .chain(self.services.keys())
            .cloned()
            .collect()
    }

    pub fn route(&self, method: &str, request: &Value) -> Result<Value, QueryError> {
        if let Some(handler) = self.services.get(method) {
            return handler(request);
        }
        if self.app_methods.contains(method) {
            return (self.app_query)(method, request);
        }
        Err(QueryError::UnknownMethod(method.to_string()))
    }
}

/// Map a query result to an HTTP response and count it.
pub(crate) fn query_response(surface: &str, result: Result<Value, QueryError>) -> Response {
    let (status, body, outcome) = match result {
        Ok(value) => (StatusCode::OK, value, "ok"),
        Err(e) => {
            let status = match e {
                QueryError::UnknownMethod(_) => StatusCode::NOT_FOUND,
                QueryError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                QueryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, json!({ "error": e.to_string() }), "error")
        }
    };
    metric_inc!(QUERY_REQUESTS, &[surface, outcome]);
    (status, Json(body)).into_response()
}

/// Parse an optional JSON request body; empty means `null`.
pub(crate) fn parse_body(body: &Bytes) -> Result<Value, QueryError> {
    if body.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| QueryError::InvalidRequest(e.to_string()))
}

pub struct QueryGrpcComponent {
    listener: HttpListener,
    router: Arc<QueryRouter>,
}

impl QueryGrpcComponent {
    pub fn new(address: impl Into<String>, router: Arc<QueryRouter>) -> Self {
        Self {
            listener: HttpListener::new(NAME, address),
            router,
        }
    }

    pub fn router(&self) -> &Arc<QueryRouter> {
        &self.router
    }

    pub fn listener(&self) -> &HttpListener {
        &self.listener
    }

    fn http_router(&self) -> Router {
        Router::new()
            .route("/*method", post(handle_method))
            .with_state(Arc::clone(&self.router))
    }
}

async fn handle_method(
    State(router): State<Arc<QueryRouter>>,
    Path(method): Path<String>,
    body: Bytes,
) -> Response {
    let method = format!("/{}", method.trim_start_matches('/'));
    debug!(%method, "grpc query");
    let result = parse_body(&body).and_then(|request| router.route(&method, &request));
    query_response("grpc", result)
}

#[async_trait::async_trait]
impl ServiceComponent for QueryGrpcComponent {
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
