//! Gateway component.
//!
//! HTTP/JSON front for module queries:
//!
//! | Route | Answer |
//! |-------|--------|
//! | `GET /mini/base/v1/interfaces` | Interfaces and their registered implementations |
//! | `GET /mini/:module/v1/state` | Module state (optional `?height=`) |
//! | `GET /mini/:module/v1/params` | Module params (optional `?height=`) |
//! | registered routes | Forwarded to a query router method |

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::bail;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tracing::info;

use super::grpc::{query_response, QueryRouter};
use super::listener::HttpListener;
use super::{ComponentContext, ComponentError, ServiceComponent};
use crate::runtime::app::{QueryError, QueryFn};
use crate::runtime::codec::InterfaceRegistry;

pub const NAME: &str = "gateway";

const INTERFACES_PATH: &str = "/mini/base/v1/interfaces";
const MODULE_STATE_PATH: &str = "/mini/:module/v1/state";
const MODULE_PARAMS_PATH: &str = "/mini/:module/v1/params";

/// Paths the gateway always serves.
const BUILTIN_PATHS: &[&str] = &[INTERFACES_PATH, MODULE_STATE_PATH, MODULE_PARAMS_PATH];

/// Whether two route patterns can match the same request path.
fn paths_overlap(a: &str, b: &str) -> bool {
    let a: Vec<&str> = a.split('/').collect();
    let b: Vec<&str> = b.split('/').collect();
    for (x, y) in a.iter().zip(&b) {
        if x.starts_with('*') || y.starts_with('*') {
            return true;
        }
        if x != y && !x.starts_with(':') && !y.starts_with(':') {
            return false;
        }
    }
    a.len() == b.len()
}

/// An HTTP path forwarded to a query method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayRoute {
    pub http_path: String,
    pub method: String,
}

impl GatewayRoute {
    pub fn new(http_path: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            http_path: http_path.into(),
            method: method.into(),
        }
    }
}

#[derive(Clone)]
struct GatewayState {
    interfaces: Arc<InterfaceRegistry>,
    app_query: QueryFn,
}

pub struct GatewayComponent {
    listener: HttpListener,
    state: GatewayState,
    routes: Mutex<Vec<(GatewayRoute, Arc<QueryRouter>)>>,
}

impl GatewayComponent {
    pub fn new(
        address: impl Into<String>,
        interfaces: Arc<InterfaceRegistry>,
        app_query: QueryFn,
    ) -> Self {
        Self {
            listener: HttpListener::new(NAME, address),
            state: GatewayState {
                interfaces,
                app_query,
            },
            routes: Mutex::new(Vec::new()),
        }
    }

    pub fn listener(&self) -> &HttpListener {
        &self.listener
    }

    /// Forward `route.http_path` to `route.method` on `router`.
    ///
    /// The method must already be served by the router.
    pub fn register_route(&self, route: GatewayRoute, router: Arc<QueryRouter>) -> anyhow::Result<()> {
        if !route.http_path.starts_with('/') {
            bail!("gateway path {} must start with '/'", route.http_path);
        }
        if !router.has_method(&route.method) {
            bail!(
                "gateway route {} points at unknown method {}",
                route.http_path,
                route.method
            );
        }
        if let Some(builtin) = BUILTIN_PATHS
            .iter()
            .find(|builtin| paths_overlap(builtin, &route.http_path))
        {
            bail!(
                "gateway path {} collides with built-in route {builtin}",
                route.http_path
            );
        }
        let mut routes = self.routes.lock();
        if let Some((existing, _)) = routes
            .iter()
            .find(|(r, _)| paths_overlap(&r.http_path, &route.http_path))
        {
            bail!(
                "gateway path {} collides with registered route {}",
                route.http_path,
                existing.http_path
            );
        }
        routes.push((route, router));
        Ok(())
    }

    pub fn routes(&self) -> Vec<GatewayRoute> {
        self.routes.lock().iter().map(|(r, _)| r.clone()).collect()
    }

    fn http_router(&self) -> Router {
        let mut router = Router::new()
            .route(INTERFACES_PATH, get(list_interfaces))
            .route(MODULE_STATE_PATH, get(module_state))
            .route(MODULE_PARAMS_PATH, get(module_params))
            .with_state(self.state.clone());

        for (route, target) in self.routes.lock().iter() {
            let method = route.method.clone();
            let target = Arc::clone(target);
            router = router.route(
                &route.http_path,
                get(move |Query(params): Query<BTreeMap<String, String>>| async move {
                    let result = request_from_params(&params)
                        .and_then(|request| target.route(&method, &request));
                    query_response(NAME, result)
                }),
            );
        }
        router
    }
}

/// Query-string parameters as a JSON request; `height` must be numeric.
fn request_from_params(params: &BTreeMap<String, String>) -> Result<Value, QueryError> {
    let mut request = Map::new();
    for (key, value) in params {
        let value = if key == "height" {
            let height: u64 = value.parse().map_err(|_| {
                QueryError::InvalidRequest(format!("height must be an unsigned integer, got {value}"))
            })?;
            Value::from(height)
        } else {
            Value::from(value.as_str())
        };
        request.insert(key.clone(), value);
    }
    Ok(Value::Object(request))
}

async fn list_interfaces(State(state): State<GatewayState>) -> Response {
    let interfaces: Map<String, Value> = state
        .interfaces
        .list_all_interfaces()
        .into_iter()
        .map(|name| {
            let implementations = state.interfaces.list_implementations(&name);
            (name, json!(implementations))
        })
        .collect();
    query_response(NAME, Ok(json!({ "interfaces": interfaces })))
}

fn module_query(state: &GatewayState, module: &str, kind: &str, params: &BTreeMap<String, String>) -> Response {
    let method = format!("/mini.{module}.v1.Query/{kind}");
    let result = request_from_params(params).and_then(|request| (state.app_query)(&method, &request));
    query_response(NAME, result)
}

async fn module_state(
    State(state): State<GatewayState>,
    Path(module): Path<String>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Response {
    module_query(&state, &module, "State", &params)
}

async fn module_params(
    State(state): State<GatewayState>,
    Path(module): Path<String>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Response {
    module_query(&state, &module, "Params", &params)
}

#[async_trait::async_trait]
impl ServiceComponent for GatewayComponent {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn init(&self, _ctx: &ComponentContext) -> Result<(), ComponentError> {
        self.listener.validate_address()
    }

    async fn start(&self, _ctx: &ComponentContext) -> Result<(), ComponentError> {
        let routes = self.routes.lock().len();
        self.listener.serve(self.http_router()).await?;
        info!(routes, "gateway routes registered");
        Ok(())
    }

    async fn stop(&self, ctx: &ComponentContext) -> Result<(), ComponentError> {
        self.listener.shutdown(ctx.stop_timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> GatewayComponent {
        let app_query: QueryFn = Arc::new(|method: &str, _: &Value| Ok(json!(method)));
        GatewayComponent::new("127.0.0.1:0", Arc::new(InterfaceRegistry::new()), app_query)
    }

    fn router() -> Arc<QueryRouter> {
        let app_query: QueryFn = Arc::new(|_: &str, _: &Value| Ok(Value::Null));
        Arc::new(QueryRouter::new(
            app_query,
            ["/mini.node.v1.Service/Status".to_string()],
        ))
    }

    #[test]
    fn test_register_route_requires_known_method() {
        let gateway = gateway();
        gateway
            .register_route(
                GatewayRoute::new("/mini/node/v1/status", "/mini.node.v1.Service/Status"),
                router(),
            )
            .unwrap();
        assert!(gateway
            .register_route(
                GatewayRoute::new("/mini/node/v1/missing", "/mini.node.v1.Service/Missing"),
                router(),
            )
            .is_err());
        assert_eq!(gateway.routes().len(), 1);
    }

    #[test]
    fn test_duplicate_path_rejected() {
        let gateway = gateway();
        let route = GatewayRoute::new("/mini/node/v1/status", "/mini.node.v1.Service/Status");
        gateway.register_route(route.clone(), router()).unwrap();
        assert!(gateway.register_route(route, router()).is_err());
    }

    #[test]
    fn test_builtin_path_collision_rejected() {
        let gateway = gateway();

        for path in ["/mini/bank/v1/state", "/mini/base/v1/interfaces", "/mini/:name/v1/params"] {
            let err = gateway
                .register_route(
                    GatewayRoute::new(path, "/mini.node.v1.Service/Status"),
                    router(),
                )
                .unwrap_err();
            assert!(err.to_string().contains("built-in"), "{err}");
        }
        assert!(gateway.routes().is_empty());
    }

    #[test]
    fn test_paths_overlap() {
        assert!(paths_overlap("/mini/:module/v1/state", "/mini/node/v1/state"));
        assert!(!paths_overlap("/mini/:module/v1/state", "/mini/node/v1/status"));
        assert!(!paths_overlap("/mini/:module/v1/state", "/mini/node/v1/state/extra"));
        assert!(paths_overlap("/query/*method", "/query/a/b"));
    }

    #[test]
    fn test_router_builds_with_service_routes() {
        let gateway = gateway();
        gateway
            .register_route(
                GatewayRoute::new("/mini/node/v1/status", "/mini.node.v1.Service/Status"),
                router(),
            )
            .unwrap();
        let _ = gateway.http_router();
    }

    #[test]
    fn test_request_from_params() {
        let mut params = BTreeMap::new();
        params.insert("height".to_string(), "7".to_string());
        assert_eq!(request_from_params(&params).unwrap(), json!({ "height": 7 }));
        params.insert("height".to_string(), "seven".to_string());
        assert!(request_from_params(&params).is_err());
    }
}
