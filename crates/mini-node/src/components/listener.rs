//! Shared HTTP listener plumbing for the server components.

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::ComponentError;

/// Server task that is aborted when dropped, so a stop abandoned by an
/// outer timeout never leaves the server running detached.
struct ServerTask(JoinHandle<std::io::Result<()>>);

impl Drop for ServerTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[derive(Default)]
struct ListenerState {
    local_addr: Option<SocketAddr>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<ServerTask>,
}

/// An axum server bound on `start` and drained on `stop`.
pub struct HttpListener {
    component: &'static str,
    address: String,
    state: Mutex<ListenerState>,
}

impl HttpListener {
    pub fn new(component: &'static str, address: impl Into<String>) -> Self {
        Self {
            component,
            address: address.into(),
            state: Mutex::new(ListenerState::default()),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Bound address once serving; reflects the real port for `:0`.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.state.lock().local_addr
    }

    pub fn is_serving(&self) -> bool {
        self.state.lock().task.is_some()
    }

    /// Check the address has the `host:port` shape without binding.
    pub fn validate_address(&self) -> Result<(), ComponentError> {
        let valid = self
            .address
            .rsplit_once(':')
            .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
        if valid {
            Ok(())
        } else {
            Err(ComponentError::new(
                self.component,
                format!("invalid listen address {:?}", self.address),
            ))
        }
    }

    pub async fn serve(&self, router: Router) -> Result<SocketAddr, ComponentError> {
        if self.is_serving() {
            return Err(ComponentError::new(self.component, "already serving"));
        }

        let listener = TcpListener::bind(&self.address).await.map_err(|e| {
            ComponentError::new(
                self.component,
                format!("failed to bind {}: {e}", self.address),
            )
        })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ComponentError::new(self.component, e.to_string()))?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        let mut state = self.state.lock();
        state.local_addr = Some(local_addr);
        state.shutdown = Some(shutdown_tx);
        state.task = Some(ServerTask(task));
        drop(state);

        info!(component = self.component, %local_addr, "listening");
        Ok(local_addr)
    }

    /// Ask the server to drain and wait at most `timeout` for it.
    ///
    /// A listener that never started stops trivially.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), ComponentError> {
        let (shutdown, task) = {
            let mut state = self.state.lock();
            (state.shutdown.take(), state.task.take())
        };
        if let Some(shutdown) = shutdown {
            let _ = shutdown.send(());
        }
        let Some(mut task) = task else {
            return Ok(());
        };

        match tokio::time::timeout(timeout, &mut task.0).await {
            Ok(Ok(Ok(()))) => {
                info!(component = self.component, "listener stopped");
                Ok(())
            }
            Ok(Ok(Err(e))) => Err(ComponentError::new(
                self.component,
                format!("server error: {e}"),
            )),
            Ok(Err(e)) => Err(ComponentError::new(
                self.component,
                format!("server task failed: {e}"),
            )),
            Err(_) => {
                warn!(component = self.component, ?timeout, "listener did not drain in time");
                task.0.abort();
                Err(ComponentError::new(
                    self.component,
                    format!("stop timed out after {}", humantime::format_duration(timeout)),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;

    #[test]
    fn test_validate_address() {
        assert!(HttpListener::new("t", "127.0.0.1:0").validate_address().is_ok());
        assert!(HttpListener::new("t", "localhost:1317").validate_address().is_ok());
        assert!(HttpListener::new("t", "127.0.0.1").validate_address().is_err());
        assert!(HttpListener::new("t", ":80").validate_address().is_err());
    }

    #[tokio::test]
    async fn test_dropped_server_task_is_aborted() {
        let task = ServerTask(tokio::spawn(async {
            std::future::pending::<()>().await;
            Ok::<(), std::io::Error>(())
        }));
        let handle = task.0.abort_handle();

        drop(task);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn test_serve_and_shutdown() {
        let listener = HttpListener::new("t", "127.0.0.1:0");
        let addr = listener
            .serve(Router::new().route("/", get(|| async { "ok" })))
            .await
            .unwrap();
        assert_ne!(addr.port(), 0);
        assert!(listener.serve(Router::new()).await.is_err());

        listener.shutdown(Duration::from_secs(5)).await.unwrap();
        assert!(!listener.is_serving());
        listener.shutdown(Duration::from_secs(5)).await.unwrap();
    }
}
