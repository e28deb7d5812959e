//! IPC server and client.
//!
//! One client connection carries any number of sequential requests; each
//! request line gets exactly one response line. Handlers are looked up per
//! request, so registration order never matters and a method can be served
//! the moment its handler lands.

use crate::error::{IpcError, IpcResult};
use crate::protocol::{error_codes, Method, Request, Response};
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

/// Boxed async handler for one method.
pub type HandlerFn =
    Box<dyn Fn(Request) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync>;

type HandlerMap = Arc<RwLock<HashMap<Method, HandlerFn>>>;

/// IPC server bound to a Unix domain socket.
pub struct IpcServer {
    socket_path: PathBuf,
    handlers: HandlerMap,
    shutdown_tx: broadcast::Sender<()>,
}

impl IpcServer {
    pub fn new(socket_path: &str) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            socket_path: PathBuf::from(socket_path),
            handlers: Arc::new(RwLock::new(HashMap::new())),
            shutdown_tx,
        }
    }

    /// Register the handler for a method, replacing any previous one.
    pub async fn register_handler<F, Fut>(&self, method: Method, handler: F)
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.handlers
            .write()
            .await
            .insert(method, Box::new(move |req| Box::pin(handler(req))));
    }

    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn shutdown_sender(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Serve until a shutdown signal arrives.
    pub async fn run(&self) -> IpcResult<()> {
        let listener = self.claim_socket()?;
        info!(socket = %self.socket_path.display(), "Bridge IPC ready");

        let mut stop = self.shutdown_tx.subscribe();
        loop {
            let stream = tokio::select! {
                _ = stop.recv() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => stream,
                    Err(e) => {
                        warn!(error = %e, "Accept failed, backing off");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        continue;
                    }
                },
            };

            let handlers = self.handlers.clone();
            tokio::spawn(async move {
                if let Err(e) = serve_client(stream, handlers).await {
                    debug!(error = %e, "Client session ended with error");
                }
            });
        }

        info!("Bridge IPC stopped");
        let _ = std::fs::remove_file(&self.socket_path);
        Ok(())
    }

    /// Bind the socket path, reclaiming a socket file a previous run left
    /// behind.
    fn claim_socket(&self) -> IpcResult<UnixListener> {
        if let Some(dir) = self.socket_path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        match UnixListener::bind(&self.socket_path) {
            Ok(listener) => Ok(listener),
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                std::fs::remove_file(&self.socket_path)?;
                UnixListener::bind(&self.socket_path).map_err(IpcError::Io)
            }
            Err(e) => Err(IpcError::Io(e)),
        }
    }
}

/// Request/response loop for one client.
async fn serve_client(stream: UnixStream, handlers: HandlerMap) -> IpcResult<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        let raw = line.trim();
        if raw.is_empty() {
            continue;
        }

        let response = match Request::from_json(raw) {
            Ok(request) => dispatch(&handlers, request).await,
            Err(e) => {
                debug!(error = %e, "Unparseable request line");
                Response::error("", error_codes::PARSE_ERROR, &format!("bad request: {}", e))
            }
        };

        let mut payload = response.to_json()?;
        payload.push('\n');
        write_half.write_all(payload.as_bytes()).await?;
    }

    Ok(())
}

async fn dispatch(handlers: &HandlerMap, request: Request) -> Response {
    let id = request.id.clone();
    debug!(method = ?request.method, id = %id, "Dispatching request");

    let handlers = handlers.read().await;
    match handlers.get(&request.method) {
        Some(handler) => handler(request).await,
        None => Response::error(
            &id,
            error_codes::METHOD_NOT_FOUND,
            &format!("no handler for {:?}", request.method),
        ),
    }
}

/// IPC client for talking to a running daemon.
pub struct IpcClient {
    socket_path: PathBuf,
}

impl IpcClient {
    pub fn new(socket_path: &str) -> Self {
        Self {
            socket_path: PathBuf::from(socket_path),
        }
    }

    /// One request, one response, over a fresh connection.
    pub async fn call(&self, request: Request) -> IpcResult<Response> {
        let mut stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            IpcError::Socket(format!(
                "daemon unreachable at {}: {}",
                self.socket_path.display(),
                e
            ))
        })?;

        let mut payload = request.to_json()?;
        payload.push('\n');
        stream.write_all(payload.as_bytes()).await?;

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(IpcError::ConnectionClosed);
        }
        Response::from_json(line.trim()).map_err(IpcError::from)
    }

    /// Send a method call with no parameters.
    pub async fn call_method(&self, method: Method) -> IpcResult<Response> {
        self.call(Request::new(method)).await
    }

    /// Send a method call with parameters.
    pub async fn call_method_with_params(
        &self,
        method: Method,
        params: serde_json::Value,
    ) -> IpcResult<Response> {
        self.call(Request::with_params(method, params)).await
    }

    /// Check if the daemon is running.
    pub async fn is_daemon_running(&self) -> bool {
        self.call_method(Method::Health).await.is_ok()
    }
}
