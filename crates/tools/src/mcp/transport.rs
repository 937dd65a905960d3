//! Stdio transport for MCP servers.
//!
//! Spawns a subprocess and exchanges newline-delimited JSON-RPC over its
//! stdin/stdout. A reader task routes responses back to waiting requests.

use proctor_core::TransportError;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, trace};

use super::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId};

/// Default time to wait for a single response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

type PendingMap = HashMap<RequestId, oneshot::Sender<JsonRpcResponse>>;

/// Marks the transport closed when the reader task ends for any reason,
/// including its runtime being dropped.
struct ClosedOnDrop(Arc<AtomicBool>);

impl Drop for ClosedOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// A JSON-RPC connection to a child process.
pub struct StdioTransport {
    host: String,
    next_id: AtomicU64,
    pending: Arc<Mutex<PendingMap>>,
    writer: Mutex<BufWriter<ChildStdin>>,
    closed: Arc<AtomicBool>,
    request_timeout: Duration,
    child: Mutex<Child>,
}

impl StdioTransport {
    /// Spawn `command` and start reading its stdout.
    ///
    /// Must be called from within a tokio runtime; the reader task lives on it.
    pub fn spawn(
        host: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Arc<Self>, TransportError> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| TransportError::Connect {
            host: host.to_string(),
            reason: format!("failed to spawn '{command}': {e}"),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| TransportError::Connect {
            host: host.to_string(),
            reason: "child stdin unavailable".into(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| TransportError::Connect {
            host: host.to_string(),
            reason: "child stdout unavailable".into(),
        })?;

        let transport = Arc::new(Self {
            host: host.to_string(),
            next_id: AtomicU64::new(1),
            pending: Arc::new(Mutex::new(HashMap::new())),
            writer: Mutex::new(BufWriter::new(stdin)),
            closed: Arc::new(AtomicBool::new(false)),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            child: Mutex::new(child),
        });

        // The task holds no reference to the transport itself, so dropping
        // the last handle kills the child.
        let pending = Arc::clone(&transport.pending);
        let guard = ClosedOnDrop(Arc::clone(&transport.closed));
        let host_name = transport.host.clone();
        tokio::spawn(async move {
            let _guard = guard;
            let mut reader = BufReader::new(stdout);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => match serde_json::from_str::<JsonRpcResponse>(&line) {
                        Ok(response) => {
                            let mut pending = pending.lock().await;
                            if let Some(sender) = pending.remove(&response.id) {
                                let _ = sender.send(response);
                            }
                        }
                        Err(e) => {
                            trace!(host = %host_name, error = %e, "Ignoring non-response line");
                        }
                    },
                }
            }

            debug!(host = %host_name, "MCP server stdout closed");
            // Wake every waiter; their senders are dropped here.
            pending.lock().await.clear();
        });

        Ok(transport)
    }

    /// Whether the reader task is still running.
    pub fn is_alive(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    /// Send a request and wait for its response.
    ///
    /// JSON-RPC error responses are returned as `Ok`; the caller decides what
    /// they mean.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, TransportError> {
        if !self.is_alive() {
            return Err(TransportError::Closed(self.host.clone()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(method, params, id);

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request.id.clone(), tx);

        let json = serde_json::to_string(&request).map_err(|e| self.protocol_error(e))?;
        if let Err(e) = self.write_line(&json).await {
            self.pending.lock().await.remove(&request.id);
            return Err(e);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(TransportError::Closed(self.host.clone())),
            Err(_) => {
                self.pending.lock().await.remove(&request.id);
                Err(TransportError::Io {
                    host: self.host.clone(),
                    reason: format!(
                        "no response to '{method}' within {}s",
                        self.request_timeout.as_secs()
                    ),
                })
            }
        }
    }

    /// Send a notification. No response is expected.
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), TransportError> {
        let note = JsonRpcNotification::new(method, params);
        let json = serde_json::to_string(&note).map_err(|e| self.protocol_error(e))?;
        self.write_line(&json).await
    }

    /// Kill the child process and mark the transport closed.
    pub async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        self.pending.lock().await.clear();
        let mut child = self.child.lock().await;
        match child.kill().await {
            Ok(()) => Ok(()),
            // Already exited.
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    async fn write_line(&self, json: &str) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        writer
            .write_all(json.as_bytes())
            .await
            .map_err(|e| self.io_error(e))?;
        writer.write_all(b"\n").await.map_err(|e| self.io_error(e))?;
        writer.flush().await.map_err(|e| self.io_error(e))
    }

    fn io_error(&self, e: std::io::Error) -> TransportError {
        TransportError::Io {
            host: self.host.clone(),
            reason: e.to_string(),
        }
    }

    fn protocol_error(&self, e: serde_json::Error) -> TransportError {
        TransportError::Protocol {
            host: self.host.clone(),
            reason: e.to_string(),
        }
    }
}
