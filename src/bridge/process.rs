//! MCP server process management
//!
//! Spawns and manages the Node MCP server subprocess, handling the
//! `initialize` handshake, serialized tool calls with bounded waits, and
//! lazy restart after crashes.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{json, Value as JsonValue};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};

use super::protocol::{InitializeParams, JsonRpcMessage, JsonRpcRequest, ToolCallParams};

/// Time the freshly spawned child gets before we check it survived startup.
const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Bound on the wait for the `initialize` response. Silence within this
/// window is treated as success: a slow backend must not block startup.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Grace period between closing stdin and killing the child.
const STOP_GRACE: Duration = Duration::from_secs(2);

/// Health snapshot readable without contending on the call gate.
#[derive(Debug, Clone, Default)]
pub struct BridgeStatus {
    pub alive: bool,
    pub initialized: bool,
    pub pid: Option<u32>,
    pub last_error: Option<String>,
}

/// One running child with its stdio endpoints.
struct ChildHandle {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

#[derive(Default)]
struct BridgeInner {
    child: Option<ChildHandle>,
    initialized: bool,
}

enum Handshake {
    Complete,
    /// Explicit error response; the child must be torn down.
    Rejected(String),
    /// No parseable response within the window; proceed optimistically.
    Silent,
}

enum Exchange {
    Response(JsonValue),
    Timeout,
    ConnectionLost,
    Failed(String),
}

/// Bridge to the Node MCP server over line-delimited JSON-RPC.
///
/// All calls are serialized through one gate: the transport has no way to
/// demultiplex responses, so at most one request may be in flight. An
/// instance is owned by the composition root; do not create more than one
/// per server script.
pub struct McpBridge {
    program: PathBuf,
    script: PathBuf,
    inner: Mutex<BridgeInner>,
    status: parking_lot::Mutex<BridgeStatus>,
}

impl McpBridge {
    /// Bridge for a Node MCP server entry point (dist/index.js).
    pub fn new(script: PathBuf) -> Self {
        Self::with_program(Self::find_node(), script)
    }

    /// Bridge with an explicit interpreter, for non-Node servers and tests.
    pub fn with_program(program: PathBuf, script: PathBuf) -> Self {
        Self {
            program,
            script,
            inner: Mutex::new(BridgeInner::default()),
            status: parking_lot::Mutex::new(BridgeStatus::default()),
        }
    }

    /// Whether the server script exists on disk.
    pub fn available(&self) -> bool {
        self.script.exists()
    }

    /// Find the node binary in PATH or common locations.
    fn find_node() -> PathBuf {
        if let Ok(path) = which::which("node") {
            return path;
        }

        let mut candidates = vec![
            PathBuf::from("/usr/local/bin/node"),
            PathBuf::from("/opt/homebrew/bin/node"),
        ];
        if let Some(home) = dirs::home_dir() {
            candidates.insert(0, home.join(".local/bin/node"));
        }
        for path in candidates {
            if path.exists() {
                return path;
            }
        }

        // Let spawn fail with a clear error if node truly is absent.
        PathBuf::from("node")
    }

    /// Ensure a child is running and initialized.
    ///
    /// Idempotent when already running; with `force_restart` the current
    /// child is torn down and a new one spawned and handshaken. Returns
    /// `true` iff a child process is alive afterwards.
    pub async fn ensure_started(&self, force_restart: bool) -> bool {
        let mut inner = self.inner.lock().await;
        self.start_locked(&mut inner, force_restart).await
    }

    async fn start_locked(&self, inner: &mut BridgeInner, force_restart: bool) -> bool {
        if !self.available() {
            tracing::warn!("MCP server script not found at {:?}", self.script);
            self.note_error("MCP server not available");
            return false;
        }

        if !force_restart && Self::child_alive(inner) && inner.initialized {
            return true;
        }

        self.stop_locked(inner).await;

        let mut child = match tokio::process::Command::new(&self.program)
            .arg(&self.script)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                tracing::error!("Failed to spawn MCP server: {}", e);
                self.note_error(&format!("Failed to spawn MCP server: {e}"));
                return false;
            }
        };

        let Some(stdin) = child.stdin.take() else {
            tracing::error!("Failed to capture MCP server stdin");
            child.kill().await.ok();
            return false;
        };
        let Some(stdout) = child.stdout.take() else {
            tracing::error!("Failed to capture MCP server stdout");
            child.kill().await.ok();
            return false;
        };

        // Drain stderr for the lifetime of the process. This keeps the
        // child from blocking on a full pipe buffer, so it runs whether or
        // not the lines end up emitted anywhere.
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if !line.trim().is_empty() {
                        tracing::debug!(target: "mcp_stderr", "{}", line);
                    }
                }
            });
        }

        sleep(SETTLE_DELAY).await;

        if !matches!(child.try_wait(), Ok(None)) {
            tracing::error!("MCP server died immediately after start");
            self.note_error("MCP server died immediately after start");
            return false;
        }

        let mut handle = ChildHandle {
            stdin,
            stdout: BufReader::new(stdout).lines(),
            child,
        };

        match Self::handshake(&mut handle).await {
            Handshake::Complete => {}
            Handshake::Silent => {
                tracing::warn!(
                    "No initialization response (timeout after {}s), assuming success",
                    HANDSHAKE_TIMEOUT.as_secs()
                );
            }
            Handshake::Rejected(message) => {
                tracing::error!("MCP initialization failed: {}", message);
                self.note_error(&format!("MCP initialization failed: {message}"));
                Self::shutdown_handle(handle).await;
                return false;
            }
        }

        // A child that closed stdout and exited during the handshake window
        // is not a started server, optimism notwithstanding.
        if !matches!(handle.child.try_wait(), Ok(None)) {
            tracing::error!("MCP server exited during handshake");
            self.note_error("MCP server exited during handshake");
            return false;
        }

        tracing::info!("Started MCP server (pid {:?})", handle.child.id());
        inner.child = Some(handle);
        inner.initialized = true;
        self.update_status(inner);
        true
    }

    async fn handshake(handle: &mut ChildHandle) -> Handshake {
        let request = JsonRpcRequest::new(0, "initialize", InitializeParams::client());
        let line = match request.to_line() {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("MCP initialization warning: {}", e);
                return Handshake::Silent;
            }
        };

        if let Err(e) = handle.stdin.write_all(line.as_bytes()).await {
            tracing::warn!("MCP initialization warning: {}", e);
            return Handshake::Silent;
        }
        let _ = handle.stdin.flush().await;

        match timeout(HANDSHAKE_TIMEOUT, handle.stdout.next_line()).await {
            Ok(Ok(Some(text))) => match serde_json::from_str::<JsonRpcMessage>(&text) {
                Ok(message) => {
                    if let Some(error) = message.error {
                        Handshake::Rejected(error.to_string())
                    } else if let Some(result) = message.result {
                        let server = result
                            .pointer("/serverInfo/name")
                            .and_then(|v| v.as_str())
                            .unwrap_or("unknown");
                        tracing::info!("MCP initialized: {}", server);
                        Handshake::Complete
                    } else {
                        tracing::warn!("Unexpected initialization response: {}", text);
                        Handshake::Silent
                    }
                }
                Err(e) => {
                    tracing::warn!("MCP initialization warning: {}", e);
                    Handshake::Silent
                }
            },
            Ok(Ok(None)) | Ok(Err(_)) | Err(_) => Handshake::Silent,
        }
    }

    /// Call an MCP tool and return its response payload.
    ///
    /// Never returns an Err across this boundary: every failure mode is
    /// normalized into a `{"error": ...}` JSON value so callers branch on
    /// the payload uniformly.
    pub async fn call(&self, tool: &str, arguments: JsonValue, call_timeout: Duration) -> JsonValue {
        let mut inner = self.inner.lock().await;

        if !Self::child_alive(&mut inner) || !inner.initialized {
            if !self.start_locked(&mut inner, false).await {
                return json!({"error": "Failed to start MCP server"});
            }
        }

        let id = chrono::Utc::now().timestamp_millis() as u64;
        let request = JsonRpcRequest::new(
            id,
            "tools/call",
            ToolCallParams {
                name: tool.to_string(),
                arguments,
            },
        );
        let line = match request.to_line() {
            Ok(line) => line,
            Err(e) => return json!({"error": format!("Failed to encode request: {e}")}),
        };

        let outcome = {
            let Some(handle) = inner.child.as_mut() else {
                return json!({"error": "Failed to start MCP server"});
            };
            Self::exchange(handle, &line, call_timeout).await
        };

        match outcome {
            Exchange::Response(value) => {
                self.update_status(&mut inner);
                value
            }
            Exchange::Timeout => {
                tracing::warn!(
                    "MCP call to '{}' timed out after {}s",
                    tool,
                    call_timeout.as_secs()
                );
                if !Self::child_alive(&mut inner) {
                    tracing::warn!("MCP server died - will restart on next call");
                    inner.initialized = false;
                }
                self.update_status(&mut inner);
                json!({
                    "error": format!(
                        "Timeout waiting for MCP response (>{}s)",
                        call_timeout.as_secs()
                    )
                })
            }
            Exchange::ConnectionLost => {
                tracing::error!("MCP server connection broken - server may have crashed");
                inner.child = None;
                inner.initialized = false;
                self.note_error("Server connection lost");
                self.update_status(&mut inner);
                json!({"error": "Server connection lost"})
            }
            Exchange::Failed(message) => {
                tracing::error!("MCP call failed: {}", message);
                self.note_error(&message);
                json!({"error": message})
            }
        }
    }

    async fn exchange(handle: &mut ChildHandle, line: &str, call_timeout: Duration) -> Exchange {
        if let Err(e) = handle.stdin.write_all(line.as_bytes()).await {
            return Self::write_failure(e);
        }
        if let Err(e) = handle.stdin.flush().await {
            return Self::write_failure(e);
        }

        match timeout(call_timeout, handle.stdout.next_line()).await {
            Ok(Ok(Some(text))) => match serde_json::from_str(&text) {
                Ok(value) => Exchange::Response(value),
                Err(e) => Exchange::Failed(format!("Invalid JSON response: {e}")),
            },
            Ok(Ok(None)) => Exchange::ConnectionLost,
            Ok(Err(e)) => Exchange::Failed(format!("Read error: {e}")),
            Err(_) => Exchange::Timeout,
        }
    }

    fn write_failure(e: std::io::Error) -> Exchange {
        if e.kind() == ErrorKind::BrokenPipe {
            Exchange::ConnectionLost
        } else {
            Exchange::Failed(format!("Failed to write request: {e}"))
        }
    }

    /// Stop the MCP server gracefully. Idempotent.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        self.stop_locked(&mut inner).await;
    }

    async fn stop_locked(&self, inner: &mut BridgeInner) {
        if let Some(handle) = inner.child.take() {
            Self::shutdown_handle(handle).await;
            tracing::info!("Stopped MCP server");
        }
        inner.initialized = false;
        self.update_status(inner);
    }

    async fn shutdown_handle(handle: ChildHandle) {
        let ChildHandle {
            mut child,
            stdin,
            stdout,
        } = handle;

        // Closing stdin asks the server to exit.
        drop(stdin);
        drop(stdout);

        tokio::select! {
            _ = sleep(STOP_GRACE) => {
                tracing::warn!("MCP server didn't terminate gracefully, killing...");
                child.kill().await.ok();
            }
            status = child.wait() => {
                tracing::debug!("MCP server exited with status: {:?}", status);
            }
        }
    }

    /// Whether the child process is currently running.
    pub async fn is_alive(&self) -> bool {
        let mut inner = self.inner.lock().await;
        Self::child_alive(&mut inner)
    }

    /// OS pid of the running child, if any.
    pub async fn process_id(&self) -> Option<u32> {
        let inner = self.inner.lock().await;
        inner.child.as_ref().and_then(|h| h.child.id())
    }

    /// Health snapshot. Refreshes liveness when the call gate is free,
    /// otherwise returns the last recorded state, so a long in-flight call
    /// never stalls a health probe.
    pub fn status(&self) -> BridgeStatus {
        if let Ok(mut inner) = self.inner.try_lock() {
            self.update_status(&mut inner);
        }
        self.status.lock().clone()
    }

    fn child_alive(inner: &mut BridgeInner) -> bool {
        inner
            .child
            .as_mut()
            .map(|h| matches!(h.child.try_wait(), Ok(None)))
            .unwrap_or(false)
    }

    fn update_status(&self, inner: &mut BridgeInner) {
        let alive = Self::child_alive(inner);
        let pid = inner.child.as_ref().and_then(|h| h.child.id());
        let mut status = self.status.lock();
        status.alive = alive;
        status.initialized = inner.initialized;
        status.pid = pid;
    }

    fn note_error(&self, message: &str) {
        self.status.lock().last_error = Some(message.to_string());
    }
}
