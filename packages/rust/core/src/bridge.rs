//! Subprocess bridge to an external reasoning service.
//!
//! Spawns the configured command, then speaks a JSON-lines protocol over its
//! stdin/stdout: the bridge announces `ready`, answers each `transform`
//! request with a `result` or `error` carrying the same id, and exits on
//! `shutdown`.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use newsrouter_shared::{BridgeConfig, NewsRouterError, Result};

use crate::reasoner::{Reasoner, TransformRequest};

// ---------------------------------------------------------------------------
// Protocol types
// ---------------------------------------------------------------------------

/// Request message sent to the bridge.
#[derive(Debug, serde::Serialize)]
#[serde(tag = "type")]
enum RequestMessage<'a> {
    #[serde(rename = "transform")]
    Transform {
        id: String,
        request: &'a TransformRequest<'a>,
    },
    #[serde(rename = "shutdown")]
    Shutdown,
}

/// Response message received from the bridge.
#[derive(Debug, serde::Deserialize)]
#[serde(tag = "type")]
enum ResponseMessage {
    #[serde(rename = "ready")]
    Ready,
    #[serde(rename = "result")]
    Result { id: String, items: Vec<String> },
    #[serde(rename = "error")]
    Error { id: String, error: String },
}

// ---------------------------------------------------------------------------
// Bridge handle
// ---------------------------------------------------------------------------

/// Handle to the spawned bridge subprocess.
struct BridgeHandle {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    request_counter: u64,
    /// Set once replies can no longer be paired with requests.
    out_of_sync: bool,
}

impl BridgeHandle {
    /// Spawn the bridge subprocess and wait for its ready signal.
    async fn spawn(cmd: &str, config: &BridgeConfig) -> Result<Self> {
        info!(cmd, args = ?config.args, "spawning reasoning bridge");

        let mut command = Command::new(cmd);
        command
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit()) // Bridge logs go to parent stderr
            .kill_on_drop(true);
        if let Some(dir) = &config.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| {
            NewsRouterError::Reasoning(format!("failed to spawn bridge: {e}. Is `{cmd}` installed?"))
        })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            NewsRouterError::Reasoning("failed to capture bridge stdin".into())
        })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            NewsRouterError::Reasoning("failed to capture bridge stdout".into())
        })?;

        let mut handle = Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            request_counter: 0,
            out_of_sync: false,
        };

        handle.wait_for_ready().await?;
        Ok(handle)
    }

    async fn read_message(&mut self) -> Result<ResponseMessage> {
        let mut line = String::new();
        self.reader
            .read_line(&mut line)
            .await
            .map_err(|e| NewsRouterError::Reasoning(format!("bridge read error: {e}")))?;

        if line.is_empty() {
            return Err(NewsRouterError::Reasoning(
                "bridge closed stdout unexpectedly".into(),
            ));
        }

        serde_json::from_str(line.trim()).map_err(|e| {
            let preview: String = line.chars().take(200).collect();
            NewsRouterError::Reasoning(format!("invalid bridge message: {e} (got: {preview})"))
        })
    }

    async fn wait_for_ready(&mut self) -> Result<()> {
        match self.read_message().await? {
            ResponseMessage::Ready => {
                info!("bridge is ready");
                Ok(())
            }
            other => Err(NewsRouterError::Reasoning(format!(
                "expected ready message, got: {other:?}"
            ))),
        }
    }

    async fn write_line(&mut self, json: &str) -> Result<()> {
        self.stdin
            .write_all(format!("{json}\n").as_bytes())
            .await
            .map_err(|e| NewsRouterError::Reasoning(format!("failed to write to bridge stdin: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| NewsRouterError::Reasoning(format!("failed to flush bridge stdin: {e}")))
    }

    /// Send one request and wait for its response.
    async fn send(&mut self, request: &TransformRequest<'_>) -> Result<Vec<String>> {
        self.request_counter += 1;
        let id = format!("req-{}", self.request_counter);

        let json = serde_json::to_string(&RequestMessage::Transform {
            id: id.clone(),
            request,
        })
        .map_err(|e| NewsRouterError::Reasoning(format!("failed to serialize request: {e}")))?;

        debug!(%id, stage = request.stage, key = request.key, "sending bridge request");
        self.write_line(&json).await?;

        let response = self.read_message().await;
        match response {
            Ok(ResponseMessage::Result { id: resp_id, items }) if resp_id == id => Ok(items),
            Ok(ResponseMessage::Error { id: resp_id, error }) if resp_id == id => {
                Err(NewsRouterError::Reasoning(error))
            }
            Ok(ResponseMessage::Result { id: resp_id, .. } | ResponseMessage::Error { id: resp_id, .. }) => {
                self.out_of_sync = true;
                Err(NewsRouterError::Reasoning(format!(
                    "bridge answered {resp_id}, expected {id}"
                )))
            }
            Ok(ResponseMessage::Ready) => {
                self.out_of_sync = true;
                Err(NewsRouterError::Reasoning(
                    "unexpected ready message during transform".into(),
                ))
            }
            Err(e) => {
                self.out_of_sync = true;
                Err(e)
            }
        }
    }

    /// Send shutdown and wait for the bridge to exit.
    async fn shutdown(mut self) {
        if let Ok(json) = serde_json::to_string(&RequestMessage::Shutdown) {
            let _ = self.write_line(&json).await;
        }

        match self.child.wait().await {
            Ok(status) => info!(?status, "bridge exited"),
            Err(e) => warn!("bridge wait error: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// BridgeReasoner
// ---------------------------------------------------------------------------

/// [`Reasoner`] backed by a long-lived bridge subprocess.
///
/// Requests are serialized through one pipe; stages run sequentially anyway.
pub struct BridgeReasoner {
    handle: Mutex<Option<BridgeHandle>>,
}

impl BridgeReasoner {
    /// Spawn the bridge described by `config`.
    pub async fn spawn(config: &BridgeConfig) -> Result<Self> {
        let cmd = config
            .cmd
            .as_deref()
            .ok_or_else(|| NewsRouterError::config("bridge.cmd is not set"))?;
        let handle = BridgeHandle::spawn(cmd, config).await?;
        Ok(Self {
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Ask the bridge to exit. Later transforms fail with a reasoning error.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.handle.lock().await.take() {
            handle.shutdown().await;
        }
    }
}

#[async_trait]
impl Reasoner for BridgeReasoner {
    async fn transform(&self, request: &TransformRequest<'_>) -> Result<Vec<String>> {
        let mut guard = self.handle.lock().await;
        let handle = guard
            .as_mut()
            .ok_or_else(|| NewsRouterError::Reasoning("bridge has been shut down".into()))?;
        let result = handle.send(request).await;
        if handle.out_of_sync {
            warn!("bridge replies out of step with requests, dropping bridge");
            // Dropping the handle kills the subprocess.
            *guard = None;
        }
        result
    }

    fn name(&self) -> &str {
        "bridge"
    }
}
