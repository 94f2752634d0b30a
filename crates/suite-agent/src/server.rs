//! Control channel server.
//!
//! Listens on a Unix socket (owner-only permissions) and answers
//! length-prefixed JSON requests. Every request is read under a timeout; a
//! protocol error is answered once and the connection closed. Nothing here
//! can take the agent down.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use subtle::ConstantTimeEq;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use suite_config::ControlSection;

use crate::error::{AgentError, AgentResult, ProtocolError};
use crate::protocol::{
    Command, ControlRequest, ControlResponse, ERR_MISSING_TASK_ID, ERR_UNAUTHORIZED,
    ERR_UNKNOWN_COMMAND, read_message, write_message,
};

/// The commands a control server can route to.
#[async_trait]
pub trait ControlHandler: Send + Sync {
    /// Agent and task state.
    async fn status(&self) -> ControlResponse;

    /// Start (or restart) a task now.
    async fn start_task(&self, task_id: &str) -> ControlResponse;

    /// Stop a task.
    async fn stop_task(&self, task_id: &str) -> ControlResponse;

    /// Re-read configuration and reconcile tasks.
    async fn reload_config(&self) -> ControlResponse;
}

/// Per-connection limits and the optional shared secret.
#[derive(Clone)]
pub struct ServerSettings {
    /// Required token, if any.
    pub token: Option<String>,
    /// Time allowed to receive one complete request.
    pub read_timeout: Duration,
    /// Largest accepted request frame.
    pub max_frame_bytes: usize,
}

impl From<&ControlSection> for ServerSettings {
    fn from(section: &ControlSection) -> Self {
        Self {
            token: section.token.clone(),
            read_timeout: Duration::from_millis(section.read_timeout_ms),
            max_frame_bytes: section.max_frame_bytes,
        }
    }
}

impl std::fmt::Debug for ServerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSettings")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("read_timeout", &self.read_timeout)
            .field("max_frame_bytes", &self.max_frame_bytes)
            .finish()
    }
}

impl ServerSettings {
    fn authorized(&self, provided: Option<&str>) -> bool {
        match (&self.token, provided) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(expected), Some(given)) => given.as_bytes().ct_eq(expected.as_bytes()).into(),
        }
    }
}

/// A bound control socket.
pub struct ControlServer {
    listener: UnixListener,
    path: PathBuf,
    settings: Arc<ServerSettings>,
    handler: Arc<dyn ControlHandler>,
}

impl ControlServer {
    /// Bind `path`, replacing a stale socket left by a previous agent.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Io`] if the socket cannot be created.
    pub fn bind(
        path: &Path,
        settings: ServerSettings,
        handler: Arc<dyn ControlHandler>,
    ) -> AgentResult<Self> {
        let io_err = |source: std::io::Error| AgentError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        match std::fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "removed stale control socket"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => return Err(io_err(e)),
        }

        let listener = UnixListener::bind(path).map_err(io_err)?;
        restrict_permissions(path).map_err(io_err)?;
        info!(path = %path.display(), "control channel listening");

        Ok(Self {
            listener,
            path: path.to_path_buf(),
            settings: Arc::new(settings),
            handler,
        })
    }

    /// Socket path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept connections until `shutdown` fires, then remove the socket.
    pub async fn serve(self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        let settings = Arc::clone(&self.settings);
                        let handler = Arc::clone(&self.handler);
                        tokio::spawn(async move {
                            handle_connection(stream, &settings, handler.as_ref()).await;
                        });
                    },
                    Err(e) => warn!(error = %e, "failed to accept control connection"),
                },
            }
        }

        if let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %self.path.display(), error = %e, "failed to remove control socket");
        }
        debug!("control channel stopped");
    }
}

impl std::fmt::Debug for ControlServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlServer")
            .field("path", &self.path)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

async fn handle_connection(
    mut stream: UnixStream,
    settings: &ServerSettings,
    handler: &dyn ControlHandler,
) {
    loop {
        let read = tokio::time::timeout(
            settings.read_timeout,
            read_message::<ControlRequest, _>(&mut stream, settings.max_frame_bytes),
        )
        .await;

        let request = match read {
            Ok(Ok(request)) => request,
            Ok(Err(ProtocolError::Closed)) => break,
            Ok(Err(e)) => {
                warn!(error = %e, "rejecting control request");
                reply_and_close(&mut stream, e.code()).await;
                break;
            },
            Err(_) => {
                debug!("control client timed out");
                reply_and_close(&mut stream, ProtocolError::Timeout.code()).await;
                break;
            },
        };

        if !settings.authorized(request.token.as_deref()) {
            warn!(command = %request.command, "unauthorized control request");
            reply_and_close(&mut stream, ERR_UNAUTHORIZED).await;
            break;
        }

        let response = route(handler, &request).await;
        if let Err(e) = write_message(&mut stream, &response).await {
            debug!(error = %e, "control client went away before the reply");
            break;
        }
    }
}

async fn reply_and_close(stream: &mut UnixStream, code: &str) {
    // Best effort: the peer may already be gone.
    let _ = write_message(stream, &ControlResponse::error(code)).await;
}

async fn route(handler: &dyn ControlHandler, request: &ControlRequest) -> ControlResponse {
    let Some(command) = Command::parse(&request.command) else {
        debug!(command = %request.command, "unknown control command");
        return ControlResponse::error(ERR_UNKNOWN_COMMAND);
    };
    debug!(command = command.as_str(), task_id = ?request.task_id, "control request");

    match command {
        Command::Status => handler.status().await,
        Command::ReloadConfig => handler.reload_config().await,
        Command::StartTask | Command::StopTask => {
            let Some(task_id) = request.task_id.as_deref().filter(|t| !t.is_empty()) else {
                return ControlResponse::error(ERR_MISSING_TASK_ID);
            };
            if command == Command::StartTask {
                handler.start_task(task_id).await
            } else {
                handler.stop_task(task_id).await
            }
        },
    }
}
