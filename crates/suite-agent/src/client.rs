//! Control channel client, used by the `suite agent` commands.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::net::UnixStream;

use crate::error::{AgentError, AgentResult, ProtocolError};
use crate::protocol::{Command, ControlRequest, ControlResponse, read_message, write_message};

/// Default time to wait for a reply.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest reply the client will accept.
const MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;

/// Sends single requests to a running agent.
#[derive(Clone)]
pub struct ControlClient {
    socket: PathBuf,
    token: Option<String>,
    timeout: Duration,
}

impl ControlClient {
    /// Client for the agent listening on `socket`.
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
            token: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Builder: send `token` with every request.
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Builder: override the reply timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Socket this client talks to.
    #[must_use]
    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// Send one request and wait for its reply.
    ///
    /// # Errors
    ///
    /// [`AgentError::Io`] if the agent is not listening, or
    /// [`AgentError::Protocol`] if the exchange fails or times out.
    pub async fn send(&self, request: ControlRequest) -> AgentResult<ControlResponse> {
        let request = request.with_token(self.token.clone());
        let exchange = async {
            let mut stream =
                UnixStream::connect(&self.socket)
                    .await
                    .map_err(|source| AgentError::Io {
                        path: self.socket.clone(),
                        source,
                    })?;
            write_message(&mut stream, &request).await?;
            let response: ControlResponse = read_message(&mut stream, MAX_RESPONSE_BYTES).await?;
            Ok(response)
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| AgentError::Protocol(ProtocolError::Timeout))?
    }

    /// `status`.
    ///
    /// # Errors
    ///
    /// See [`ControlClient::send`].
    pub async fn status(&self) -> AgentResult<ControlResponse> {
        self.send(ControlRequest::new(Command::Status)).await
    }

    /// `start_task`.
    ///
    /// # Errors
    ///
    /// See [`ControlClient::send`].
    pub async fn start_task(&self, task_id: &str) -> AgentResult<ControlResponse> {
        self.send(ControlRequest::new(Command::StartTask).with_task(task_id))
            .await
    }

    /// `stop_task`.
    ///
    /// # Errors
    ///
    /// See [`ControlClient::send`].
    pub async fn stop_task(&self, task_id: &str) -> AgentResult<ControlResponse> {
        self.send(ControlRequest::new(Command::StopTask).with_task(task_id))
            .await
    }

    /// `reload_config`.
    ///
    /// # Errors
    ///
    /// See [`ControlClient::send`].
    pub async fn reload(&self) -> AgentResult<ControlResponse> {
        self.send(ControlRequest::new(Command::ReloadConfig)).await
    }
}

impl std::fmt::Debug for ControlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlClient")
            .field("socket", &self.socket)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}
