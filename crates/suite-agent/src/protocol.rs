//! Control channel wire protocol.
//!
//! Every message is a 4-byte big-endian length followed by that many bytes
//! of JSON. Requests are [`ControlRequest`], responses [`ControlResponse`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProtocolError;

/// Error code: token missing or wrong.
pub const ERR_UNAUTHORIZED: &str = "unauthorized";
/// Error code: command not recognised.
pub const ERR_UNKNOWN_COMMAND: &str = "unknown_command";
/// Error code: `task_id` required but absent.
pub const ERR_MISSING_TASK_ID: &str = "missing_task_id";
/// Error code: no task with that id.
pub const ERR_UNKNOWN_TASK: &str = "unknown_task";
/// Error code: configuration reload failed.
pub const ERR_RELOAD_FAILED: &str = "reload_failed";

/// A control request as sent on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRequest {
    /// `status`, `start_task`, `stop_task` or `reload_config`.
    pub command: String,
    /// Target task for `start_task` / `stop_task`.
    #[serde(default)]
    pub task_id: Option<String>,
    /// Shared secret, when the agent requires one.
    #[serde(default)]
    pub token: Option<String>,
}

impl ControlRequest {
    /// Request for `command` with no task and no token.
    pub fn new(command: Command) -> Self {
        Self {
            command: command.as_str().to_string(),
            ..Self::default()
        }
    }

    /// Builder: set the task id.
    #[must_use]
    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Builder: set the token.
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }
}

/// Recognised commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Report agent and task state.
    Status,
    /// Start (or restart) a task now.
    StartTask,
    /// Stop a task.
    StopTask,
    /// Re-read configuration and reconcile tasks.
    ReloadConfig,
}

impl Command {
    /// Parse a wire command name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "status" => Some(Self::Status),
            "start_task" => Some(Self::StartTask),
            "stop_task" => Some(Self::StopTask),
            "reload_config" => Some(Self::ReloadConfig),
            _ => None,
        }
    }

    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::StartTask => "start_task",
            Self::StopTask => "stop_task",
            Self::ReloadConfig => "reload_config",
        }
    }
}

/// A control response. `data` and `error` are always present, possibly null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResponse {
    /// Whether the command succeeded.
    pub ok: bool,
    /// Command result.
    #[serde(default)]
    pub data: Option<Value>,
    /// Error code, optionally followed by `": <detail>"`.
    #[serde(default)]
    pub error: Option<String>,
}

impl ControlResponse {
    /// Successful response.
    pub fn ok(data: impl Into<Option<Value>>) -> Self {
        Self {
            ok: true,
            data: data.into(),
            error: None,
        }
    }

    /// Failed response.
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// The error code without any detail suffix.
    #[must_use]
    pub fn error_code(&self) -> Option<&str> {
        self.error
            .as_deref()
            .map(|e| e.split_once(':').map_or(e, |(code, _)| code))
    }
}

/// Read one length-prefixed frame.
///
/// # Errors
///
/// [`ProtocolError::Closed`] on a clean EOF before the header,
/// [`ProtocolError::FrameTooLarge`] if the header exceeds `max_len`, or the
/// underlying I/O error.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {},
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(ProtocolError::Closed),
        Err(e) => return Err(ProtocolError::Io(e)),
    }
    let len = usize::try_from(u32::from_be_bytes(len_buf)).unwrap_or(usize::MAX);
    if len > max_len {
        return Err(ProtocolError::FrameTooLarge { len, max: max_len });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Write one length-prefixed frame.
///
/// # Errors
///
/// Returns the underlying I/O error, or [`ProtocolError::FrameTooLarge`] if
/// `payload` does not fit a 4-byte length.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(payload.len()).map_err(|_| ProtocolError::FrameTooLarge {
        len: payload.len(),
        max: usize::try_from(u32::MAX).unwrap_or(usize::MAX),
    })?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read and decode one JSON message.
///
/// # Errors
///
/// Any [`read_frame`] error, or [`ProtocolError::Malformed`].
pub async fn read_message<T, R>(reader: &mut R, max_len: usize) -> Result<T, ProtocolError>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let payload = read_frame(reader, max_len).await?;
    Ok(serde_json::from_slice(&payload)?)
}

/// Encode and write one JSON message.
///
/// # Errors
///
/// Any [`write_frame`] error, or [`ProtocolError::Malformed`] if `message`
/// cannot be serialized.
pub async fn write_message<T, W>(writer: &mut W, message: &T) -> Result<(), ProtocolError>
where
    T: Serialize + ?Sized,
    W: AsyncWrite + Unpin,
{
    let payload = serde_json::to_vec(message)?;
    write_frame(writer, &payload).await
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_request_defaults() {
        let req: ControlRequest = serde_json::from_str(r#"{"command": "status"}"#).unwrap();
        assert_eq!(req.command, "status");
        assert!(req.task_id.is_none());
        assert!(req.token.is_none());
        assert_eq!(Command::parse(&req.command), Some(Command::Status));
        assert_eq!(Command::parse("dance"), None);
    }

    #[test]
    fn test_response_shape_keeps_nulls() {
        let value = serde_json::to_value(ControlResponse::error(ERR_UNAUTHORIZED)).unwrap();
        assert_eq!(value, json!({"ok": false, "data": null, "error": "unauthorized"}));
    }

    #[test]
    fn test_error_code_strips_detail() {
        let resp = ControlResponse::error(format!("{ERR_RELOAD_FAILED}: bad toml"));
        assert_eq!(resp.error_code(), Some(ERR_RELOAD_FAILED));
        assert_eq!(ControlResponse::ok(None).error_code(), None);
    }

    #[tokio::test]
    async fn test_frame_round_trip_over_duplex() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let req = ControlRequest::new(Command::StopTask).with_task("scan");
        write_message(&mut a, &req).await.unwrap();
        let got: ControlRequest = read_message(&mut b, 1024).await.unwrap();
        assert_eq!(got, req);
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&1_000_000u32.to_be_bytes()).await.unwrap();
        let err = read_frame(&mut b, 1024).await.unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge { len: 1_000_000, max: 1024 }));
    }

    #[tokio::test]
    async fn test_eof_is_closed() {
        let (a, mut b) = tokio::io::duplex(64);
        drop(a);
        let err = read_frame(&mut b, 1024).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Closed));
    }

    #[tokio::test]
    async fn test_malformed_json() {
        let (mut a, mut b) = tokio::io::duplex(64);
        write_frame(&mut a, b"{nope").await.unwrap();
        let err = read_message::<ControlRequest, _>(&mut b, 1024).await.unwrap_err();
        assert_eq!(err.code(), "malformed_request");
    }
}
