use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{io_err, DaemonError};

/// Control socket commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlCommand {
    Status,
    Rescan,
    Stop,
}

/// JSON newline-delimited request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlRequest {
    pub cmd: ControlCommand,
}

/// JSON newline-delimited response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ControlResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

const STATUS_ATTEMPTS: u32 = 5;
const STATUS_RETRY_PAUSE: Duration = Duration::from_millis(100);

/// Blocking client for the daemon control socket. One connection per command.
#[derive(Debug, Clone, Copy)]
pub struct ControlClient<'a> {
    socket: &'a Path,
}

impl<'a> ControlClient<'a> {
    pub fn new(socket: &'a Path) -> Self {
        Self { socket }
    }

    /// Issue `cmd` and unwrap the response payload. A refused command becomes
    /// [`DaemonError::Protocol`] carrying the daemon's message.
    pub fn call(&self, cmd: ControlCommand) -> Result<Value, DaemonError> {
        let ControlResponse { ok, data, error } = self.exchange(&ControlRequest { cmd })?;
        if !ok {
            let reason = error.unwrap_or_else(|| format!("daemon refused {cmd:?}"));
            return Err(DaemonError::Protocol(reason));
        }
        Ok(data.unwrap_or(Value::Null))
    }

    /// [`call`](Self::call), retried while the socket is not accepting yet.
    pub fn call_when_ready(
        &self,
        cmd: ControlCommand,
        attempts: u32,
        pause: Duration,
    ) -> Result<Value, DaemonError> {
        let mut remaining = attempts.max(1);
        loop {
            remaining -= 1;
            match self.call(cmd) {
                Err(DaemonError::DaemonNotRunning { .. }) if remaining > 0 => sleep(pause),
                outcome => return outcome,
            }
        }
    }

    /// Write one request line, read one response line.
    pub fn exchange(&self, request: &ControlRequest) -> Result<ControlResponse, DaemonError> {
        let mut stream = UnixStream::connect(self.socket).map_err(|err| match err.kind() {
            ErrorKind::NotFound | ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset => {
                DaemonError::DaemonNotRunning {
                    socket: self.socket.to_path_buf(),
                }
            }
            _ => io_err(self.socket, err),
        })?;

        let mut frame = serde_json::to_vec(request)?;
        frame.push(b'\n');
        stream.write_all(&frame).map_err(|e| io_err(self.socket, e))?;

        let mut reply = String::new();
        match BufReader::new(stream).read_line(&mut reply) {
            Ok(0) => Err(DaemonError::Protocol(format!(
                "no reply to {:?} before the daemon hung up",
                request.cmd
            ))),
            Ok(_) => Ok(serde_json::from_str(reply.trim_end())?),
            Err(err) => Err(io_err(self.socket, err)),
        }
    }
}

pub fn send_request(socket: &Path, request: &ControlRequest) -> Result<ControlResponse, DaemonError> {
    ControlClient::new(socket).exchange(request)
}

/// Status snapshot. Retries briefly so a daemon that is still binding its
/// socket is not reported as stopped.
pub fn request_status(socket: &Path) -> Result<Value, DaemonError> {
    ControlClient::new(socket).call_when_ready(
        ControlCommand::Status,
        STATUS_ATTEMPTS,
        STATUS_RETRY_PAUSE,
    )
}

pub fn request_rescan(socket: &Path) -> Result<Value, DaemonError> {
    ControlClient::new(socket).call(ControlCommand::Rescan)
}

pub fn request_stop(socket: &Path) -> Result<(), DaemonError> {
    ControlClient::new(socket).call(ControlCommand::Stop).map(drop)
}
