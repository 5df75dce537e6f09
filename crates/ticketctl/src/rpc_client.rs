//! RPC Client - Unix socket client for communicating with ticketd

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;

use ticket_common::ipc::{Request, Response, DEFAULT_SOCKET_PATH, SOCKET_ENV};

const CALL_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RpcClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl RpcClient {
    /// Discover socket path with fallback chain
    ///
    /// Priority:
    /// 1. Explicit --socket flag
    /// 2. $TICKETD_SOCKET environment variable
    /// 3. /run/ticketd/ticketd.sock
    pub fn discover_socket_path(explicit_path: Option<&str>) -> String {
        if let Some(path) = explicit_path {
            return path.to_string();
        }
        if let Ok(path) = std::env::var(SOCKET_ENV) {
            return path;
        }
        DEFAULT_SOCKET_PATH.to_string()
    }

    pub async fn connect(socket_path: Option<&str>) -> Result<Self> {
        let path = Self::discover_socket_path(socket_path);
        let stream = UnixStream::connect(&path)
            .await
            .map_err(|e| Self::socket_error_with_hint(&path, e))?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
        })
    }

    fn socket_error_with_hint(path: &str, error: std::io::Error) -> anyhow::Error {
        use std::io::ErrorKind;

        let hint = match error.kind() {
            ErrorKind::NotFound => format!("Socket not found at {}. Is ticketd running?", path),
            ErrorKind::PermissionDenied => format!(
                "Permission denied on {}. Your user needs access to the ticketd socket group.",
                path
            ),
            ErrorKind::ConnectionRefused => format!(
                "ticketd not responding on {}. The socket exists but nothing is accepting connections.",
                path
            ),
            _ => format!("Failed to connect to ticketd at {}", path),
        };

        anyhow::Error::new(error).context(hint)
    }

    /// Send one request and wait for its response
    pub async fn call(&mut self, request: &Request) -> Result<Response> {
        tokio::time::timeout(CALL_TIMEOUT, self.call_inner(request))
            .await
            .context("Timed out waiting for ticketd")?
    }

    async fn call_inner(&mut self, request: &Request) -> Result<Response> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        self.writer
            .write_all(line.as_bytes())
            .await
            .context("Failed to send request")?;

        let mut reply = String::new();
        let read = self
            .reader
            .read_line(&mut reply)
            .await
            .context("Failed to read response")?;
        if read == 0 {
            anyhow::bail!("ticketd closed the connection");
        }
        serde_json::from_str(&reply).context("Malformed response from ticketd")
    }
}
