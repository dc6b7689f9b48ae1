//! Client-side driver for the task-offload wire protocol.
//!
//! Mirrors the server's framing exactly; the interactive menu that would sit
//! on top of this is out of scope, tests and embedding programs use it
//! directly.

use std::path::Path;

use bytes::Bytes;
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::errors::AppResult;
use crate::models::ServiceStatus;
use crate::protocol;

/// Outcome of an EXECUTE_TASK exchange as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Server rejected the request before reading the task: no valid session.
    Denied,
    /// Admission check failed: the task did not fit the memory budget.
    Rejected,
    /// The task ran; a failed job surfaces as an empty result.
    Completed(Bytes),
}

pub struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
}

impl Client {
    pub async fn connect(addr: impl ToSocketAddrs) -> AppResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
        })
    }

    pub async fn register(&mut self, username: &str, password: &str) -> AppResult<bool> {
        self.send_credentials(protocol::TAG_REGISTER, username, password)
            .await?;
        let reply = protocol::read_token(&mut self.reader).await?;
        Ok(reply == protocol::REGISTER_SUCCESS)
    }

    pub async fn login(&mut self, username: &str, password: &str) -> AppResult<bool> {
        self.send_credentials(protocol::TAG_LOGIN, username, password)
            .await?;
        let reply = protocol::read_token(&mut self.reader).await?;
        Ok(reply == protocol::LOGIN_SUCCESS)
    }

    async fn send_credentials(&mut self, tag: &str, username: &str, password: &str) -> AppResult<()> {
        protocol::write_token(&mut self.writer, tag).await?;
        protocol::write_token(&mut self.writer, username).await?;
        protocol::write_token(&mut self.writer, password).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Runs one task on the server, blocking until the result (or a
    /// rejection) comes back. The protocol is strictly request/response, so
    /// one task is in flight per connection at a time.
    pub async fn execute_task(&mut self, task: &[u8]) -> AppResult<TaskOutcome> {
        protocol::write_token(&mut self.writer, protocol::TAG_EXECUTE_TASK).await?;
        self.writer.flush().await?;

        if protocol::read_token(&mut self.reader).await? != protocol::VALID {
            return Ok(TaskOutcome::Denied);
        }

        protocol::write_payload(&mut self.writer, task).await?;
        self.writer.flush().await?;

        if !protocol::read_flag(&mut self.reader).await? {
            return Ok(TaskOutcome::Rejected);
        }

        let result = protocol::read_payload(&mut self.reader, u32::MAX as usize).await?;
        Ok(TaskOutcome::Completed(result))
    }

    /// Fetches the server's `(available_memory, pending_tasks)` snapshot.
    /// `None` means the session check failed.
    pub async fn query_status(&mut self) -> AppResult<Option<ServiceStatus>> {
        protocol::write_token(&mut self.writer, protocol::TAG_QUERY_STATUS).await?;
        self.writer.flush().await?;

        if protocol::read_token(&mut self.reader).await? != protocol::VALID {
            return Ok(None);
        }
        Ok(Some(protocol::read_status(&mut self.reader).await?))
    }

    /// Ends the session. On success the server closes the connection and this
    /// client is no longer usable.
    pub async fn logout(&mut self) -> AppResult<bool> {
        protocol::write_token(&mut self.writer, protocol::TAG_LOGOUT).await?;
        self.writer.flush().await?;
        Ok(protocol::read_token(&mut self.reader).await? == protocol::VALID)
    }
}

/// Task payloads are prepared as ordinary files; read one fully into memory.
pub async fn load_task_file(path: impl AsRef<Path>) -> AppResult<Vec<u8>> {
    Ok(tokio::fs::read(path).await?)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[tokio::test]
    async fn loads_task_bytes_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"task payload bytes").unwrap();

        let bytes = load_task_file(file.path()).await.unwrap();
        assert_eq!(bytes, b"task payload bytes");
    }
}
