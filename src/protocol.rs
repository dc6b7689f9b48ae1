//! Wire codec for the task-offload protocol.
//!
//! Everything travels over a plain TCP stream. String tokens are a 2-byte
//! big-endian length followed by UTF-8 bytes, binary payloads are a 4-byte
//! big-endian length followed by that many bytes, booleans are a single byte.
//! The status snapshot is two 4-byte big-endian integers, memory first.

use std::io;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::models::ServiceStatus;

// Request tags sent by clients.
pub const TAG_REGISTER: &str = "REGISTER";
pub const TAG_LOGIN: &str = "LOGIN";
pub const TAG_EXECUTE_TASK: &str = "EXECUTE_TASK";
pub const TAG_QUERY_STATUS: &str = "QUERY_STATUS";
pub const TAG_LOGOUT: &str = "LOGOUT";

// Response tokens sent by the server.
pub const REGISTER_SUCCESS: &str = "REGISTER_SUCCESS";
pub const REGISTER_FAILURE: &str = "REGISTER_FAILURE";
pub const LOGIN_SUCCESS: &str = "LOGIN_SUCCESS";
pub const LOGIN_FAILURE: &str = "LOGIN_FAILURE";

// Session-check markers preceding every steady-state response.
pub const VALID: &str = "VALID";
pub const INVALID: &str = "INVALID";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Register,
    Login,
    ExecuteTask,
    QueryStatus,
    Logout,
}

impl Request {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            TAG_REGISTER => Some(Self::Register),
            TAG_LOGIN => Some(Self::Login),
            TAG_EXECUTE_TASK => Some(Self::ExecuteTask),
            TAG_QUERY_STATUS => Some(Self::QueryStatus),
            TAG_LOGOUT => Some(Self::Logout),
            _ => None,
        }
    }
}

pub async fn read_token<R>(reader: &mut R) -> io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u16().await? as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

pub async fn write_token<W>(writer: &mut W, token: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let bytes = token.as_bytes();
    if bytes.len() > u16::MAX as usize {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "token too long"));
    }
    writer.write_u16(bytes.len() as u16).await?;
    writer.write_all(bytes).await
}

/// Reads a length-prefixed binary payload. A length above `max_len` means the
/// stream cannot be trusted (or resynchronized) and is reported as
/// `InvalidData`; callers drop the connection on it.
pub async fn read_payload<R>(reader: &mut R, max_len: usize) -> io::Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await? as usize;
    if len > max_len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("payload length {} exceeds maximum {}", len, max_len),
        ));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(Bytes::from(buf))
}

pub async fn write_payload<W>(writer: &mut W, payload: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "payload too long"))?;
    writer.write_u32(len).await?;
    writer.write_all(payload).await
}

pub async fn read_flag<R>(reader: &mut R) -> io::Result<bool>
where
    R: AsyncRead + Unpin,
{
    Ok(reader.read_u8().await? != 0)
}

pub async fn write_flag<W>(writer: &mut W, flag: bool) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_u8(flag as u8).await
}

pub async fn read_status<R>(reader: &mut R) -> io::Result<ServiceStatus>
where
    R: AsyncRead + Unpin,
{
    let available_memory = reader.read_u32().await? as u64;
    let pending_tasks = reader.read_u32().await? as u64;
    Ok(ServiceStatus {
        available_memory,
        pending_tasks,
    })
}

pub async fn write_status<W>(writer: &mut W, status: &ServiceStatus) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_u32(clamp_u32(status.available_memory)).await?;
    writer.write_u32(clamp_u32(status.pending_tasks)).await
}

// The wire carries 4-byte counters while the ledger is 64-bit internally.
fn clamp_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn token_round_trip() {
        let (mut client, mut server) = tokio::io::duplex(256);
        write_token(&mut client, TAG_REGISTER).await.unwrap();
        write_token(&mut client, "alice").await.unwrap();
        assert_eq!(read_token(&mut server).await.unwrap(), "REGISTER");
        assert_eq!(read_token(&mut server).await.unwrap(), "alice");
    }

    #[tokio::test]
    async fn payload_round_trip_including_empty() {
        let (mut client, mut server) = tokio::io::duplex(256);
        write_payload(&mut client, b"task-bytes").await.unwrap();
        write_payload(&mut client, b"").await.unwrap();
        assert_eq!(
            read_payload(&mut server, 1024).await.unwrap(),
            Bytes::from_static(b"task-bytes")
        );
        assert!(read_payload(&mut server, 1024).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn oversized_payload_length_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(256);
        client.write_u32(10_000).await.unwrap();
        let err = read_payload(&mut server, 64).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn invalid_utf8_token_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(256);
        client.write_u16(2).await.unwrap();
        client.write_all(&[0xff, 0xfe]).await.unwrap();
        let err = read_token(&mut server).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn status_clamps_to_wire_width() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let status = ServiceStatus {
            available_memory: u64::from(u32::MAX) + 10,
            pending_tasks: 3,
        };
        write_status(&mut client, &status).await.unwrap();
        let read = read_status(&mut server).await.unwrap();
        assert_eq!(read.available_memory, u64::from(u32::MAX));
        assert_eq!(read.pending_tasks, 3);
    }
}
