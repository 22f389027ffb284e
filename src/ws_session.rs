//! WebSocket (control-plane) session (C9): one task per accepted TCP
//! socket, framing each JSON request/response with a 4-byte little-endian
//! length prefix (legacy framing, chosen over an RFC6455 upgrade).
//!
//! Framing is grounded on the reference codebase's `SovaClient::send`/`read`
//! in `core/src/server/client.rs` (length-prefixed frame shape), with two
//! departures: the length prefix here is little-endian rather than the
//! reference's big-endian, and the compression high-bit flag is dropped
//! since plain JSON frames are all that's needed.

use crate::dispatcher::Dispatcher;
use crate::error::{CloseReason, HubError};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Idle read deadline before a retry is counted.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(20);
/// Number of consecutive idle timeouts tolerated before the socket closes.
pub const DEFAULT_MAX_RETRIES: u32 = 6;

/// Maximum frame length accepted, guarding against a corrupt/hostile length
/// prefix forcing an unbounded allocation.
const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Runs one session to completion: reads length-prefixed JSON frames,
/// dispatches each to `dispatcher`, and writes the JSON response back as
/// one frame. Returns when the peer closes or an unrecoverable error
/// forces the socket shut.
pub async fn run_session(mut socket: TcpStream, dispatcher: Arc<Dispatcher>) {
    let mut retries = 0u32;
    loop {
        let frame = match timeout(DEFAULT_READ_TIMEOUT, read_frame(&mut socket)).await {
            Ok(Ok(Some(bytes))) => bytes,
            Ok(Ok(None)) => {
                crate::log_println!("[ws] peer closed connection");
                return;
            }
            Ok(Err(close_reason)) => {
                send_close(&mut socket, close_reason).await;
                return;
            }
            Err(_elapsed) => {
                retries += 1;
                if retries > DEFAULT_MAX_RETRIES {
                    crate::log_eprintln!("[ws] idle read timeout retries exhausted, closing");
                    send_close(&mut socket, CloseReason::GoingAway).await;
                    return;
                }
                continue;
            }
        };
        retries = 0;

        let response = match serde_json::from_slice::<Value>(&frame) {
            Ok(request) => dispatcher.process(&request),
            Err(e) => HubError::InvalidJson(e.to_string()).to_json(),
        };

        if let Err(e) = write_frame(&mut socket, &response).await {
            crate::log_eprintln!("[ws] failed to write response frame: {e}");
            return;
        }
    }
}

/// Reads one length-prefixed frame. `Ok(None)` means the peer closed
/// cleanly at a frame boundary (EOF on the length prefix).
async fn read_frame(socket: &mut TcpStream) -> Result<Option<Vec<u8>>, CloseReason> {
    let mut len_buf = [0u8; 4];
    match socket.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => {
            crate::log_eprintln!("[ws] failed to read frame length: {e}");
            return Err(CloseReason::BadPayload);
        }
    }
    let len = u32::from_le_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        crate::log_eprintln!("[ws] frame length {len} exceeds maximum, closing");
        return Err(CloseReason::BadPayload);
    }
    let mut buf = vec![0u8; len as usize];
    if let Err(e) = socket.read_exact(&mut buf).await {
        crate::log_eprintln!("[ws] failed to read frame body: {e}");
        return Err(CloseReason::BadPayload);
    }
    Ok(Some(buf))
}

async fn write_frame(socket: &mut TcpStream, value: &Value) -> std::io::Result<()> {
    let bytes = serde_json::to_vec(value).unwrap_or_else(|_| b"{}".to_vec());
    let len = bytes.len() as u32;
    socket.write_all(&len.to_le_bytes()).await?;
    socket.write_all(&bytes).await?;
    Ok(())
}

async fn send_close(socket: &mut TcpStream, reason: CloseReason) {
    let payload = serde_json::json!({ "error": reason.as_str() });
    let _ = write_frame(socket, &payload).await;
    let _ = socket.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_length_prefix_is_little_endian_u32() {
        let len: u32 = 42;
        assert_eq!(len.to_le_bytes(), [42, 0, 0, 0]);
    }
}
