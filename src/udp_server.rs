//! UDP/OSC server (C10): owns the receive socket and current outbound
//! destination, decodes inbound packets through the OSC codec, and emits a
//! fixed diagnostic reply.
//!
//! Socket handling is grounded on the reference codebase's `UdpSocket`
//! bind/`send_to` pattern in `core/src/protocol/osc.rs`, adapted to
//! `tokio::net::UdpSocket` for the async reactor this hub runs on.

use crate::msg::Msg;
use crate::osc_codec;
use crate::queue::LockedQueue;
use rosc::{OscMessage, OscPacket, OscType};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, Notify};

/// Default destination for outbound OSC.
pub fn default_dst() -> SocketAddr {
    "127.0.0.1:57120".parse().unwrap()
}

pub struct UdpServer {
    socket: UdpSocket,
    local_addr: SocketAddr,
    dst: Mutex<SocketAddr>,
    spi_in: Arc<LockedQueue<Msg>>,
    shutdown: Notify,
}

impl UdpServer {
    pub async fn bind(rcv_port: u16, dst: SocketAddr, spi_in: Arc<LockedQueue<Msg>>) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", rcv_port)).await?;
        let local_addr = socket.local_addr()?;
        Ok(UdpServer { socket, local_addr, dst: Mutex::new(dst), spi_in, shutdown: Notify::new() })
    }

    pub async fn set_dst(&self, dst: SocketAddr) {
        *self.dst.lock().await = dst;
    }

    /// Encodes `msg` and sends it to the current destination (used by the
    /// `oscInQ` drain worker).
    pub async fn send(&self, msg: &Msg) -> std::io::Result<()> {
        let Some(atom) = msg.as_midi_atom() else {
            return Ok(());
        };
        let Some(bytes) = osc_codec::encode_atom(atom) else {
            return Ok(());
        };
        let dst = *self.dst.lock().await;
        self.socket.send_to(&bytes, dst).await?;
        Ok(())
    }

    /// Cancels [`Self::run`] cleanly. The hub calls this from its
    /// `ctrl_c`/SIGTERM handler.
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }

    /// Runs the receive loop until shut down. Self-echoed datagrams
    /// (sender matches our own bound address) are discarded; everything
    /// else is decoded onto `spiInQ`, with a fixed diagnostic reply sent
    /// back to the sender.
    pub async fn run(&self) {
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    crate::log_println!("[udp] shutdown signal received, stopping receive loop");
                    return;
                }
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((n, sender)) => self.handle_datagram(&buf[..n], sender).await,
                        Err(e) => crate::log_eprintln!("[udp] recv_from failed: {e}"),
                    }
                }
            }
        }
    }

    async fn handle_datagram(&self, bytes: &[u8], sender: SocketAddr) {
        if sender == self.local_addr {
            return;
        }
        for msg in osc_codec::decode_packet(bytes) {
            self.spi_in.push_back(msg);
        }
        if let Some(reply) = diagnostic_reply() {
            if let Err(e) = self.socket.send_to(&reply, sender).await {
                crate::log_eprintln!("[udp] failed to send diagnostic reply: {e}");
            }
        }
    }
}

/// A fixed diagnostic OSC reply: a single `/diag/ack` message.
fn diagnostic_reply() -> Option<Vec<u8>> {
    let packet = OscPacket::Message(OscMessage { addr: "/diag/ack".to_string(), args: vec![OscType::Int(1)] });
    rosc::encoder::encode(&packet).ok()
}
