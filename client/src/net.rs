//! UDP transport for the client: a single socket to the host plus a
//! headless terminal front end.
//!
//! A sender task drains the outgoing queue while the main loop
//! multiplexes incoming datagrams, stdin commands, a status interval,
//! and ctrl-c. The core only runs on the main task.

use crate::client::{ClientState, NetworkingClient};
use log::{error, info, warn};
use shared::error::NetError;
use shared::protocol::{self, WireMessage};
use shared::transport::ClientTransport;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::interval;

/// [`ClientTransport`] backed by the sender task's outgoing queue.
pub struct UdpClientTransport {
    out_tx: mpsc::UnboundedSender<WireMessage>,
}

impl ClientTransport for UdpClientTransport {
    fn send(&mut self, message: &WireMessage) -> Result<(), NetError> {
        self.out_tx
            .send(message.clone())
            .map_err(|e| NetError::TransportSend(e.to_string()))
    }
}

/// UDP front end owning the socket and the outgoing queue.
pub struct ClientConnection {
    socket: Arc<UdpSocket>,
    out_tx: mpsc::UnboundedSender<WireMessage>,
    out_rx: mpsc::UnboundedReceiver<WireMessage>,
}

impl ClientConnection {
    pub async fn connect(server: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind("0.0.0.0:0").await?);
        socket.connect(server).await?;
        info!("connecting to {}", server);

        let (out_tx, out_rx) = mpsc::unbounded_channel();

        Ok(Self {
            socket,
            out_tx,
            out_rx,
        })
    }

    /// Transport handle to hand to [`NetworkingClient`].
    pub fn transport(&self) -> UdpClientTransport {
        UdpClientTransport {
            out_tx: self.out_tx.clone(),
        }
    }

    /// Spawns the task that drains the outgoing queue.
    fn spawn_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut out_rx = std::mem::replace(&mut self.out_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                match protocol::encode(&message) {
                    Ok(bytes) => {
                        if let Err(e) = socket.send(&bytes).await {
                            error!("failed to send to host: {}", e);
                        }
                    }
                    Err(e) => error!("failed to encode outgoing message: {}", e),
                }
            }
        });
    }

    /// Main loop. Stdin drives key events (`down <code>`, `up <code>`,
    /// `quit`); the status interval logs the mirrored entity set once a
    /// second so a headless run stays observable.
    pub async fn run(
        mut self,
        mut client: NetworkingClient,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_sender();
        client.connect()?;

        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        let mut status = interval(Duration::from_secs(1));
        let mut buffer = [0u8; 65536];

        loop {
            tokio::select! {
                received = self.socket.recv(&mut buffer) => {
                    match received {
                        Ok(len) => match protocol::decode(&buffer[..len]) {
                            Ok(message) => client.on_message(message)?,
                            Err(_) => warn!("failed to decode datagram from host"),
                        },
                        Err(e) => {
                            error!("socket error: {}", e);
                            break;
                        }
                    }
                    if client.state() == ClientState::Error {
                        error!("rejected by host, giving up");
                        break;
                    }
                },

                line = stdin.next_line() => {
                    match line? {
                        Some(line) => {
                            if !self.handle_command(&mut client, line.trim()) {
                                break;
                            }
                        }
                        None => break,
                    }
                },

                _ = status.tick() => {
                    log_status(&client);
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("interrupted");
                    break;
                },
            }
        }

        // Best effort; the host's inactivity timeout covers the rest.
        let _ = self.out_tx.send(WireMessage::Leave);
        client.on_disconnected();
        Ok(())
    }

    /// Returns false when the loop should stop.
    fn handle_command(&self, client: &mut NetworkingClient, line: &str) -> bool {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("quit"), _) => return false,
            (Some("down"), Some(code)) => match code.parse::<u32>() {
                Ok(code) => client.key_down(code),
                Err(_) => warn!("not a key code: {}", code),
            },
            (Some("up"), Some(code)) => match code.parse::<u32>() {
                Ok(code) => client.key_up(code),
                Err(_) => warn!("not a key code: {}", code),
            },
            (None, _) => {}
            _ => warn!("unknown command: {} (try 'down <code>', 'up <code>', 'quit')", line),
        }
        true
    }
}

fn log_status(client: &NetworkingClient) {
    let mut ids: Vec<String> = client.base().ids().iter().map(|id| id.to_string()).collect();
    ids.sort();
    info!(
        "state={:?} player={:?} clock={} entities=[{}]",
        client.state(),
        client.player_id(),
        client.high_water(),
        ids.join(", ")
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transport_queues_outgoing_messages() {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let mut transport = UdpClientTransport { out_tx };

        transport.send(&WireMessage::Join).unwrap();
        transport.send(&WireMessage::KeyDown { key_code: 37 }).unwrap();

        assert!(matches!(out_rx.recv().await, Some(WireMessage::Join)));
        assert!(matches!(
            out_rx.recv().await,
            Some(WireMessage::KeyDown { key_code: 37 })
        ));
    }

    #[tokio::test]
    async fn test_send_after_queue_closed_is_transport_error() {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        drop(out_rx);
        let mut transport = UdpClientTransport { out_tx };

        let result = transport.send(&WireMessage::Leave);
        assert!(matches!(result, Err(NetError::TransportSend(_))));
    }

    #[tokio::test]
    async fn test_connect_binds_an_ephemeral_socket() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        let connection = ClientConnection::connect(&addr.to_string()).await.unwrap();
        connection.socket.send(b"probe").await.unwrap();

        let mut buffer = [0u8; 16];
        let (len, _) = server.recv_from(&mut buffer).await.unwrap();
        assert_eq!(&buffer[..len], b"probe");
    }
}
