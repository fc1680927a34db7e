//! UDP transport for the host: multiplexes N peers behind stable peer
//! ids and drives the main event loop.
//!
//! Task layout: a receiver task decodes datagrams into an mpsc channel,
//! a sender task drains the outgoing queue, a timeout checker
//! synthesizes disconnects for silent peers, and the main loop
//! multiplexes network events with the tick interval. UDP has no
//! connection notion, so `join`/`leave` datagrams plus the inactivity
//! timeout stand in for connect/disconnect events.

use crate::host::NetworkingHost;
use log::{debug, error, info, warn};
use shared::error::NetError;
use shared::protocol::{self, WireMessage};
use shared::transport::{HostTransport, PeerId};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};

const PEER_TIMEOUT: Duration = Duration::from_secs(5);

/// Messages sent from network tasks to the main loop.
#[derive(Debug)]
pub enum NetMessage {
    Datagram {
        message: WireMessage,
        addr: SocketAddr,
    },
    PeerTimeout {
        peer: PeerId,
    },
}

/// Messages queued from the core to the sender task.
#[derive(Debug)]
pub enum Outgoing {
    Send { peer: PeerId, message: WireMessage },
    Broadcast { message: WireMessage },
    Drop { peer: PeerId },
}

#[derive(Debug)]
struct PeerLink {
    addr: SocketAddr,
    last_seen: Instant,
}

/// Address <-> peer id table behind the UDP socket.
///
/// Peer ids are assigned once per connection and never reused within a
/// session, so a reconnecting address gets a fresh id.
pub struct PeerTable {
    peers: HashMap<PeerId, PeerLink>,
    by_addr: HashMap<SocketAddr, PeerId>,
    next_peer_id: u64,
}

impl PeerTable {
    pub fn new() -> Self {
        Self {
            peers: HashMap::new(),
            by_addr: HashMap::new(),
            next_peer_id: 1,
        }
    }

    pub fn register(&mut self, addr: SocketAddr) -> PeerId {
        let peer = PeerId(self.next_peer_id);
        self.next_peer_id += 1;
        self.peers.insert(
            peer,
            PeerLink {
                addr,
                last_seen: Instant::now(),
            },
        );
        self.by_addr.insert(addr, peer);
        info!("{} registered from {}", peer, addr);
        peer
    }

    pub fn remove(&mut self, peer: PeerId) -> bool {
        match self.peers.remove(&peer) {
            Some(link) => {
                self.by_addr.remove(&link.addr);
                true
            }
            None => false,
        }
    }

    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<PeerId> {
        self.by_addr.get(&addr).copied()
    }

    pub fn addr_of(&self, peer: PeerId) -> Option<SocketAddr> {
        self.peers.get(&peer).map(|link| link.addr)
    }

    /// Marks a peer as recently active.
    pub fn touch(&mut self, peer: PeerId) {
        if let Some(link) = self.peers.get_mut(&peer) {
            link.last_seen = Instant::now();
        }
    }

    /// Removes and returns every peer silent longer than `timeout`.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<PeerId> {
        let timed_out: Vec<PeerId> = self
            .peers
            .iter()
            .filter(|(_, link)| link.last_seen.elapsed() > timeout)
            .map(|(peer, _)| *peer)
            .collect();
        for peer in &timed_out {
            self.remove(*peer);
        }
        timed_out
    }

    pub fn addrs(&self) -> Vec<(PeerId, SocketAddr)> {
        self.peers
            .iter()
            .map(|(peer, link)| (*peer, link.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

impl Default for PeerTable {
    fn default() -> Self {
        Self::new()
    }
}

/// [`HostTransport`] backed by the sender task's outgoing queue.
pub struct UdpHostTransport {
    out_tx: mpsc::UnboundedSender<Outgoing>,
}

impl HostTransport for UdpHostTransport {
    fn send(&mut self, peer: PeerId, message: &WireMessage) -> Result<(), NetError> {
        self.out_tx
            .send(Outgoing::Send {
                peer,
                message: message.clone(),
            })
            .map_err(|e| NetError::TransportSend(e.to_string()))
    }

    fn broadcast(&mut self, message: &WireMessage) {
        if self
            .out_tx
            .send(Outgoing::Broadcast {
                message: message.clone(),
            })
            .is_err()
        {
            error!("outgoing queue closed, broadcast dropped");
        }
    }

    fn disconnect(&mut self, peer: PeerId) {
        let _ = self.out_tx.send(Outgoing::Drop { peer });
    }
}

/// UDP front end coordinating the socket tasks and the tick loop.
pub struct HostServer {
    socket: Arc<UdpSocket>,
    peers: Arc<RwLock<PeerTable>>,
    tick_duration: Duration,

    net_tx: mpsc::UnboundedSender<NetMessage>,
    net_rx: mpsc::UnboundedReceiver<NetMessage>,
    out_tx: mpsc::UnboundedSender<Outgoing>,
    out_rx: mpsc::UnboundedReceiver<Outgoing>,
}

impl HostServer {
    pub async fn bind(
        addr: &str,
        tick_duration: Duration,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("host listening on {}", addr);

        let (net_tx, net_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        Ok(Self {
            socket,
            peers: Arc::new(RwLock::new(PeerTable::new())),
            tick_duration,
            net_tx,
            net_rx,
            out_tx,
            out_rx,
        })
    }

    /// Transport handle to hand to [`NetworkingHost`].
    pub fn transport(&self) -> UdpHostTransport {
        UdpHostTransport {
            out_tx: self.out_tx.clone(),
        }
    }

    /// Spawns the task that continuously decodes incoming datagrams.
    fn spawn_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let net_tx = self.net_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 65536];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match protocol::decode(&buffer[..len]) {
                        Ok(message) => {
                            if net_tx
                                .send(NetMessage::Datagram { message, addr })
                                .is_err()
                            {
                                break;
                            }
                        }
                        Err(_) => warn!("failed to decode datagram from {}", addr),
                    },
                    Err(e) => {
                        error!("error receiving datagram: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns the task that drains the outgoing queue.
    fn spawn_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let peers = Arc::clone(&self.peers);
        let mut out_rx = std::mem::replace(&mut self.out_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(outgoing) = out_rx.recv().await {
                match outgoing {
                    Outgoing::Send { peer, message } => {
                        let addr = { peers.read().await.addr_of(peer) };
                        match addr {
                            Some(addr) => send_datagram(&socket, &message, addr).await,
                            None => debug!("dropped send to vanished {}", peer),
                        }
                    }
                    Outgoing::Broadcast { message } => {
                        let addrs = { peers.read().await.addrs() };
                        for (_, addr) in addrs {
                            send_datagram(&socket, &message, addr).await;
                        }
                    }
                    Outgoing::Drop { peer } => {
                        let removed = { peers.write().await.remove(peer) };
                        if removed {
                            info!("closed connection to {}", peer);
                        }
                    }
                }
            }
        });
    }

    /// Spawns the task that synthesizes disconnects for silent peers.
    fn spawn_timeout_checker(&self) {
        let peers = Arc::clone(&self.peers);
        let net_tx = self.net_tx.clone();

        tokio::spawn(async move {
            let mut check = interval(Duration::from_secs(1));

            loop {
                check.tick().await;

                let timed_out = { peers.write().await.check_timeouts(PEER_TIMEOUT) };
                for peer in timed_out {
                    if net_tx.send(NetMessage::PeerTimeout { peer }).is_err() {
                        return;
                    }
                }
            }
        });
    }

    async fn handle_datagram(
        &self,
        host: &mut NetworkingHost,
        message: WireMessage,
        addr: SocketAddr,
    ) {
        match message {
            WireMessage::Join => {
                let (stale, peer) = {
                    let mut peers = self.peers.write().await;
                    let stale = peers.find_by_addr(addr);
                    if let Some(stale) = stale {
                        peers.remove(stale);
                    }
                    (stale, peers.register(addr))
                };
                // A join from a known address replaces the old
                // connection, like a reconnect after a crash.
                if let Some(stale) = stale {
                    host.on_peer_disconnected(stale);
                }
                host.on_peer_connected(peer);
            }
            WireMessage::Leave => {
                let peer = {
                    let mut peers = self.peers.write().await;
                    let peer = peers.find_by_addr(addr);
                    if let Some(peer) = peer {
                        peers.remove(peer);
                    }
                    peer
                };
                match peer {
                    Some(peer) => host.on_peer_disconnected(peer),
                    None => debug!("leave from unknown address {}", addr),
                }
            }
            other => {
                let peer = {
                    let mut peers = self.peers.write().await;
                    let peer = peers.find_by_addr(addr);
                    if let Some(peer) = peer {
                        peers.touch(peer);
                    }
                    peer
                };
                match peer {
                    Some(peer) => host.on_peer_message(peer, other),
                    None => warn!("datagram from unknown address {}", addr),
                }
            }
        }
    }

    /// Main loop: delivers transport events between ticks and runs the
    /// gameplay closure plus the host's end-of-tick broadcast on every
    /// tick. Only this task touches the host, which keeps all live
    /// table access single-writer.
    pub async fn run<F>(
        mut self,
        mut host: NetworkingHost,
        mut per_tick: F,
    ) -> Result<(), Box<dyn std::error::Error>>
    where
        F: FnMut(&mut NetworkingHost),
    {
        self.spawn_receiver();
        self.spawn_sender();
        self.spawn_timeout_checker();

        let mut tick = interval(self.tick_duration);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("host started");

        loop {
            tokio::select! {
                message = self.net_rx.recv() => {
                    match message {
                        Some(NetMessage::Datagram { message, addr }) => {
                            self.handle_datagram(&mut host, message, addr).await;
                        }
                        Some(NetMessage::PeerTimeout { peer }) => {
                            info!("{} timed out", peer);
                            host.on_peer_disconnected(peer);
                        }
                        None => {
                            info!("host shutting down");
                            break;
                        }
                    }
                },

                _ = tick.tick() => {
                    per_tick(&mut host);
                    host.tick()?;
                },
            }
        }

        Ok(())
    }
}

async fn send_datagram(socket: &UdpSocket, message: &WireMessage, addr: SocketAddr) {
    match protocol::encode(message) {
        Ok(bytes) => {
            if let Err(e) = socket.send_to(&bytes, addr).await {
                error!("failed to send to {}: {}", addr, e);
            }
        }
        Err(e) => error!("failed to encode outgoing message: {}", e),
    }
}
