use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tokio_util::codec::Encoder;
use tracing::{debug, info, warn};

use crate::core::{Config, Error, Result, MAX_PACKET_SIZE};
use crate::protocol::{Message, ProtocolConfig, StatusSnapshot, VcmCodec, VcmStateMachine};

/// Liveness datagrams recognized and dropped without reaching the state
/// machine (fixed patterns from the capture)
const LIVENESS_PACKETS: [&[u8]; 2] = [
    &[
        0xff, 0xff, 0xff, 0x01, 0x00, 0x00, 0x00, 0x0c, 0xff, 0x01, 0x06, 0x14, 0x02, 0x06, 0x01,
        0x00, 0x03, 0x00, 0x00, 0x00,
    ],
    &[
        0xff, 0xff, 0xff, 0x01, 0x00, 0x00, 0x00, 0x0c, 0xff, 0x01, 0x06, 0x32, 0x02, 0x06, 0x01,
        0x00, 0x01, 0x00, 0x00, 0x00,
    ],
];

/// Requests sent from handles into the simulator loop
enum Command {
    /// Send a raw payload to the current peer
    SendRaw(Vec<u8>),
    /// Read a status snapshot
    Status(oneshot::Sender<StatusSnapshot>),
}

/// Handle for external collaborators of a running simulator
#[derive(Clone)]
pub struct SimulatorHandle {
    command_tx: mpsc::Sender<Command>,
}

impl SimulatorHandle {
    /// Sends a raw hex payload to the current peer
    pub async fn send_raw_hex(&self, payload: &str) -> Result<()> {
        let bytes = hex::decode(payload)
            .map_err(|e| Error::protocol(format!("invalid hex payload: {}", e)))?;
        self.command_tx
            .send(Command::SendRaw(bytes))
            .await
            .map_err(|e| Error::network(format!("failed to queue payload: {}", e)))
    }

    /// Returns the simulator's current status snapshot
    pub async fn status(&self) -> Result<StatusSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(Command::Status(tx))
            .await
            .map_err(|e| Error::network(format!("failed to request status: {}", e)))?;
        rx.await
            .map_err(|e| Error::network(format!("simulator stopped: {}", e)))
    }
}

/// UDP transport adapter around the VCM state machine
///
/// One `select!` loop serializes inbound datagrams, the periodic tick, and
/// handle commands, so the state machine is never touched by two triggers
/// at once.
pub struct Simulator {
    /// UDP socket bound at construction
    socket: Arc<UdpSocket>,
    /// The protocol engine
    machine: VcmStateMachine,
    /// Wire codec for outbound messages
    codec: VcmCodec,
    /// Last observed sender, target for all sends once known
    peer_addr: Option<SocketAddr>,
    /// Fallback target until a peer has been observed
    default_peer_addr: SocketAddr,
    /// Period of the tick timer
    tick_interval: Duration,
    /// Channel for handle commands
    command_tx: mpsc::Sender<Command>,
    command_rx: mpsc::Receiver<Command>,
}

impl Simulator {
    /// Creates a new simulator bound to the configured address
    pub async fn new(config: Config) -> Result<Self> {
        let socket = UdpSocket::bind(config.bind_addr)
            .await
            .map_err(|e| Error::network(format!("failed to bind {}: {}", config.bind_addr, e)))?;

        let local_addr = socket.local_addr().map_err(Error::Io)?;
        info!("VCM simulator listening on {}", local_addr);

        let protocol_config = ProtocolConfig {
            broadcast_interval: config.broadcast_interval,
            wifi_ssid: config.wifi_ssid.clone(),
            ..ProtocolConfig::default()
        };

        let (command_tx, command_rx) = mpsc::channel(100);

        Ok(Simulator {
            socket: Arc::new(socket),
            machine: VcmStateMachine::new(protocol_config),
            codec: VcmCodec::new(),
            peer_addr: None,
            default_peer_addr: config.default_peer_addr,
            tick_interval: config.tick_interval,
            command_tx,
            command_rx,
        })
    }

    /// Returns a handle for sending payloads and reading status
    pub fn handle(&self) -> SimulatorHandle {
        SimulatorHandle {
            command_tx: self.command_tx.clone(),
        }
    }

    /// Returns the local socket address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .map_err(|e| Error::network(format!("failed to get local address: {}", e)))
    }

    /// Runs the simulator until the process shuts down
    pub async fn run(mut self) -> Result<()> {
        let mut recv_buf = [0u8; MAX_PACKET_SIZE];
        let mut ticker = interval(self.tick_interval);
        let socket = Arc::clone(&self.socket);
        let mut command_rx = std::mem::replace(&mut self.command_rx, mpsc::channel(1).1);

        loop {
            tokio::select! {
                result = socket.recv_from(&mut recv_buf) => {
                    match result {
                        Ok((size, addr)) => self.handle_datagram(&recv_buf[..size], addr).await,
                        Err(e) => warn!("recv failed: {}", e),
                    }
                }

                _ = ticker.tick() => {
                    for msg in self.machine.tick() {
                        self.send_message(msg).await;
                    }
                }

                Some(command) = command_rx.recv() => {
                    self.handle_command(command).await;
                }
            }
        }
    }

    /// Handles one inbound datagram
    async fn handle_datagram(&mut self, payload: &[u8], addr: SocketAddr) {
        // Remember the sender for all subsequent sends
        self.peer_addr = Some(addr);

        if LIVENESS_PACKETS.iter().any(|p| *p == payload) {
            debug!("ignoring liveness packet from {}", addr);
            return;
        }

        debug!("received {} bytes from {}", payload.len(), addr);

        for msg in self.machine.process_inbound(payload) {
            self.send_message(msg).await;
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::SendRaw(bytes) => self.send_bytes(&bytes).await,
            Command::Status(reply) => {
                let _ = reply.send(self.machine.status());
            }
        }
    }

    async fn send_message(&mut self, msg: Message) {
        debug!("send {}", msg);

        let mut buf = BytesMut::new();
        if let Err(e) = self.codec.encode(msg, &mut buf) {
            warn!("failed to encode message: {}", e);
            return;
        }
        self.send_bytes(&buf).await;
    }

    /// Sends a payload to the remembered peer, or the configured default
    async fn send_bytes(&mut self, payload: &[u8]) {
        let target = self.peer_addr.unwrap_or(self.default_peer_addr);
        if let Err(e) = self.socket.send_to(payload, target).await {
            warn!("failed to send to {}: {}", target, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    async fn start_simulator() -> (SocketAddr, SimulatorHandle, UdpSocket) {
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let config = Config {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            default_peer_addr: client.local_addr().unwrap(),
            ..Config::default()
        };

        let simulator = Simulator::new(config).await.unwrap();
        let addr = simulator.local_addr().unwrap();
        let handle = simulator.handle();

        tokio::spawn(async move {
            simulator.run().await.unwrap();
        });

        (addr, handle, client)
    }

    async fn recv_hex(client: &UdpSocket) -> String {
        let mut buf = [0u8; MAX_PACKET_SIZE];
        let (size, _) = timeout(Duration::from_secs(1), client.recv_from(&mut buf))
            .await
            .expect("expected a datagram")
            .unwrap();
        hex::encode(&buf[..size])
    }

    #[tokio::test]
    async fn test_ping_gets_ack_and_response() {
        let (addr, _handle, client) = start_simulator().await;

        let ping = hex::decode("00a4040d00000008a40d002802000000").unwrap();
        client.send_to(&ping, addr).await.unwrap();

        // ACK first, then the status response
        let ack = recv_hex(&client).await;
        assert!(ack.ends_with("02700000"));

        let response = recv_hex(&client).await;
        let msg = Message::from_hex(&response).unwrap();
        assert!(msg.is_response());
        assert_eq!(msg.sequence, 0x28);
    }

    #[tokio::test]
    async fn test_liveness_packets_dropped() {
        let (addr, handle, client) = start_simulator().await;

        for packet in LIVENESS_PACKETS {
            client.send_to(packet, addr).await.unwrap();
        }

        // No reply, no state machine involvement
        let mut buf = [0u8; MAX_PACKET_SIZE];
        assert!(
            timeout(Duration::from_millis(200), client.recv_from(&mut buf))
                .await
                .is_err()
        );

        let status = handle.status().await.unwrap();
        assert_eq!(status.state, "Idle");
    }

    #[tokio::test]
    async fn test_malformed_datagram_ignored() {
        let (addr, handle, client) = start_simulator().await;

        client.send_to(&[0x00, 0xa4, 0x04], addr).await.unwrap();

        let mut buf = [0u8; MAX_PACKET_SIZE];
        assert!(
            timeout(Duration::from_millis(200), client.recv_from(&mut buf))
                .await
                .is_err()
        );

        let status = handle.status().await.unwrap();
        assert_eq!(status.state, "Idle");
    }

    #[tokio::test]
    async fn test_status_snapshot_tracks_handshake() {
        let (addr, handle, client) = start_simulator().await;

        let status = handle.status().await.unwrap();
        assert_eq!(status.state, "Idle");
        assert!(!status.wifi_connected);

        client
            .send_to(
                &hex::decode("00a4040d00000008a40d002802000000").unwrap(),
                addr,
            )
            .await
            .unwrap();
        client
            .send_to(
                &hex::decode("00a3030f00000008a30f002902000000").unwrap(),
                addr,
            )
            .await
            .unwrap();

        // Drain the two ACK/response pairs
        for _ in 0..4 {
            recv_hex(&client).await;
        }

        let status = handle.status().await.unwrap();
        assert_eq!(status.state, "Handshake");
    }

    #[tokio::test]
    async fn test_send_raw_hex_to_default_peer() {
        let (_addr, handle, client) = start_simulator().await;

        // No peer observed yet, falls back to the configured default
        handle.send_raw_hex("deadbeef").await.unwrap();

        let payload = recv_hex(&client).await;
        assert_eq!(payload, "deadbeef");
    }

    #[tokio::test]
    async fn test_send_raw_hex_rejects_bad_hex() {
        let (_addr, handle, _client) = start_simulator().await;

        assert!(handle.send_raw_hex("not-hex").await.is_err());
    }
}
