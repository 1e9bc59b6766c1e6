use std::collections::HashSet;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use super::message::{data, headers, subheaders, Message};

/// VCM operational states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcmState {
    /// Initial state, waiting for the IHU handshake pings
    Idle,
    /// Answering pings, watching for the setup trigger
    Handshake,
    /// Device-initiated multi-step setup exchange
    Setup,
    /// Periodically broadcasting SSID scan results
    WifiScanning,
    /// Connection sequence sent, awaiting IHU confirmation
    WifiConnecting,
    /// Connected, periodically broadcasting status
    WifiConnected,
}

impl VcmState {
    /// Returns the state name used in logs and status snapshots
    pub fn name(&self) -> &'static str {
        match self {
            VcmState::Idle => "Idle",
            VcmState::Handshake => "Handshake",
            VcmState::Setup => "Setup",
            VcmState::WifiScanning => "WifiScanning",
            VcmState::WifiConnecting => "WifiConnecting",
            VcmState::WifiConnected => "WifiConnected",
        }
    }
}

/// Protocol configuration
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    /// Interval between periodic status broadcasts
    pub broadcast_interval: Duration,
    /// SSID name reported in status snapshots
    pub wifi_ssid: String,
    /// First sequence number for VCM-initiated requests
    pub initial_sequence: u8,
    /// Distinct ping topics required before leaving Idle
    pub handshake_min_topics: usize,
    /// Combined ping count required before leaving Idle
    pub handshake_min_pings: u32,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        ProtocolConfig {
            broadcast_interval: Duration::from_secs(5),
            wifi_ssid: "testas".to_string(),
            // VCM-initiated sequences start around 0x50 in the capture
            initial_sequence: 0x50,
            handshake_min_topics: 2,
            handshake_min_pings: 2,
        }
    }
}

/// Mutable conversation state, one instance per simulated session
#[derive(Debug)]
struct VcmContext {
    /// Current operational state
    state: VcmState,
    /// Last nonzero sequence number observed from the IHU
    last_ihu_sequence: u8,
    /// Counter for VCM-initiated request sequences, wraps at 256
    next_vcm_sequence: u8,
    /// Setup sub-phase, 0 through 4
    setup_phase: u8,
    /// Message that triggered the setup sequence, answered on completion
    setup_trigger: Option<Message>,
    /// Configured SSID name
    wifi_ssid: String,
    /// Credential learned from the IHU
    wifi_password: String,
    /// Whether the simulated WiFi session is connected
    wifi_connected: bool,
    /// When the last periodic broadcast went out
    last_broadcast: Option<Instant>,
    /// Distinct ping topics seen while Idle
    handshake_topics_seen: HashSet<[u8; 3]>,
    /// Total pings seen while Idle
    handshake_ping_count: u32,
}

/// Point-in-time view of the conversation, for external status reads
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    /// Current state name
    pub state: &'static str,
    /// Whether the simulated WiFi session is connected
    pub wifi_connected: bool,
    /// Configured SSID name
    pub wifi_ssid: String,
}

/// VCM protocol state machine
///
/// Owns the conversation context and all behavioral logic: which messages
/// to emit in response to which inputs, and what to emit on a timer. The
/// caller is responsible for serializing calls to [`process_inbound`]
/// and [`tick`]; the machine itself holds no locks.
///
/// [`process_inbound`]: VcmStateMachine::process_inbound
/// [`tick`]: VcmStateMachine::tick
pub struct VcmStateMachine {
    ctx: VcmContext,
    config: ProtocolConfig,
}

impl Default for VcmStateMachine {
    fn default() -> Self {
        Self::new(ProtocolConfig::default())
    }
}

impl VcmStateMachine {
    /// Creates a new state machine in the Idle state
    pub fn new(config: ProtocolConfig) -> Self {
        VcmStateMachine {
            ctx: VcmContext {
                state: VcmState::Idle,
                last_ihu_sequence: 0,
                next_vcm_sequence: config.initial_sequence,
                setup_phase: 0,
                setup_trigger: None,
                wifi_ssid: config.wifi_ssid.clone(),
                wifi_password: String::new(),
                wifi_connected: false,
                last_broadcast: None,
                handshake_topics_seen: HashSet::new(),
                handshake_ping_count: 0,
            },
            config,
        }
    }

    /// Returns the current state
    pub fn state(&self) -> VcmState {
        self.ctx.state
    }

    /// Returns a snapshot of the conversation for status reads
    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            state: self.ctx.state.name(),
            wifi_connected: self.ctx.wifi_connected,
            wifi_ssid: self.ctx.wifi_ssid.clone(),
        }
    }

    /// Processes an inbound datagram and returns the messages to send
    ///
    /// Undecodable input and acknowledgments resolve to an empty result;
    /// neither is an error at this level. A message whose sequence is
    /// nonzero updates the remembered IHU sequence regardless of state.
    pub fn process_inbound(&mut self, payload: &[u8]) -> Vec<Message> {
        let msg = match Message::decode(payload) {
            Ok(msg) => msg,
            Err(e) => {
                debug!("discarding undecodable datagram: {}", e);
                return Vec::new();
            }
        };

        debug!(state = self.ctx.state.name(), "recv {}", msg);

        // ACKs never get a response, in any state
        if msg.is_ack() {
            return Vec::new();
        }

        if msg.sequence != 0 {
            self.ctx.last_ihu_sequence = msg.sequence;
        }

        match self.ctx.state {
            VcmState::Idle => self.handle_idle(&msg),
            VcmState::Handshake => self.handle_handshake(&msg),
            VcmState::Setup => self.handle_setup(&msg),
            VcmState::WifiScanning => self.handle_wifi_scanning(&msg),
            VcmState::WifiConnecting => self.handle_wifi_connecting(&msg),
            VcmState::WifiConnected => self.handle_wifi_connected(&msg),
        }
    }

    /// Processes a hex payload string, for the raw-hex send path
    pub fn process_hex(&mut self, payload: &str) -> Vec<Message> {
        match hex::decode(payload) {
            Ok(bytes) => self.process_inbound(&bytes),
            Err(e) => {
                debug!("discarding non-hex payload: {}", e);
                Vec::new()
            }
        }
    }

    /// Emits any due periodic broadcast
    ///
    /// Only WifiScanning and WifiConnected broadcast; at most one message
    /// per elapsed interval, after which the timer is re-armed.
    pub fn tick(&mut self) -> Vec<Message> {
        if !matches!(
            self.ctx.state,
            VcmState::WifiScanning | VcmState::WifiConnected
        ) {
            return Vec::new();
        }

        let due = self
            .ctx
            .last_broadcast
            .map_or(true, |t| t.elapsed() >= self.config.broadcast_interval);
        if !due {
            return Vec::new();
        }

        self.ctx.last_broadcast = Some(Instant::now());
        let payload = if self.ctx.state == VcmState::WifiConnected {
            data::SSID_CONNECTED
        } else {
            data::SSID_SCANNING
        };
        vec![Message::broadcast(
            headers::A4_04_0D,
            subheaders::WIFI_SCAN,
            payload,
        )]
    }

    /// Draws the next VCM-initiated sequence number
    fn next_sequence(&mut self) -> u8 {
        let seq = self.ctx.next_vcm_sequence;
        self.ctx.next_vcm_sequence = self.ctx.next_vcm_sequence.wrapping_add(1);
        seq
    }

    /// Builds a VCM-initiated request with a fresh sequence number
    fn next_request(
        &mut self,
        header: [u8; 7],
        subheader: [u8; 3],
        payload: &'static [u8],
    ) -> Message {
        let seq = self.next_sequence();
        Message::request(header, subheader, seq, payload)
    }

    /// Answers a handshake ping with an ACK and a status response
    ///
    /// Returns `None` for anything that is not one of the two known ping
    /// topics.
    fn answer_ping(&self, msg: &Message) -> Option<Vec<Message>> {
        let status = match msg.subheader {
            subheaders::PING_0D => data::RESPONSE_00,
            subheaders::PING_0F => data::RESPONSE_SHORT,
            _ => return None,
        };
        Some(vec![
            Message::ack_for(msg),
            Message::response_to(msg, status),
        ])
    }

    fn handle_idle(&mut self, msg: &Message) -> Vec<Message> {
        let Some(responses) = self.answer_ping(msg) else {
            return Vec::new();
        };

        self.ctx.handshake_topics_seen.insert(msg.subheader);
        self.ctx.handshake_ping_count += 1;

        if self.ctx.handshake_topics_seen.len() >= self.config.handshake_min_topics
            && self.ctx.handshake_ping_count >= self.config.handshake_min_pings
        {
            info!("handshake detected, entering Handshake state");
            self.ctx.state = VcmState::Handshake;
        }

        responses
    }

    fn handle_handshake(&mut self, msg: &Message) -> Vec<Message> {
        if let Some(responses) = self.answer_ping(msg) {
            return responses;
        }

        if msg.subheader == subheaders::SETUP_TRIGGER && msg.data == data::REQUEST_20 {
            info!("setup sequence triggered, entering Setup state");
            let mut responses = vec![Message::ack_for(msg)];

            // Kept to synthesize the completion response later
            self.ctx.setup_trigger = Some(msg.clone());
            self.ctx.state = VcmState::Setup;
            self.ctx.setup_phase = 0;

            responses.push(self.next_request(
                headers::A3_03_11,
                subheaders::SETUP_11,
                data::REQUEST_00,
            ));
            return responses;
        }

        Vec::new()
    }

    fn handle_setup(&mut self, msg: &Message) -> Vec<Message> {
        if !msg.is_response() {
            return Vec::new();
        }

        let mut responses = vec![Message::ack_for(msg)];

        // Phases advance on the topic the response addresses, guarded by
        // the expected phase so duplicates and out-of-order responses are
        // acknowledged but do not advance the sequence.
        match (msg.subheader, self.ctx.setup_phase) {
            (subheaders::SETUP_11, 0) => {
                self.ctx.setup_phase = 1;
                responses.push(self.next_request(
                    headers::A3_03_10,
                    subheaders::SETUP_10,
                    data::REQUEST_00,
                ));
            }
            (subheaders::SETUP_10, 1) => {
                self.ctx.setup_phase = 2;
                responses.push(self.next_request(
                    headers::A3_03_08,
                    subheaders::SETUP_08,
                    data::REQUEST_00,
                ));
            }
            (subheaders::SETUP_08, 2) => {
                self.ctx.setup_phase = 3;
                responses.push(Message::broadcast(
                    headers::A3_03_0A,
                    subheaders::STATUS_0A,
                    data::BROADCAST_00,
                ));
                responses.push(Message::broadcast(
                    headers::A4_04_00,
                    subheaders::STATUS_00,
                    data::BROADCAST_20,
                ));
                // Repeat the phase-2 request, this time flagged 0x80
                responses.push(self.next_request(
                    headers::A3_03_08,
                    subheaders::SETUP_08,
                    data::REQUEST_80,
                ));
            }
            (subheaders::SETUP_08, 3) => {
                self.ctx.setup_phase = 4;
                responses.extend(self.complete_setup());
            }
            _ => {}
        }

        responses
    }

    fn complete_setup(&mut self) -> Vec<Message> {
        let mut responses = vec![Message::broadcast(
            headers::A4_04_00,
            subheaders::STATUS_00,
            data::BROADCAST_20,
        )];

        // Answer the request that started the whole setup sequence
        if let Some(trigger) = &self.ctx.setup_trigger {
            responses.push(Message::response_to(trigger, data::RESPONSE_20));
        }

        info!("setup complete, entering WifiScanning state");
        self.ctx.state = VcmState::WifiScanning;
        self.ctx.last_broadcast = Some(Instant::now());

        responses
    }

    fn handle_wifi_scanning(&mut self, msg: &Message) -> Vec<Message> {
        if let Some(responses) = self.answer_ping(msg) {
            return responses;
        }

        if msg.subheader == subheaders::WIFI_PASSWORD && msg.is_request() {
            info!("wifi credential received, entering WifiConnecting state");
            let mut responses = vec![Message::ack_for(msg)];

            // A malformed credential is treated as absent, the connection
            // sequence still runs
            if let Some((password, _trailing)) = msg.wifi_credential() {
                self.ctx.wifi_password = password;
            }

            self.ctx.state = VcmState::WifiConnecting;
            responses.extend(self.start_wifi_connection(msg));
            return responses;
        }

        Vec::new()
    }

    /// Emits the connection sequence observed in the capture
    fn start_wifi_connection(&mut self, credential_msg: &Message) -> Vec<Message> {
        let mut responses = vec![
            Message::response_to(credential_msg, data::WIFI_CONNECTING),
            Message::broadcast(headers::A3_03_0A, subheaders::STATUS_0A, data::BROADCAST_80),
            Message::build(
                headers::A4_04_08,
                subheaders::WIFI_PASSWORD,
                credential_msg.sequence,
                data::CREDENTIAL_ACCEPTED,
            ),
            Message::broadcast(headers::AA_0A_01, subheaders::CONN_AA01, data::BROADCAST_40),
            Message::broadcast(headers::AA_0A_07, subheaders::CONN_AA07, data::BROADCAST_40),
            Message::broadcast(headers::AB_0B_01, subheaders::CONN_AB01, data::BROADCAST_00),
            Message::broadcast(headers::A4_04_08, subheaders::WIFI_STATUS, data::WIFI_STATUS),
        ];

        // Ask the IHU to confirm the connection; its response completes it
        responses.push(self.next_request(
            headers::A3_03_08,
            subheaders::SETUP_08,
            data::REQUEST_80,
        ));

        responses
    }

    fn handle_wifi_connecting(&mut self, msg: &Message) -> Vec<Message> {
        if msg.subheader == subheaders::SETUP_08 && msg.is_response() {
            info!("wifi connection confirmed, entering WifiConnected state");
            let responses = vec![
                Message::ack_for(msg),
                Message::broadcast(headers::A4_04_02, subheaders::WIFI_FINAL, data::WIFI_FINAL),
            ];

            self.ctx.state = VcmState::WifiConnected;
            self.ctx.wifi_connected = true;
            self.ctx.last_broadcast = Some(Instant::now());

            return responses;
        }

        Vec::new()
    }

    fn handle_wifi_connected(&mut self, msg: &Message) -> Vec<Message> {
        self.answer_ping(msg).unwrap_or_default()
    }
}
