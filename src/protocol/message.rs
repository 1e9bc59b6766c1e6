use std::fmt;

use crate::core::{Error, Result};

/// Fixed header width in bytes
pub const HEADER_LEN: usize = 7;

/// Fixed subheader width in bytes
pub const SUBHEADER_LEN: usize = 3;

/// Minimum wire size: header + length + subheader + sequence
pub const MIN_MESSAGE_LEN: usize = 12;

/// Data payload identifying an acknowledgment, hex `02700000`
pub const ACK_DATA: [u8; 4] = [0x02, 0x70, 0x00, 0x00];

/// Header templates observed in the reference traffic
///
/// Format: `00 XX XX YY 000000` where XX XX appears to identify a module
/// and YY a variant.
pub mod headers {
    pub const A4_04_0D: [u8; 7] = [0x00, 0xa4, 0x04, 0x0d, 0x00, 0x00, 0x00];
    pub const A4_04_00: [u8; 7] = [0x00, 0xa4, 0x04, 0x00, 0x00, 0x00, 0x00];
    pub const A4_04_08: [u8; 7] = [0x00, 0xa4, 0x04, 0x08, 0x00, 0x00, 0x00];
    pub const A4_04_02: [u8; 7] = [0x00, 0xa4, 0x04, 0x02, 0x00, 0x00, 0x00];
    pub const A3_03_0F: [u8; 7] = [0x00, 0xa3, 0x03, 0x0f, 0x00, 0x00, 0x00];
    pub const A3_03_08: [u8; 7] = [0x00, 0xa3, 0x03, 0x08, 0x00, 0x00, 0x00];
    pub const A3_03_0A: [u8; 7] = [0x00, 0xa3, 0x03, 0x0a, 0x00, 0x00, 0x00];
    pub const A3_03_11: [u8; 7] = [0x00, 0xa3, 0x03, 0x11, 0x00, 0x00, 0x00];
    pub const A3_03_10: [u8; 7] = [0x00, 0xa3, 0x03, 0x10, 0x00, 0x00, 0x00];
    pub const AA_0A_01: [u8; 7] = [0x00, 0xaa, 0x0a, 0x01, 0x00, 0x00, 0x00];
    pub const AA_0A_07: [u8; 7] = [0x00, 0xaa, 0x0a, 0x07, 0x00, 0x00, 0x00];
    pub const AB_0B_01: [u8; 7] = [0x00, 0xab, 0x0b, 0x01, 0x00, 0x00, 0x00];
}

/// Known subheader opcodes (message topics)
pub mod subheaders {
    /// Module 0d status check
    pub const PING_0D: [u8; 3] = [0xa4, 0x0d, 0x00];
    /// Module 0f status check
    pub const PING_0F: [u8; 3] = [0xa3, 0x0f, 0x00];

    /// Triggers the setup sequence
    pub const SETUP_TRIGGER: [u8; 3] = [0xa4, 0x00, 0x02];
    /// Setup sub-request 1
    pub const SETUP_11: [u8; 3] = [0xa3, 0x11, 0x02];
    /// Setup sub-request 2
    pub const SETUP_10: [u8; 3] = [0xa3, 0x10, 0x02];
    /// Setup sub-request 3, reused for connection confirmation
    pub const SETUP_08: [u8; 3] = [0xa3, 0x08, 0x02];

    /// General status broadcast
    pub const STATUS_0A: [u8; 3] = [0xa3, 0x0a, 0x05];
    /// Setup status broadcast
    pub const STATUS_00: [u8; 3] = [0xa4, 0x00, 0x05];

    /// SSID scan-result broadcast
    pub const WIFI_SCAN: [u8; 3] = [0xa4, 0x0d, 0x05];
    /// WiFi credential entry
    pub const WIFI_PASSWORD: [u8; 3] = [0xa4, 0x08, 0x02];
    /// WiFi connection status
    pub const WIFI_STATUS: [u8; 3] = [0xa4, 0x08, 0x05];
    /// Final connection status
    pub const WIFI_FINAL: [u8; 3] = [0xa4, 0x02, 0x05];

    /// Connection info broadcasts
    pub const CONN_AA01: [u8; 3] = [0xaa, 0x01, 0x05];
    pub const CONN_AA07: [u8; 3] = [0xaa, 0x07, 0x05];
    pub const CONN_AB01: [u8; 3] = [0xab, 0x01, 0x05];
}

/// Standard data payload patterns
pub mod data {
    /// `02000000`
    pub const REQUEST_BASIC: &[u8] = &[0x02, 0x00, 0x00, 0x00];
    /// `0202000020`
    pub const REQUEST_20: &[u8] = &[0x02, 0x02, 0x00, 0x00, 0x20];
    /// `0202000080`
    pub const REQUEST_80: &[u8] = &[0x02, 0x02, 0x00, 0x00, 0x80];
    /// `0202000000`
    pub const REQUEST_00: &[u8] = &[0x02, 0x02, 0x00, 0x00, 0x00];

    /// `020400000000`
    pub const RESPONSE_00: &[u8] = &[0x02, 0x04, 0x00, 0x00, 0x00, 0x00];
    /// `0204000000`
    pub const RESPONSE_SHORT: &[u8] = &[0x02, 0x04, 0x00, 0x00, 0x00];
    /// `0204000020`
    pub const RESPONSE_20: &[u8] = &[0x02, 0x04, 0x00, 0x00, 0x20];

    /// `0205000000`
    pub const BROADCAST_00: &[u8] = &[0x02, 0x05, 0x00, 0x00, 0x00];
    /// `0205000020`
    pub const BROADCAST_20: &[u8] = &[0x02, 0x05, 0x00, 0x00, 0x20];
    /// `0205000040`
    pub const BROADCAST_40: &[u8] = &[0x02, 0x05, 0x00, 0x00, 0x40];
    /// `0205000080`
    pub const BROADCAST_80: &[u8] = &[0x02, 0x05, 0x00, 0x00, 0x80];

    /// `02e0000048`
    pub const WIFI_CONNECTING: &[u8] = &[0x02, 0xe0, 0x00, 0x00, 0x48];

    /// SSID broadcast while scanning, status byte 0x00 (from capture)
    pub const SSID_SCANNING: &[u8] = &[
        0x02, 0x05, 0x00, 0x00, 0x00, 0x83, 0x3a, 0x32, 0xb9, 0xba, 0x30, 0xb9, 0xba, 0xa0,
    ];
    /// SSID broadcast once connected, status byte 0x40 (from capture)
    pub const SSID_CONNECTED: &[u8] = &[
        0x02, 0x05, 0x00, 0x00, 0x40, 0xa3, 0x3a, 0x32, 0xb9, 0xba, 0x30, 0xb9, 0xb8, 0xb0,
    ];

    /// Credential-accepted response (from capture)
    pub const CREDENTIAL_ACCEPTED: &[u8] = &[
        0x02, 0x04, 0x00, 0x00, 0x0c, 0xe8, 0xca, 0xe6, 0xe8, 0xc2, 0xe6, 0x80,
    ];
    /// WiFi status broadcast sent during connection (from capture)
    pub const WIFI_STATUS: &[u8] = &[
        0x02, 0x05, 0x00, 0x00, 0x0c, 0xe8, 0xca, 0xe6, 0xe8, 0xc2, 0xe6, 0x80,
    ];
    /// Final connection status (from capture)
    pub const WIFI_FINAL: &[u8] = &[0x02, 0x05, 0x00, 0x00, 0x1a];
}

/// Role of a message, derived from its data prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Data equals the ACK sentinel exactly
    Ack,
    /// Data starts with `0200` or `0202`
    Request,
    /// Data starts with `0204`
    Response,
    /// Data starts with `0205`
    Broadcast,
    /// Data starts with `02e0`
    ConnectingStatus,
    /// Anything else
    Other,
}

/// A parsed VCM protocol message
///
/// Wire layout: `[header: 7][length: 1][subheader: 3][sequence: 1][data: N]`
/// with `length = 4 + N`. Messages are immutable once constructed; the
/// `length` field is carried verbatim on decode and only computed by
/// [`Message::build`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Opaque identifier block, echoed from request to response
    pub header: [u8; HEADER_LEN],
    /// Declared size of subheader + sequence + data
    pub length: u8,
    /// Topic opcode
    pub subheader: [u8; SUBHEADER_LEN],
    /// Sequence number, 0 for broadcasts
    pub sequence: u8,
    /// Variable-length payload; first bytes carry the role tag
    pub data: Vec<u8>,
}

impl Message {
    /// Decodes a raw datagram into a message
    ///
    /// Fails if the input is shorter than the fixed-width prefix. The data
    /// portion is carried through without further validation; role
    /// classification is a derived property.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MIN_MESSAGE_LEN {
            return Err(Error::protocol(format!(
                "datagram too short: {} bytes, need at least {}",
                bytes.len(),
                MIN_MESSAGE_LEN
            )));
        }

        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&bytes[..HEADER_LEN]);

        let mut subheader = [0u8; SUBHEADER_LEN];
        subheader.copy_from_slice(&bytes[8..8 + SUBHEADER_LEN]);

        Ok(Message {
            header,
            length: bytes[7],
            subheader,
            sequence: bytes[11],
            data: bytes[MIN_MESSAGE_LEN..].to_vec(),
        })
    }

    /// Decodes a hex payload string into a message
    pub fn from_hex(payload: &str) -> Result<Self> {
        let bytes = hex::decode(payload)
            .map_err(|e| Error::protocol(format!("invalid hex payload: {}", e)))?;
        Self::decode(&bytes)
    }

    /// Encodes the message back into its wire form
    ///
    /// Fields are concatenated verbatim; the stored `length` is never
    /// recomputed here, so a decoded message re-encodes byte for byte.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(MIN_MESSAGE_LEN + self.data.len());
        bytes.extend_from_slice(&self.header);
        bytes.push(self.length);
        bytes.extend_from_slice(&self.subheader);
        bytes.push(self.sequence);
        bytes.extend_from_slice(&self.data);
        bytes
    }

    /// Returns the wire form as a hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.encode())
    }

    /// Builds a new message with the length field computed from the data
    ///
    /// This is the only constructor that derives `length`
    /// (3 bytes subheader + 1 byte sequence + data).
    pub fn build(
        header: [u8; HEADER_LEN],
        subheader: [u8; SUBHEADER_LEN],
        sequence: u8,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        let data = data.into();
        Message {
            header,
            length: (SUBHEADER_LEN + 1 + data.len()) as u8,
            subheader,
            sequence,
            data,
        }
    }

    /// Creates an acknowledgment for an incoming message
    ///
    /// Header, subheader and sequence are echoed back unchanged.
    pub fn ack_for(original: &Message) -> Self {
        Message::build(
            original.header,
            original.subheader,
            original.sequence,
            ACK_DATA.to_vec(),
        )
    }

    /// Creates a response to an incoming request, echoing its identity fields
    pub fn response_to(original: &Message, data: impl Into<Vec<u8>>) -> Self {
        Message::build(original.header, original.subheader, original.sequence, data)
    }

    /// Creates a broadcast message (sequence fixed at 0)
    pub fn broadcast(
        header: [u8; HEADER_LEN],
        subheader: [u8; SUBHEADER_LEN],
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Message::build(header, subheader, 0, data)
    }

    /// Creates a device-initiated request to the IHU
    pub fn request(
        header: [u8; HEADER_LEN],
        subheader: [u8; SUBHEADER_LEN],
        sequence: u8,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Message::build(header, subheader, sequence, data)
    }

    /// Classifies the message by its data prefix, most specific match first
    pub fn role(&self) -> Role {
        if self.is_ack() {
            Role::Ack
        } else if self.data.starts_with(&[0x02, 0x00]) || self.data.starts_with(&[0x02, 0x02]) {
            Role::Request
        } else if self.data.starts_with(&[0x02, 0x04]) {
            Role::Response
        } else if self.data.starts_with(&[0x02, 0x05]) {
            Role::Broadcast
        } else if self.data.starts_with(&[0x02, 0xe0]) {
            Role::ConnectingStatus
        } else {
            Role::Other
        }
    }

    /// Returns true if the data equals the ACK sentinel exactly
    pub fn is_ack(&self) -> bool {
        self.data == ACK_DATA
    }

    /// Returns true for request data (`0200` or `0202` prefix)
    pub fn is_request(&self) -> bool {
        self.role() == Role::Request
    }

    /// Returns true for response data (`0204` prefix)
    pub fn is_response(&self) -> bool {
        self.role() == Role::Response
    }

    /// Returns true for broadcast data (`0205` prefix)
    pub fn is_broadcast(&self) -> bool {
        self.role() == Role::Broadcast
    }

    /// Decodes a WiFi credential from a request message
    ///
    /// Expected data layout: `02020000` + length byte + text + trailing
    /// bytes. The text is decoded lossily, so invalid UTF-8 becomes the
    /// replacement character rather than an error. Returns `None` on any
    /// malformed slice; callers rely on the absent result being silent.
    pub fn wifi_credential(&self) -> Option<(String, Option<Vec<u8>>)> {
        let payload = self.data.strip_prefix(&[0x02, 0x02, 0x00, 0x00][..])?;

        let text_len = *payload.first()? as usize;
        let text_bytes = payload.get(1..1 + text_len)?;
        let text = String::from_utf8_lossy(text_bytes).into_owned();

        let trailing = &payload[1 + text_len..];
        let trailing = (!trailing.is_empty()).then(|| trailing.to_vec());

        Some((text, trailing))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = match self.role() {
            Role::Ack => "ACK",
            Role::Request => "REQ",
            Role::Response => "RSP",
            Role::Broadcast => "BRD",
            Role::ConnectingStatus => "CON",
            Role::Other => "???",
        };
        write!(
            f,
            "Message(sub={}, seq={:02x}, role={}, data={})",
            hex::encode(self.subheader),
            self.sequence,
            role,
            hex::encode(&self.data)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_basic_message() {
        let msg = Message::from_hex("00a4040d00000008a40d002802000000").unwrap();

        assert_eq!(msg.header, [0x00, 0xa4, 0x04, 0x0d, 0x00, 0x00, 0x00]);
        assert_eq!(msg.length, 0x08);
        assert_eq!(msg.subheader, subheaders::PING_0D);
        assert_eq!(msg.sequence, 0x28);
        assert_eq!(msg.data, data::REQUEST_BASIC);
        assert!(msg.is_request());
    }

    #[test]
    fn test_decode_ack_message() {
        let msg = Message::from_hex("00a4040d00000008a40d002802700000").unwrap();

        assert!(msg.is_ack());
        assert_eq!(msg.role(), Role::Ack);
        assert_eq!(msg.data, ACK_DATA);
    }

    #[test]
    fn test_decode_broadcast_message() {
        let msg =
            Message::from_hex("00a4040d00000012a40d05000205000000833a32b9ba30b9baa0").unwrap();

        assert_eq!(msg.subheader, subheaders::WIFI_SCAN);
        assert_eq!(msg.sequence, 0);
        assert!(msg.is_broadcast());
    }

    #[test]
    fn test_round_trip() {
        let original = "00a4040d00000008a40d002802000000";
        let msg = Message::from_hex(original).unwrap();

        assert_eq!(msg.to_hex(), original);
        assert_eq!(Message::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn test_decode_too_short() {
        assert!(Message::decode(&[0x00, 0xa4, 0x04]).is_err());
        assert!(Message::from_hex("00a404").is_err());
    }

    #[test]
    fn test_decode_invalid_hex() {
        assert!(Message::from_hex("invalid").is_err());
    }

    #[test]
    fn test_build_computes_length() {
        let msg = Message::build(
            headers::A4_04_0D,
            subheaders::PING_0D,
            0x28,
            data::REQUEST_BASIC,
        );

        // 3 bytes subheader + 1 byte sequence + 4 bytes data
        assert_eq!(msg.length, 8);
        assert_eq!(msg.to_hex(), "00a4040d00000008a40d002802000000");
    }

    #[test]
    fn test_ack_echoes_identity_fields() {
        let original = Message::from_hex("00a4040d00000008a40d002802000000").unwrap();
        let ack = Message::ack_for(&original);

        assert_eq!(ack.header, original.header);
        assert_eq!(ack.subheader, original.subheader);
        assert_eq!(ack.sequence, original.sequence);
        assert!(ack.is_ack());
    }

    #[test]
    fn test_wifi_credential_decoding() {
        let msg =
            Message::from_hex("00a4040800000018a408024b02020000086c61696b696e617319d195cdd185cc")
                .unwrap();

        let (text, trailing) = msg.wifi_credential().unwrap();
        assert_eq!(text, "laikinas");
        assert!(trailing.is_some());
    }

    #[test]
    fn test_wifi_credential_lossy_text() {
        // Length byte claims 4 bytes of text that are not valid UTF-8
        let msg = Message::build(
            headers::A4_04_08,
            subheaders::WIFI_PASSWORD,
            0x4b,
            vec![0x02, 0x02, 0x00, 0x00, 0x04, 0xff, 0xfe, 0x61, 0x62],
        );

        let (text, trailing) = msg.wifi_credential().unwrap();
        assert_eq!(text, "\u{fffd}\u{fffd}ab");
        assert!(trailing.is_none());
    }

    #[test]
    fn test_wifi_credential_malformed() {
        // Wrong prefix
        let msg = Message::build(headers::A4_04_08, subheaders::WIFI_PASSWORD, 0x4b, data::REQUEST_BASIC);
        assert!(msg.wifi_credential().is_none());

        // Length byte runs past the payload
        let msg = Message::build(
            headers::A4_04_08,
            subheaders::WIFI_PASSWORD,
            0x4b,
            vec![0x02, 0x02, 0x00, 0x00, 0x20, 0x61],
        );
        assert!(msg.wifi_credential().is_none());

        // Prefix only, no length byte
        let msg = Message::build(
            headers::A4_04_08,
            subheaders::WIFI_PASSWORD,
            0x4b,
            vec![0x02, 0x02, 0x00, 0x00],
        );
        assert!(msg.wifi_credential().is_none());
    }

    #[test]
    fn test_role_classification() {
        let mk = |data: &[u8]| {
            Message::build(headers::A4_04_0D, subheaders::PING_0D, 0, data.to_vec())
        };

        assert_eq!(mk(&[0x02, 0x70, 0x00, 0x00]).role(), Role::Ack);
        assert_eq!(mk(data::REQUEST_BASIC).role(), Role::Request);
        assert_eq!(mk(data::REQUEST_20).role(), Role::Request);
        assert_eq!(mk(data::RESPONSE_00).role(), Role::Response);
        assert_eq!(mk(data::BROADCAST_00).role(), Role::Broadcast);
        assert_eq!(mk(data::WIFI_CONNECTING).role(), Role::ConnectingStatus);
        assert_eq!(mk(&[0x01, 0x02]).role(), Role::Other);

        // The ACK sentinel must match exactly, a 0270 prefix alone is not an ACK
        assert_eq!(mk(&[0x02, 0x70, 0x00, 0x00, 0x01]).role(), Role::Other);
    }
}
