use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use super::message::{Message, MIN_MESSAGE_LEN};
use crate::core::Error;

/// Wire codec for VCM protocol messages
///
/// The protocol is datagram oriented, so each decode call consumes the
/// entire buffer as one message; there is no length-prefixed framing to
/// wait on.
#[derive(Clone, Default)]
pub struct VcmCodec;

impl VcmCodec {
    /// Creates a new codec
    pub fn new() -> Self {
        VcmCodec
    }
}

impl Decoder for VcmCodec {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        if src.len() < MIN_MESSAGE_LEN {
            let len = src.len();
            src.clear();
            return Err(Error::protocol(format!(
                "datagram too short: {} bytes",
                len
            )));
        }

        let datagram = src.split_to(src.len());
        Message::decode(&datagram).map(Some)
    }
}

impl Encoder<Message> for VcmCodec {
    type Error = Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&item.encode());
        Ok(())
    }
}
