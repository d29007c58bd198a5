use std::ops::Range;

use bytes::{BufMut, BytesMut};

use crate::{Error, ie::Ie};

/// GTPv2-C message type values (3GPP TS 29.274 table 6.1-1), restricted to
/// the subset a P-GW core dispatches on.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub enum MessageType {
    CreateSessionRequest,
    CreateSessionResponse,
    DeleteSessionRequest,
    DeleteSessionResponse,
    Other(u8),
}

pub const CREATE_SESSION_REQUEST: u8 = 32;
pub const CREATE_SESSION_RESPONSE: u8 = 33;
pub const DELETE_SESSION_REQUEST: u8 = 36;
pub const DELETE_SESSION_RESPONSE: u8 = 37;

impl From<u8> for MessageType {
    fn from(value: u8) -> Self {
        match value {
            CREATE_SESSION_REQUEST => Self::CreateSessionRequest,
            CREATE_SESSION_RESPONSE => Self::CreateSessionResponse,
            DELETE_SESSION_REQUEST => Self::DeleteSessionRequest,
            DELETE_SESSION_RESPONSE => Self::DeleteSessionResponse,
            other => Self::Other(other),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(value: MessageType) -> Self {
        match value {
            MessageType::CreateSessionRequest => CREATE_SESSION_REQUEST,
            MessageType::CreateSessionResponse => CREATE_SESSION_RESPONSE,
            MessageType::DeleteSessionRequest => DELETE_SESSION_REQUEST,
            MessageType::DeleteSessionResponse => DELETE_SESSION_RESPONSE,
            MessageType::Other(other) => other,
        }
    }
}

/// Reads just the message type byte without parsing the IE run, so a
/// dispatcher can pick a handler before paying for a full decode.
pub fn peek_message_type(bytes: &[u8]) -> Option<MessageType> {
    bytes.get(1).copied().map(MessageType::from)
}

/// A cache of the IE list found while decoding, keyed by (type, instance).
/// Mirrors the flat attribute-range cache used by STUN-style codecs, just
/// keyed on a pair since GTPv2 IEs disambiguate repeats by instance number.
#[derive(Debug, Clone, Default)]
pub struct Ies(Vec<(u8, u8, Range<usize>)>);

impl Ies {
    pub fn append(&mut self, kind: u8, instance: u8, range: Range<usize>) {
        self.0.push((kind, instance, range));
    }

    pub fn get(&self, kind: u8, instance: u8) -> Option<Range<usize>> {
        self.0
            .iter()
            .find(|(k, i, _)| *k == kind && *i == instance)
            .map(|(_, _, r)| r.clone())
    }

    /// Parse a flat run of IE TLVs (top-level message body, or the body of a
    /// grouped IE) into a cache of ranges relative to `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        let mut ies = Ies::default();
        let mut offset = 0;

        while offset + 4 <= bytes.len() {
            let kind = bytes[offset];
            let length = u16::from_be_bytes([bytes[offset + 1], bytes[offset + 2]]) as usize;
            let instance = bytes[offset + 3] & 0x0f;

            let start = offset + 4;
            let end = start + length;
            if end > bytes.len() {
                return Err(Error::TruncatedIe);
            }

            ies.append(kind, instance, start..end);
            offset = end;
        }

        Ok(ies)
    }
}

/// A decoded GTPv2-C message header (3GPP TS 29.274 §5.1), TEID-present form.
/// Every message a P-GW handles on S5-C carries the TEID flag set.
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub message_type: MessageType,
    pub teid: u32,
    pub sequence: u32,
}

pub struct Message<'a> {
    header: Header,
    bytes: &'a [u8],
    ies: Ies,
}

impl<'a> Message<'a> {
    pub fn header(&self) -> Header {
        self.header
    }

    pub fn message_type(&self) -> MessageType {
        self.header.message_type
    }

    pub fn teid(&self) -> u32 {
        self.header.teid
    }

    pub fn sequence(&self) -> u32 {
        self.header.sequence
    }

    /// Decode a full GTPv2-C datagram: 4-byte base header + 4-byte TEID +
    /// 3-byte sequence + 1 spare byte, followed by a flat run of IEs.
    pub fn decode(bytes: &'a [u8]) -> Result<Self, Error> {
        if bytes.len() < 12 {
            return Err(Error::InvalidInput);
        }

        let flags = bytes[0];
        let teid_present = flags & 0x08 != 0;
        if !teid_present {
            return Err(Error::InvalidInput);
        }

        let message_type = MessageType::from(bytes[1]);
        let length = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
        if bytes.len() < length + 4 {
            return Err(Error::InvalidInput);
        }

        let teid = u32::from_be_bytes(bytes[4..8].try_into()?);
        let sequence = u32::from_be_bytes([0, bytes[8], bytes[9], bytes[10]]);

        let body = &bytes[12..(length + 4)];
        let ies = Ies::parse(body)?;

        Ok(Self {
            header: Header {
                message_type,
                teid,
                sequence,
            },
            bytes: body,
            ies,
        })
    }

    /// Look up the first occurrence of IE `T` at instance 0.
    pub fn get<T: Ie<'a>>(&self) -> Option<T::Item> {
        self.get_instance::<T>(0)
    }

    pub fn get_instance<T: Ie<'a>>(&self, instance: u8) -> Option<T::Item> {
        let range = self.ies.get(T::TYPE, instance)?;
        T::deserialize(&self.bytes[range]).ok()
    }

    pub fn require<T: Ie<'a>>(&self) -> Result<T::Item, Error> {
        self.get::<T>().ok_or(Error::MissingIe(T::TYPE))
    }
}

/// Incrementally builds a GTPv2-C message: header first, then a run of IEs
/// appended with [`MessageEncoder::append`], finished with [`MessageEncoder::finish`].
pub struct MessageEncoder {
    bytes: BytesMut,
}

impl MessageEncoder {
    pub fn new(message_type: MessageType, teid: u32, sequence: u32) -> Self {
        let mut bytes = BytesMut::with_capacity(128);
        bytes.put_u8(0x48); // version 2, TEID present, piggyback/spare clear
        bytes.put_u8(message_type.into());
        bytes.put_u16(0); // length patched in `finish`
        bytes.put_u32(teid);
        bytes.put(&sequence.to_be_bytes()[1..4][..]);
        bytes.put_u8(0);

        Self { bytes }
    }

    pub fn append<'c, T: Ie<'c>>(&mut self, value: T::Item) {
        self.append_instance::<T>(value, 0);
    }

    pub fn append_instance<'c, T: Ie<'c>>(&mut self, value: T::Item, instance: u8) {
        self.bytes.put_u8(T::TYPE);

        let os = self.bytes.len();
        self.bytes.put_u16(0);
        self.bytes.put_u8(instance & 0x0f);

        let before = self.bytes.len();
        T::serialize(value, &mut self.bytes);
        let size = (self.bytes.len() - before) as u16;

        self.bytes[os..os + 2].copy_from_slice(&size.to_be_bytes());
    }

    pub fn finish(mut self) -> BytesMut {
        let length = (self.bytes.len() - 4) as u16;
        self.bytes[2..4].copy_from_slice(&length.to_be_bytes());
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ie::Imsi;

    #[test]
    fn encodes_and_decodes_a_header_round_trip() {
        let mut encoder = MessageEncoder::new(MessageType::CreateSessionRequest, 0, 7);
        encoder.append::<Imsi>("001010123456789".to_string());
        let bytes = encoder.finish();

        let message = Message::decode(&bytes).unwrap();
        assert_eq!(message.message_type(), MessageType::CreateSessionRequest);
        assert_eq!(message.teid(), 0);
        assert_eq!(message.sequence(), 7);
        assert_eq!(message.get::<Imsi>().unwrap(), "001010123456789");
    }
}
