use std::net::Ipv4Addr;

use bytes::{BufMut, BytesMut};

use crate::Error;

use super::Ie;

/// Fully Qualified PDN Connection Set Identifier (3GPP TS 29.274 §8.62),
/// IPv4 node-id form only.
#[derive(Debug, Clone)]
pub struct FqCsidValue {
    pub node_id: Ipv4Addr,
    pub csids: Vec<u16>,
}

pub struct FqCsid;

impl<'a> Ie<'a> for FqCsid {
    const TYPE: u8 = 132;
    type Item = FqCsidValue;

    fn serialize(value: Self::Item, bytes: &mut BytesMut) {
        bytes.put_u8((value.csids.len() as u8) & 0x0f); // node-id type 0 (IPv4) in high nibble
        bytes.put_slice(&value.node_id.octets());
        for csid in &value.csids {
            bytes.put_u16(*csid);
        }
    }

    fn deserialize(bytes: &'a [u8]) -> Result<Self::Item, Error> {
        if bytes.len() < 5 {
            return Err(Error::TruncatedIe);
        }

        let count = (bytes[0] & 0x0f) as usize;
        let node_id = Ipv4Addr::new(bytes[1], bytes[2], bytes[3], bytes[4]);

        let mut csids = Vec::with_capacity(count);
        let mut offset = 5;
        for _ in 0..count {
            if offset + 2 > bytes.len() {
                return Err(Error::TruncatedIe);
            }

            csids.push(u16::from_be_bytes([bytes[offset], bytes[offset + 1]]));
            offset += 2;
        }

        Ok(FqCsidValue { node_id, csids })
    }
}
