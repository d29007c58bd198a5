use std::net::Ipv4Addr;

use bytes::{BufMut, BytesMut};

use crate::Error;

use super::Ie;

/// F-TEID interface type (3GPP TS 29.274 table 8.22-1), restricted to the
/// S5/S8 interfaces a P-GW core ever names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterfaceType {
    S5S8SgwGtpU,
    S5S8PgwGtpU,
    S5S8SgwGtpC,
    S5S8PgwGtpC,
    Other(u8),
}

impl From<u8> for InterfaceType {
    fn from(value: u8) -> Self {
        match value & 0x3f {
            6 => Self::S5S8SgwGtpU,
            7 => Self::S5S8PgwGtpU,
            10 => Self::S5S8SgwGtpC,
            11 => Self::S5S8PgwGtpC,
            other => Self::Other(other),
        }
    }
}

impl From<InterfaceType> for u8 {
    fn from(value: InterfaceType) -> Self {
        match value {
            InterfaceType::S5S8SgwGtpU => 6,
            InterfaceType::S5S8PgwGtpU => 7,
            InterfaceType::S5S8SgwGtpC => 10,
            InterfaceType::S5S8PgwGtpC => 11,
            InterfaceType::Other(other) => other,
        }
    }
}

/// Fully Qualified TEID (3GPP TS 29.274 §8.22). IPv6 is a Non-goal, so only
/// the V4 form is represented.
#[derive(Debug, Clone, Copy)]
pub struct FteidValue {
    pub interface_type: InterfaceType,
    pub teid: u32,
    pub ipv4: Ipv4Addr,
}

pub struct Fteid;

impl<'a> Ie<'a> for Fteid {
    const TYPE: u8 = 87;
    type Item = FteidValue;

    fn serialize(value: Self::Item, bytes: &mut BytesMut) {
        bytes.put_u8(0x80 | (u8::from(value.interface_type) & 0x3f)); // V4 flag set, V6 clear
        bytes.put_u32(value.teid);
        bytes.put_slice(&value.ipv4.octets());
    }

    fn deserialize(bytes: &'a [u8]) -> Result<Self::Item, Error> {
        if bytes.len() < 9 {
            return Err(Error::TruncatedIe);
        }

        let v4_present = bytes[0] & 0x80 != 0;
        if !v4_present {
            return Err(Error::InvalidInput);
        }

        Ok(FteidValue {
            interface_type: InterfaceType::from(bytes[0]),
            teid: u32::from_be_bytes(bytes[1..5].try_into()?),
            ipv4: Ipv4Addr::new(bytes[5], bytes[6], bytes[7], bytes[8]),
        })
    }
}
