//! GTPv2-C Information Elements (3GPP TS 29.274 §8), restricted to the set a
//! Create/Delete Session Request or Response carries.

mod bearer_context;
mod fqcsid;
mod fteid;
mod tbcd;

pub use bearer_context::{BearerContext, BearerContextToBeCreated, BearerContextToBeCreatedValue, BearerContextValue};
pub use fqcsid::FqCsid;
pub use fqcsid::FqCsidValue;
pub use fteid::{Fteid, FteidValue, InterfaceType};

use std::net::Ipv4Addr;

use bytes::{BufMut, BytesMut};

use crate::Error;

/// A typed GTPv2-C information element.
///
/// Mirrors the typed-attribute idiom used by other TLV codecs in this
/// workspace: a `TYPE` tag selects the IE, `Item` is the decoded value, and
/// `serialize`/`deserialize` convert to/from the IE's value bytes (the body
/// after the 4-byte type/length/instance header, which [`crate::message`]
/// strips before calling into here).
pub trait Ie<'a> {
    const TYPE: u8;
    type Item;

    fn serialize(value: Self::Item, bytes: &mut BytesMut);
    fn deserialize(bytes: &'a [u8]) -> Result<Self::Item, Error>;
}

pub struct Imsi;

impl<'a> Ie<'a> for Imsi {
    const TYPE: u8 = 1;
    type Item = String;

    fn serialize(value: Self::Item, bytes: &mut BytesMut) {
        bytes.put_slice(&tbcd::encode(&value));
    }

    fn deserialize(bytes: &'a [u8]) -> Result<Self::Item, Error> {
        Ok(tbcd::decode(bytes))
    }
}

pub struct Cause;

impl<'a> Ie<'a> for Cause {
    const TYPE: u8 = 2;
    type Item = u8;

    fn serialize(value: Self::Item, bytes: &mut BytesMut) {
        bytes.put_u8(value);
        bytes.put_u8(0); // spare/flags octet, no CS/PCE/BCE bits set
    }

    fn deserialize(bytes: &'a [u8]) -> Result<Self::Item, Error> {
        bytes.first().copied().ok_or(Error::TruncatedIe)
    }
}

pub struct Apn;

impl<'a> Ie<'a> for Apn {
    const TYPE: u8 = 71;
    type Item = String;

    fn serialize(value: Self::Item, bytes: &mut BytesMut) {
        bytes.put_slice(value.as_bytes());
    }

    fn deserialize(bytes: &'a [u8]) -> Result<Self::Item, Error> {
        Ok(std::str::from_utf8(bytes)?.to_string())
    }
}

pub struct Ebi;

impl<'a> Ie<'a> for Ebi {
    const TYPE: u8 = 73;
    type Item = u8;

    fn serialize(value: Self::Item, bytes: &mut BytesMut) {
        bytes.put_u8(value & 0x0f);
    }

    fn deserialize(bytes: &'a [u8]) -> Result<Self::Item, Error> {
        Ok(bytes.first().copied().ok_or(Error::TruncatedIe)? & 0x0f)
    }
}

pub struct Mei;

impl<'a> Ie<'a> for Mei {
    const TYPE: u8 = 75;
    type Item = String;

    fn serialize(value: Self::Item, bytes: &mut BytesMut) {
        bytes.put_slice(&tbcd::encode(&value));
    }

    fn deserialize(bytes: &'a [u8]) -> Result<Self::Item, Error> {
        Ok(tbcd::decode(bytes))
    }
}

pub struct Msisdn;

impl<'a> Ie<'a> for Msisdn {
    const TYPE: u8 = 76;
    type Item = String;

    fn serialize(value: Self::Item, bytes: &mut BytesMut) {
        bytes.put_slice(&tbcd::encode(&value));
    }

    fn deserialize(bytes: &'a [u8]) -> Result<Self::Item, Error> {
        Ok(tbcd::decode(bytes))
    }
}

/// PDN Address Allocation (IPv4 only; IPv6 PDN types are a Non-goal).
pub struct Paa;

impl<'a> Ie<'a> for Paa {
    const TYPE: u8 = 79;
    type Item = Ipv4Addr;

    fn serialize(value: Self::Item, bytes: &mut BytesMut) {
        bytes.put_u8(0x01); // PDN type = IPv4
        bytes.put_slice(&value.octets());
    }

    fn deserialize(bytes: &'a [u8]) -> Result<Self::Item, Error> {
        if bytes.len() < 5 {
            return Err(Error::TruncatedIe);
        }

        Ok(Ipv4Addr::new(bytes[1], bytes[2], bytes[3], bytes[4]))
    }
}

pub struct RatType;

impl<'a> Ie<'a> for RatType {
    const TYPE: u8 = 82;
    type Item = u8;

    fn serialize(value: Self::Item, bytes: &mut BytesMut) {
        bytes.put_u8(value);
    }

    fn deserialize(bytes: &'a [u8]) -> Result<Self::Item, Error> {
        bytes.first().copied().ok_or(Error::TruncatedIe)
    }
}

/// `(mcc, mnc)`, both kept as their original decimal digit strings so a
/// 2-digit MNC round-trips without a spurious leading zero.
pub struct ServingNetwork;

impl<'a> Ie<'a> for ServingNetwork {
    const TYPE: u8 = 83;
    type Item = (String, String);

    fn serialize(value: Self::Item, bytes: &mut BytesMut) {
        let (mcc, mnc) = value;
        bytes.put_slice(&tbcd::encode_plmn(&mcc, &mnc));
    }

    fn deserialize(bytes: &'a [u8]) -> Result<Self::Item, Error> {
        tbcd::decode_plmn(bytes).ok_or(Error::TruncatedIe)
    }
}

pub struct ApnRestriction;

impl<'a> Ie<'a> for ApnRestriction {
    const TYPE: u8 = 127;
    type Item = u8;

    fn serialize(value: Self::Item, bytes: &mut BytesMut) {
        bytes.put_u8(value);
    }

    fn deserialize(bytes: &'a [u8]) -> Result<Self::Item, Error> {
        bytes.first().copied().ok_or(Error::TruncatedIe)
    }
}

/// APN Restriction value `Public-2` (3GPP TS 23.060 Annex A).
pub const APN_RESTRICTION_PUBLIC_2: u8 = 2;

pub struct ChargingId;

impl<'a> Ie<'a> for ChargingId {
    const TYPE: u8 = 94;
    type Item = u32;

    fn serialize(value: Self::Item, bytes: &mut BytesMut) {
        bytes.put_u32(value);
    }

    fn deserialize(bytes: &'a [u8]) -> Result<Self::Item, Error> {
        Ok(u32::from_be_bytes(bytes.get(..4).ok_or(Error::TruncatedIe)?.try_into()?))
    }
}
