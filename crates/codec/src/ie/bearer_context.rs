use bytes::{BufMut, BytesMut};

use crate::{
    Error,
    ie::{ChargingId, Ebi, Fteid, fteid::FteidValue},
    message::Ies,
};

use super::{Cause, Ie};

fn nested_get<'a, T: Ie<'a>>(ies: &Ies, bytes: &'a [u8], instance: u8) -> Option<T::Item> {
    let range = ies.get(T::TYPE, instance)?;
    T::deserialize(&bytes[range]).ok()
}

/// `Bearer Context To Be Created` (3GPP TS 29.274 §8.61), carried on
/// Create Session Request: grouped IE of an EBI and the SGW's S5/S8 F-TEID
/// for this bearer.
#[derive(Debug, Clone, Copy)]
pub struct BearerContextToBeCreatedValue {
    pub ebi: u8,
    pub sgw_fteid: FteidValue,
}

pub struct BearerContextToBeCreated;

impl<'a> Ie<'a> for BearerContextToBeCreated {
    const TYPE: u8 = 93;
    type Item = BearerContextToBeCreatedValue;

    fn serialize(value: Self::Item, bytes: &mut BytesMut) {
        bytes.put_u8(Ebi::TYPE);
        bytes.put_u16(1);
        bytes.put_u8(0);
        bytes.put_u8(value.ebi & 0x0f);

        bytes.put_u8(Fteid::TYPE);
        let os = bytes.len();
        bytes.put_u16(0);
        bytes.put_u8(0);
        let before = bytes.len();
        Fteid::serialize(value.sgw_fteid, bytes);
        let size = (bytes.len() - before) as u16;
        bytes[os..os + 2].copy_from_slice(&size.to_be_bytes());
    }

    fn deserialize(bytes: &'a [u8]) -> Result<Self::Item, Error> {
        let ies = Ies::parse(bytes)?;

        Ok(BearerContextToBeCreatedValue {
            ebi: nested_get::<Ebi>(&ies, bytes, 0).ok_or(Error::MissingIe(Ebi::TYPE))?,
            sgw_fteid: nested_get::<Fteid>(&ies, bytes, 0).ok_or(Error::MissingIe(Fteid::TYPE))?,
        })
    }
}

/// `Bearer Context` (3GPP TS 29.274 §8.61), carried on Create Session
/// Response: grouped IE of cause, EBI, the PGW's S5/S8-U F-TEID and a
/// Charging ID.
#[derive(Debug, Clone, Copy)]
pub struct BearerContextValue {
    pub cause: u8,
    pub ebi: u8,
    pub pgw_fteid: FteidValue,
    pub charging_id: u32,
}

pub struct BearerContext;

impl<'a> Ie<'a> for BearerContext {
    const TYPE: u8 = 93;
    type Item = BearerContextValue;

    fn serialize(value: Self::Item, bytes: &mut BytesMut) {
        bytes.put_u8(Cause::TYPE);
        bytes.put_u16(2);
        bytes.put_u8(0);
        bytes.put_u8(value.cause);
        bytes.put_u8(0);

        bytes.put_u8(Ebi::TYPE);
        bytes.put_u16(1);
        bytes.put_u8(0);
        bytes.put_u8(value.ebi & 0x0f);

        bytes.put_u8(Fteid::TYPE);
        let os = bytes.len();
        bytes.put_u16(0);
        bytes.put_u8(0);
        let before = bytes.len();
        Fteid::serialize(value.pgw_fteid, bytes);
        let size = (bytes.len() - before) as u16;
        bytes[os..os + 2].copy_from_slice(&size.to_be_bytes());

        bytes.put_u8(ChargingId::TYPE);
        bytes.put_u16(4);
        bytes.put_u8(0);
        bytes.put_u32(value.charging_id);
    }

    fn deserialize(bytes: &'a [u8]) -> Result<Self::Item, Error> {
        let ies = Ies::parse(bytes)?;

        Ok(BearerContextValue {
            cause: nested_get::<Cause>(&ies, bytes, 0).ok_or(Error::MissingIe(Cause::TYPE))?,
            ebi: nested_get::<Ebi>(&ies, bytes, 0).ok_or(Error::MissingIe(Ebi::TYPE))?,
            pgw_fteid: nested_get::<Fteid>(&ies, bytes, 0).ok_or(Error::MissingIe(Fteid::TYPE))?,
            charging_id: nested_get::<ChargingId>(&ies, bytes, 0)
                .ok_or(Error::MissingIe(ChargingId::TYPE))?,
        })
    }
}
