//! GTPv2-C Cause values (3GPP TS 29.274 §8.4), restricted to those a P-GW
//! core's Create/Delete handlers emit.

pub const REQUEST_ACCEPTED: u8 = 16;
pub const IMSI_IMEI_NOT_KNOWN: u8 = 64;
