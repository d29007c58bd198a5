//! ## GTPv2-C (3GPP TS 29.274)
//!
//! Minimal encoder/decoder for the GTPv2-C control-plane messages and
//! information elements used by a PDN Gateway's Create/Delete Session
//! procedures. Only the message types and IEs a P-GW core needs are
//! represented; this is not a general-purpose GTP library.

pub mod cause;
pub mod ie;
pub mod message;

use std::{array::TryFromSliceError, str::Utf8Error};

#[derive(Debug)]
pub enum Error {
    InvalidInput,
    UnknownMessageType,
    MissingIe(u8),
    TruncatedIe,
    Utf8Error(Utf8Error),
    TryFromSliceError(TryFromSliceError),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<Utf8Error> for Error {
    fn from(value: Utf8Error) -> Self {
        Self::Utf8Error(value)
    }
}

impl From<TryFromSliceError> for Error {
    fn from(value: TryFromSliceError) -> Self {
        Self::TryFromSliceError(value)
    }
}
