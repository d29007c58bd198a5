use std::fmt;

/// Dispatch-visible error kinds for the Create/Delete Session handlers.
///
/// Hand-rolled rather than built on `thiserror`, matching the plain `Error`
/// enums used by the library crates in this workspace (`anyhow` is reserved
/// for the binary crate's composition root).
#[derive(Debug)]
pub enum Error {
    RequiredIeMissing(&'static str),
    IeDecodeFailed(String),
    MissingTunnelData,
    SessionNotKnown,
    DatapathProgramFailed { op: &'static str, cause: String },
    SocketSendFailed(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequiredIeMissing(ie) => write!(f, "required IE missing: {ie}"),
            Self::IeDecodeFailed(cause) => write!(f, "message decode failed: {cause}"),
            Self::MissingTunnelData => write!(f, "no F-TEID child IE on bearer context"),
            Self::SessionNotKnown => write!(f, "session not known"),
            Self::DatapathProgramFailed { op, cause } => {
                write!(f, "datapath operation {op} failed: {cause}")
            }
            Self::SocketSendFailed(cause) => write!(f, "socket send failed: {cause}"),
        }
    }
}
