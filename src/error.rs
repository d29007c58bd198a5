use std::fmt;

/// Top-level error kinds for the binary crate's composition root:
/// configuration, discovery, and the KV-backed IP repository. Errors
/// surfaced from `pgw-service`'s handlers stay as `service::error::Error`
/// and are logged directly at the dispatch site rather than converted,
/// since the router never propagates a per-datagram failure any further
/// than a log line. Hand-rolled rather than built on `thiserror`,
/// matching the plain `Error` enums in the library crates this binary
/// wires together; `anyhow` is reserved for `main`'s top-level `Result`.
#[derive(Debug)]
pub enum GatewayError {
    InvalidConfig { reason: String },
    DiscoveryFailed { network: String },
    KvFailed { op: &'static str, cause: String },
}

impl std::error::Error for GatewayError {}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig { reason } => write!(f, "invalid configuration: {reason}"),
            Self::DiscoveryFailed { network } => {
                write!(f, "could not discover an interface for network {network}")
            }
            Self::KvFailed { op, cause } => write!(f, "KV operation {op} failed: {cause}"),
        }
    }
}
