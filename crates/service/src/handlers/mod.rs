//! Create/Delete Session Request handlers.

pub mod create;
pub mod delete;

pub use create::{CreateOutcome, CreateSessionHandler, GatewayAddresses, SgiLink, DOWNLINK_TABLE, MAIN_TABLE};
pub use delete::{DeleteOutcome, DeleteSessionHandler};
