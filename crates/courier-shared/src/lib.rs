//! # courier-shared
//!
//! Types shared by every Courier crate: integer identifiers, message and
//! presence enums, the push-transport wire protocol and its constants.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
pub use protocol::{ClientEvent, ServerEvent};
pub use types::*;
