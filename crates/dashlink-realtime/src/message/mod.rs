//! Wire message types, parsing, and validation.

pub mod serializer;
pub mod types;
pub mod validator;

pub use serializer::{parse_inbound, serialize_outbound};
pub use types::{ApplicationMessage, ControlMessage, InboundFrame};
