//! JSON encoding and decoding of frames.

use serde::Serialize;

use dashlink_core::AppResult;

use super::types::{ApplicationMessage, InboundFrame};
use super::validator::validate_inbound;

/// Parse and classify an inbound text frame.
///
/// Fails when the frame is blank, oversized, not a JSON object, or lacks a
/// string `type` field.
pub fn parse_inbound(text: &str) -> AppResult<InboundFrame> {
    validate_inbound(text)?;
    let msg: ApplicationMessage = serde_json::from_str(text)?;
    Ok(msg.into())
}

/// Serialize an outbound message to a text frame.
pub fn serialize_outbound<T: Serialize + ?Sized>(msg: &T) -> AppResult<String> {
    Ok(serde_json::to_string(msg)?)
}
