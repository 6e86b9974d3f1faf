use serde::Serialize;
use serde::de::DeserializeOwned;

use super::messages::{ClientMessage, ServerMessage};

/// Maximum text frame size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024; // 16 KiB

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("empty message")]
    EmptyMessage,
    #[error("payload too large: {0} bytes (max {MAX_MESSAGE_SIZE})")]
    PayloadTooLarge(usize),
    #[error("serialize error: {0}")]
    SerializeError(String),
    #[error("deserialize error: {0}")]
    DeserializeError(String),
}

/// Encode a payload as a JSON text frame, enforcing the size limit.
pub fn encode_message<T: Serialize>(payload: &T) -> Result<String, ProtocolError> {
    let text =
        serde_json::to_string(payload).map_err(|e| ProtocolError::SerializeError(e.to_string()))?;
    if text.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::PayloadTooLarge(text.len()));
    }
    Ok(text)
}

/// Decode a JSON text frame.
pub fn decode_message<T: DeserializeOwned>(text: &str) -> Result<T, ProtocolError> {
    if text.trim().is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    if text.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::PayloadTooLarge(text.len()));
    }
    serde_json::from_str(text).map_err(|e| ProtocolError::DeserializeError(e.to_string()))
}

pub fn encode_client_message(msg: &ClientMessage) -> Result<String, ProtocolError> {
    encode_message(msg)
}

pub fn encode_server_message(msg: &ServerMessage) -> Result<String, ProtocolError> {
    encode_message(msg)
}

pub fn decode_client_message(text: &str) -> Result<ClientMessage, ProtocolError> {
    decode_message(text)
}

pub fn decode_server_message(text: &str) -> Result<ServerMessage, ProtocolError> {
    decode_message(text)
}
