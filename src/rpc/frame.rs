use crate::error::{ProtocolError, ProtocolErrorCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// A single length-prefixed RPC frame exchanged over a worker's stdio.
///
/// Wire format: 4-byte big-endian length prefix, followed by that many bytes of UTF-8 JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    #[serde(rename = "type")]
    pub kind: FrameKind,
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    Request,
    Response,
}

impl Frame {
    pub fn request(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            kind: FrameKind::Request,
            id,
            method: Some(method.into()),
            params: Some(params),
            result: None,
            error: None,
        }
    }

    pub fn response_ok(id: u64, result: Value) -> Self {
        Self {
            kind: FrameKind::Response,
            id,
            method: None,
            params: None,
            result: Some(result),
            error: None,
        }
    }

    pub fn response_err(id: u64, error: impl Into<String>) -> Self {
        Self {
            kind: FrameKind::Response,
            id,
            method: None,
            params: None,
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self.kind, FrameKind::Request)
    }

    /// Encode this frame as a length-prefixed byte buffer ready to write to a pipe.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let body = serde_json::to_vec(self).map_err(|e| ProtocolError {
            code: ProtocolErrorCode::MalformedFrame,
            message: format!("failed to encode frame: {e}"),
        })?;
        let mut buf = Vec::with_capacity(4 + body.len());
        buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
        buf.extend_from_slice(&body);
        Ok(buf)
    }

    /// Decode a single frame from `body` (the bytes following the length prefix).
    pub fn decode(body: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(body).map_err(|e| ProtocolError {
            code: ProtocolErrorCode::MalformedFrame,
            message: format!("failed to decode frame: {e}"),
        })
    }

    /// Write this frame to an async writer, length-prefixed.
    pub async fn write_to<W: AsyncWriteExt + Unpin>(&self, writer: &mut W) -> Result<(), ProtocolError> {
        let buf = self.encode()?;
        writer.write_all(&buf).await.map_err(|e| ProtocolError {
            code: ProtocolErrorCode::ChannelClosed,
            message: format!("failed to write frame: {e}"),
        })?;
        writer.flush().await.map_err(|e| ProtocolError {
            code: ProtocolErrorCode::ChannelClosed,
            message: format!("failed to flush frame: {e}"),
        })
    }

    /// Read a single length-prefixed frame from an async reader.
    pub async fn read_from<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Self, ProtocolError> {
        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf).await.map_err(|e| ProtocolError {
            code: ProtocolErrorCode::ChannelClosed,
            message: format!("failed to read frame length: {e}"),
        })?;
        let len = u32::from_be_bytes(len_buf) as usize;

        let mut body = vec![0u8; len];
        reader.read_exact(&mut body).await.map_err(|e| ProtocolError {
            code: ProtocolErrorCode::ChannelClosed,
            message: format!("failed to read frame body: {e}"),
        })?;

        Self::decode(&body)
    }
}
