// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RPC wire protocol.
//!
//! Length-prefixed JSON frames:
//!
//! ```text
//! +----------------+-------------------+
//! | Length (4B BE) | JSON payload      |
//! +----------------+-------------------+
//! ```

use crate::error::Error;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// One RPC frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RpcMessage {
    /// A call from either side of the connection.
    Request {
        id: u64,
        method: String,
        #[serde(default)]
        params: Value,
    },

    /// A successful reply.
    Response {
        id: u64,
        #[serde(default)]
        result: Value,
    },

    /// A failed reply; the message carries the handler error verbatim.
    Error { id: u64, message: String },
}

/// Read one frame.
///
/// Returns `Ok(None)` if the stream was closed cleanly at a frame
/// boundary.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_frame_size: usize,
) -> Result<Option<RpcMessage>, Error> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 {
        return Err(Error::Protocol("empty frame".into()));
    }
    if len > max_frame_size {
        return Err(Error::Protocol(format!(
            "frame too large: {} > {}",
            len, max_frame_size
        )));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;

    let msg: RpcMessage = serde_json::from_slice(&body)
        .map_err(|e| Error::Protocol(format!("invalid frame: {}", e)))?;

    Ok(Some(msg))
}

/// Write one frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    msg: &RpcMessage,
) -> Result<(), Error> {
    let body =
        serde_json::to_vec(msg).map_err(|e| Error::Protocol(format!("encode frame: {}", e)))?;

    writer.write_all(&(body.len() as u32).to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_frame_roundtrip() {
        let msg = RpcMessage::Request {
            id: 7,
            method: "TestLatency".into(),
            params: json!({"addrs": ["127.0.0.1:1"]}),
        };

        let mut buf = std::io::Cursor::new(Vec::new());
        write_frame(&mut buf, &msg).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf.into_inner());
        let back = read_frame(&mut cursor, super::super::MAX_FRAME_SIZE)
            .await
            .unwrap()
            .unwrap();

        match back {
            RpcMessage::Request { id, method, params } => {
                assert_eq!(id, 7);
                assert_eq!(method, "TestLatency");
                assert_eq!(params["addrs"][0], "127.0.0.1:1");
            }
            _ => panic!("wrong message kind"),
        }
    }

    #[tokio::test]
    async fn test_read_frame_clean_eof() {
        let mut cursor = std::io::Cursor::new(Vec::new());
        let frame = read_frame(&mut cursor, 1024).await.unwrap();
        assert!(frame.is_none());
    }

    #[tokio::test]
    async fn test_read_frame_too_large() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(2048u32).to_be_bytes());
        buf.extend_from_slice(&[0u8; 8]);

        let mut cursor = std::io::Cursor::new(buf);
        let err = read_frame(&mut cursor, 1024).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn test_response_without_result_field() {
        let body = br#"{"kind":"response","id":3}"#;
        let mut buf = Vec::new();
        buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
        buf.extend_from_slice(body);

        let mut cursor = std::io::Cursor::new(buf);
        let msg = read_frame(&mut cursor, 1024).await.unwrap().unwrap();
        match msg {
            RpcMessage::Response { id, result } => {
                assert_eq!(id, 3);
                assert!(result.is_null());
            }
            _ => panic!("wrong message kind"),
        }
    }
}
