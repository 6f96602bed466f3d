// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! Async framing over a byte stream.
//!
//! CBOR items are self-delimiting, so framing is just "accumulate bytes and
//! try to decode one item". Short reads keep accumulating; trailing bytes
//! stay in the buffer for the next message.

use crate::request::Request;
use crate::response::Response;
use serde::Deserialize;
use serde_cbor::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound for one message; anything larger is a protocol violation.
const MAX_MESSAGE_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("connection closed")]
    ConnectionClosed,

    #[error("timed out")]
    Timeout,

    #[error("malformed message: {0}")]
    Malformed(&'static str),

    #[error("unknown opcode {0}")]
    UnknownOpcode(u64),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("message exceeds {MAX_MESSAGE_SIZE} bytes")]
    TooLarge,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Try to decode one CBOR item from the front of `buf`. Returns the item and
/// the bytes it consumed, or `None` when more input is needed.
fn try_decode(buf: &[u8]) -> Result<Option<(Value, usize)>, ProtocolError> {
    if buf.is_empty() {
        return Ok(None);
    }
    let mut deserializer = serde_cbor::Deserializer::from_slice(buf);
    match Value::deserialize(&mut deserializer) {
        Ok(value) => Ok(Some((value, deserializer.byte_offset()))),
        Err(e) if e.classify() == serde_cbor::error::Category::Eof => Ok(None),
        Err(e) => Err(ProtocolError::Decode(e.to_string())),
    }
}

async fn read_value<R>(reader: &mut R, timeout: Duration) -> Result<Value, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut buf: Vec<u8> = Vec::with_capacity(256);
    loop {
        if let Some((value, consumed)) = try_decode(&buf)? {
            // A request/response conversation is strictly alternating;
            // trailing bytes mean the peer is ahead of the protocol.
            if consumed != buf.len() {
                return Err(ProtocolError::Malformed("trailing bytes after message"));
            }
            return Ok(value);
        }
        if buf.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::TooLarge);
        }

        let mut chunk = [0u8; 4096];
        let n = tokio::time::timeout(timeout, reader.read(&mut chunk))
            .await
            .map_err(|_| ProtocolError::Timeout)??;
        if n == 0 {
            return Err(ProtocolError::ConnectionClosed);
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

async fn write_value<W>(
    writer: &mut W,
    value: &Value,
    timeout: Duration,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = serde_cbor::to_vec(value).map_err(|e| ProtocolError::Decode(e.to_string()))?;
    tokio::time::timeout(timeout, async {
        writer.write_all(&bytes).await?;
        writer.flush().await
    })
    .await
    .map_err(|_| ProtocolError::Timeout)??;
    Ok(())
}

pub async fn read_request<R>(reader: &mut R, timeout: Duration) -> Result<Request, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    Request::from_value(read_value(reader, timeout).await?)
}

pub async fn write_request<W>(
    writer: &mut W,
    request: &Request,
    timeout: Duration,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    write_value(writer, &request.to_value(), timeout).await
}

pub async fn read_response<R>(reader: &mut R, timeout: Duration) -> Result<Response, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    Response::from_value(read_value(reader, timeout).await?)
}

pub async fn write_response<W>(
    writer: &mut W,
    response: &Response,
    timeout: Duration,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    write_value(writer, &response.to_value(), timeout).await
}
