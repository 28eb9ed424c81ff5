//! Length-prefixed framing: a 2-byte big-endian header length, a UTF-8 JSON
//! header, then the raw payload bytes the header describes.

use serde::{Deserialize, Serialize};
use tinyledger_core::error::ProtocolError;

const TRANSACTION_CONTENT: &str = "transaction_content";
const DATABASE_CONTENT: &str = "database_content";
const DB_REQUEST: &str = "db_request";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    TransactionContent,
    DatabaseContent,
    DbRequest,
}

impl ContentType {
    fn as_str(self) -> &'static str {
        match self {
            ContentType::TransactionContent => TRANSACTION_CONTENT,
            ContentType::DatabaseContent => DATABASE_CONTENT,
            ContentType::DbRequest => DB_REQUEST,
        }
    }

    fn parse(s: &str) -> Result<Self, ProtocolError> {
        match s {
            TRANSACTION_CONTENT => Ok(ContentType::TransactionContent),
            DATABASE_CONTENT => Ok(ContentType::DatabaseContent),
            DB_REQUEST => Ok(ContentType::DbRequest),
            other => Err(ProtocolError::UnknownContentType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireHeader {
    byteorder: String,
    #[serde(rename = "content-type")]
    content_type: String,
    #[serde(rename = "content-length")]
    content_length: u32,
}

/// A fully decoded (or about-to-be-encoded) message body.
#[derive(Debug, Clone)]
pub enum Payload {
    TransactionContent(Vec<u8>),
    DatabaseContent(Vec<u8>),
    DbRequest,
}

/// Encodes `payload` into a complete frame ready to write to a socket.
pub fn encode_frame(payload: &Payload) -> Vec<u8> {
    let (content_type, bytes): (ContentType, Vec<u8>) = match payload {
        Payload::TransactionContent(b) => (ContentType::TransactionContent, b.clone()),
        Payload::DatabaseContent(b) => (ContentType::DatabaseContent, b.clone()),
        Payload::DbRequest => (ContentType::DbRequest, vec![0u8]),
    };
    let header = WireHeader {
        byteorder: "big".to_string(),
        content_type: content_type.as_str().to_string(),
        content_length: bytes.len() as u32,
    };
    let header_json = serde_json::to_vec(&header).expect("header always encodes");
    let mut out = Vec::with_capacity(2 + header_json.len() + bytes.len());
    out.extend_from_slice(&(header_json.len() as u16).to_be_bytes());
    out.extend_from_slice(&header_json);
    out.extend_from_slice(&bytes);
    out
}

fn parse_header(bytes: &[u8]) -> Result<WireHeader, ProtocolError> {
    let value: serde_json::Value = serde_json::from_slice(bytes).map_err(|_| ProtocolError::MalformedHeader)?;
    let obj = value.as_object().ok_or(ProtocolError::MalformedHeader)?;
    let byteorder = obj
        .get("byteorder")
        .and_then(|v| v.as_str())
        .ok_or(ProtocolError::MissingHeaderField("byteorder"))?
        .to_string();
    let content_type = obj
        .get("content-type")
        .and_then(|v| v.as_str())
        .ok_or(ProtocolError::MissingHeaderField("content-type"))?
        .to_string();
    let content_length = obj
        .get("content-length")
        .and_then(|v| v.as_u64())
        .ok_or(ProtocolError::MissingHeaderField("content-length"))? as u32;
    Ok(WireHeader { byteorder, content_type, content_length })
}

/// Incremental frame decoder: feed it bytes as they arrive, call
/// [`FrameReader::try_parse`] after each feed to see if a complete message
/// is ready.
#[derive(Debug, Default)]
pub struct FrameReader {
    buf: Vec<u8>,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Returns `Ok(Some(payload))` once a full frame has been buffered,
    /// `Ok(None)` if more bytes are needed, or an error if the header is
    /// malformed or names an unrecognized content-type.
    pub fn try_parse(&mut self) -> Result<Option<Payload>, ProtocolError> {
        if self.buf.len() < 2 {
            return Ok(None);
        }
        let header_len = u16::from_be_bytes([self.buf[0], self.buf[1]]) as usize;
        if self.buf.len() < 2 + header_len {
            return Ok(None);
        }
        let header = parse_header(&self.buf[2..2 + header_len])?;
        let content_length = header.content_length as usize;
        let total = 2 + header_len + content_length;
        if self.buf.len() < total {
            return Ok(None);
        }

        let payload_bytes = self.buf[2 + header_len..total].to_vec();
        let content_type = ContentType::parse(&header.content_type)?;
        let payload = match content_type {
            ContentType::TransactionContent => Payload::TransactionContent(payload_bytes),
            ContentType::DatabaseContent => Payload::DatabaseContent(payload_bytes),
            ContentType::DbRequest => Payload::DbRequest,
        };
        self.buf.drain(0..total);
        Ok(Some(payload))
    }
}
