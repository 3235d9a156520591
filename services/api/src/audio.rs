//! Decoding of client audio payloads.
//!
//! Audio arrives from the browser as base64 text inside JSON; the backends
//! take raw bytes. The samples themselves are opaque to the server and pass
//! through unmodified.

use anyhow::{Context, Result};
use base64::Engine;
use bytes::Bytes;

/// Decodes one base64 media-chunk payload into raw audio bytes.
pub fn decode_media_chunk(data: &str) -> Result<Bytes> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data)
        .context("media chunk payload is not valid base64")?;
    Ok(Bytes::from(bytes))
}
