// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `Content-Length` framing for JSON messages.
//!
//! Each frame is a header block terminated by `\r\n\r\n` followed by exactly
//! `Content-Length` bytes of UTF-8 JSON. Frame boundaries come only from the
//! declared length, never from scanning the body.

use std::io;

use bytes::{Buf, BufMut, BytesMut};
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::{names, GLOBAL_METRICS};

/// Terminates the header block.
pub const HEADER_SEPARATOR: &[u8] = b"\r\n\r\n";

/// Unterminated header data beyond this size is treated as garbage.
pub const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Largest body a frame may declare (16 MiB). Larger frames are skipped.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Upper bound on buffer growth per partial read while a body arrives.
const RESERVE_CHUNK: usize = 64 * 1024;

/// Codec for `Content-Length` framed JSON.
///
/// Decoding is resilient: a header block without a usable length, or a body
/// that is not valid JSON, is logged and skipped, and decoding continues
/// with the bytes that follow.
#[derive(Debug, Default)]
pub struct ContentLengthCodec {
    /// Body length of a frame whose header was consumed but whose body has
    /// not fully arrived.
    body_len: Option<usize>,
    /// Frames discarded so far.
    discarded: u64,
}

impl ContentLengthCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames skipped because they could not be parsed.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    fn discard(&mut self) {
        self.discarded += 1;
        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.increment(names::RPC_MALFORMED_FRAME);
    }
}

/// Extract the `Content-Length` value from a header block (without the
/// trailing separator). Header names are case-insensitive.
pub fn parse_content_length(header: &[u8]) -> Option<usize> {
    let text = std::str::from_utf8(header).ok()?;
    text.split("\r\n").find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

fn find_separator(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_SEPARATOR.len())
        .position(|window| window == HEADER_SEPARATOR)
}

impl Decoder for ContentLengthCodec {
    type Item = Value;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Value>, io::Error> {
        loop {
            let len = match self.body_len {
                Some(len) => len,
                None => {
                    let Some(pos) = find_separator(src) else {
                        if src.len() > MAX_HEADER_BYTES {
                            // Keep a possible partial separator at the tail.
                            let drop_len = src.len() - (HEADER_SEPARATOR.len() - 1);
                            warn!(bytes = drop_len, "Discarding unterminated frame header");
                            src.advance(drop_len);
                            self.discard();
                        }
                        return Ok(None);
                    };

                    let header = src.split_to(pos + HEADER_SEPARATOR.len());
                    match parse_content_length(&header[..pos]) {
                        Some(len) if len > MAX_FRAME_BYTES => {
                            warn!(
                                declared = len,
                                max = MAX_FRAME_BYTES,
                                "Discarding frame header with oversized Content-Length"
                            );
                            self.discard();
                            continue;
                        }
                        Some(len) => {
                            self.body_len = Some(len);
                            len
                        }
                        None => {
                            warn!(
                                header = %String::from_utf8_lossy(&header[..pos]),
                                "Discarding frame header without Content-Length"
                            );
                            self.discard();
                            continue;
                        }
                    }
                }
            };

            if src.len() < len {
                src.reserve((len - src.len()).min(RESERVE_CHUNK));
                return Ok(None);
            }

            let body = src.split_to(len);
            self.body_len = None;

            match serde_json::from_slice::<Value>(&body) {
                Ok(value) => return Ok(Some(value)),
                Err(e) => {
                    warn!(error = %e, bytes = len, "Discarding malformed frame body");
                    self.discard();
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Value>, io::Error> {
        if let Some(value) = self.decode(src)? {
            return Ok(Some(value));
        }
        if !src.is_empty() {
            debug!(bytes = src.len(), "Discarding incomplete frame at end of stream");
            src.clear();
            self.body_len = None;
        }
        Ok(None)
    }
}

impl Encoder<Value> for ContentLengthCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Value, dst: &mut BytesMut) -> Result<(), io::Error> {
        let body = serde_json::to_vec(&item)?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        dst.reserve(header.len() + body.len());
        dst.put_slice(header.as_bytes());
        dst.put_slice(&body);
        Ok(())
    }
}

/// Frame a single message into bytes.
pub fn encode_frame(message: &Value) -> Result<Vec<u8>, serde_json::Error> {
    let body = serde_json::to_vec(message)?;
    let mut frame = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    frame.extend_from_slice(&body);
    Ok(frame)
}
