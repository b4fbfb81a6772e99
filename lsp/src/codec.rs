//! JSON-RPC framing codec for LSP communication.
//!
//! LSP uses `Content-Length: N\r\n\r\n{json}` framing over stdin/stdout.
//! This module provides [`FrameReader`] and [`FrameWriter`] for async
//! reading and writing of framed JSON-RPC messages.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::{Error, Result};

/// Maximum frame size (4 MiB) to prevent unbounded memory allocation.
const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// Reads JSON-RPC frames from an async reader.
///
/// Parses `Content-Length` headers and reads exactly that many bytes, then
/// deserializes the body as JSON. Partial reads are handled by the
/// underlying buffered reader: headers and bodies may arrive split across
/// any chunk boundaries, and several complete frames may sit in one chunk.
pub struct FrameReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Read the next JSON-RPC frame.
    ///
    /// Returns `Ok(None)` on EOF (clean shutdown). Returns
    /// [`Error::Framing`] on malformed headers or oversized frames — the
    /// stream position is unknown and the caller should tear down. Returns
    /// [`Error::FrameParse`] when the body bytes were fully consumed but
    /// are not valid JSON — the stream is still aligned on a frame
    /// boundary, so the caller may keep reading.
    pub async fn read_frame(&mut self) -> Result<Option<serde_json::Value>> {
        let content_length = match self.read_headers().await? {
            Some(len) => len,
            None => return Ok(None), // EOF
        };

        if content_length > MAX_FRAME_BYTES {
            return Err(Error::framing(format!(
                "Content-Length {content_length} exceeds maximum {MAX_FRAME_BYTES}"
            )));
        }

        let mut body = vec![0u8; content_length];
        self.reader
            .read_exact(&mut body)
            .await
            .map_err(|e| Error::framing(format!("reading frame body: {e}")))?;

        match serde_json::from_slice(&body) {
            Ok(value) => Ok(Some(value)),
            Err(e) => Err(Error::FrameParse(e.to_string())),
        }
    }

    /// Parse headers until the empty line separator.
    ///
    /// Returns the `Content-Length` value, or `None` on EOF.
    async fn read_headers(&mut self) -> Result<Option<usize>> {
        let mut content_length: Option<usize> = None;
        let mut line = String::new();
        let mut saw_any_header_bytes = false;

        loop {
            line.clear();
            let bytes_read = self
                .reader
                .read_line(&mut line)
                .await
                .map_err(|e| Error::framing(format!("reading header line: {e}")))?;

            if bytes_read == 0 {
                // EOF is a clean shutdown only between frames, never inside
                // a header block.
                if !saw_any_header_bytes {
                    return Ok(None);
                }
                return Err(Error::framing("unexpected EOF while reading headers"));
            }
            saw_any_header_bytes = true;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                // Empty line = end of headers
                break;
            }

            // LSP spec uses "Content-Length" but parse case-insensitively.
            if let Some(colon_pos) = trimmed.find(':') {
                let key = &trimmed[..colon_pos];
                if key.eq_ignore_ascii_case("Content-Length") {
                    let len: usize = trimmed[colon_pos + 1..].trim().parse().map_err(|_| {
                        Error::framing(format!("invalid Content-Length value in {trimmed:?}"))
                    })?;
                    content_length = Some(len);
                }
            }
            // Ignore other headers (e.g. Content-Type)
        }

        match content_length {
            Some(len) => Ok(Some(len)),
            None => Err(Error::framing("missing Content-Length header")),
        }
    }
}

/// Writes JSON-RPC frames to an async writer.
///
/// Serializes JSON and prepends the `Content-Length` header.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write a JSON-RPC frame with `Content-Length` header.
    pub async fn write_frame(&mut self, msg: &serde_json::Value) -> Result<()> {
        let body = serde_json::to_string(msg)?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());

        self.writer.write_all(header.as_bytes()).await?;
        self.writer.write_all(body.as_bytes()).await?;
        self.writer.flush().await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// Reader that yields the underlying bytes in fixed-size chunks, so
    /// tests can force headers and bodies to split at arbitrary points.
    struct ChunkedReader {
        data: Vec<u8>,
        pos: usize,
        chunk: usize,
    }

    impl ChunkedReader {
        fn new(data: Vec<u8>, chunk: usize) -> Self {
            Self {
                data,
                pos: 0,
                chunk,
            }
        }
    }

    impl AsyncRead for ChunkedReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            let this = self.get_mut();
            if this.pos >= this.data.len() {
                return Poll::Ready(Ok(()));
            }
            let end = (this.pos + this.chunk).min(this.data.len());
            let take = end.min(this.pos + buf.remaining());
            buf.put_slice(&this.data[this.pos..take]);
            this.pos = take;
            Poll::Ready(Ok(()))
        }
    }

    async fn encode(msg: &serde_json::Value) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut writer = FrameWriter::new(&mut buf);
        writer.write_frame(msg).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn roundtrip() {
        let msg = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "textDocument/publishDiagnostics",
            "params": { "uri": "file:///test.rs" }
        });

        let buf = encode(&msg).await;
        let mut reader = FrameReader::new(buf.as_slice());
        let result = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(result, msg);
    }

    #[tokio::test]
    async fn roundtrip_survives_arbitrary_chunk_boundaries() {
        let msg1 = serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": {"ok": true}});
        let msg2 = serde_json::json!({"jsonrpc": "2.0", "method": "note", "params": [1, 2]});

        let mut bytes = encode(&msg1).await;
        bytes.extend(encode(&msg2).await);

        for chunk in [1, 2, 3, 5, 7, 16, 64, 4096] {
            let mut reader = FrameReader::new(ChunkedReader::new(bytes.clone(), chunk));
            assert_eq!(reader.read_frame().await.unwrap().unwrap(), msg1);
            assert_eq!(reader.read_frame().await.unwrap().unwrap(), msg2);
            assert!(reader.read_frame().await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn multiple_frames_in_one_buffer() {
        let msg1 = serde_json::json!({"jsonrpc": "2.0", "id": 1});
        let msg2 = serde_json::json!({"jsonrpc": "2.0", "id": 2});

        let mut buf = encode(&msg1).await;
        buf.extend(encode(&msg2).await);

        let mut reader = FrameReader::new(buf.as_slice());
        assert_eq!(reader.read_frame().await.unwrap().unwrap(), msg1);
        assert_eq!(reader.read_frame().await.unwrap().unwrap(), msg2);
    }

    #[tokio::test]
    async fn eof_returns_none() {
        let buf: &[u8] = b"";
        let mut reader = FrameReader::new(buf);
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_content_length_is_framing_error() {
        let buf: &[u8] = b"Content-Type: application/json\r\n\r\n{}";
        let mut reader = FrameReader::new(buf);
        assert!(matches!(reader.read_frame().await, Err(Error::Framing(_))));
    }

    #[tokio::test]
    async fn eof_mid_headers_is_error() {
        let buf: &[u8] = b"Content-Length: 10\r\n";
        let mut reader = FrameReader::new(buf);
        assert!(matches!(reader.read_frame().await, Err(Error::Framing(_))));
    }

    #[tokio::test]
    async fn invalid_content_length_value() {
        let buf: &[u8] = b"Content-Length: not_a_number\r\n\r\n";
        let mut reader = FrameReader::new(buf);
        assert!(matches!(reader.read_frame().await, Err(Error::Framing(_))));
    }

    #[tokio::test]
    async fn oversized_frame_rejected() {
        let header = format!("Content-Length: {}\r\n\r\n", MAX_FRAME_BYTES + 1);
        let mut reader = FrameReader::new(header.as_bytes());
        assert!(matches!(reader.read_frame().await, Err(Error::Framing(_))));
    }

    #[tokio::test]
    async fn case_insensitive_content_length() {
        let body = r#"{"jsonrpc":"2.0","id":1}"#;
        let frame = format!("content-length: {}\r\n\r\n{body}", body.len());

        let mut reader = FrameReader::new(frame.as_bytes());
        let result = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(result["id"], 1);
    }

    #[tokio::test]
    async fn ignores_extra_headers() {
        let body = r#"{"jsonrpc":"2.0","id":1}"#;
        let frame = format!(
            "Content-Type: application/vscode-jsonrpc; charset=utf-8\r\nContent-Length: {}\r\n\r\n{body}",
            body.len(),
        );

        let mut reader = FrameReader::new(frame.as_bytes());
        let result = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(result["id"], 1);
    }

    #[tokio::test]
    async fn invalid_json_body_is_recoverable() {
        // A bad body must not poison the stream: the frame after it parses.
        let bad = b"not valid json!!!";
        let good = r#"{"jsonrpc":"2.0","id":7}"#;
        let mut buf = format!("Content-Length: {}\r\n\r\n", bad.len()).into_bytes();
        buf.extend_from_slice(bad);
        buf.extend(format!("Content-Length: {}\r\n\r\n{good}", good.len()).into_bytes());

        let mut reader = FrameReader::new(buf.as_slice());
        assert!(matches!(
            reader.read_frame().await,
            Err(Error::FrameParse(_))
        ));
        let next = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(next["id"], 7);
    }

    #[tokio::test]
    async fn eof_mid_body() {
        let buf: &[u8] = b"Content-Length: 100\r\n\r\nhello";
        let mut reader = FrameReader::new(buf);
        assert!(matches!(reader.read_frame().await, Err(Error::Framing(_))));
    }

    #[tokio::test]
    async fn content_length_counts_bytes_not_chars() {
        // "é" is 2 bytes in UTF-8, so {"k":"é"} is 10 bytes.
        let body = r#"{"k":"é"}"#;
        assert_eq!(body.len(), 10);
        let frame = format!("Content-Length: {}\r\n\r\n{body}", body.len());

        let mut reader = FrameReader::new(frame.as_bytes());
        let result = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(result["k"], "é");
    }

    #[tokio::test]
    async fn write_content_length_is_byte_count() {
        let msg = serde_json::json!({"k": "é"});
        let buf = encode(&msg).await;

        let output = String::from_utf8(buf).unwrap();
        let body = serde_json::to_string(&msg).unwrap();
        assert!(output.starts_with(&format!("Content-Length: {}\r\n\r\n", body.len())));
    }
}
