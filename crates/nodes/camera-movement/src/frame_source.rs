//! JPEG frames from a multipart HTTP stream.
//!
//! Each call opens the stream, reads chunk by chunk until one complete JPEG
//! (start marker `FF D8` through end marker `FF D9`) is buffered, and drops
//! the connection. Reconnecting per frame always yields the camera's current
//! picture instead of a backlog.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// JPEG start-of-image marker
pub const SOI: [u8; 2] = [0xFF, 0xD8];
/// JPEG end-of-image marker
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Give up on a response after buffering this much without a complete frame.
pub const MAX_FRAME_BUFFER: usize = 4 * 1024 * 1024;

/// Errors while fetching a frame
#[derive(Debug, Error)]
pub enum FrameSourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("stream responded with status {0}")]
    Status(u16),
    #[error("no frame within {0:?}")]
    Timeout(Duration),
}

/// Source of encoded frames.
#[async_trait]
pub trait FrameSource: Send {
    /// Fetch the next encoded frame.
    ///
    /// `Ok(None)` means the stream ended or overflowed without a complete frame.
    async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FrameSourceError>;
}

/// [`FrameSource`] reading an MJPEG stream over HTTP.
pub struct MjpegFrameSource {
    http: reqwest::Client,
    url: String,
    frame_timeout: Duration,
}

impl MjpegFrameSource {
    pub fn new(url: &str, frame_timeout: Duration) -> Result<Self, FrameSourceError> {
        // No overall request timeout: the body is an endless stream, so the
        // per-frame timeout below bounds the read instead.
        let http = reqwest::Client::builder()
            .connect_timeout(frame_timeout)
            .build()?;
        Ok(Self {
            http,
            url: url.to_string(),
            frame_timeout,
        })
    }

    async fn read_frame(&self) -> Result<Option<Vec<u8>>, FrameSourceError> {
        let mut response = self.http.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(FrameSourceError::Status(response.status().as_u16()));
        }

        let mut scanner = FrameScanner::default();
        while let Some(chunk) = response.chunk().await? {
            if let Some(frame) = scanner.push(&chunk) {
                return Ok(Some(frame));
            }
            if scanner.buffered() > MAX_FRAME_BUFFER {
                log::warn!(
                    "No complete frame in {} buffered bytes from {}",
                    scanner.buffered(),
                    self.url
                );
                return Ok(None);
            }
        }

        log::debug!("Stream {} ended without a complete frame", self.url);
        Ok(None)
    }
}

#[async_trait]
impl FrameSource for MjpegFrameSource {
    async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FrameSourceError> {
        tokio::time::timeout(self.frame_timeout, self.read_frame())
            .await
            .map_err(|_| FrameSourceError::Timeout(self.frame_timeout))?
    }
}

/// Incremental search for one JPEG in a byte stream.
#[derive(Debug, Default)]
pub struct FrameScanner {
    buffer: Vec<u8>,
}

impl FrameScanner {
    /// Append a chunk; returns the first complete frame once one is buffered.
    pub fn push(&mut self, chunk: &[u8]) -> Option<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);

        let Some(start) = find_marker(&self.buffer, &SOI) else {
            // Keep a trailing 0xFF: the marker may straddle two chunks.
            let keep = usize::from(self.buffer.last() == Some(&SOI[0]));
            self.buffer.drain(..self.buffer.len() - keep);
            return None;
        };
        if start > 0 {
            self.buffer.drain(..start);
        }

        let end = find_marker(&self.buffer[SOI.len()..], &EOI)? + SOI.len();
        let frame_end = end + EOI.len();
        let frame = self.buffer[..frame_end].to_vec();
        self.buffer.drain(..frame_end);
        Some(frame)
    }

    /// Bytes held while waiting for the rest of a frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

fn find_marker(buffer: &[u8], marker: &[u8]) -> Option<usize> {
    buffer
        .windows(marker.len())
        .position(|window| window == marker)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: &[u8] = &[0xFF, 0xD8, 1, 2, 3, 0xFF, 0xD9];

    #[test]
    fn test_frame_in_single_chunk() {
        let mut scanner = FrameScanner::default();
        let mut chunk = b"--boundary\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        chunk.extend_from_slice(FRAME);
        chunk.extend_from_slice(b"\r\n--boundary");
        assert_eq!(scanner.push(&chunk), Some(FRAME.to_vec()));
    }

    #[test]
    fn test_frame_across_chunks() {
        let mut scanner = FrameScanner::default();
        assert_eq!(scanner.push(&[b'x', 0xFF, 0xD8, 1]), None);
        assert_eq!(scanner.push(&[2, 3, 0xFF]), None);
        assert_eq!(scanner.push(&[0xD9, b'y']), Some(FRAME.to_vec()));
    }

    #[test]
    fn test_start_marker_split_between_chunks() {
        let mut scanner = FrameScanner::default();
        assert_eq!(scanner.push(&[b'a', b'b', 0xFF]), None);
        assert_eq!(scanner.buffered(), 1);
        assert_eq!(scanner.push(&[0xD8, 1, 2, 3, 0xFF, 0xD9]), Some(FRAME.to_vec()));
    }

    #[test]
    fn test_noise_without_start_is_discarded() {
        let mut scanner = FrameScanner::default();
        assert_eq!(scanner.push(&[1, 2, 3, 0xFF, 0xD9]), None);
        assert_eq!(scanner.buffered(), 0);
    }

    #[test]
    fn test_end_marker_must_follow_start() {
        // FF D8 FF D9 is the smallest frame; the end marker cannot overlap the start.
        let mut scanner = FrameScanner::default();
        assert_eq!(scanner.push(&[0xFF, 0xD8, 0xD9]), None);
        assert_eq!(
            scanner.push(&[0xFF, 0xD9]),
            Some(vec![0xFF, 0xD8, 0xD9, 0xFF, 0xD9])
        );
    }

    #[test]
    fn test_first_of_two_frames() {
        let mut scanner = FrameScanner::default();
        let mut chunk = FRAME.to_vec();
        chunk.extend_from_slice(&[0xFF, 0xD8, 9, 0xFF, 0xD9]);
        assert_eq!(scanner.push(&chunk), Some(FRAME.to_vec()));
    }
}
