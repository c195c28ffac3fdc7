//! Bounded accumulator used to materialize bodies before inspection.
use bytes::{Bytes, BytesMut};
use http_body_util::BodyExt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BodyBufferError {
    /// The body grew past the configured bound
    #[error("body exceeds maximum size of {limit} bytes")]
    TooLarge { limit: usize },

    /// The underlying stream failed before completion
    #[error("failed to read body: {0}")]
    Read(String),
}

/// Helper to buffer request and response bodies for engine analysis.
///
/// Each request leg owns its own buffer.
#[derive(Debug)]
pub struct BodyBuffer {
    max_body_size: usize,
    buffer: BytesMut,
}

impl BodyBuffer {
    pub fn new(max_body_size: usize) -> Self {
        Self {
            max_body_size,
            buffer: BytesMut::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Append one chunk, refusing to grow past the bound
    pub fn append_chunk(&mut self, chunk: &[u8]) -> Result<(), BodyBufferError> {
        if self.buffer.len() + chunk.len() > self.max_body_size {
            return Err(BodyBufferError::TooLarge {
                limit: self.max_body_size,
            });
        }

        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    /// Drain a whole body stream into the buffer.
    ///
    /// Trailers are ignored. On error the partially read bytes stay in the
    /// buffer and must not be used.
    pub async fn read_from<B>(&mut self, mut body: B) -> Result<(), BodyBufferError>
    where
        B: hyper::body::Body<Data = Bytes> + Unpin,
        B::Error: std::fmt::Display,
    {
        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(|e| BodyBufferError::Read(e.to_string()))?;
            if let Ok(data) = frame.into_data() {
                self.append_chunk(&data)?;
            }
        }
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Hand out the buffered bytes, leaving the buffer empty
    pub fn take(&mut self) -> Bytes {
        self.buffer.split().freeze()
    }
}
