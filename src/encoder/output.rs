//! Output targets of a finished walk.

use std::io::Write;

use bytes::Bytes;
use futures::stream::{self, LocalBoxStream, StreamExt};
use log::debug;

use super::Encoder;
use crate::{Error, Result};

/// A walked value graph, possibly still waiting for deferred extra types.
///
/// Synchronous targets ([`into_chunks`](Self::into_chunks),
/// [`into_bytes`](Self::into_bytes), [`write_to`](Self::write_to)) fail with
/// [`Error::SyncTargetConflict`] while anything is pending. The async
/// targets drive the outstanding futures first.
pub struct Encoding<'r> {
    encoder: Encoder<'r>,
}

impl<'r> Encoding<'r> {
    pub(super) fn new(encoder: Encoder<'r>) -> Self {
        Self { encoder }
    }

    /// Deferred serializations still outstanding.
    pub fn pending(&self) -> usize {
        self.encoder.pending.len()
    }

    pub fn is_complete(&self) -> bool {
        let buffer = &self.encoder.buffer;
        buffer.is_ready(buffer.root())
    }

    fn check_complete(&self) -> Result<()> {
        match self.pending() {
            0 => Ok(()),
            pending => Err(Error::SyncTargetConflict { pending }),
        }
    }

    pub fn into_chunks(self) -> Result<Vec<Bytes>> {
        self.check_complete()?;
        Ok(self.encoder.buffer.extract())
    }

    pub fn into_bytes(self) -> Result<Vec<u8>> {
        Ok(self.into_chunks()?.concat())
    }

    /// Writes all chunks in order; returns the number of bytes written.
    pub fn write_to(self, mut writer: impl Write) -> Result<usize> {
        let mut written = 0;
        for chunk in self.into_chunks()? {
            writer.write_all(&chunk)?;
            written += chunk.len();
        }
        writer.flush()?;
        Ok(written)
    }

    /// Waits for every deferred serialization, writing each result as it
    /// arrives. Results may also defer, so the loop runs until the queue
    /// drains.
    async fn drive(&mut self) -> Result<()> {
        let encoder = &mut self.encoder;
        while let Some(completed) = encoder.pending.next().await {
            encoder.complete_deferred(completed)?;
        }
        // Keine Deferreds: Manifest wurde schon in encode() geschrieben.
        encoder.finish_manifest();
        debug!("all deferred extra types resolved");
        Ok(())
    }

    pub async fn chunks(mut self) -> Result<Vec<Bytes>> {
        self.drive().await?;
        Ok(self.encoder.buffer.extract())
    }

    pub async fn bytes(self) -> Result<Vec<u8>> {
        Ok(self.chunks().await?.concat())
    }

    /// Stream of output chunks. Yields an error item instead if the
    /// deferred part fails.
    pub fn into_stream(self) -> LocalBoxStream<'r, Result<Bytes>> {
        stream::once(self.chunks())
            .flat_map(|result| match result {
                Ok(chunks) => stream::iter(chunks.into_iter().map(Ok)).left_stream(),
                Err(err) => stream::once(async move { Err(err) }).right_stream(),
            })
            .boxed_local()
    }
}
