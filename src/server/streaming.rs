use anyhow::Result;
use futures::stream::{Stream, StreamExt};
use uuid::Uuid;

use crate::stream::ChunkStream;

/// Adapt a job's chunk stream into a response body stream.
///
/// A generation error is passed through as the body's error, which makes
/// hyper abort the chunked response instead of ending it cleanly.
pub fn text_body(job_id: Uuid, chunks: ChunkStream) -> impl Stream<Item = Result<String>> {
    async_stream::stream! {
        let mut chunks = chunks;
        let mut bytes_sent = 0usize;

        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(text) => {
                    bytes_sent += text.len();
                    yield Ok(text);
                }
                Err(e) => {
                    tracing::warn!(%job_id, bytes_sent, "Aborting response body: {:#}", e);
                    yield Err(e);
                    return;
                }
            }
        }

        tracing::debug!(%job_id, bytes_sent, "Response body complete");
    }
}
