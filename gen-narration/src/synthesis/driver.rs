//! Synthesis driver: one provider request per chunk, collected in chunk order.

use crate::error::{NarrationError, Result};
use crate::text::SsmlChunk;
use crate::voices::VoiceConfiguration;
use futures_util::{StreamExt, TryStreamExt, stream};
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;
use tts_client::{AudioEncoding, SpeechSynthesizer, SynthesisRequest, Timepoint, TtsError};

/// Options for driving synthesis of a story's chunks.
#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    /// Encoding requested from the provider
    pub encoding: AudioEncoding,
    /// Chunks of one voice in flight at once
    pub max_concurrent_chunks: usize,
    /// Limit for a single provider call
    pub request_timeout: Duration,
    /// Retries for rate limits and server errors
    pub max_retries: u32,
    /// Wait before the first retry; doubles on each further retry
    pub retry_backoff: Duration,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            encoding: AudioEncoding::Mp3,
            max_concurrent_chunks: 4,
            request_timeout: Duration::from_secs(60),
            max_retries: 3,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

/// Audio and chunk-local timepoints for one synthesized chunk.
#[derive(Debug, Clone)]
pub struct ChunkAudio {
    /// Index of the chunk this audio was synthesized from
    pub index: usize,
    /// Story-wide mark ids the chunk carried
    pub marks: Range<usize>,
    /// Encoded audio bytes
    pub audio: Vec<u8>,
    /// Timepoints with chunk-local mark names (`w0` is the chunk's first mark)
    pub timepoints: Vec<Timepoint>,
}

/// Sends chunks to a speech synthesizer.
pub struct SynthesisDriver {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    options: SynthesisOptions,
}

impl SynthesisDriver {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, options: SynthesisOptions) -> Self {
        Self {
            synthesizer,
            options,
        }
    }

    pub fn encoding(&self) -> AudioEncoding {
        self.options.encoding
    }

    /// Synthesize every chunk for one voice.
    ///
    /// Up to `max_concurrent_chunks` requests run at once. Results come back in
    /// chunk order. The first failing chunk fails the whole voice.
    pub async fn synthesize_chunks(
        &self,
        voice: &VoiceConfiguration,
        chunks: &[SsmlChunk],
    ) -> Result<Vec<ChunkAudio>> {
        let concurrency = self.options.max_concurrent_chunks.max(1);

        let mut results: Vec<ChunkAudio> = stream::iter(chunks)
            .map(|chunk| self.synthesize_chunk(voice, chunk))
            .buffered(concurrency)
            .try_collect()
            .await?;

        results.sort_by_key(|c| c.index);
        Ok(results)
    }

    /// Synthesize one chunk, retrying transient provider errors.
    async fn synthesize_chunk(
        &self,
        voice: &VoiceConfiguration,
        chunk: &SsmlChunk,
    ) -> Result<ChunkAudio> {
        let request = SynthesisRequest {
            ssml: chunk.request_ssml(),
            voice: voice.selection(),
            encoding: self.options.encoding,
            enable_mark_timepoints: true,
        };

        let mut attempt: u32 = 0;
        loop {
            let call = self.synthesizer.synthesize(request.clone());
            let outcome = tokio::time::timeout(self.options.request_timeout, call).await;

            match outcome {
                Err(_) => {
                    return Err(NarrationError::Timeout {
                        operation: format!(
                            "synthesizing chunk {} for {}",
                            chunk.index,
                            voice.label()
                        ),
                        after: self.options.request_timeout,
                    });
                }
                Ok(Ok(response)) => {
                    if response.timepoints.len() != chunk.mark_count() {
                        log::warn!(
                            "{} chunk {}: {} marks sent, {} timepoints returned",
                            voice.label(),
                            chunk.index,
                            chunk.mark_count(),
                            response.timepoints.len()
                        );
                    }
                    log::debug!(
                        "{} chunk {}: {} audio bytes, {} timepoints",
                        voice.label(),
                        chunk.index,
                        response.audio.len(),
                        response.timepoints.len()
                    );
                    return Ok(ChunkAudio {
                        index: chunk.index,
                        marks: chunk.marks.clone(),
                        audio: response.audio,
                        timepoints: response.timepoints,
                    });
                }
                Ok(Err(e)) if e.is_transient() && attempt < self.options.max_retries => {
                    attempt += 1;
                    let wait = self.backoff(attempt, &e);
                    log::warn!(
                        "{} chunk {} failed (attempt {}/{}), retrying in {:?}: {}",
                        voice.label(),
                        chunk.index,
                        attempt,
                        self.options.max_retries + 1,
                        wait,
                        e
                    );
                    tokio::time::sleep(wait).await;
                }
                Ok(Err(e)) => {
                    return Err(NarrationError::Synthesis {
                        chunk_index: chunk.index,
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    fn backoff(&self, attempt: u32, error: &TtsError) -> Duration {
        if let TtsError::RateLimited {
            retry_after: Some(secs),
        } = error
        {
            return Duration::from_secs(*secs);
        }
        self.options.retry_backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}
