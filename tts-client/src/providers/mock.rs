//! Mock speech synthesizer for testing
//!
//! Echoes one timepoint per SSML mark it receives and returns the request's
//! SSML bytes as "audio", so callers can check ordering without a real
//! encoder. Can be scripted to fail, drop marks, or respond slowly.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{Result, TtsError};
use crate::provider::{SpeechSynthesizer, SynthesisRequest, SynthesisResponse, Timepoint};

static MARK_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<mark name=['"]([^'"]+)['"]\s*/>"#).unwrap());

/// Seconds before the first mark in every response
const FIRST_MARK_SECONDS: f64 = 0.05;
/// Seconds between consecutive marks in a response
const MARK_SPACING_SECONDS: f64 = 0.35;

/// A scripted synthesizer for tests and dry runs
pub struct MockSynthesizer {
    call_count: AtomicUsize,
    /// Voice names whose requests always fail
    failing_voices: HashSet<String>,
    /// Zero-based call numbers that fail
    failing_calls: HashSet<usize>,
    /// Mark names left out of every response
    dropped_marks: HashSet<String>,
    delay: Option<Duration>,
    requests: Mutex<Vec<SynthesisRequest>>,
}

impl Default for MockSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSynthesizer {
    /// Create a synthesizer that always succeeds
    pub fn new() -> Self {
        Self {
            call_count: AtomicUsize::new(0),
            failing_voices: HashSet::new(),
            failing_calls: HashSet::new(),
            dropped_marks: HashSet::new(),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Fail every request addressed to `voice_name`
    pub fn failing_for_voice(mut self, voice_name: &str) -> Self {
        self.failing_voices.insert(voice_name.to_string());
        self
    }

    /// Fail the `n`th call (zero-based), counting across all voices
    pub fn failing_on_call(mut self, n: usize) -> Self {
        self.failing_calls.insert(n);
        self
    }

    /// Leave `mark_name` out of every response
    pub fn dropping_mark(mut self, mark_name: &str) -> Self {
        self.dropped_marks.insert(mark_name.to_string());
        self
    }

    /// Sleep before answering each request
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get the number of times synthesize() was called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// SSML of every request received, in arrival order
    pub fn received_ssml(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|r| r.iter().map(|req| req.ssml.clone()).collect())
            .unwrap_or_default()
    }
}

/// Mark names in document order
pub fn mark_names(ssml: &str) -> Vec<String> {
    MARK_NAME
        .captures_iter(ssml)
        .map(|c| c[1].to_string())
        .collect()
}

#[async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesisResponse> {
        let call_num = self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing_voices.contains(&request.voice.voice_name) {
            return Err(TtsError::ApiError {
                message: format!("voice {} rejected (mock)", request.voice.voice_name),
                status_code: Some(400),
            });
        }
        if self.failing_calls.contains(&call_num) {
            return Err(TtsError::ApiError {
                message: format!("call {} rejected (mock)", call_num),
                status_code: Some(400),
            });
        }

        let timepoints = if request.enable_mark_timepoints {
            mark_names(&request.ssml)
                .into_iter()
                .enumerate()
                .filter(|(_, name)| !self.dropped_marks.contains(name))
                .map(|(i, name)| {
                    Timepoint::new(name, FIRST_MARK_SECONDS + i as f64 * MARK_SPACING_SECONDS)
                })
                .collect()
        } else {
            Vec::new()
        };

        Ok(SynthesisResponse {
            audio: request.ssml.into_bytes(),
            timepoints,
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }

    fn is_available(&self) -> Result<()> {
        Ok(())
    }
}
