//! Speech synthesis client library for the gen-narration workspace
//!
//! Provides a unified interface over speech synthesis providers that can
//! report SSML mark timepoints alongside the synthesized audio:
//! - Google Cloud Text-to-Speech (REST, v1beta1)
//! - Mock synthesizer (deterministic, for tests and dry runs)

pub mod config;
pub mod error;
pub mod provider;
pub mod providers;

pub use config::{Config, ProviderConfig};
pub use error::{Result, TtsError};
pub use provider::{
    AudioEncoding, SpeechSynthesizer, SynthesisRequest, SynthesisResponse, Timepoint, VoiceGender,
    VoiceSelection,
};
pub use providers::{GoogleAuth, GoogleTtsProvider, MockSynthesizer, ProviderKind, get_provider};
