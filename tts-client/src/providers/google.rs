//! Google Cloud Text-to-Speech provider
//!
//! Direct HTTP implementation for the `v1beta1/text:synthesize` endpoint, which
//! is the API version that can report SSML mark timepoints.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TtsError};
use crate::provider::{SpeechSynthesizer, SynthesisRequest, SynthesisResponse, Timepoint};

const GOOGLE_TTS_BASE_URL: &str = "https://texttospeech.googleapis.com";
const SYNTHESIZE_PATH: &str = "/v1beta1/text:synthesize";

/// How requests are authenticated
#[derive(Debug, Clone)]
pub enum GoogleAuth {
    /// API key, sent as the `key` query parameter
    ApiKey(String),
    /// OAuth access token, sent as a bearer token
    AccessToken(String),
}

/// Provider for direct Google Cloud TTS calls
pub struct GoogleTtsProvider {
    auth: GoogleAuth,
    base_url: String,
    client: Client,
}

impl GoogleTtsProvider {
    /// Create a new Google TTS provider
    pub fn new(auth: GoogleAuth, base_url: Option<String>) -> Result<Self> {
        let client = Client::new();

        Ok(Self {
            auth,
            base_url: base_url.unwrap_or_else(|| GOOGLE_TTS_BASE_URL.to_string()),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), SYNTHESIZE_PATH)
    }
}

// Google TTS request/response types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceParams<'a>,
    audio_config: AudioConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    enable_time_pointing: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
struct SynthesisInput<'a> {
    ssml: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceParams<'a> {
    language_code: &'a str,
    name: &'a str,
    ssml_gender: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: String,
    #[serde(default)]
    timepoints: Vec<ResponseTimepoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseTimepoint {
    mark_name: String,
    #[serde(default)]
    time_seconds: f64,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

fn build_request_body(request: &SynthesisRequest) -> SynthesizeRequest<'_> {
    SynthesizeRequest {
        input: SynthesisInput {
            ssml: &request.ssml,
        },
        voice: VoiceParams {
            language_code: &request.voice.language_code,
            name: &request.voice.voice_name,
            ssml_gender: request.voice.gender.wire_name(),
        },
        audio_config: AudioConfig {
            audio_encoding: request.encoding.wire_name(),
        },
        enable_time_pointing: if request.enable_mark_timepoints {
            vec!["SSML_MARK"]
        } else {
            Vec::new()
        },
    }
}

fn parse_response_body(body: &str) -> Result<SynthesisResponse> {
    let api_response: SynthesizeResponse = serde_json::from_str(body)
        .map_err(|e| TtsError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

    let audio = BASE64
        .decode(api_response.audio_content.as_bytes())
        .map_err(|e| TtsError::InvalidResponse(format!("audioContent is not base64: {}", e)))?;

    let timepoints = api_response
        .timepoints
        .into_iter()
        .map(|tp| Timepoint::new(tp.mark_name, tp.time_seconds))
        .collect();

    Ok(SynthesisResponse { audio, timepoints })
}

#[async_trait]
impl SpeechSynthesizer for GoogleTtsProvider {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesisResponse> {
        let body = build_request_body(&request);

        log::debug!(
            "Google TTS request: voice={} encoding={} ssml_bytes={}",
            request.voice.voice_name,
            request.encoding.wire_name(),
            request.ssml.len()
        );

        let mut builder = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json");
        builder = match &self.auth {
            GoogleAuth::ApiKey(key) => builder.query(&[("key", key)]),
            GoogleAuth::AccessToken(token) => builder.bearer_auth(token),
        };

        let response = builder
            .json(&body)
            .send()
            .await
            .map_err(|e| TtsError::ApiError {
                message: format!("Request failed: {}", e),
                status_code: None,
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let error_text = response.text().await.unwrap_or_default();
            let message =
                if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(&error_text) {
                    error_response.error.message
                } else {
                    error_text
                };

            if status.as_u16() == 429 {
                return Err(TtsError::RateLimited { retry_after });
            }

            return Err(TtsError::ApiError {
                message,
                status_code: Some(status.as_u16()),
            });
        }

        let text = response.text().await.map_err(|e| TtsError::ApiError {
            message: format!("Failed to read response: {}", e),
            status_code: None,
        })?;

        parse_response_body(&text)
    }

    fn name(&self) -> &'static str {
        "Google Cloud TTS"
    }

    fn is_available(&self) -> Result<()> {
        let empty = match &self.auth {
            GoogleAuth::ApiKey(key) => key.is_empty(),
            GoogleAuth::AccessToken(token) => token.is_empty(),
        };
        if empty {
            return Err(TtsError::ProviderUnavailable(
                "Google TTS credentials are empty".to_string(),
            ));
        }
        Ok(())
    }
}
