//! Speech synthesis provider implementations

mod google;
pub mod mock;

pub use google::{GoogleAuth, GoogleTtsProvider};
pub use mock::MockSynthesizer;

use crate::config::ProviderConfig;
use crate::error::{Result, TtsError};
use crate::provider::SpeechSynthesizer;

const GOOGLE_API_KEY_ENV: &str = "GOOGLE_TTS_API_KEY";
const GOOGLE_ACCESS_TOKEN_ENV: &str = "GOOGLE_TTS_ACCESS_TOKEN";

/// Supported provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Google,
    Mock,
}

impl ProviderKind {
    /// Parse provider kind from string
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "google" | "google-cloud" | "gcp" => Ok(Self::Google),
            "mock" => Ok(Self::Mock),
            _ => Err(TtsError::ConfigError(format!("Unknown provider: {}", s))),
        }
    }

    /// Get the environment variable name for this provider's credentials
    pub fn env_var(&self) -> Option<&'static str> {
        match self {
            Self::Google => Some(GOOGLE_API_KEY_ENV),
            Self::Mock => None,
        }
    }
}

/// Create a provider instance by name and optional config
pub fn get_provider(
    provider: &str,
    provider_config: Option<&ProviderConfig>,
) -> Result<Box<dyn SpeechSynthesizer>> {
    let kind = ProviderKind::from_str(provider)?;

    match kind {
        ProviderKind::Google => {
            let auth = get_google_auth(provider_config)?;
            let base_url = provider_config.and_then(|c| c.base_url.clone());
            Ok(Box::new(GoogleTtsProvider::new(auth, base_url)?))
        }
        ProviderKind::Mock => Ok(Box::new(MockSynthesizer::new())),
    }
}

/// Resolve Google credentials from config first, then environment variables
fn get_google_auth(config: Option<&ProviderConfig>) -> Result<GoogleAuth> {
    if let Some(key) = config.and_then(|c| c.api_key.clone()) {
        return Ok(GoogleAuth::ApiKey(key));
    }
    if let Some(token) = config.and_then(|c| c.access_token.clone()) {
        return Ok(GoogleAuth::AccessToken(token));
    }
    if let Ok(key) = std::env::var(GOOGLE_API_KEY_ENV) {
        return Ok(GoogleAuth::ApiKey(key));
    }
    if let Ok(token) = std::env::var(GOOGLE_ACCESS_TOKEN_ENV) {
        return Ok(GoogleAuth::AccessToken(token));
    }

    Err(TtsError::MissingCredentials {
        provider: "Google Cloud TTS".to_string(),
        env_var: GOOGLE_API_KEY_ENV.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!(ProviderKind::from_str("google").unwrap(), ProviderKind::Google);
        assert_eq!(ProviderKind::from_str("GCP").unwrap(), ProviderKind::Google);
        assert_eq!(ProviderKind::from_str("mock").unwrap(), ProviderKind::Mock);
        assert!(ProviderKind::from_str("polly").is_err());
    }

    #[test]
    fn test_get_mock_provider() {
        let provider = get_provider("mock", None).unwrap();
        assert_eq!(provider.name(), "mock");
    }

    #[test]
    fn test_google_provider_from_config() {
        let config = ProviderConfig {
            api_key: Some("from-config".to_string()),
            access_token: None,
            base_url: None,
        };
        let provider = get_provider("google", Some(&config)).unwrap();
        assert_eq!(provider.name(), "Google Cloud TTS");
        assert!(provider.is_available().is_ok());
    }

    #[test]
    fn test_access_token_from_config() {
        let config = ProviderConfig {
            api_key: None,
            access_token: Some("token".to_string()),
            base_url: None,
        };
        assert!(matches!(
            get_google_auth(Some(&config)).unwrap(),
            GoogleAuth::AccessToken(_)
        ));
    }
}
