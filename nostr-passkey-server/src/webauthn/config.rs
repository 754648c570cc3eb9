//! WebAuthn Relying Party configuration
//!
//! Configures the WebAuthn library with Relying Party (RP) identity.

use url::Url;
use webauthn_rs::prelude::*;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid origin URL: {0}")]
    InvalidOrigin(String),
    #[error("WebAuthn error: {0:?}")]
    Webauthn(WebauthnError),
}

/// WebAuthn configuration wrapper
pub struct WebAuthnConfig {
    webauthn: Webauthn,
    rp_origin: Url,
}

impl WebAuthnConfig {
    /// Create a new WebAuthn configuration
    ///
    /// # Arguments
    ///
    /// * `rp_id` - Relying Party ID (the registrable domain, e.g. `forum.example.com`)
    /// * `rp_origin` - Relying Party origin URL browsers will report in `clientDataJSON`
    /// * `rp_name` - Human-readable name for the Relying Party
    pub fn new(rp_id: &str, rp_origin: &Url, rp_name: &str) -> Result<Self, WebauthnError> {
        let builder = WebauthnBuilder::new(rp_id, rp_origin)?
            .rp_name(rp_name)
            .allow_subdomains(false);

        Ok(Self {
            webauthn: builder.build()?,
            rp_origin: rp_origin.clone(),
        })
    }

    /// Create configuration from string settings
    pub fn from_settings(rp_id: &str, rp_origin: &str, rp_name: &str) -> Result<Self, ConfigError> {
        let origin =
            Url::parse(rp_origin).map_err(|e| ConfigError::InvalidOrigin(format!("{}", e)))?;

        Self::new(rp_id, &origin, rp_name).map_err(ConfigError::Webauthn)
    }

    /// Get a reference to the Webauthn instance
    pub fn webauthn(&self) -> &Webauthn {
        &self.webauthn
    }

    pub fn rp_origin(&self) -> &Url {
        &self.rp_origin
    }
}

impl std::fmt::Debug for WebAuthnConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebAuthnConfig")
            .field("webauthn", &"<Webauthn instance>")
            .field("rp_origin", &self.rp_origin.as_str())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let origin = Url::parse("http://localhost:5173").unwrap();
        let config = WebAuthnConfig::new("localhost", &origin, "Test").unwrap();
        assert!(config.webauthn().get_allowed_origins().contains(&origin));
        assert_eq!(config.rp_origin(), &origin);
    }

    #[test]
    fn test_invalid_origin_rejected() {
        let result = WebAuthnConfig::from_settings("localhost", "not a url", "Test");
        assert!(matches!(result, Err(ConfigError::InvalidOrigin(_))));
    }

    #[test]
    fn test_rp_id_must_match_origin() {
        let result =
            WebAuthnConfig::from_settings("forum.example.com", "https://evil.example.net", "Test");
        assert!(matches!(result, Err(ConfigError::Webauthn(_))));
    }
}
