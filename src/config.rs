//! Configuration types for the hello-world endpoint and caller.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::SoapError;

/// SOAP 1.1 envelope namespace.
pub const SOAP_11_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
/// SOAP 1.2 envelope namespace.
pub const SOAP_12_NS: &str = "http://www.w3.org/2003/05/soap-envelope";

/// Main configuration, shared by both binaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HelloConfig {
    /// Config version
    pub version: String,

    /// Service endpoint settings
    pub server: ServerSettings,

    /// Service caller settings
    pub client: ClientSettings,
}

impl Default for HelloConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            server: ServerSettings::default(),
            client: ClientSettings::default(),
        }
    }
}

impl HelloConfig {
    /// Load configuration from a YAML file.
    ///
    /// A missing file yields the defaults; an unreadable or malformed one is an error.
    pub async fn load(path: &Path) -> Result<Self, SoapError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, SoapError> {
        serde_yaml::from_str(yaml).map_err(|e| SoapError::Config(e.to_string()))
    }
}

/// Endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address the listener binds to
    pub bind_address: String,

    /// Base URL advertised in the WSDL when the request carries no Host header
    pub public_url: Option<String>,

    /// Maximum request body size (bytes)
    pub max_body_size: usize,

    /// SOAP versions accepted on the wire
    pub accepted_versions: Vec<SoapVersion>,

    /// Allowed Content-Type headers for SOAP requests
    pub allowed_content_types: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8000".to_string(),
            public_url: None,
            max_body_size: 1_048_576, // 1MB
            accepted_versions: vec![SoapVersion::Soap11, SoapVersion::Soap12],
            allowed_content_types: vec![
                "text/xml".to_string(),
                "application/soap+xml".to_string(),
                "application/xml".to_string(),
            ],
        }
    }
}

/// Caller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Where the interface description is fetched from
    pub wsdl_url: String,

    /// Envelope version used for invocations
    pub soap_version: SoapVersion,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            wsdl_url: "http://localhost:8000/?wsdl".to_string(),
            soap_version: SoapVersion::Soap11,
        }
    }
}

/// SOAP versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SoapVersion {
    /// SOAP 1.1 (namespace: http://schemas.xmlsoap.org/soap/envelope/)
    #[default]
    #[serde(rename = "1.1")]
    Soap11,
    /// SOAP 1.2 (namespace: http://www.w3.org/2003/05/soap-envelope)
    #[serde(rename = "1.2")]
    Soap12,
}

impl SoapVersion {
    /// Envelope namespace URI.
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Soap11 => SOAP_11_NS,
            Self::Soap12 => SOAP_12_NS,
        }
    }

    /// Detect the version from an envelope namespace URI.
    pub fn from_namespace(ns: &str) -> Option<Self> {
        match ns {
            SOAP_11_NS => Some(Self::Soap11),
            SOAP_12_NS => Some(Self::Soap12),
            _ => None,
        }
    }

    /// HTTP Content-Type for messages of this version.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Soap11 => "text/xml; charset=utf-8",
            Self::Soap12 => "application/soap+xml; charset=utf-8",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Soap11 => "1.1",
            Self::Soap12 => "1.2",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HelloConfig::default();
        assert_eq!(config.server.bind_address, "127.0.0.1:8000");
        assert_eq!(config.client.wsdl_url, "http://localhost:8000/?wsdl");
        assert_eq!(config.client.soap_version, SoapVersion::Soap11);
        assert_eq!(config.server.accepted_versions.len(), 2);
    }

    #[test]
    fn test_config_serialization() {
        let config = HelloConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed = HelloConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.server.max_body_size, config.server.max_body_size);
        assert_eq!(parsed.client.wsdl_url, config.client.wsdl_url);
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
version: "1"
server:
  bind_address: "0.0.0.0:9000"
  public_url: "http://soap.example.org:9000/"
  accepted_versions:
    - "1.1"
client:
  soap_version: "1.2"
"#;
        let config = HelloConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.bind_address, "0.0.0.0:9000");
        assert_eq!(
            config.server.public_url.as_deref(),
            Some("http://soap.example.org:9000/")
        );
        assert_eq!(config.server.accepted_versions, vec![SoapVersion::Soap11]);
        assert_eq!(config.client.soap_version, SoapVersion::Soap12);
        // untouched keys keep their defaults
        assert_eq!(config.server.max_body_size, 1_048_576);
        assert_eq!(config.client.wsdl_url, "http://localhost:8000/?wsdl");
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let err = HelloConfig::from_yaml("server: [not, a, map]").unwrap_err();
        assert!(matches!(err, SoapError::Config(_)));
    }

    #[tokio::test]
    async fn test_load_missing_file_uses_defaults() {
        let config = HelloConfig::load(Path::new("/nonexistent/hello-soap.yaml"))
            .await
            .unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:8000");
    }

    #[test]
    fn test_version_namespace_detection() {
        assert_eq!(SoapVersion::from_namespace(SOAP_11_NS), Some(SoapVersion::Soap11));
        assert_eq!(SoapVersion::from_namespace(SOAP_12_NS), Some(SoapVersion::Soap12));
        assert_eq!(SoapVersion::from_namespace("urn:other"), None);
        assert!(SoapVersion::Soap12.content_type().starts_with("application/soap+xml"));
    }
}
