//! Error types and SOAP Fault handling.

use quick_xml::escape::escape;
use std::fmt;
use thiserror::Error;

use crate::config::SoapVersion;

/// Errors raised by the endpoint and the caller.
#[derive(Error, Debug)]
pub enum SoapError {
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("DOCTYPE declarations are not allowed")]
    DoctypeNotAllowed,

    #[error("Invalid SOAP envelope: {0}")]
    InvalidEnvelope(String),

    #[error("Invalid WSDL: {0}")]
    Wsdl(String),

    #[error("Operation not found: {0}")]
    OperationNotFound(String),

    #[error("Operation {operation} expects {expected} argument(s), got {got}")]
    ArgumentMismatch {
        operation: String,
        expected: usize,
        got: usize,
    },

    #[error("SOAP fault: {0}")]
    Fault(Fault),

    #[error("Unexpected HTTP {status} response: {body}")]
    UnexpectedResponse { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<quick_xml::Error> for SoapError {
    fn from(e: quick_xml::Error) -> Self {
        Self::XmlParse(e.to_string())
    }
}

impl SoapError {
    /// Convert a request-processing error into the fault sent back to the caller.
    pub fn into_fault(self) -> Fault {
        match self {
            Self::Fault(fault) => fault,
            Self::Io(_) | Self::Http(_) | Self::Config(_) | Self::UnexpectedResponse { .. } => {
                Fault::server(self.to_string())
            }
            other => Fault::client(other.to_string()),
        }
    }
}

/// Which side of the exchange a fault blames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCode {
    /// The message was malformed or asked for something that does not exist
    Client,
    /// The endpoint failed while processing a well-formed message
    Server,
}

impl FaultCode {
    /// Qualified fault code value for the given envelope version.
    pub fn as_qualified(&self, version: SoapVersion) -> &'static str {
        match (version, self) {
            (SoapVersion::Soap11, Self::Client) => "soap:Client",
            (SoapVersion::Soap11, Self::Server) => "soap:Server",
            (SoapVersion::Soap12, Self::Client) => "soap:Sender",
            (SoapVersion::Soap12, Self::Server) => "soap:Receiver",
        }
    }

    /// Parse a fault code value, with or without its prefix.
    pub fn from_qualified(value: &str) -> Self {
        let local = value.rsplit(':').next().unwrap_or(value).trim();
        // SOAP 1.1 allows dotted refinements such as "Client.Authentication"
        let base = local.split('.').next().unwrap_or(local);
        match base {
            "Client" | "Sender" => Self::Client,
            _ => Self::Server,
        }
    }
}

/// A SOAP Fault carried in a response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub code: FaultCode,
    pub message: String,
}

impl Fault {
    pub fn client(message: impl Into<String>) -> Self {
        Self {
            code: FaultCode::Client,
            message: message.into(),
        }
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self {
            code: FaultCode::Server,
            message: message.into(),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self.code {
            FaultCode::Client => "Client",
            FaultCode::Server => "Server",
        };
        write!(f, "[{}] {}", code, self.message)
    }
}

/// Generate a SOAP Fault response envelope.
pub fn soap_fault_response(fault: &Fault, version: SoapVersion) -> String {
    match version {
        SoapVersion::Soap11 => soap_11_fault(fault),
        SoapVersion::Soap12 => soap_12_fault(fault),
    }
}

fn soap_11_fault(fault: &Fault) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="{}">
  <soap:Body>
    <soap:Fault>
      <faultcode>{}</faultcode>
      <faultstring>{}</faultstring>
    </soap:Fault>
  </soap:Body>
</soap:Envelope>"#,
        SoapVersion::Soap11.namespace(),
        fault.code.as_qualified(SoapVersion::Soap11),
        escape(fault.message.as_str())
    )
}

fn soap_12_fault(fault: &Fault) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="{}">
  <soap:Body>
    <soap:Fault>
      <soap:Code>
        <soap:Value>{}</soap:Value>
      </soap:Code>
      <soap:Reason>
        <soap:Text xml:lang="en">{}</soap:Text>
      </soap:Reason>
    </soap:Fault>
  </soap:Body>
</soap:Envelope>"#,
        SoapVersion::Soap12.namespace(),
        fault.code.as_qualified(SoapVersion::Soap12),
        escape(fault.message.as_str())
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soap_11_fault() {
        let fault = Fault::client("Unknown operation: say_goodbye");
        let xml = soap_fault_response(&fault, SoapVersion::Soap11);
        assert!(xml.contains("http://schemas.xmlsoap.org/soap/envelope/"));
        assert!(xml.contains("<faultcode>soap:Client</faultcode>"));
        assert!(xml.contains("Unknown operation: say_goodbye"));
    }

    #[test]
    fn test_soap_12_fault() {
        let fault = Fault::server("boom");
        let xml = soap_fault_response(&fault, SoapVersion::Soap12);
        assert!(xml.contains("http://www.w3.org/2003/05/soap-envelope"));
        assert!(xml.contains("soap:Receiver"));
    }

    #[test]
    fn test_fault_message_is_escaped() {
        let fault = Fault::client("bad <input> & more");
        let xml = soap_fault_response(&fault, SoapVersion::Soap11);
        assert!(xml.contains("bad &lt;input&gt; &amp; more"));
    }

    #[test]
    fn test_fault_code_from_qualified() {
        assert_eq!(FaultCode::from_qualified("soap:Client"), FaultCode::Client);
        assert_eq!(FaultCode::from_qualified("env:Sender"), FaultCode::Client);
        assert_eq!(FaultCode::from_qualified("Client.Authentication"), FaultCode::Client);
        assert_eq!(FaultCode::from_qualified("soap:Server"), FaultCode::Server);
        assert_eq!(FaultCode::from_qualified("soap:Receiver"), FaultCode::Server);
    }

    #[test]
    fn test_into_fault_classification() {
        let fault = SoapError::OperationNotFound("x".into()).into_fault();
        assert_eq!(fault.code, FaultCode::Client);

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert_eq!(SoapError::from(io).into_fault().code, FaultCode::Server);

        let original = Fault::server("kept");
        assert_eq!(SoapError::Fault(original.clone()).into_fault(), original);
    }
}
