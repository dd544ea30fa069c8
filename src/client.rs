//! SOAP caller driven by a fetched WSDL.
//!
//! [`SoapClient`] holds the parsed [`ServiceDescription`]; [`ServiceProxy`]
//! turns operation calls into envelopes POSTed to the advertised address.
//! Transport and encoding errors propagate unchanged; nothing is retried.

use reqwest::header::CONTENT_TYPE;
use tracing::{debug, info};

use crate::config::{ClientSettings, SoapVersion};
use crate::envelope::{build_request, response_element};
use crate::error::SoapError;
use crate::parser::{parse_soap_envelope, BodyContent};
use crate::service::SAY_HELLO;
use crate::wsdl::{parse_wsdl, OperationDescriptor, ServiceDescription};

/// Client bound to one service description.
#[derive(Debug, Clone)]
pub struct SoapClient {
    http: reqwest::Client,
    description: ServiceDescription,
    version: SoapVersion,
}

impl SoapClient {
    /// Fetch the WSDL at `wsdl_url` and build a SOAP 1.1 client from it.
    pub async fn from_wsdl(wsdl_url: &str) -> Result<Self, SoapError> {
        Self::fetch(reqwest::Client::new(), wsdl_url, SoapVersion::Soap11).await
    }

    /// Fetch the configured WSDL and use the configured envelope version.
    pub async fn with_settings(settings: &ClientSettings) -> Result<Self, SoapError> {
        Self::fetch(reqwest::Client::new(), &settings.wsdl_url, settings.soap_version).await
    }

    /// Build a client from an already known description.
    pub fn from_description(description: ServiceDescription, version: SoapVersion) -> Self {
        Self {
            http: reqwest::Client::new(),
            description,
            version,
        }
    }

    async fn fetch(
        http: reqwest::Client,
        wsdl_url: &str,
        version: SoapVersion,
    ) -> Result<Self, SoapError> {
        debug!(url = %wsdl_url, "Fetching WSDL");
        let response = http.get(wsdl_url).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(SoapError::UnexpectedResponse {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let description = parse_wsdl(&body)?;
        info!(
            service = %description.service_name,
            location = %description.location,
            operations = description.operations.len(),
            "Service description loaded"
        );

        Ok(Self {
            http,
            description,
            version,
        })
    }

    pub fn description(&self) -> &ServiceDescription {
        &self.description
    }

    /// Proxy for invoking the service's operations.
    pub fn service(&self) -> ServiceProxy<'_> {
        ServiceProxy { client: self }
    }
}

/// Callable view of a service's operations.
pub struct ServiceProxy<'a> {
    client: &'a SoapClient,
}

impl ServiceProxy<'_> {
    /// Invoke `operation` with positional string arguments, matched to the
    /// operation's input parts in WSDL order.
    pub async fn call(&self, operation: &str, args: &[&str]) -> Result<String, SoapError> {
        let description = &self.client.description;
        let version = self.client.version;

        let op = description
            .operation(operation)
            .ok_or_else(|| SoapError::OperationNotFound(operation.to_string()))?;
        if args.len() != op.inputs.len() {
            return Err(SoapError::ArgumentMismatch {
                operation: op.name.clone(),
                expected: op.inputs.len(),
                got: args.len(),
            });
        }

        let named: Vec<(&str, &str)> = op
            .inputs
            .iter()
            .map(|part| part.name.as_str())
            .zip(args.iter().copied())
            .collect();
        let envelope = build_request(version, &description.target_namespace, &op.name, &named);

        let request = self.client.http.post(description.location.as_str());
        let request = match version {
            SoapVersion::Soap11 => request
                .header(CONTENT_TYPE, version.content_type())
                .header("SOAPAction", format!("\"{}\"", op.soap_action)),
            SoapVersion::Soap12 => request.header(
                CONTENT_TYPE,
                format!("{}; action=\"{}\"", version.content_type(), op.soap_action),
            ),
        };

        debug!(operation = %op.name, location = %description.location, "Invoking operation");
        let response = request.body(envelope).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        let reply = match parse_soap_envelope(&body) {
            Ok(reply) => reply,
            Err(e) if status.is_success() => return Err(e),
            Err(_) => {
                return Err(SoapError::UnexpectedResponse {
                    status: status.as_u16(),
                    body: String::from_utf8_lossy(&body).into_owned(),
                })
            }
        };

        read_result(op, &description.target_namespace, reply.body)
    }

    pub async fn say_hello(&self, name: &str) -> Result<String, SoapError> {
        self.call(SAY_HELLO, &[name]).await
    }
}

/// Extract the result of `op` from a reply body.
///
/// The wrapper must be `{op}Response`, qualified with the target namespace
/// when qualified at all.
fn read_result(
    op: &OperationDescriptor,
    target_namespace: &str,
    body: BodyContent,
) -> Result<String, SoapError> {
    let call = match body {
        BodyContent::Fault(fault) => return Err(SoapError::Fault(fault)),
        BodyContent::Empty => {
            return Err(SoapError::InvalidEnvelope(format!(
                "{} response body is empty",
                op.name
            )))
        }
        BodyContent::Operation(call) => call,
    };

    let expected = response_element(&op.name);
    if call.name != expected {
        return Err(SoapError::InvalidEnvelope(format!(
            "expected {} in reply, got {}",
            expected, call.name
        )));
    }
    if let Some(ns) = call.namespace.as_deref() {
        if ns != target_namespace {
            return Err(SoapError::InvalidEnvelope(format!(
                "{} reply in namespace {}, expected {}",
                op.name, ns, target_namespace
            )));
        }
    }

    call.param(&op.output.name)
        .or_else(|| call.params.first())
        .map(|part| part.value.clone().unwrap_or_default())
        .ok_or_else(|| SoapError::InvalidEnvelope(format!("{} response carries no result", op.name)))
}
