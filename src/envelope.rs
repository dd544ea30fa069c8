//! SOAP envelope construction for requests and responses.
//!
//! Both directions use document/literal wrapped style: the Body holds a single
//! wrapper element in the service's target namespace whose children are the
//! operation's parts, qualified with the same namespace.

use quick_xml::escape::escape;

use crate::config::SoapVersion;

/// Name of the response wrapper element for an operation.
pub fn response_element(operation: &str) -> String {
    format!("{}Response", operation)
}

/// Name of the result part inside the response wrapper.
pub fn result_element(operation: &str) -> String {
    format!("{}Result", operation)
}

/// Build a request envelope invoking `operation` with named string arguments.
pub fn build_request(
    version: SoapVersion,
    namespace: &str,
    operation: &str,
    args: &[(&str, &str)],
) -> String {
    let parts = args
        .iter()
        .map(|(name, value)| format!("<tns:{name}>{}</tns:{name}>", escape(*value)))
        .collect::<String>();

    wrap(version, namespace, operation, &parts)
}

/// Build a response envelope carrying an operation's string result.
pub fn build_response(version: SoapVersion, namespace: &str, operation: &str, result: &str) -> String {
    let result_name = result_element(operation);
    let parts = format!("<tns:{result_name}>{}</tns:{result_name}>", escape(result));

    wrap(version, namespace, &response_element(operation), &parts)
}

fn wrap(version: SoapVersion, namespace: &str, wrapper: &str, parts: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="{}" xmlns:tns="{}"><soap:Body><tns:{wrapper}>{parts}</tns:{wrapper}></soap:Body></soap:Envelope>"#,
        version.namespace(),
        escape(namespace),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_soap_envelope, BodyContent};

    #[test]
    fn test_request_envelope_structure() {
        let xml = build_request(
            SoapVersion::Soap11,
            "spyne.examples.helloworld",
            "say_hello",
            &[("name", "Jonathan")],
        );
        assert!(xml.contains(r#"xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/""#));
        assert!(xml.contains(r#"xmlns:tns="spyne.examples.helloworld""#));
        assert!(xml.contains("<tns:say_hello><tns:name>Jonathan</tns:name></tns:say_hello>"));
    }

    #[test]
    fn test_response_envelope_is_parseable() {
        let xml = build_response(SoapVersion::Soap12, "urn:hello", "say_hello", "Hello, <you> & me!");
        let envelope = parse_soap_envelope(xml.as_bytes()).unwrap();
        assert_eq!(envelope.version, SoapVersion::Soap12);

        let BodyContent::Operation(op) = envelope.body else {
            panic!("expected operation body");
        };
        assert_eq!(op.name, "say_helloResponse");
        assert_eq!(op.namespace.as_deref(), Some("urn:hello"));
        let result = op.param("say_helloResult").unwrap();
        assert_eq!(result.value.as_deref(), Some("Hello, <you> & me!"));
    }

    #[test]
    fn test_values_are_escaped() {
        let xml = build_request(SoapVersion::Soap11, "urn:hello", "say_hello", &[("name", "a<b&c")]);
        assert!(xml.contains("a&lt;b&amp;c"));
        assert!(!xml.contains("a<b"));
    }
}
