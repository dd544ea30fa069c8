//! SOAP XML parsing utilities.
//!
//! Uses quick-xml which is safe against XXE by default (doesn't expand entities).
//! Documents carrying a DOCTYPE are rejected outright.

use crate::config::SoapVersion;
use crate::error::{Fault, FaultCode, SoapError};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;

/// XML Schema instance namespace (`xsi:nil`).
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Parsed SOAP envelope.
#[derive(Debug, Clone)]
pub struct SoapEnvelope {
    /// Detected SOAP version
    pub version: SoapVersion,
    /// Whether a SOAP Header element was present
    pub header_present: bool,
    /// Body content
    pub body: BodyContent,
}

/// What the SOAP Body carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyContent {
    /// An operation request or response wrapper element
    Operation(OperationCall),
    /// A SOAP Fault
    Fault(Fault),
    /// `<Body/>` with no child element
    Empty,
}

/// Operation wrapper element and its simple-typed children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationCall {
    /// Wrapper element local name
    pub name: String,
    /// Wrapper element namespace
    pub namespace: Option<String>,
    /// Child elements, in document order
    pub params: Vec<Param>,
}

impl OperationCall {
    /// Look up a parameter by local name.
    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }
}

/// A single parameter element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    /// `None` when the element is marked `xsi:nil="true"`
    pub value: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FaultField {
    Code,
    Reason,
}

#[derive(Default)]
struct FaultBuilder {
    code: Option<String>,
    reason: String,
    field: Option<(FaultField, u32)>,
}

impl FaultBuilder {
    fn build(self) -> Fault {
        Fault {
            code: self
                .code
                .as_deref()
                .map(FaultCode::from_qualified)
                .unwrap_or(FaultCode::Server),
            message: self.reason.trim().to_string(),
        }
    }
}

/// Event-driven state while walking an envelope.
#[derive(Default)]
struct EnvelopeState {
    depth: u32,
    version: Option<SoapVersion>,
    header_present: bool,
    body_seen: bool,
    in_body: bool,
    body: Option<BodyContent>,
    operation: Option<OperationCall>,
    param: Option<Param>,
    fault: Option<FaultBuilder>,
}

impl EnvelopeState {
    fn open(
        &mut self,
        reader: &NsReader<&[u8]>,
        depth: u32,
        ns: Option<String>,
        e: &BytesStart,
        empty: bool,
    ) -> Result<(), SoapError> {
        let local_name = local_name_str(e);

        match depth {
            1 => {
                if local_name != "Envelope" {
                    return Err(SoapError::InvalidEnvelope(format!(
                        "root element is {}, expected Envelope",
                        local_name
                    )));
                }
                let version = ns.as_deref().and_then(SoapVersion::from_namespace).ok_or_else(|| {
                    SoapError::InvalidEnvelope(format!(
                        "unrecognized envelope namespace: {}",
                        ns.as_deref().unwrap_or("<none>")
                    ))
                })?;
                self.version = Some(version);
            }
            2 => {
                let envelope_ns = self.version.map(|v| v.namespace());
                if ns.as_deref() != envelope_ns {
                    return Err(SoapError::InvalidEnvelope(format!(
                        "unexpected element {} in Envelope",
                        local_name
                    )));
                }
                match local_name.as_str() {
                    "Header" => self.header_present = true,
                    "Body" => {
                        if self.body_seen {
                            return Err(SoapError::InvalidEnvelope("duplicate Body".to_string()));
                        }
                        self.body_seen = true;
                        self.in_body = !empty;
                    }
                    other => {
                        return Err(SoapError::InvalidEnvelope(format!(
                            "unexpected element {} in Envelope",
                            other
                        )))
                    }
                }
            }
            3 if self.in_body && self.body.is_none() && self.operation.is_none() && self.fault.is_none() => {
                let envelope_ns = self.version.map(|v| v.namespace());
                if local_name == "Fault" && ns.as_deref() == envelope_ns {
                    if empty {
                        self.body = Some(BodyContent::Fault(FaultBuilder::default().build()));
                    } else {
                        self.fault = Some(FaultBuilder::default());
                    }
                } else {
                    let call = OperationCall {
                        name: local_name,
                        namespace: ns,
                        params: Vec::new(),
                    };
                    if empty {
                        self.body = Some(BodyContent::Operation(call));
                    } else {
                        self.operation = Some(call);
                    }
                }
            }
            4 if self.operation.is_some() => {
                let param = Param {
                    name: local_name,
                    value: if is_nil(reader, e) { None } else { Some(String::new()) },
                };
                if empty {
                    if let Some(op) = self.operation.as_mut() {
                        op.params.push(param);
                    }
                } else {
                    self.param = Some(param);
                }
            }
            _ => {
                if let Some(fault) = self.fault.as_mut() {
                    if fault.field.is_none() && !empty {
                        match local_name.as_str() {
                            // SOAP 1.2 nests Value under Code (and Subcode); only the first counts
                            "faultcode" | "Value" if fault.code.is_none() => {
                                fault.code = Some(String::new());
                                fault.field = Some((FaultField::Code, depth));
                            }
                            "faultstring" | "Text" if fault.reason.is_empty() => {
                                fault.field = Some((FaultField::Reason, depth));
                            }
                            _ => {}
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn close(&mut self, depth: u32) {
        if let Some(fault) = self.fault.as_mut() {
            if matches!(fault.field, Some((_, d)) if d == depth) {
                fault.field = None;
            }
        }

        match depth {
            4 => {
                if let (Some(param), Some(op)) = (self.param.take(), self.operation.as_mut()) {
                    op.params.push(param);
                }
            }
            3 => {
                if let Some(op) = self.operation.take() {
                    self.body = Some(BodyContent::Operation(op));
                }
                if let Some(fault) = self.fault.take() {
                    self.body = Some(BodyContent::Fault(fault.build()));
                }
            }
            2 => self.in_body = false,
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if self.depth == 4 {
            if let Some(Param { value: Some(value), .. }) = self.param.as_mut() {
                value.push_str(text);
                return;
            }
        }
        if let Some(fault) = self.fault.as_mut() {
            match fault.field {
                Some((FaultField::Code, _)) => {
                    if let Some(code) = fault.code.as_mut() {
                        code.push_str(text);
                    }
                }
                Some((FaultField::Reason, _)) => fault.reason.push_str(text),
                None => {}
            }
        }
    }
}

/// Parse raw bytes as a SOAP envelope.
pub fn parse_soap_envelope(data: &[u8]) -> Result<SoapEnvelope, SoapError> {
    let xml_str = std::str::from_utf8(data)
        .map_err(|e| SoapError::XmlParse(format!("Invalid UTF-8: {}", e)))?;

    let mut reader = NsReader::from_str(xml_str);
    let mut state = EnvelopeState::default();

    loop {
        let (ns, event) = reader.read_resolved_event()?;
        let ns = namespace_of(&ns)?;

        match event {
            Event::Start(ref e) => {
                state.depth += 1;
                state.open(&reader, state.depth, ns, e, false)?;
            }
            Event::Empty(ref e) => {
                state.open(&reader, state.depth + 1, ns, e, true)?;
            }
            Event::End(_) => {
                state.close(state.depth);
                state.depth = state.depth.saturating_sub(1);
            }
            Event::Text(ref e) => {
                let text = e.unescape()?;
                state.text(&text);
            }
            Event::CData(ref e) => {
                let text = std::str::from_utf8(e)
                    .map_err(|err| SoapError::XmlParse(format!("Invalid UTF-8 in CDATA: {}", err)))?;
                state.text(text);
            }
            Event::DocType(_) => return Err(SoapError::DoctypeNotAllowed),
            Event::Eof => {
                if state.depth != 0 {
                    return Err(SoapError::XmlParse(
                        "unexpected end of document: unclosed elements".to_string(),
                    ));
                }
                break;
            }
            _ => {}
        }
    }

    let version = state.version.ok_or_else(|| {
        SoapError::InvalidEnvelope("No SOAP Envelope found with recognized namespace".to_string())
    })?;
    if !state.body_seen {
        return Err(SoapError::InvalidEnvelope("missing Body".to_string()));
    }

    Ok(SoapEnvelope {
        version,
        header_present: state.header_present,
        body: state.body.unwrap_or(BodyContent::Empty),
    })
}

/// Namespace URI of a resolved name; `None` when unqualified.
///
/// A prefix with no `xmlns` declaration in scope is an error.
pub(crate) fn namespace_of(ns: &ResolveResult) -> Result<Option<String>, SoapError> {
    match ns {
        ResolveResult::Bound(Namespace(uri)) => std::str::from_utf8(uri)
            .map(|uri| Some(uri.to_string()))
            .map_err(|e| SoapError::XmlParse(format!("Invalid UTF-8 in namespace: {}", e))),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) => Err(SoapError::XmlParse(format!(
            "undeclared namespace prefix: {}",
            String::from_utf8_lossy(prefix)
        ))),
    }
}

/// Extract local name from element.
pub(crate) fn local_name_str(e: &BytesStart) -> String {
    std::str::from_utf8(e.local_name().as_ref())
        .unwrap_or("")
        .to_string()
}

/// Check the xsi:nil attribute.
fn is_nil(reader: &NsReader<&[u8]>, e: &BytesStart) -> bool {
    for attr in e.attributes().flatten() {
        let (ns, local) = reader.resolve_attribute(attr.key);
        let in_xsi = matches!(ns, ResolveResult::Bound(Namespace(uri)) if uri == XSI_NS.as_bytes());
        if in_xsi && local.as_ref() == b"nil" {
            let value = std::str::from_utf8(&attr.value).unwrap_or("");
            return value == "1" || value == "true";
        }
    }
    false
}

/// Extract SOAPAction from HTTP header value (removes quotes).
pub fn parse_soap_action(header_value: &str) -> String {
    header_value.trim().trim_matches('"').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOAP_11_REQUEST: &str = r#"<?xml version="1.0"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Header>
    <m:Trans xmlns:m="http://example.org/trans">234</m:Trans>
  </soap:Header>
  <soap:Body>
    <tns:say_hello xmlns:tns="spyne.examples.helloworld">
      <tns:name>Jonathan</tns:name>
    </tns:say_hello>
  </soap:Body>
</soap:Envelope>"#;

    const SOAP_12_REQUEST: &str = r#"<?xml version="1.0"?>
<env:Envelope xmlns:env="http://www.w3.org/2003/05/soap-envelope">
  <env:Body>
    <say_hello xmlns="spyne.examples.helloworld"><name>Ada</name></say_hello>
  </env:Body>
</env:Envelope>"#;

    fn operation(envelope: &SoapEnvelope) -> &OperationCall {
        match &envelope.body {
            BodyContent::Operation(op) => op,
            other => panic!("expected operation, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_soap_11() {
        let envelope = parse_soap_envelope(SOAP_11_REQUEST.as_bytes()).unwrap();
        assert_eq!(envelope.version, SoapVersion::Soap11);
        assert!(envelope.header_present);
        let op = operation(&envelope);
        assert_eq!(op.name, "say_hello");
        assert_eq!(op.namespace.as_deref(), Some("spyne.examples.helloworld"));
        assert_eq!(op.param("name").unwrap().value.as_deref(), Some("Jonathan"));
    }

    #[test]
    fn test_parse_soap_12_default_namespace() {
        let envelope = parse_soap_envelope(SOAP_12_REQUEST.as_bytes()).unwrap();
        assert_eq!(envelope.version, SoapVersion::Soap12);
        assert!(!envelope.header_present);
        let op = operation(&envelope);
        assert_eq!(op.namespace.as_deref(), Some("spyne.examples.helloworld"));
        assert_eq!(op.param("name").unwrap().value.as_deref(), Some("Ada"));
    }

    #[test]
    fn test_param_text_is_unescaped_and_untrimmed() {
        let xml = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><t:say_hello xmlns:t="urn:t"><t:name>  Tom &amp; &lt;Jerry&gt; </t:name></t:say_hello></soap:Body></soap:Envelope>"#;
        let envelope = parse_soap_envelope(xml.as_bytes()).unwrap();
        let op = operation(&envelope);
        assert_eq!(op.params[0].value.as_deref(), Some("  Tom & <Jerry> "));
    }

    #[test]
    fn test_empty_and_nil_params() {
        let xml = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"
    xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <soap:Body>
    <t:op xmlns:t="urn:t">
      <t:a></t:a>
      <t:b/>
      <t:c xsi:nil="true"/>
    </t:op>
  </soap:Body>
</soap:Envelope>"#;
        let envelope = parse_soap_envelope(xml.as_bytes()).unwrap();
        let op = operation(&envelope);
        assert_eq!(op.param("a").unwrap().value.as_deref(), Some(""));
        assert_eq!(op.param("b").unwrap().value.as_deref(), Some(""));
        assert_eq!(op.param("c").unwrap().value, None);
    }

    #[test]
    fn test_nil_in_foreign_namespace_is_not_nil() {
        let xml = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>
    <t:op xmlns:t="urn:t" xmlns:foo="urn:x">
      <t:name foo:nil="true">Bob</t:name>
    </t:op>
  </soap:Body>
</soap:Envelope>"#;
        let envelope = parse_soap_envelope(xml.as_bytes()).unwrap();
        assert_eq!(operation(&envelope).params[0].value.as_deref(), Some("Bob"));
    }

    #[test]
    fn test_cdata_param() {
        let xml = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><op><name><![CDATA[a<b]]></name></op></soap:Body></soap:Envelope>"#;
        let envelope = parse_soap_envelope(xml.as_bytes()).unwrap();
        assert_eq!(operation(&envelope).params[0].value.as_deref(), Some("a<b"));
    }

    #[test]
    fn test_parse_soap_11_fault() {
        let xml = crate::error::soap_fault_response(
            &Fault::client("Unknown operation"),
            SoapVersion::Soap11,
        );
        let envelope = parse_soap_envelope(xml.as_bytes()).unwrap();
        assert_eq!(envelope.body, BodyContent::Fault(Fault::client("Unknown operation")));
    }

    #[test]
    fn test_parse_soap_12_fault() {
        let xml = crate::error::soap_fault_response(&Fault::server("boom"), SoapVersion::Soap12);
        let envelope = parse_soap_envelope(xml.as_bytes()).unwrap();
        assert_eq!(envelope.body, BodyContent::Fault(Fault::server("boom")));
    }

    #[test]
    fn test_empty_body() {
        let xml = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body/></soap:Envelope>"#;
        let envelope = parse_soap_envelope(xml.as_bytes()).unwrap();
        assert_eq!(envelope.body, BodyContent::Empty);
    }

    #[test]
    fn test_missing_body_rejected() {
        let xml = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Header/></soap:Envelope>"#;
        let err = parse_soap_envelope(xml.as_bytes()).unwrap_err();
        assert!(matches!(err, SoapError::InvalidEnvelope(_)));
    }

    #[test]
    fn test_non_soap_root_rejected() {
        let err = parse_soap_envelope(b"<hello>world</hello>").unwrap_err();
        assert!(matches!(err, SoapError::InvalidEnvelope(_)));
    }

    #[test]
    fn test_unknown_envelope_namespace_rejected() {
        let xml = r#"<s:Envelope xmlns:s="urn:not-soap"><s:Body/></s:Envelope>"#;
        let err = parse_soap_envelope(xml.as_bytes()).unwrap_err();
        assert!(matches!(err, SoapError::InvalidEnvelope(_)));
    }

    #[test]
    fn test_malformed_xml_rejected() {
        let xml = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body></soap:Envelope>"#;
        assert!(parse_soap_envelope(xml.as_bytes()).is_err());
    }

    #[test]
    fn test_unclosed_envelope_rejected() {
        let xml = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><t:say_hello xmlns:t="urn:t"><t:name>Jonathan</t:name></t:say_hello></soap:Body>"#;
        let err = parse_soap_envelope(xml.as_bytes()).unwrap_err();
        assert!(matches!(err, SoapError::XmlParse(_)), "got {:?}", err);
    }

    #[test]
    fn test_undeclared_prefix_rejected() {
        let xml = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><zz:say_hello><zz:name>x</zz:name></zz:say_hello></soap:Body></soap:Envelope>"#;
        let err = parse_soap_envelope(xml.as_bytes()).unwrap_err();
        assert!(matches!(err, SoapError::XmlParse(_)), "got {:?}", err);
    }

    #[test]
    fn test_duplicate_body_rejected() {
        let xml = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><op/></soap:Body><soap:Body><other/></soap:Body></soap:Envelope>"#;
        let err = parse_soap_envelope(xml.as_bytes()).unwrap_err();
        assert!(matches!(err, SoapError::InvalidEnvelope(ref m) if m == "duplicate Body"), "got {:?}", err);
    }

    #[test]
    fn test_xxe_detection() {
        let xxe_payload = r#"<?xml version="1.0"?>
<!DOCTYPE foo [<!ENTITY xxe SYSTEM "file:///etc/passwd">]>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>&xxe;</soap:Body>
</soap:Envelope>"#;

        let err = parse_soap_envelope(xxe_payload.as_bytes()).unwrap_err();
        assert!(matches!(err, SoapError::DoctypeNotAllowed));
    }

    #[test]
    fn test_parse_soap_action() {
        assert_eq!(parse_soap_action("\"say_hello\""), "say_hello");
        assert_eq!(parse_soap_action("say_hello"), "say_hello");
        assert_eq!(parse_soap_action("  \"say_hello\"  "), "say_hello");
    }
}
