//! WSDL 1.1 interface descriptions.
//!
//! The endpoint renders a [`ServiceDescription`] as a document/literal WSDL with
//! a SOAP 1.1 HTTP binding; the caller parses such a document back into the
//! same structure to build its proxy.

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::NsReader;
use std::collections::HashMap;
use tracing::debug;

use crate::envelope::{response_element, result_element};
use crate::error::SoapError;
use crate::parser::{local_name_str, namespace_of};

pub const WSDL_NS: &str = "http://schemas.xmlsoap.org/wsdl/";
pub const WSDL_SOAP_NS: &str = "http://schemas.xmlsoap.org/wsdl/soap/";
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";
pub const SOAP_HTTP_TRANSPORT: &str = "http://schemas.xmlsoap.org/soap/http";

/// A message part: an element name and its XSD type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub name: String,
    /// Qualified XSD type, e.g. `xs:string`
    pub xsd_type: String,
}

impl Part {
    pub fn string(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            xsd_type: "xs:string".to_string(),
        }
    }

    /// Type name without its prefix.
    pub fn local_type(&self) -> &str {
        strip_prefix(&self.xsd_type)
    }
}

/// One operation of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDescriptor {
    pub name: String,
    pub soap_action: String,
    pub inputs: Vec<Part>,
    pub output: Part,
}

impl OperationDescriptor {
    /// Operation taking string parts and returning a string, with the
    /// conventional `{name}Result` output part.
    pub fn string_operation(name: &str, inputs: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            soap_action: name.to_string(),
            inputs: inputs.iter().map(|input| Part::string(*input)).collect(),
            output: Part::string(result_element(name)),
        }
    }
}

/// Everything a caller needs to invoke a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescription {
    pub service_name: String,
    pub target_namespace: String,
    /// Endpoint URL from `soap:address`
    pub location: String,
    pub operations: Vec<OperationDescriptor>,
}

impl ServiceDescription {
    /// Look up an operation by name.
    pub fn operation(&self, name: &str) -> Option<&OperationDescriptor> {
        self.operations.iter().find(|op| op.name == name)
    }

    /// Render as a WSDL 1.1 document.
    pub fn to_wsdl(&self) -> String {
        let svc = escape(self.service_name.as_str());
        let tns = escape(self.target_namespace.as_str());

        let mut types = String::new();
        let mut messages = String::new();
        let mut port_ops = String::new();
        let mut binding_ops = String::new();

        for op in &self.operations {
            let name = escape(op.name.as_str());
            let response = escape(response_element(&op.name).as_str()).into_owned();

            types.push_str(&schema_element(&name, &op.inputs));
            types.push_str(&schema_element(&response, std::slice::from_ref(&op.output)));

            messages.push_str(&format!(
                r#"
  <wsdl:message name="{name}">
    <wsdl:part name="{name}" element="tns:{name}"/>
  </wsdl:message>
  <wsdl:message name="{response}">
    <wsdl:part name="{response}" element="tns:{response}"/>
  </wsdl:message>"#
            ));

            port_ops.push_str(&format!(
                r#"
    <wsdl:operation name="{name}">
      <wsdl:input name="{name}" message="tns:{name}"/>
      <wsdl:output name="{response}" message="tns:{response}"/>
    </wsdl:operation>"#
            ));

            binding_ops.push_str(&format!(
                r#"
    <wsdl:operation name="{name}">
      <soap:operation soapAction="{}" style="document"/>
      <wsdl:input name="{name}">
        <soap:body use="literal"/>
      </wsdl:input>
      <wsdl:output name="{response}">
        <soap:body use="literal"/>
      </wsdl:output>
    </wsdl:operation>"#,
                escape(op.soap_action.as_str())
            ));
        }

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<wsdl:definitions xmlns:wsdl="{WSDL_NS}" xmlns:soap="{WSDL_SOAP_NS}" xmlns:xs="{XSD_NS}" xmlns:tns="{tns}" targetNamespace="{tns}" name="{svc}">
  <wsdl:types>
    <xs:schema targetNamespace="{tns}" elementFormDefault="qualified">{types}
    </xs:schema>
  </wsdl:types>{messages}
  <wsdl:portType name="{svc}">{port_ops}
  </wsdl:portType>
  <wsdl:binding name="{svc}" type="tns:{svc}">
    <soap:binding style="document" transport="{SOAP_HTTP_TRANSPORT}"/>{binding_ops}
  </wsdl:binding>
  <wsdl:service name="{svc}">
    <wsdl:port name="{svc}" binding="tns:{svc}">
      <soap:address location="{}"/>
    </wsdl:port>
  </wsdl:service>
</wsdl:definitions>"#,
            escape(self.location.as_str())
        )
    }
}

fn schema_element(name: &str, parts: &[Part]) -> String {
    let fields = parts
        .iter()
        .map(|part| {
            format!(
                r#"
            <xs:element name="{}" type="{}" minOccurs="0" nillable="true"/>"#,
                escape(part.name.as_str()),
                escape(part.xsd_type.as_str())
            )
        })
        .collect::<String>();

    format!(
        r#"
      <xs:element name="{name}">
        <xs:complexType>
          <xs:sequence>{fields}
          </xs:sequence>
        </xs:complexType>
      </xs:element>"#
    )
}

fn strip_prefix(qname: &str) -> &str {
    qname.rsplit(':').next().unwrap_or(qname)
}

/// Element identity on the parse stack.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Node {
    ns: Option<String>,
    local: String,
}

impl Node {
    fn is(&self, ns: &str, local: &str) -> bool {
        self.ns.as_deref() == Some(ns) && self.local == local
    }
}

#[derive(Debug, Default)]
struct PortOperation {
    input_message: Option<String>,
    output_message: Option<String>,
}

/// Collected WSDL pieces, joined once the whole document is read.
#[derive(Debug, Default)]
struct WsdlState {
    stack: Vec<Node>,
    target_namespace: Option<String>,
    service_name: Option<String>,
    location: Option<String>,
    /// schema element name -> sequence children
    schema_elements: HashMap<String, Vec<Part>>,
    current_schema_element: Option<String>,
    /// message name -> element name
    messages: HashMap<String, String>,
    current_message: Option<String>,
    /// portType operations in declaration order
    port_operations: Vec<(String, PortOperation)>,
    /// binding operation name -> soapAction
    soap_actions: HashMap<String, String>,
    current_binding_operation: Option<String>,
}

impl WsdlState {
    fn open(&mut self, ns: Option<String>, e: &BytesStart) -> Result<(), SoapError> {
        let node = Node {
            ns,
            local: local_name_str(e),
        };
        let attrs = attributes(e)?;
        let attr = |key: &str| attrs.get(key).cloned();
        let parent = self.stack.last();
        let grandparent = self.stack.len().checked_sub(2).and_then(|i| self.stack.get(i));

        if self.stack.is_empty() {
            if !node.is(WSDL_NS, "definitions") {
                return Err(SoapError::Wsdl(format!(
                    "root element is {}, expected wsdl:definitions",
                    node.local
                )));
            }
            self.target_namespace = attr("targetNamespace");
        } else if node.is(XSD_NS, "element") {
            if parent.is_some_and(|p| p.is(XSD_NS, "schema")) {
                if let Some(name) = attr("name") {
                    self.schema_elements.entry(name.clone()).or_default();
                    self.current_schema_element = Some(name);
                }
            } else if parent.is_some_and(|p| p.is(XSD_NS, "sequence")) {
                if let (Some(owner), Some(name)) = (self.current_schema_element.as_ref(), attr("name")) {
                    let part = Part {
                        name,
                        xsd_type: attr("type").unwrap_or_else(|| "xs:string".to_string()),
                    };
                    self.schema_elements.entry(owner.clone()).or_default().push(part);
                }
            }
        } else if node.is(WSDL_NS, "message") {
            self.current_message = attr("name");
        } else if node.is(WSDL_NS, "part") {
            if let (Some(message), Some(element)) = (self.current_message.as_ref(), attr("element")) {
                self.messages
                    .insert(message.clone(), strip_prefix(&element).to_string());
            }
        } else if node.is(WSDL_NS, "operation") {
            if let Some(name) = attr("name") {
                if parent.is_some_and(|p| p.is(WSDL_NS, "portType")) {
                    self.port_operations.push((name, PortOperation::default()));
                } else if parent.is_some_and(|p| p.is(WSDL_NS, "binding")) {
                    self.current_binding_operation = Some(name);
                }
            }
        } else if node.is(WSDL_NS, "input") || node.is(WSDL_NS, "output") {
            let in_port_type = grandparent.is_some_and(|g| g.is(WSDL_NS, "portType"));
            if in_port_type {
                let message = attr("message").map(|m| strip_prefix(&m).to_string());
                if let Some((_, op)) = self.port_operations.last_mut() {
                    if node.local == "input" {
                        op.input_message = message;
                    } else {
                        op.output_message = message;
                    }
                }
            }
        } else if node.is(WSDL_SOAP_NS, "operation") {
            if let (Some(op), Some(action)) = (self.current_binding_operation.as_ref(), attr("soapAction")) {
                self.soap_actions.insert(op.clone(), action);
            }
        } else if node.is(WSDL_NS, "service") {
            if self.service_name.is_none() {
                self.service_name = attr("name");
            }
        } else if node.is(WSDL_SOAP_NS, "address") && self.location.is_none() {
            self.location = attr("location");
        }

        self.stack.push(node);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(node) = self.stack.pop() {
            let parent = self.stack.last();
            if node.is(XSD_NS, "element") && parent.is_some_and(|p| p.is(XSD_NS, "schema")) {
                self.current_schema_element = None;
            } else if node.is(WSDL_NS, "message") {
                self.current_message = None;
            } else if node.is(WSDL_NS, "operation") && parent.is_some_and(|p| p.is(WSDL_NS, "binding")) {
                self.current_binding_operation = None;
            }
        }
    }

    fn finish(self) -> Result<ServiceDescription, SoapError> {
        let target_namespace = self
            .target_namespace
            .ok_or_else(|| SoapError::Wsdl("definitions has no targetNamespace".to_string()))?;
        let location = self
            .location
            .ok_or_else(|| SoapError::Wsdl("no soap:address location".to_string()))?;

        let element_parts = |message: Option<&String>| -> Result<Vec<Part>, SoapError> {
            let message = message.ok_or_else(|| SoapError::Wsdl("operation message missing".to_string()))?;
            let element = self
                .messages
                .get(message)
                .ok_or_else(|| SoapError::Wsdl(format!("undeclared message {}", message)))?;
            self.schema_elements
                .get(element)
                .cloned()
                .ok_or_else(|| SoapError::Wsdl(format!("undeclared schema element {}", element)))
        };

        let mut operations = Vec::with_capacity(self.port_operations.len());
        for (name, port_op) in &self.port_operations {
            let inputs = element_parts(port_op.input_message.as_ref())?;
            let output = element_parts(port_op.output_message.as_ref())?
                .into_iter()
                .next()
                .ok_or_else(|| SoapError::Wsdl(format!("operation {} declares no result", name)))?;
            operations.push(OperationDescriptor {
                name: name.clone(),
                soap_action: self.soap_actions.get(name).cloned().unwrap_or_default(),
                inputs,
                output,
            });
        }

        Ok(ServiceDescription {
            service_name: self.service_name.unwrap_or_default(),
            target_namespace,
            location,
            operations,
        })
    }
}

/// Collect an element's attributes keyed by local name.
fn attributes(e: &BytesStart) -> Result<HashMap<String, String>, SoapError> {
    let mut map = HashMap::new();
    for attr in e.attributes().flatten() {
        let key = std::str::from_utf8(attr.key.local_name().as_ref())
            .unwrap_or("")
            .to_string();
        if key.is_empty() || attr.key.as_ref().starts_with(b"xmlns") {
            continue;
        }
        map.insert(key, attr.unescape_value()?.into_owned());
    }
    Ok(map)
}

/// Parse a WSDL 1.1 document.
pub fn parse_wsdl(data: &[u8]) -> Result<ServiceDescription, SoapError> {
    let xml_str = std::str::from_utf8(data)
        .map_err(|e| SoapError::Wsdl(format!("Invalid UTF-8: {}", e)))?;

    let mut reader = NsReader::from_str(xml_str);
    let mut state = WsdlState::default();

    loop {
        let (ns, event) = reader.read_resolved_event()?;
        let ns = namespace_of(&ns)?;

        match event {
            Event::Start(ref e) => state.open(ns, e)?,
            Event::Empty(ref e) => {
                state.open(ns, e)?;
                state.close();
            }
            Event::End(_) => state.close(),
            Event::DocType(_) => return Err(SoapError::DoctypeNotAllowed),
            Event::Eof => break,
            _ => {}
        }
    }

    let description = state.finish()?;
    debug!(
        service = %description.service_name,
        location = %description.location,
        operations = description.operations.len(),
        "Parsed WSDL"
    );
    Ok(description)
}
