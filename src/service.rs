//! Services exposed by the endpoint.

use crate::error::Fault;
use crate::parser::OperationCall;
use crate::wsdl::{OperationDescriptor, ServiceDescription};

/// A SOAP service: a named set of string-returning operations in one
/// target namespace.
pub trait SoapService: Send + Sync {
    /// Service name, used for the WSDL service, port type and binding.
    fn name(&self) -> &str;

    /// Target namespace of request and response elements.
    fn target_namespace(&self) -> &str;

    /// Operations this service implements.
    fn operations(&self) -> Vec<OperationDescriptor>;

    /// Invoke an operation with its decoded parameters.
    fn invoke(&self, call: &OperationCall) -> Result<String, Fault>;

    /// Interface description advertising `location` as the endpoint address.
    fn describe(&self, location: &str) -> ServiceDescription {
        ServiceDescription {
            service_name: self.name().to_string(),
            target_namespace: self.target_namespace().to_string(),
            location: location.to_string(),
            operations: self.operations(),
        }
    }
}

pub const HELLO_NAMESPACE: &str = "spyne.examples.helloworld";
pub const SAY_HELLO: &str = "say_hello";

/// The hello-world service: a single `say_hello(name) -> greeting` operation.
#[derive(Debug, Clone, Default)]
pub struct HelloWorldService;

impl HelloWorldService {
    pub fn new() -> Self {
        Self
    }

    pub fn say_hello(name: &str) -> String {
        format!("Hello, {}!", name)
    }
}

impl SoapService for HelloWorldService {
    fn name(&self) -> &str {
        "HelloWorldService"
    }

    fn target_namespace(&self) -> &str {
        HELLO_NAMESPACE
    }

    fn operations(&self) -> Vec<OperationDescriptor> {
        vec![OperationDescriptor::string_operation(SAY_HELLO, &["name"])]
    }

    fn invoke(&self, call: &OperationCall) -> Result<String, Fault> {
        match call.name.as_str() {
            SAY_HELLO => {
                let name = call
                    .param("name")
                    .and_then(|p| p.value.as_deref())
                    .ok_or_else(|| Fault::client("say_hello requires a non-nil name"))?;
                Ok(Self::say_hello(name))
            }
            other => Err(Fault::client(format!("Unknown operation: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FaultCode;
    use crate::parser::Param;

    fn call(name: &str, params: Vec<Param>) -> OperationCall {
        OperationCall {
            name: name.to_string(),
            namespace: Some(HELLO_NAMESPACE.to_string()),
            params,
        }
    }

    fn name_param(value: Option<&str>) -> Param {
        Param {
            name: "name".to_string(),
            value: value.map(String::from),
        }
    }

    #[test]
    fn test_say_hello() {
        assert_eq!(HelloWorldService::say_hello("Jonathan"), "Hello, Jonathan!");
        assert_eq!(HelloWorldService::say_hello(""), "Hello, !");
        assert_eq!(HelloWorldService::say_hello(" <x> "), "Hello,  <x> !");
    }

    #[test]
    fn test_invoke_say_hello() {
        let service = HelloWorldService::new();
        let result = service.invoke(&call(SAY_HELLO, vec![name_param(Some("Ada"))]));
        assert_eq!(result.unwrap(), "Hello, Ada!");
    }

    #[test]
    fn test_invoke_unknown_operation() {
        let service = HelloWorldService::new();
        let fault = service.invoke(&call("say_goodbye", vec![])).unwrap_err();
        assert_eq!(fault.code, FaultCode::Client);
        assert!(fault.message.contains("say_goodbye"));
    }

    #[test]
    fn test_invoke_missing_or_nil_name() {
        let service = HelloWorldService::new();
        assert!(service.invoke(&call(SAY_HELLO, vec![])).is_err());
        assert!(service.invoke(&call(SAY_HELLO, vec![name_param(None)])).is_err());
    }

    #[test]
    fn test_describe_single_operation() {
        let description = HelloWorldService::new().describe("http://localhost:8000/");
        assert_eq!(description.service_name, "HelloWorldService");
        assert_eq!(description.target_namespace, HELLO_NAMESPACE);
        assert_eq!(description.operations.len(), 1);
        let op = &description.operations[0];
        assert_eq!(op.name, "say_hello");
        assert_eq!(op.inputs.len(), 1);
        assert_eq!(op.inputs[0].name, "name");
    }
}
