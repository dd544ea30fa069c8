//! SOAP hello-world endpoint and caller.
//!
//! Exposes a single `say_hello(name) -> "Hello, {name}!"` operation over
//! SOAP/HTTP together with its WSDL, and a caller that builds its proxy from
//! that WSDL.
//!
//! # Features
//!
//! - SOAP 1.1 and 1.2 envelopes (document/literal wrapped)
//! - WSDL 1.1 generation (`GET /?wsdl`) and parsing
//! - SOAP Fault responses for malformed or unknown requests
//! - DOCTYPE rejection (no entity expansion)
//! - Endpoint with explicit bind / serve / shutdown lifecycle
//!
//! # Example
//!
//! ```ignore
//! use hello_soap::{HelloWorldService, SoapClient, SoapServer};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let server = SoapServer::bind(Default::default(), Arc::new(HelloWorldService::new())).await?;
//! let handle = server.spawn(CancellationToken::new())?;
//!
//! let client = SoapClient::from_wsdl(&handle.wsdl_url()).await?;
//! assert_eq!(client.service().say_hello("Jonathan").await?, "Hello, Jonathan!");
//! handle.shutdown().await?;
//! ```

pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod parser;
pub mod server;
pub mod service;
pub mod wsdl;

pub use client::{ServiceProxy, SoapClient};
pub use config::{ClientSettings, HelloConfig, ServerSettings, SoapVersion};
pub use error::{Fault, FaultCode, SoapError};
pub use server::{ServerHandle, ServerStats, SoapServer};
pub use service::{HelloWorldService, SoapService};
pub use wsdl::ServiceDescription;
