//! SOAP endpoint: serves the WSDL and dispatches envelopes to a [`SoapService`].

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ServerSettings, SoapVersion};
use crate::envelope::build_response;
use crate::error::{soap_fault_response, Fault, SoapError};
use crate::parser::{parse_soap_action, parse_soap_envelope, BodyContent};
use crate::service::SoapService;

/// Counters reported when the endpoint stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub requests_processed: u64,
    pub faults_returned: u64,
}

/// State shared by the request handlers.
pub struct AppState {
    settings: ServerSettings,
    service: Arc<dyn SoapService>,
    /// Endpoint URL used in the WSDL when neither `public_url` nor a Host header applies
    fallback_location: String,
    requests_processed: AtomicU64,
    faults_returned: AtomicU64,
}

impl AppState {
    pub fn new(
        settings: ServerSettings,
        service: Arc<dyn SoapService>,
        fallback_location: impl Into<String>,
    ) -> Self {
        Self {
            settings,
            service,
            fallback_location: fallback_location.into(),
            requests_processed: AtomicU64::new(0),
            faults_returned: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            requests_processed: self.requests_processed.load(Ordering::Relaxed),
            faults_returned: self.faults_returned.load(Ordering::Relaxed),
        }
    }

    /// Check if Content-Type is valid for SOAP.
    fn is_valid_content_type(&self, content_type: Option<&str>) -> bool {
        match content_type {
            Some(ct) => {
                let ct_lower = ct.to_lowercase();
                self.settings
                    .allowed_content_types
                    .iter()
                    .any(|allowed| ct_lower.contains(&allowed.to_lowercase()))
            }
            None => false,
        }
    }

    fn advertised_location(&self, headers: &HeaderMap) -> String {
        if let Some(url) = &self.settings.public_url {
            return url.clone();
        }
        headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(|host| format!("http://{}/", host))
            .unwrap_or_else(|| self.fallback_location.clone())
    }

    /// Decode an envelope, run the operation and encode the reply.
    fn dispatch(
        &self,
        body: &[u8],
        soap_action: Option<&str>,
        fallback_version: SoapVersion,
    ) -> Result<(SoapVersion, String), (SoapVersion, Fault)> {
        let envelope = parse_soap_envelope(body).map_err(|e| (fallback_version, e.into_fault()))?;
        let version = envelope.version;

        if !self.settings.accepted_versions.contains(&version) {
            return Err((
                version,
                Fault::client(format!("SOAP {} is not accepted by this endpoint", version.as_str())),
            ));
        }

        let call = match envelope.body {
            BodyContent::Operation(call) => call,
            BodyContent::Fault(_) => {
                return Err((version, Fault::client("Request body carries a Fault")));
            }
            BodyContent::Empty => {
                return Err((version, Fault::client("Request body is empty")));
            }
        };

        let target_namespace = self.service.target_namespace();
        if call.namespace.as_deref().is_some_and(|ns| ns != target_namespace) {
            return Err((
                version,
                Fault::client(format!(
                    "Unknown operation: {{{}}}{}",
                    call.namespace.as_deref().unwrap_or_default(),
                    call.name
                )),
            ));
        }

        if let Some(action) = soap_action.filter(|a| !a.is_empty() && *a != call.name) {
            debug!(soap_action = %action, operation = %call.name, "SOAPAction differs from body operation");
        }

        let result = self.service.invoke(&call).map_err(|fault| (version, fault))?;
        debug!(operation = %call.name, "Operation invoked");
        Ok((version, build_response(version, target_namespace, &call.name, &result)))
    }

    fn fault_response(&self, status: StatusCode, fault: &Fault, version: SoapVersion) -> Response {
        self.faults_returned.fetch_add(1, Ordering::Relaxed);
        warn!(status = status.as_u16(), fault = %fault, "Returning SOAP fault");
        (
            status,
            [(header::CONTENT_TYPE, version.content_type())],
            soap_fault_response(fault, version),
        )
            .into_response()
    }
}

/// SOAP version implied by a Content-Type, for replies to unparseable requests.
fn version_from_content_type(content_type: Option<&str>) -> SoapVersion {
    match content_type {
        Some(ct) if ct.to_lowercase().contains("application/soap+xml") => SoapVersion::Soap12,
        _ => SoapVersion::Soap11,
    }
}

fn wants_wsdl(query: Option<&str>) -> bool {
    query.is_some_and(|q| {
        q.split('&')
            .filter_map(|pair| pair.split('=').next())
            .any(|key| key.eq_ignore_ascii_case("wsdl"))
    })
}

async fn describe(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    if !wants_wsdl(query.as_deref()) {
        return (
            StatusCode::BAD_REQUEST,
            "POST SOAP envelopes to this URL, or GET ?wsdl for the service description\n",
        )
            .into_response();
    }

    let location = state.advertised_location(&headers);
    debug!(location = %location, "Serving WSDL");
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, SoapVersion::Soap11.content_type())],
        state.service.describe(&location).to_wsdl(),
    )
        .into_response()
}

async fn invoke(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    state.requests_processed.fetch_add(1, Ordering::Relaxed);

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let soap_action = headers
        .get("soapaction")
        .and_then(|v| v.to_str().ok())
        .map(parse_soap_action);
    let fallback_version = version_from_content_type(content_type);

    debug!(
        content_type = ?content_type,
        soap_action = ?soap_action,
        body_size = body.len(),
        "Processing SOAP request"
    );

    if !state.is_valid_content_type(content_type) {
        let fault = Fault::client(format!(
            "Unsupported content type: {}",
            content_type.unwrap_or("<none>")
        ));
        return state.fault_response(StatusCode::UNSUPPORTED_MEDIA_TYPE, &fault, fallback_version);
    }

    match state.dispatch(&body, soap_action.as_deref(), fallback_version) {
        Ok((version, xml)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, version.content_type())],
            xml,
        )
            .into_response(),
        Err((version, fault)) => {
            state.fault_response(StatusCode::INTERNAL_SERVER_ERROR, &fault, version)
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = state.settings.max_body_size;

    Router::new()
        .route("/", get(describe).post(invoke))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// A bound but not yet serving endpoint.
pub struct SoapServer {
    listener: TcpListener,
    state: Arc<AppState>,
}

impl SoapServer {
    /// Bind the listener. Nothing is served until [`run_until`](Self::run_until)
    /// or [`spawn`](Self::spawn).
    pub async fn bind(
        settings: ServerSettings,
        service: Arc<dyn SoapService>,
    ) -> Result<Self, SoapError> {
        let listener = TcpListener::bind(settings.bind_address.as_str()).await?;
        let addr = listener.local_addr()?;
        info!(address = %addr, service = service.name(), "SOAP endpoint bound");

        let state = Arc::new(AppState::new(settings, service, format!("http://{}/", addr)));
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, SoapError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` completes, then drain in-flight requests.
    pub async fn run_until<F>(self, shutdown: F) -> Result<ServerStats, SoapError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = build_router(self.state.clone());
        axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        let stats = self.state.stats();
        info!(
            requests_processed = stats.requests_processed,
            faults_returned = stats.faults_returned,
            "SOAP endpoint stopped"
        );
        Ok(stats)
    }

    /// Serve on a background task until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> Result<ServerHandle, SoapError> {
        let addr = self.local_addr()?;
        let token = cancel.clone();
        let join = tokio::spawn(async move {
            self.run_until(async move { token.cancelled().await }).await
        });

        Ok(ServerHandle { addr, cancel, join })
    }
}

/// Handle to a spawned endpoint.
pub struct ServerHandle {
    addr: SocketAddr,
    cancel: CancellationToken,
    join: JoinHandle<Result<ServerStats, SoapError>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn wsdl_url(&self) -> String {
        format!("http://{}/?wsdl", self.addr)
    }

    /// Stop accepting connections and wait for the accept loop to finish.
    pub async fn shutdown(self) -> Result<ServerStats, SoapError> {
        self.cancel.cancel();
        self.join.await.map_err(|e| SoapError::Io(std::io::Error::other(e)))?
    }
}
