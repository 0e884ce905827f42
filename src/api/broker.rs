//! Purpose: Run one request through the full dispatch pipeline.
//! Exports: `Broker`.
//! Role: version -> credentials/auth -> route -> body -> handler -> encode, one request at a time.
//! Invariants: Every failure becomes exactly one error envelope; nothing escapes to the transport.
//! Invariants: 5xx descriptions are generic; the detail goes only to the `ErrorLog`.
//! Notes: Per-request state lives on the stack; the broker itself is shared read-mostly.
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::api::credentials::{AUTHORIZATION_HEADER, Credentials};
use crate::api::handler::{BrokerHandler, ErrorLog, FailureStage, TracingErrorLog};
use crate::api::identity::{ORIGINATING_IDENTITY_HEADER, OriginatingIdentity};
use crate::api::request::{BrokerRequest, IncomingRequest, RequestInfo};
use crate::api::response::{JSON_CONTENT_TYPE, OutgoingResponse, TypedResponse};
use crate::api::route::{self, Operation};
use crate::api::version::{self, MinVersion, ProtocolVersion, VERSION_HEADER};
use crate::core::error::{Error, ErrorKind};
use crate::json::{Mapping, ObjectKind, Parser, ResourceLimits, TypeRegistry, Value, builtin};
use crate::model::{ContextHandler, DefaultContextHandler, validate};

const CONTENT_TYPE_HEADER: &str = "Content-Type";

/// The dispatch orchestrator; one instance serves every request.
pub struct Broker {
    min_version: MinVersion,
    limits: ResourceLimits,
    registry: Option<Arc<TypeRegistry>>,
    error_log: Arc<dyn ErrorLog>,
    context_handler: Arc<dyn ContextHandler>,
}

struct Failure {
    stage: FailureStage,
    error: Error,
}

impl Failure {
    fn new(stage: FailureStage, error: Error) -> Self {
        Self { stage, error }
    }
}

impl From<Error> for Failure {
    fn from(error: Error) -> Self {
        Self::new(FailureStage::Pipeline, error)
    }
}

impl Broker {
    pub fn new() -> Self {
        Self {
            min_version: MinVersion::default(),
            limits: ResourceLimits::default(),
            registry: None,
            error_log: Arc::new(TracingErrorLog),
            context_handler: Arc::new(DefaultContextHandler),
        }
    }

    pub fn with_min_version(self, version: ProtocolVersion) -> Self {
        self.min_version.set(version);
        self
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Replaces the builtin type bindings for request bodies.
    pub fn with_registry(mut self, registry: TypeRegistry) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    pub fn with_error_log(mut self, error_log: impl ErrorLog + 'static) -> Self {
        self.error_log = Arc::new(error_log);
        self
    }

    pub fn with_context_handler(mut self, handler: impl ContextHandler + 'static) -> Self {
        self.context_handler = Arc::new(handler);
        self
    }

    /// Hot-reload path: one atomic store, visible to the next request on any thread.
    pub fn set_min_version(&self, version: ProtocolVersion) {
        self.min_version.set(version);
    }

    pub fn min_version(&self) -> ProtocolVersion {
        self.min_version.get()
    }

    pub fn limits(&self) -> ResourceLimits {
        self.limits
    }

    fn registry(&self) -> &TypeRegistry {
        self.registry.as_deref().unwrap_or_else(|| builtin())
    }

    /// Processes one request to completion; never fails and never panics on handler panics.
    pub fn process<R, H>(&self, request: &mut R, handler: &H) -> OutgoingResponse
    where
        R: IncomingRequest + ?Sized,
        H: BrokerHandler + ?Sized,
    {
        let mut operation = None;
        match self.dispatch(request, handler, &mut operation) {
            Ok(response) => {
                let operation = operation.map_or_else(String::new, |op| op.to_string());
                tracing::debug!(%operation, status = response.status, "request dispatched");
                response
            }
            Err(failure) => self.failure_response(failure.stage, operation, &failure.error),
        }
    }

    /// Envelope for an error raised outside `process`, e.g. by a transport adapter.
    pub fn error_response(&self, err: &Error) -> OutgoingResponse {
        self.failure_response(FailureStage::Pipeline, None, err)
    }

    fn failure_response(
        &self,
        stage: FailureStage,
        operation: Option<Operation>,
        err: &Error,
    ) -> OutgoingResponse {
        let response = OutgoingResponse::from_error(err);
        if response.status >= 500 {
            self.error_log.log(stage, operation, err);
            return response;
        }
        let operation = operation.map_or_else(String::new, |op| op.to_string());
        match err.kind() {
            ErrorKind::UnsupportedVersion | ErrorKind::Authentication => {
                tracing::warn!(%operation, status = response.status, error = %err, "request rejected");
            }
            _ => {
                tracing::debug!(%operation, status = response.status, error = %err, "request rejected");
            }
        }
        response
    }

    fn dispatch<R, H>(
        &self,
        request: &mut R,
        handler: &H,
        operation: &mut Option<Operation>,
    ) -> Result<OutgoingResponse, Failure>
    where
        R: IncomingRequest + ?Sized,
        H: BrokerHandler + ?Sized,
    {
        let version = version::negotiate(request.header(VERSION_HEADER), self.min_version())?;

        let credentials = Credentials::from_header(request.header(AUTHORIZATION_HEADER));
        guarded(|| handler.authenticate(&credentials))?.map_err(authentication_failure)?;

        let originating_identity =
            OriginatingIdentity::from_header(request.header(ORIGINATING_IDENTITY_HEADER))?;

        let segments = route::split_path(request.path())?;
        let matched = route::resolve(request.method(), &segments).ok_or_else(|| {
            Error::new(ErrorKind::RouteNotFound).with_message(format!(
                "No operation for {} {}",
                request.method(),
                request.path()
            ))
        })?;
        *operation = Some(matched.operation);

        let body = match matched.operation.body_kind() {
            Some(kind) => Some(self.read_body(request, kind)?),
            None => None,
        };

        let info = RequestInfo {
            version,
            credentials,
            originating_identity,
            accepts_incomplete: request.query("accepts_incomplete") == Some("true"),
        };
        let typed = BrokerRequest::assemble(
            matched,
            info,
            &|name| request.query(name).map(str::to_string),
            body,
        )?;

        guarded(|| invoke(handler, typed))?
    }

    fn read_body<R>(&self, request: &mut R, kind: ObjectKind) -> Result<Mapping, Error>
    where
        R: IncomingRequest + ?Sized,
    {
        let content_type = request.header(CONTENT_TYPE_HEADER).unwrap_or_default();
        let media_type = content_type.split(';').next().unwrap_or_default().trim();
        if !media_type.eq_ignore_ascii_case(JSON_CONTENT_TYPE) {
            return Err(Error::new(ErrorKind::InvalidRequest)
                .with_message(format!("Content-Type must be {JSON_CONTENT_TYPE}")));
        }

        let mut parser = Parser::new(request.body(), self.registry(), self.limits);
        let mut body = parser.parse(Mapping::new(kind)).map_err(|err| match err.kind() {
            ErrorKind::Io => Error::new(ErrorKind::InvalidRequest)
                .with_message("failed to read request body")
                .with_source(err),
            _ => err,
        })?;
        validate(&body)?;

        if let Some(Value::Object(context)) = body.get_mut("context") {
            let raw = std::mem::take(context);
            *context = self.context_handler.convert(raw)?;
        }
        Ok(body)
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("min_version", &self.min_version())
            .field("limits", &self.limits)
            .field("custom_registry", &self.registry.is_some())
            .finish_non_exhaustive()
    }
}

fn authentication_failure(err: Error) -> Error {
    match err.kind() {
        ErrorKind::Authentication | ErrorKind::Business => err,
        _ => {
            let message = err.message().unwrap_or("Unauthorized").to_string();
            Error::new(ErrorKind::Authentication)
                .with_message(message)
                .with_source(err)
        }
    }
}

fn invoke<H>(handler: &H, request: BrokerRequest) -> Result<OutgoingResponse, Failure>
where
    H: BrokerHandler + ?Sized,
{
    match request {
        BrokerRequest::Catalog(request) => encode(handler.catalog(request)),
        BrokerRequest::Provision(request) => encode(handler.provision(request)),
        BrokerRequest::FetchInstance(request) => encode(handler.fetch_instance(request)),
        BrokerRequest::UpdateInstance(request) => encode(handler.update_instance(request)),
        BrokerRequest::Deprovision(request) => encode(handler.deprovision(request)),
        BrokerRequest::InstanceLastOperation(request) => {
            encode(handler.instance_last_operation(request))
        }
        BrokerRequest::Bind(request) => encode(handler.bind(request)),
        BrokerRequest::FetchBinding(request) => encode(handler.fetch_binding(request)),
        BrokerRequest::Unbind(request) => encode(handler.unbind(request)),
        BrokerRequest::BindingLastOperation(request) => {
            encode(handler.binding_last_operation(request))
        }
    }
}

fn encode<T: TypedResponse>(result: Result<T, Error>) -> Result<OutgoingResponse, Failure> {
    let response = result.map_err(|err| Failure::new(FailureStage::Handler, err))?;
    OutgoingResponse::success(&response).map_err(|err| Failure::new(FailureStage::Response, err))
}

/// Runs handler code, turning a panic into an internal error.
fn guarded<T>(call: impl FnOnce() -> T) -> Result<T, Failure> {
    panic::catch_unwind(AssertUnwindSafe(call)).map_err(|payload| {
        Failure::new(
            FailureStage::HandlerPanic,
            Error::new(ErrorKind::Internal)
                .with_message(format!("handler panicked: {}", panic_message(payload.as_ref()))),
        )
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string payload"
    }
}
