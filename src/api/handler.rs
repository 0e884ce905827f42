//! Purpose: The business-logic seam and the error-log collaborator.
//! Exports: `BrokerHandler`, `ErrorLog`, `FailureStage`, `TracingErrorLog`.
//! Role: Broker authors implement `BrokerHandler`; the dispatcher owns everything around it.
//! Invariants: Handlers receive fully validated typed requests and return constrained responses.
//! Notes: Optional operations default to a 400 "not supported" rejection.
use std::fmt;

use crate::api::credentials::Credentials;
use crate::api::request::{
    BindRequest, BindingLastOperationRequest, CatalogRequest, DeprovisionRequest,
    FetchBindingRequest, FetchInstanceRequest, InstanceLastOperationRequest, ProvisionRequest,
    UnbindRequest, UpdateInstanceRequest,
};
use crate::api::response::{
    BindResponse, BindingLastOperationResponse, CatalogResponse, DeprovisionResponse,
    FetchBindingResponse, FetchInstanceResponse, InstanceLastOperationResponse, ProvisionResponse,
    UnbindResponse, UpdateInstanceResponse,
};
use crate::api::route::Operation;
use crate::core::error::Error;

/// One callback per protocol operation plus the authentication policy.
pub trait BrokerHandler: Send + Sync {
    /// Accepts or rejects the caller; a rejection is reported as 401 unless it carries its own status.
    fn authenticate(&self, credentials: &Credentials) -> Result<(), Error>;

    fn catalog(&self, request: CatalogRequest) -> Result<CatalogResponse, Error>;

    fn provision(&self, request: ProvisionRequest) -> Result<ProvisionResponse, Error>;

    fn fetch_instance(&self, request: FetchInstanceRequest) -> Result<FetchInstanceResponse, Error> {
        let _ = request;
        Err(Error::bad_request("Fetching a service instance is not supported"))
    }

    fn update_instance(&self, request: UpdateInstanceRequest) -> Result<UpdateInstanceResponse, Error>;

    fn deprovision(&self, request: DeprovisionRequest) -> Result<DeprovisionResponse, Error>;

    fn instance_last_operation(
        &self,
        request: InstanceLastOperationRequest,
    ) -> Result<InstanceLastOperationResponse, Error> {
        let _ = request;
        Err(Error::bad_request("Polling the last operation of a service instance is not supported"))
    }

    fn bind(&self, request: BindRequest) -> Result<BindResponse, Error>;

    fn fetch_binding(&self, request: FetchBindingRequest) -> Result<FetchBindingResponse, Error> {
        let _ = request;
        Err(Error::bad_request("Fetching a service binding is not supported"))
    }

    fn unbind(&self, request: UnbindRequest) -> Result<UnbindResponse, Error>;

    fn binding_last_operation(
        &self,
        request: BindingLastOperationRequest,
    ) -> Result<BindingLastOperationResponse, Error> {
        let _ = request;
        Err(Error::bad_request("Polling the last operation of a service binding is not supported"))
    }
}

/// Where a 5xx failure came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureStage {
    /// Before the handler ran: body read, parse plumbing, context conversion.
    Pipeline,
    /// The handler returned an error that maps to 5xx.
    Handler,
    /// The handler panicked.
    HandlerPanic,
    /// The handler's response could not be encoded.
    Response,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureStage::Pipeline => "pipeline",
            FailureStage::Handler => "handler",
            FailureStage::HandlerPanic => "handler_panic",
            FailureStage::Response => "response",
        };
        f.write_str(name)
    }
}

/// Receives the full detail of every server-side failure; responses only ever carry a generic description.
pub trait ErrorLog: Send + Sync {
    fn log(&self, stage: FailureStage, operation: Option<Operation>, err: &Error);
}

/// Forwards failures to `tracing::error!` with the source chain.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingErrorLog;

impl ErrorLog for TracingErrorLog {
    fn log(&self, stage: FailureStage, operation: Option<Operation>, err: &Error) {
        let operation = operation.map_or_else(|| "unrouted".to_string(), |op| op.to_string());
        tracing::error!(
            %stage,
            %operation,
            error = %err,
            causes = %err.causes().join(": "),
            "request failed"
        );
    }
}
