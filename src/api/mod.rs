//! Purpose: The broker-facing protocol surface: negotiation, routing, typed requests and dispatch.
//! Exports: `Broker`, `BrokerHandler`, request/response types, and the header helpers they use.
//! Role: What a broker author and a transport adapter program against.
//! Invariants: `Broker::process` is the only entrypoint that turns a raw request into a response.

mod broker;
mod credentials;
mod handler;
mod identity;
mod request;
mod response;
mod route;
mod version;

pub use crate::core::error::{Error, ErrorEnvelope, ErrorKind, to_exit_code, to_http_status};
pub use broker::Broker;
pub use credentials::{AUTHORIZATION_HEADER, Credentials};
pub use handler::{BrokerHandler, ErrorLog, FailureStage, TracingErrorLog};
pub use identity::{ORIGINATING_IDENTITY_HEADER, OriginatingIdentity};
pub use request::{
    BindRequest, BindingLastOperationRequest, BrokerRequest, CatalogRequest, DeprovisionRequest,
    FetchBindingRequest, FetchInstanceRequest, InboundRequest, IncomingRequest,
    InstanceLastOperationRequest, ProvisionRequest, RequestInfo, UnbindRequest,
    UpdateInstanceRequest,
};
pub use response::{
    BindResponse, BindingLastOperationResponse, CatalogResponse, DeprovisionResponse,
    FetchBindingResponse, FetchInstanceResponse, InstanceLastOperationResponse,
    JSON_CONTENT_TYPE, OutgoingResponse, ProvisionResponse, SuccessStatus, TypedResponse,
    UnbindResponse, UpdateInstanceResponse,
};
pub use route::{Operation, RouteMatch, resolve, split_path};
pub use version::{MinVersion, ProtocolVersion, SUPPORTED_MAJOR, VERSION_HEADER, negotiate};
