//! Purpose: The abstract inbound request and the typed per-operation requests built from it.
//! Exports: `IncomingRequest`, `InboundRequest`, `RequestInfo`, `BrokerRequest`, one struct per operation.
//! Role: Transport adapters implement `IncomingRequest`; handlers only ever see typed requests.
//! Invariants: Path ids in a typed request are the decoded route parameters, never re-read from the body.
//! Invariants: Required query parameters are present and non-empty, else `InvalidRequest`.
use std::io::{Cursor, Read};

use bytes::Bytes;

use crate::api::credentials::Credentials;
use crate::api::identity::OriginatingIdentity;
use crate::api::route::{Operation, RouteMatch};
use crate::api::version::ProtocolVersion;
use crate::core::error::{Error, ErrorKind};
use crate::json::Mapping;
use crate::model::{BindRequestBody, ProvisionRequestBody, UpdateRequestBody};

/// What the dispatcher needs from a transport's request.
pub trait IncomingRequest {
    fn method(&self) -> &str;

    /// Path without the query string.
    fn path(&self) -> &str;

    /// Header value by case-insensitive name.
    fn header(&self, name: &str) -> Option<&str>;

    /// First value of a decoded query parameter.
    fn query(&self, name: &str) -> Option<&str>;

    fn body(&mut self) -> &mut dyn Read;
}

/// An owned, fully buffered request; what the HTTP adapter and tests hand to `Broker::process`.
#[derive(Clone, Debug)]
pub struct InboundRequest {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    body: Cursor<Bytes>,
}

impl InboundRequest {
    /// `target` is a path optionally followed by `?query`.
    pub fn new(method: impl Into<String>, target: &str) -> Self {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        Self {
            method: method.into(),
            path: path.to_string(),
            headers: Vec::new(),
            query: url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect(),
            body: Cursor::new(Bytes::new()),
        }
    }

    pub fn get(target: &str) -> Self {
        Self::new("GET", target)
    }

    pub fn put(target: &str) -> Self {
        Self::new("PUT", target)
    }

    pub fn patch(target: &str) -> Self {
        Self::new("PATCH", target)
    }

    pub fn delete(target: &str) -> Self {
        Self::new("DELETE", target)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Cursor::new(body.into());
        self
    }

    /// Sets a JSON body and its content type.
    pub fn with_json(self, body: impl Into<Bytes>) -> Self {
        self.with_header("Content-Type", "application/json")
            .with_body(body)
    }
}

impl IncomingRequest for InboundRequest {
    fn method(&self) -> &str {
        &self.method
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn query(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn body(&mut self) -> &mut dyn Read {
        &mut self.body
    }
}

/// Request-wide facts shared by every typed request.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestInfo {
    pub version: ProtocolVersion,
    pub credentials: Credentials,
    pub originating_identity: Option<OriginatingIdentity>,
    /// True only when the `accepts_incomplete` query parameter is exactly `true`.
    pub accepts_incomplete: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CatalogRequest {
    pub info: RequestInfo,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProvisionRequest {
    pub info: RequestInfo,
    pub instance_id: String,
    pub body: ProvisionRequestBody,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FetchInstanceRequest {
    pub info: RequestInfo,
    pub instance_id: String,
    pub service_id: Option<String>,
    pub plan_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UpdateInstanceRequest {
    pub info: RequestInfo,
    pub instance_id: String,
    pub body: UpdateRequestBody,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeprovisionRequest {
    pub info: RequestInfo,
    pub instance_id: String,
    pub service_id: String,
    pub plan_id: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InstanceLastOperationRequest {
    pub info: RequestInfo,
    pub instance_id: String,
    pub service_id: Option<String>,
    pub plan_id: Option<String>,
    pub operation: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BindRequest {
    pub info: RequestInfo,
    pub instance_id: String,
    pub binding_id: String,
    pub body: BindRequestBody,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FetchBindingRequest {
    pub info: RequestInfo,
    pub instance_id: String,
    pub binding_id: String,
    pub service_id: Option<String>,
    pub plan_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UnbindRequest {
    pub info: RequestInfo,
    pub instance_id: String,
    pub binding_id: String,
    pub service_id: String,
    pub plan_id: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BindingLastOperationRequest {
    pub info: RequestInfo,
    pub instance_id: String,
    pub binding_id: String,
    pub service_id: Option<String>,
    pub plan_id: Option<String>,
    pub operation: Option<String>,
}

/// A fully decoded request for exactly one operation.
#[derive(Clone, Debug, PartialEq)]
pub enum BrokerRequest {
    Catalog(CatalogRequest),
    Provision(ProvisionRequest),
    FetchInstance(FetchInstanceRequest),
    UpdateInstance(UpdateInstanceRequest),
    Deprovision(DeprovisionRequest),
    InstanceLastOperation(InstanceLastOperationRequest),
    Bind(BindRequest),
    FetchBinding(FetchBindingRequest),
    Unbind(UnbindRequest),
    BindingLastOperation(BindingLastOperationRequest),
}

impl BrokerRequest {
    /// Assembles the typed request for `route`; `body` is present iff the operation declares one.
    pub(crate) fn assemble(
        route: RouteMatch,
        info: RequestInfo,
        query: &dyn Fn(&str) -> Option<String>,
        body: Option<Mapping>,
    ) -> Result<Self, Error> {
        let operation = route.operation;
        let mut params = route.params.into_iter();
        let instance_id = params.next().unwrap_or_default();
        let binding_id = params.next().unwrap_or_default();
        let optional = |name: &str| query(name).filter(|value| !value.is_empty());
        let required = |name: &str| {
            optional(name).ok_or_else(|| {
                Error::new(ErrorKind::InvalidRequest)
                    .with_message(format!("Missing query parameter '{name}'"))
            })
        };
        let take_body = move || {
            body.ok_or_else(|| {
                Error::new(ErrorKind::Internal).with_message(format!("{operation} body was not read"))
            })
        };

        let request = match operation {
            Operation::Catalog => BrokerRequest::Catalog(CatalogRequest { info }),
            Operation::Provision => BrokerRequest::Provision(ProvisionRequest {
                info,
                instance_id,
                body: ProvisionRequestBody::try_from(take_body()?)?,
            }),
            Operation::FetchInstance => BrokerRequest::FetchInstance(FetchInstanceRequest {
                info,
                instance_id,
                service_id: optional("service_id"),
                plan_id: optional("plan_id"),
            }),
            Operation::UpdateInstance => BrokerRequest::UpdateInstance(UpdateInstanceRequest {
                info,
                instance_id,
                body: UpdateRequestBody::try_from(take_body()?)?,
            }),
            Operation::Deprovision => BrokerRequest::Deprovision(DeprovisionRequest {
                info,
                instance_id,
                service_id: required("service_id")?,
                plan_id: required("plan_id")?,
            }),
            Operation::InstanceLastOperation => {
                BrokerRequest::InstanceLastOperation(InstanceLastOperationRequest {
                    info,
                    instance_id,
                    service_id: optional("service_id"),
                    plan_id: optional("plan_id"),
                    operation: optional("operation"),
                })
            }
            Operation::Bind => BrokerRequest::Bind(BindRequest {
                info,
                instance_id,
                binding_id,
                body: BindRequestBody::try_from(take_body()?)?,
            }),
            Operation::FetchBinding => BrokerRequest::FetchBinding(FetchBindingRequest {
                info,
                instance_id,
                binding_id,
                service_id: optional("service_id"),
                plan_id: optional("plan_id"),
            }),
            Operation::Unbind => BrokerRequest::Unbind(UnbindRequest {
                info,
                instance_id,
                binding_id,
                service_id: required("service_id")?,
                plan_id: required("plan_id")?,
            }),
            Operation::BindingLastOperation => {
                BrokerRequest::BindingLastOperation(BindingLastOperationRequest {
                    info,
                    instance_id,
                    binding_id,
                    service_id: optional("service_id"),
                    plan_id: optional("plan_id"),
                    operation: optional("operation"),
                })
            }
        };
        Ok(request)
    }

    pub fn operation(&self) -> Operation {
        match self {
            BrokerRequest::Catalog(_) => Operation::Catalog,
            BrokerRequest::Provision(_) => Operation::Provision,
            BrokerRequest::FetchInstance(_) => Operation::FetchInstance,
            BrokerRequest::UpdateInstance(_) => Operation::UpdateInstance,
            BrokerRequest::Deprovision(_) => Operation::Deprovision,
            BrokerRequest::InstanceLastOperation(_) => Operation::InstanceLastOperation,
            BrokerRequest::Bind(_) => Operation::Bind,
            BrokerRequest::FetchBinding(_) => Operation::FetchBinding,
            BrokerRequest::Unbind(_) => Operation::Unbind,
            BrokerRequest::BindingLastOperation(_) => Operation::BindingLastOperation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BrokerRequest, IncomingRequest, InboundRequest, RequestInfo};
    use crate::api::credentials::Credentials;
    use crate::api::route::{self, RouteMatch};
    use crate::api::version::ProtocolVersion;
    use crate::core::error::ErrorKind;
    use std::io::Read;

    fn info() -> RequestInfo {
        RequestInfo {
            version: ProtocolVersion::new(2, 14),
            credentials: Credentials::None,
            originating_identity: None,
            accepts_incomplete: false,
        }
    }

    fn matched(request: &InboundRequest) -> RouteMatch {
        let segments = route::split_path(request.path()).expect("path");
        route::resolve(request.method(), &segments).expect("route")
    }

    fn assemble(request: &InboundRequest) -> Result<BrokerRequest, crate::core::error::Error> {
        BrokerRequest::assemble(
            matched(request),
            info(),
            &|name| request.query(name).map(str::to_string),
            None,
        )
    }

    #[test]
    fn inbound_request_splits_target_and_decodes_query() {
        let mut request = InboundRequest::get("/v2/service_instances/i1/last_operation?operation=op%201&plan_id=p+1")
            .with_header("X-Broker-API-Version", "2.14")
            .with_body("abc");
        assert_eq!(request.path(), "/v2/service_instances/i1/last_operation");
        assert_eq!(request.query("operation"), Some("op 1"));
        assert_eq!(request.query("plan_id"), Some("p 1"));
        assert_eq!(request.header("x-broker-api-version"), Some("2.14"));
        let mut body = String::new();
        request.body().read_to_string(&mut body).expect("read");
        assert_eq!(body, "abc");
    }

    #[test]
    fn last_operation_carries_optional_parameters() {
        let request = InboundRequest::get("/v2/service_instances/i1/last_operation?operation=task-42&service_id=");
        let BrokerRequest::InstanceLastOperation(poll) = assemble(&request).expect("assemble") else {
            panic!("expected instance last-operation request");
        };
        assert_eq!(poll.instance_id, "i1");
        assert_eq!(poll.operation.as_deref(), Some("task-42"));
        assert_eq!(poll.service_id, None);
        assert_eq!(poll.plan_id, None);
    }

    #[test]
    fn deprovision_requires_service_and_plan() {
        let request = InboundRequest::delete("/v2/service_instances/i1?service_id=s1");
        let err = assemble(&request).expect_err("plan_id missing");
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert!(err.message().unwrap_or_default().contains("plan_id"));

        let request = InboundRequest::delete("/v2/service_instances/i1/service_bindings/b1?service_id=s1&plan_id=p1");
        let BrokerRequest::Unbind(unbind) = assemble(&request).expect("assemble") else {
            panic!("expected unbind request");
        };
        assert_eq!((unbind.instance_id.as_str(), unbind.binding_id.as_str()), ("i1", "b1"));
        assert_eq!((unbind.service_id.as_str(), unbind.plan_id.as_str()), ("s1", "p1"));
    }

    #[test]
    fn body_operations_without_a_body_are_internal_errors() {
        let request = InboundRequest::put("/v2/service_instances/i1");
        let err = assemble(&request).expect_err("no body");
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
