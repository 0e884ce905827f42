//! Purpose: Resolve (method, path) to one of the protocol's ten operations.
//! Exports: `Operation`, `RouteMatch`, `split_path`, `resolve`.
//! Role: Third pipeline stage; decides which handler method runs and whether a body is read.
//! Invariants: Matching is anchored on the path suffix; any prefix before `v2` is ignored.
//! Invariants: Path parameters are percent-decoded, non-empty and free of NUL, CR, LF and BS.
use std::fmt;

use percent_encoding::percent_decode_str;

use crate::core::error::{Error, ErrorKind};
use crate::json::ObjectKind;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Operation {
    Catalog,
    Provision,
    FetchInstance,
    UpdateInstance,
    Deprovision,
    InstanceLastOperation,
    Bind,
    FetchBinding,
    Unbind,
    BindingLastOperation,
}

impl Operation {
    pub const ALL: [Operation; 10] = [
        Operation::Catalog,
        Operation::Provision,
        Operation::FetchInstance,
        Operation::UpdateInstance,
        Operation::Deprovision,
        Operation::InstanceLastOperation,
        Operation::Bind,
        Operation::FetchBinding,
        Operation::Unbind,
        Operation::BindingLastOperation,
    ];

    pub fn method(self) -> &'static str {
        match self {
            Operation::Provision | Operation::Bind => "PUT",
            Operation::UpdateInstance => "PATCH",
            Operation::Deprovision | Operation::Unbind => "DELETE",
            Operation::Catalog
            | Operation::FetchInstance
            | Operation::InstanceLastOperation
            | Operation::FetchBinding
            | Operation::BindingLastOperation => "GET",
        }
    }

    /// Root kind of the request body, for operations that carry one.
    pub fn body_kind(self) -> Option<ObjectKind> {
        match self {
            Operation::Provision => Some(ObjectKind::ProvisionRequest),
            Operation::UpdateInstance => Some(ObjectKind::UpdateRequest),
            Operation::Bind => Some(ObjectKind::BindRequest),
            _ => None,
        }
    }

    fn shape(self) -> &'static [Segment] {
        use Segment::{Binding, Instance, Literal};
        match self {
            Operation::Catalog => &[Literal("v2"), Literal("catalog")],
            Operation::Provision
            | Operation::FetchInstance
            | Operation::UpdateInstance
            | Operation::Deprovision => &[Literal("v2"), Literal("service_instances"), Instance],
            Operation::InstanceLastOperation => &[
                Literal("v2"),
                Literal("service_instances"),
                Instance,
                Literal("last_operation"),
            ],
            Operation::Bind | Operation::FetchBinding | Operation::Unbind => &[
                Literal("v2"),
                Literal("service_instances"),
                Instance,
                Literal("service_bindings"),
                Binding,
            ],
            Operation::BindingLastOperation => &[
                Literal("v2"),
                Literal("service_instances"),
                Instance,
                Literal("service_bindings"),
                Binding,
                Literal("last_operation"),
            ],
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Catalog => "catalog",
            Operation::Provision => "provision",
            Operation::FetchInstance => "fetch_instance",
            Operation::UpdateInstance => "update_instance",
            Operation::Deprovision => "deprovision",
            Operation::InstanceLastOperation => "instance_last_operation",
            Operation::Bind => "bind",
            Operation::FetchBinding => "fetch_binding",
            Operation::Unbind => "unbind",
            Operation::BindingLastOperation => "binding_last_operation",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug)]
enum Segment {
    Literal(&'static str),
    Instance,
    Binding,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RouteMatch {
    pub operation: Operation,
    /// Extracted parameters in path order: instance id, then binding id.
    pub params: Vec<String>,
}

impl RouteMatch {
    pub fn instance_id(&self) -> Option<&str> {
        self.params.first().map(String::as_str)
    }

    pub fn binding_id(&self) -> Option<&str> {
        self.params.get(1).map(String::as_str)
    }
}

/// Splits a request path into percent-decoded segments.
pub fn split_path(path: &str) -> Result<Vec<String>, Error> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let mut segments = trimmed
        .split('/')
        .map(decode_segment)
        .collect::<Result<Vec<_>, _>>()?;
    while segments.last().is_some_and(String::is_empty) {
        segments.pop();
    }
    Ok(segments)
}

fn decode_segment(raw: &str) -> Result<String, Error> {
    let decoded = percent_decode_str(raw).decode_utf8().map_err(|err| {
        Error::new(ErrorKind::InvalidRequest)
            .with_message("invalid path")
            .with_source(err)
    })?;
    if decoded
        .chars()
        .any(|ch| matches!(ch, '\n' | '\r' | '\u{8}' | '\0'))
    {
        return Err(Error::new(ErrorKind::InvalidRequest).with_message("invalid path"));
    }
    Ok(decoded.into_owned())
}

/// Finds the operation for `method` and `segments`, if any.
pub fn resolve(method: &str, segments: &[String]) -> Option<RouteMatch> {
    Operation::ALL
        .into_iter()
        .filter(|operation| operation.method().eq_ignore_ascii_case(method))
        .find_map(|operation| match_shape(operation, segments))
}

fn match_shape(operation: Operation, segments: &[String]) -> Option<RouteMatch> {
    let shape = operation.shape();
    let start = segments.len().checked_sub(shape.len())?;
    let mut params = Vec::new();
    for (pattern, segment) in shape.iter().zip(&segments[start..]) {
        match pattern {
            Segment::Literal(literal) if segment == literal => {}
            Segment::Literal(_) => return None,
            Segment::Instance | Segment::Binding if segment.is_empty() => return None,
            Segment::Instance | Segment::Binding => params.push(segment.clone()),
        }
    }
    Some(RouteMatch { operation, params })
}
