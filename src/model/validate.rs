//! Structural validation of bound object trees.
//!
//! Validation is a capability looked up by `ObjectKind`: a kind may carry a check,
//! and says whether the walk continues into its nested objects. Generic mappings
//! have no capability and are never descended into.
use crate::core::error::{Error, ErrorKind};
use crate::json::{Mapping, ObjectKind, Value};
use crate::model::OperationState;

type Check = fn(&Mapping) -> Result<(), Error>;

#[derive(Clone, Copy, Debug)]
pub struct Validator {
    check: Option<Check>,
    descend: bool,
}

impl Validator {
    const fn walk() -> Self {
        Self {
            check: None,
            descend: true,
        }
    }

    const fn checked(check: Check) -> Self {
        Self {
            check: Some(check),
            descend: true,
        }
    }

    const fn leaf(check: Option<Check>) -> Self {
        Self {
            check,
            descend: false,
        }
    }

    /// The validation capability of `kind`, if it has one.
    pub fn of(kind: ObjectKind) -> Option<Validator> {
        let validator = match kind {
            ObjectKind::Generic => return None,
            ObjectKind::Catalog => Validator::checked(check_catalog),
            ObjectKind::Service => Validator::checked(check_service),
            ObjectKind::ServiceMetadata => Validator::leaf(None),
            ObjectKind::Plan => Validator::checked(check_plan),
            ObjectKind::SchemaParameters => Validator::leaf(Some(check_schema_parameters)),
            ObjectKind::ProvisionRequest => Validator::checked(check_provision_request),
            ObjectKind::UpdateRequest => Validator::checked(check_update_request),
            ObjectKind::BindRequest => Validator::checked(check_bind_request),
            ObjectKind::VolumeMount => Validator::checked(check_volume_mount),
            ObjectKind::Device => Validator::checked(check_device),
            ObjectKind::LastOperation => Validator::checked(check_last_operation),
            _ => Validator::walk(),
        };
        Some(validator)
    }
}

/// Runs every applicable check over `root` and the bound objects beneath it.
pub fn validate(root: &Mapping) -> Result<(), Error> {
    let mut pending = vec![root];
    while let Some(mapping) = pending.pop() {
        let Some(validator) = Validator::of(mapping.kind()) else {
            continue;
        };
        if let Some(check) = validator.check {
            check(mapping)?;
        }
        if !validator.descend {
            continue;
        }
        let mut values: Vec<&Value> = mapping.iter().map(|(_, value)| value).collect();
        while let Some(value) = values.pop() {
            match value {
                Value::Object(child) => pending.push(child),
                Value::Array(sequence) => values.extend(sequence.iter()),
                _ => {}
            }
        }
    }
    Ok(())
}

fn invalid(kind: ObjectKind, message: impl std::fmt::Display) -> Error {
    Error::new(ErrorKind::Validation).with_message(format!("{kind}: {message}"))
}

fn require_text(mapping: &Mapping, key: &str) -> Result<(), Error> {
    if mapping.has_text(key) {
        return Ok(());
    }
    Err(invalid(mapping.kind(), format_args!("'{key}' is required")))
}

fn require_id(mapping: &Mapping, key: &str) -> Result<(), Error> {
    match mapping.get(key) {
        Some(Value::String(id)) if is_valid_id(id) => Ok(()),
        _ => Err(invalid(mapping.kind(), format_args!("'{key}' must be a valid id"))),
    }
}

fn require_name(mapping: &Mapping, key: &str) -> Result<(), Error> {
    match mapping.get(key) {
        Some(Value::String(name)) if is_valid_name(name) => Ok(()),
        _ => Err(invalid(
            mapping.kind(),
            format_args!("'{key}' must be a non-empty name of letters, digits, '-' and '.'"),
        )),
    }
}

fn require_items(mapping: &Mapping, key: &str) -> Result<(), Error> {
    match mapping.get(key) {
        Some(Value::Array(sequence)) if !sequence.is_empty() => Ok(()),
        _ => Err(invalid(mapping.kind(), format_args!("'{key}' must be a non-empty array"))),
    }
}

/// Non-empty, without whitespace or control characters.
pub(crate) fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && !id.chars().any(|ch| ch.is_whitespace() || ch.is_control())
}

pub(crate) fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '.')
}

fn check_catalog(mapping: &Mapping) -> Result<(), Error> {
    require_items(mapping, "services")
}

fn check_service(mapping: &Mapping) -> Result<(), Error> {
    require_name(mapping, "name")?;
    require_id(mapping, "id")?;
    require_text(mapping, "description")?;
    if !matches!(mapping.get("bindable"), Some(Value::Bool(_))) {
        return Err(invalid(mapping.kind(), "'bindable' must be a boolean"));
    }
    require_items(mapping, "plans")
}

fn check_plan(mapping: &Mapping) -> Result<(), Error> {
    require_name(mapping, "name")?;
    require_id(mapping, "id")?;
    require_text(mapping, "description")
}

fn check_schema_parameters(mapping: &Mapping) -> Result<(), Error> {
    require_text(mapping, "$schema")
}

fn check_provision_request(mapping: &Mapping) -> Result<(), Error> {
    require_id(mapping, "service_id")?;
    require_id(mapping, "plan_id")?;
    require_id(mapping, "organization_guid")?;
    require_id(mapping, "space_guid")
}

fn check_update_request(mapping: &Mapping) -> Result<(), Error> {
    require_id(mapping, "service_id")
}

fn check_bind_request(mapping: &Mapping) -> Result<(), Error> {
    require_id(mapping, "service_id")?;
    require_id(mapping, "plan_id")
}

fn check_volume_mount(mapping: &Mapping) -> Result<(), Error> {
    for key in ["driver", "container_dir", "mode", "device_type"] {
        require_text(mapping, key)?;
    }
    if !matches!(mapping.get("device"), Some(Value::Object(_))) {
        return Err(invalid(mapping.kind(), "'device' is required"));
    }
    Ok(())
}

fn check_device(mapping: &Mapping) -> Result<(), Error> {
    require_text(mapping, "volume_id")
}

fn check_last_operation(mapping: &Mapping) -> Result<(), Error> {
    match mapping.get("state") {
        Some(Value::String(state)) => state
            .parse::<OperationState>()
            .map(|_| ())
            .map_err(|_| invalid(mapping.kind(), format_args!("unknown state '{state}'"))),
        _ => Err(invalid(mapping.kind(), "'state' is required")),
    }
}
