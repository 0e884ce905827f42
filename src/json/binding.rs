//! Purpose: Declarative (owner kind, key) -> bound kind table consulted while parsing.
//! Exports: `TypeRegistry`, `TypeRegistryBuilder`, `builtin`.
//! Role: Replaces per-class annotations with plain data; the parser asks, the table answers.
//! Invariants: Immutable after construction; lookups are pure and safe to share across threads.
//! Notes: One owner may declare any number of keys; re-declaring a key replaces it.
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::json::value::ObjectKind;

/// Object bindings of the v2 protocol model.
const BUILTIN_BINDINGS: &[(ObjectKind, &str, ObjectKind)] = &[
    (ObjectKind::Catalog, "services", ObjectKind::Service),
    (ObjectKind::Service, "metadata", ObjectKind::ServiceMetadata),
    (ObjectKind::Service, "dashboard_client", ObjectKind::DashboardClient),
    (ObjectKind::Service, "plans", ObjectKind::Plan),
    (ObjectKind::Plan, "metadata", ObjectKind::PlanMetadata),
    (ObjectKind::Plan, "schemas", ObjectKind::Schemas),
    (ObjectKind::Plan, "maintenance_info", ObjectKind::MaintenanceInfo),
    (ObjectKind::Schemas, "service_instance", ObjectKind::ServiceInstanceSchema),
    (ObjectKind::Schemas, "service_binding", ObjectKind::ServiceBindingSchema),
    (ObjectKind::ServiceInstanceSchema, "create", ObjectKind::Schema),
    (ObjectKind::ServiceInstanceSchema, "update", ObjectKind::Schema),
    (ObjectKind::ServiceBindingSchema, "create", ObjectKind::Schema),
    (ObjectKind::Schema, "parameters", ObjectKind::SchemaParameters),
    (ObjectKind::ProvisionRequest, "context", ObjectKind::Context),
    (ObjectKind::ProvisionRequest, "parameters", ObjectKind::Parameters),
    (ObjectKind::ProvisionRequest, "maintenance_info", ObjectKind::MaintenanceInfo),
    (ObjectKind::UpdateRequest, "context", ObjectKind::Context),
    (ObjectKind::UpdateRequest, "parameters", ObjectKind::Parameters),
    (ObjectKind::UpdateRequest, "previous_values", ObjectKind::PreviousValues),
    (ObjectKind::UpdateRequest, "maintenance_info", ObjectKind::MaintenanceInfo),
    (ObjectKind::BindRequest, "context", ObjectKind::Context),
    (ObjectKind::BindRequest, "bind_resource", ObjectKind::BindResource),
    (ObjectKind::BindRequest, "parameters", ObjectKind::Parameters),
    (ObjectKind::FetchInstanceResponse, "parameters", ObjectKind::Parameters),
    (ObjectKind::FetchInstanceResponse, "maintenance_info", ObjectKind::MaintenanceInfo),
    (ObjectKind::BindResponse, "credentials", ObjectKind::BindingCredentials),
    (ObjectKind::BindResponse, "volume_mounts", ObjectKind::VolumeMount),
    (ObjectKind::FetchBindingResponse, "credentials", ObjectKind::BindingCredentials),
    (ObjectKind::FetchBindingResponse, "volume_mounts", ObjectKind::VolumeMount),
    (ObjectKind::FetchBindingResponse, "parameters", ObjectKind::Parameters),
    (ObjectKind::VolumeMount, "device", ObjectKind::Device),
];

static BUILTIN: LazyLock<TypeRegistry> = LazyLock::new(|| {
    BUILTIN_BINDINGS
        .iter()
        .fold(TypeRegistry::builder(), |builder, &(owner, key, bound)| {
            builder.bind(owner, key, bound)
        })
        .build()
});

/// Registry holding the protocol's own bindings.
pub fn builtin() -> &'static TypeRegistry {
    &BUILTIN
}

#[derive(Clone, Debug, Default)]
pub struct TypeRegistry {
    bindings: HashMap<ObjectKind, HashMap<String, ObjectKind>>,
}

impl TypeRegistry {
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::default()
    }

    /// Kind to instantiate when `owner` opens a container under `key`.
    pub fn resolve(&self, owner: ObjectKind, key: &str) -> Option<ObjectKind> {
        self.bindings.get(&owner)?.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.bindings.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Debug, Default)]
pub struct TypeRegistryBuilder {
    registry: TypeRegistry,
}

impl TypeRegistryBuilder {
    /// Starts from the builtin table so callers only add or override entries.
    pub fn from_builtin() -> Self {
        Self {
            registry: builtin().clone(),
        }
    }

    pub fn bind(mut self, owner: ObjectKind, key: impl Into<String>, bound: ObjectKind) -> Self {
        self.registry
            .bindings
            .entry(owner)
            .or_default()
            .insert(key.into(), bound);
        self
    }

    pub fn build(self) -> TypeRegistry {
        self.registry
    }
}
