//! Purpose: Typed views over bound mappings for every protocol object.
//! Exports: catalog, instance, binding and context types; `OperationState`; `validate`.
//! Role: What handlers read requests through and build responses with.
//! Invariants: A typed value always wraps a mapping of exactly its own `ObjectKind`.
//! Notes: `T<&Mapping>` is a borrowed view handed out by getters; `T` (= `T<Mapping>`) owns.
use crate::core::error::{Error, ErrorKind};
use crate::json::{Mapping, ObjectKind, Sequence};

/// Declares a newtype over a mapping bound to one `ObjectKind`.
macro_rules! bound_type {
    ($(#[$meta:meta])* $name:ident => $kind:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq)]
        pub struct $name<M = $crate::json::Mapping>(pub(crate) M);

        impl $name {
            pub fn new() -> Self {
                Self($crate::json::Mapping::new($crate::json::ObjectKind::$kind))
            }

            pub fn into_mapping(self) -> $crate::json::Mapping {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl<M: std::borrow::Borrow<$crate::json::Mapping>> $name<M> {
            pub fn as_mapping(&self) -> &$crate::json::Mapping {
                <M as std::borrow::Borrow<$crate::json::Mapping>>::borrow(&self.0)
            }

            pub fn to_owned_value(&self) -> $name {
                $name(<M as std::borrow::Borrow<$crate::json::Mapping>>::borrow(&self.0).clone())
            }
        }

        impl<M: std::borrow::Borrow<$crate::json::Mapping>> $crate::model::BoundType<M> for $name<M> {
            const KIND: $crate::json::ObjectKind = $crate::json::ObjectKind::$kind;

            fn from_storage(storage: M) -> Self {
                Self(storage)
            }
        }

        impl<M: std::borrow::Borrow<$crate::json::Mapping>> std::ops::Deref for $name<M> {
            type Target = $crate::json::Mapping;

            fn deref(&self) -> &$crate::json::Mapping {
                <M as std::borrow::Borrow<$crate::json::Mapping>>::borrow(&self.0)
            }
        }

        impl std::ops::DerefMut for $name {
            fn deref_mut(&mut self) -> &mut $crate::json::Mapping {
                &mut self.0
            }
        }

        impl TryFrom<$crate::json::Mapping> for $name {
            type Error = $crate::core::error::Error;

            fn try_from(mapping: $crate::json::Mapping) -> Result<Self, Self::Error> {
                $crate::model::expect_kind(&mapping, $crate::json::ObjectKind::$kind)?;
                Ok(Self(mapping))
            }
        }

        impl<'a> TryFrom<&'a $crate::json::Mapping> for $name<&'a $crate::json::Mapping> {
            type Error = $crate::core::error::Error;

            fn try_from(mapping: &'a $crate::json::Mapping) -> Result<Self, Self::Error> {
                $crate::model::expect_kind(mapping, $crate::json::ObjectKind::$kind)?;
                Ok(Self(mapping))
            }
        }

        impl From<$name> for $crate::json::Mapping {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl From<$name> for $crate::json::Value {
            fn from(value: $name) -> Self {
                $crate::json::Value::Object(value.0)
            }
        }
    };
}

mod binding;
mod catalog;
mod context;
mod instance;
mod state;
mod validate;

pub use binding::{
    BindRequestBody, BindResource, BindResponseBody, BindingCredentials, Device,
    FetchBindingResponseBody, UnbindResponseBody, VolumeMount,
};
pub use catalog::{
    CatalogBody, DashboardClient, MaintenanceInfo, Plan, PlanMetadata, Schema, SchemaParameters,
    Schemas, Service, ServiceBindingSchema, ServiceInstanceSchema, ServiceMetadata,
};
pub use context::{
    CloudFoundryContext, Context, ContextHandler, DefaultContextHandler, KubernetesContext,
    PLATFORM_CLOUD_FOUNDRY, PLATFORM_KUBERNETES, PlatformContext,
};
pub use instance::{
    DeprovisionResponseBody, FetchInstanceResponseBody, LastOperationBody, Parameters,
    PreviousValues, ProvisionRequestBody, ProvisionResponseBody, UpdateRequestBody,
    UpdateResponseBody,
};
pub use state::OperationState;
pub use validate::{Validator, validate};

/// A typed wrapper around storage `M` (an owned or borrowed mapping).
pub trait BoundType<M>: Sized {
    const KIND: ObjectKind;

    fn from_storage(storage: M) -> Self;
}

pub(crate) fn expect_kind(mapping: &Mapping, kind: ObjectKind) -> Result<(), Error> {
    if mapping.kind() == kind {
        return Ok(());
    }
    Err(Error::new(ErrorKind::Validation).with_message(format!(
        "expected a {kind} object, found {}",
        mapping.kind()
    )))
}

/// Typed view of the nested object at `key`.
pub(crate) fn field<'a, T: BoundType<&'a Mapping>>(
    mapping: &'a Mapping,
    key: &str,
) -> Result<Option<T>, Error> {
    Ok(mapping.get_bound(key, T::KIND)?.map(T::from_storage))
}

/// Typed views of every object in the array at `key`.
pub(crate) fn items<'a, T: BoundType<&'a Mapping>>(
    mapping: &'a Mapping,
    key: &str,
) -> Result<Option<Vec<T>>, Error> {
    Ok(mapping
        .get_bound_items(key, T::KIND)?
        .map(|found| found.into_iter().map(T::from_storage).collect()))
}

pub(crate) fn set_items<T>(mapping: &mut Mapping, key: &str, kind: ObjectKind, values: impl IntoIterator<Item = T>)
where
    T: Into<Mapping>,
{
    let sequence = Sequence::typed(kind, values.into_iter().map(Into::into));
    mapping.insert(key, sequence);
}

pub(crate) fn set_strings<S: Into<String>>(mapping: &mut Mapping, key: &str, values: impl IntoIterator<Item = S>) {
    let sequence: Sequence = values.into_iter().map(Into::<String>::into).collect();
    mapping.insert(key, sequence);
}
