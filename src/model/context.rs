//! Platform context objects and their post-parse conversion.
use crate::core::error::Error;
use crate::json::{Mapping, ObjectKind, Value};

bound_type!(
    /// A `context` object before (or without) platform conversion.
    Context => Context
);
bound_type!(CloudFoundryContext => CloudFoundryContext);
bound_type!(KubernetesContext => KubernetesContext);

pub const PLATFORM_CLOUD_FOUNDRY: &str = "cloudfoundry";
pub const PLATFORM_KUBERNETES: &str = "kubernetes";

/// A request's `context`, resolved by platform.
#[derive(Clone, Debug, PartialEq)]
pub enum PlatformContext<'a> {
    CloudFoundry(CloudFoundryContext<&'a Mapping>),
    Kubernetes(KubernetesContext<&'a Mapping>),
    Other(&'a Mapping),
}

impl<'a> PlatformContext<'a> {
    /// Reads the object at `key` whatever kind the context handler left it as.
    pub(crate) fn read(mapping: &'a Mapping, key: &str) -> Result<Option<Self>, Error> {
        let Some(context) = mapping.get_mapping(key)? else {
            return Ok(None);
        };
        Ok(Some(match context.kind() {
            ObjectKind::CloudFoundryContext => PlatformContext::CloudFoundry(CloudFoundryContext(context)),
            ObjectKind::KubernetesContext => PlatformContext::Kubernetes(KubernetesContext(context)),
            _ => PlatformContext::Other(context),
        }))
    }

    pub fn platform(&self) -> Result<Option<&'a str>, Error> {
        let mapping: &'a Mapping = match self {
            PlatformContext::CloudFoundry(context) => context.0,
            PlatformContext::Kubernetes(context) => context.0,
            PlatformContext::Other(context) => *context,
        };
        mapping.get_str("platform")
    }
}

impl<M: std::borrow::Borrow<Mapping>> Context<M> {
    pub fn platform(&self) -> Result<Option<&str>, Error> {
        self.get_str("platform")
    }
}

impl<M: std::borrow::Borrow<Mapping>> CloudFoundryContext<M> {
    pub fn organization_guid(&self) -> Result<Option<&str>, Error> {
        self.get_str("organization_guid")
    }

    pub fn organization_name(&self) -> Result<Option<&str>, Error> {
        self.get_str("organization_name")
    }

    pub fn space_guid(&self) -> Result<Option<&str>, Error> {
        self.get_str("space_guid")
    }

    pub fn space_name(&self) -> Result<Option<&str>, Error> {
        self.get_str("space_name")
    }

    pub fn instance_name(&self) -> Result<Option<&str>, Error> {
        self.get_str("instance_name")
    }
}

impl<M: std::borrow::Borrow<Mapping>> KubernetesContext<M> {
    pub fn namespace(&self) -> Result<Option<&str>, Error> {
        self.get_str("namespace")
    }

    pub fn cluster_id(&self) -> Result<Option<&str>, Error> {
        self.get_str("clusterid")
    }
}

/// Post-processing hook applied to the `context` object of provision, update and bind bodies.
pub trait ContextHandler: Send + Sync {
    fn convert(&self, context: Mapping) -> Result<Mapping, Error>;
}

/// Re-tags contexts of known platforms; anything else passes through untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultContextHandler;

impl ContextHandler for DefaultContextHandler {
    fn convert(&self, context: Mapping) -> Result<Mapping, Error> {
        let kind = match context.get("platform") {
            Some(Value::String(platform)) if platform == PLATFORM_CLOUD_FOUNDRY => {
                ObjectKind::CloudFoundryContext
            }
            Some(Value::String(platform)) if platform == PLATFORM_KUBERNETES => {
                ObjectKind::KubernetesContext
            }
            _ => return Ok(context),
        };
        Ok(context.into_kind(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::{ContextHandler, DefaultContextHandler, PlatformContext};
    use crate::json::{Mapping, ObjectKind};

    fn context(platform: &str) -> Mapping {
        let mut context = Mapping::new(ObjectKind::Context);
        context.insert("platform", platform);
        context.insert("namespace", "ns");
        context.insert("organization_guid", "org");
        context
    }

    #[test]
    fn known_platforms_are_retagged() {
        let handler = DefaultContextHandler;
        let converted = handler.convert(context("cloudfoundry")).expect("convert");
        assert_eq!(converted.kind(), ObjectKind::CloudFoundryContext);
        let converted = handler.convert(context("kubernetes")).expect("convert");
        assert_eq!(converted.kind(), ObjectKind::KubernetesContext);
        let converted = handler.convert(context("nomad")).expect("convert");
        assert_eq!(converted.kind(), ObjectKind::Context);
    }

    #[test]
    fn platform_context_reads_converted_objects() {
        let mut body = Mapping::new(ObjectKind::ProvisionRequest);
        let converted = DefaultContextHandler.convert(context("kubernetes")).expect("convert");
        body.insert("context", converted);
        let Some(PlatformContext::Kubernetes(kube)) = PlatformContext::read(&body, "context").expect("read") else {
            panic!("expected kubernetes context");
        };
        assert_eq!(kube.namespace().expect("namespace"), Some("ns"));
        assert!(PlatformContext::read(&body, "missing").expect("read").is_none());
    }
}
