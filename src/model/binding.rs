//! Service binding request and response bodies.
use crate::core::error::Error;
use crate::json::{Mapping, ObjectKind};
use crate::model::context::PlatformContext;
use crate::model::{Parameters, field, items, set_items};

bound_type!(
    /// Body of `PUT /v2/service_instances/{iid}/service_bindings/{bid}`.
    BindRequestBody => BindRequest
);
bound_type!(BindResource => BindResource);
bound_type!(BindResponseBody => BindResponse);
bound_type!(FetchBindingResponseBody => FetchBindingResponse);
bound_type!(UnbindResponseBody => UnbindResponse);
bound_type!(
    /// Credentials handed to the bound application; shape is up to the broker.
    BindingCredentials => BindingCredentials
);
bound_type!(VolumeMount => VolumeMount);
bound_type!(Device => Device);

impl<M: std::borrow::Borrow<Mapping>> BindRequestBody<M> {
    pub fn service_id(&self) -> Result<Option<&str>, Error> {
        self.get_str("service_id")
    }

    pub fn plan_id(&self) -> Result<Option<&str>, Error> {
        self.get_str("plan_id")
    }

    pub fn app_guid(&self) -> Result<Option<&str>, Error> {
        self.get_str("app_guid")
    }

    pub fn context(&self) -> Result<Option<PlatformContext<'_>>, Error> {
        PlatformContext::read(self, "context")
    }

    pub fn bind_resource(&self) -> Result<Option<BindResource<&Mapping>>, Error> {
        field(self, "bind_resource")
    }

    pub fn parameters(&self) -> Result<Option<Parameters<&Mapping>>, Error> {
        field(self, "parameters")
    }
}

impl BindRequestBody {
    pub fn with_ids(service_id: &str, plan_id: &str) -> Self {
        let mut body = Self::new();
        body.insert("service_id", service_id);
        body.insert("plan_id", plan_id);
        body
    }
}

impl<M: std::borrow::Borrow<Mapping>> BindResource<M> {
    pub fn app_guid(&self) -> Result<Option<&str>, Error> {
        self.get_str("app_guid")
    }

    pub fn route(&self) -> Result<Option<&str>, Error> {
        self.get_str("route")
    }
}

impl BindResponseBody {
    pub fn set_credentials(&mut self, credentials: BindingCredentials) -> &mut Self {
        self.insert("credentials", credentials);
        self
    }

    pub fn set_syslog_drain_url(&mut self, url: impl Into<String>) -> &mut Self {
        self.insert("syslog_drain_url", url.into());
        self
    }

    pub fn set_route_service_url(&mut self, url: impl Into<String>) -> &mut Self {
        self.insert("route_service_url", url.into());
        self
    }

    pub fn set_volume_mounts(&mut self, mounts: impl IntoIterator<Item = VolumeMount>) -> &mut Self {
        set_items(self, "volume_mounts", ObjectKind::VolumeMount, mounts);
        self
    }

    pub fn set_operation(&mut self, operation: impl Into<String>) -> &mut Self {
        self.insert("operation", operation.into());
        self
    }
}

impl<M: std::borrow::Borrow<Mapping>> BindResponseBody<M> {
    pub fn credentials(&self) -> Result<Option<BindingCredentials<&Mapping>>, Error> {
        field(self, "credentials")
    }

    pub fn volume_mounts(&self) -> Result<Vec<VolumeMount<&Mapping>>, Error> {
        Ok(items(self, "volume_mounts")?.unwrap_or_default())
    }
}

impl FetchBindingResponseBody {
    pub fn set_credentials(&mut self, credentials: BindingCredentials) -> &mut Self {
        self.insert("credentials", credentials);
        self
    }

    pub fn set_volume_mounts(&mut self, mounts: impl IntoIterator<Item = VolumeMount>) -> &mut Self {
        set_items(self, "volume_mounts", ObjectKind::VolumeMount, mounts);
        self
    }

    /// Stores a copy of `parameters`, re-tagged as this body's parameters object.
    pub fn set_parameters(&mut self, parameters: &Mapping) -> &mut Self {
        self.insert("parameters", parameters.clone().into_kind(ObjectKind::Parameters));
        self
    }
}

impl<M: std::borrow::Borrow<Mapping>> FetchBindingResponseBody<M> {
    pub fn credentials(&self) -> Result<Option<BindingCredentials<&Mapping>>, Error> {
        field(self, "credentials")
    }

    pub fn volume_mounts(&self) -> Result<Vec<VolumeMount<&Mapping>>, Error> {
        Ok(items(self, "volume_mounts")?.unwrap_or_default())
    }

    pub fn parameters(&self) -> Result<Option<Parameters<&Mapping>>, Error> {
        field(self, "parameters")
    }
}

impl UnbindResponseBody {
    pub fn set_operation(&mut self, operation: impl Into<String>) -> &mut Self {
        self.insert("operation", operation.into());
        self
    }
}

impl BindingCredentials {
    pub fn set(&mut self, key: &str, value: impl Into<crate::json::Value>) -> &mut Self {
        self.insert(key, value);
        self
    }
}

impl VolumeMount {
    pub fn new_shared(driver: &str, container_dir: &str, mode: &str, device: Device) -> Self {
        let mut mount = Self::new();
        mount.insert("driver", driver);
        mount.insert("container_dir", container_dir);
        mount.insert("mode", mode);
        mount.insert("device_type", "shared");
        mount.insert("device", device);
        mount
    }
}

impl<M: std::borrow::Borrow<Mapping>> VolumeMount<M> {
    pub fn driver(&self) -> Result<Option<&str>, Error> {
        self.get_str("driver")
    }

    pub fn container_dir(&self) -> Result<Option<&str>, Error> {
        self.get_str("container_dir")
    }

    pub fn mode(&self) -> Result<Option<&str>, Error> {
        self.get_str("mode")
    }

    pub fn device_type(&self) -> Result<Option<&str>, Error> {
        self.get_str("device_type")
    }

    pub fn device(&self) -> Result<Option<Device<&Mapping>>, Error> {
        field(self, "device")
    }
}

impl Device {
    pub fn with_volume_id(volume_id: &str) -> Self {
        let mut device = Self::new();
        device.insert("volume_id", volume_id);
        device
    }
}

impl<M: std::borrow::Borrow<Mapping>> Device<M> {
    pub fn volume_id(&self) -> Result<Option<&str>, Error> {
        self.get_str("volume_id")
    }

    pub fn mount_config(&self) -> Result<Option<&Mapping>, Error> {
        self.get_mapping("mount_config")
    }
}

#[cfg(test)]
mod tests {
    use super::{BindResponseBody, BindingCredentials, Device, FetchBindingResponseBody, VolumeMount};
    use crate::json::{self, ObjectKind};

    #[test]
    fn volume_mounts_bind_through_fetch_response() {
        let mut body = FetchBindingResponseBody::new();
        let mut credentials = BindingCredentials::new();
        credentials.set("user", "u").set("port", 5432);
        body.set_credentials(credentials).set_volume_mounts([VolumeMount::new_shared(
            "nfs",
            "/data",
            "rw",
            Device::with_volume_id("vol-1"),
        )]);

        let text = json::mapping_to_string(&body);
        let parsed = json::parse_str(&text, ObjectKind::FetchBindingResponse).expect("parse");
        let parsed = FetchBindingResponseBody::try_from(parsed).expect("kind");
        let mounts = parsed.volume_mounts().expect("mounts");
        assert_eq!(mounts.len(), 1);
        let device = mounts[0].device().expect("device").expect("present");
        assert_eq!(device.volume_id().expect("id"), Some("vol-1"));
        let credentials = parsed.credentials().expect("creds").expect("present");
        assert_eq!(credentials.get_i64("port").expect("port"), Some(5432));
    }

    #[test]
    fn credentials_of_wrong_kind_fail_loudly() {
        let mut body = BindResponseBody::new();
        body.insert("credentials", json::Mapping::generic());
        assert!(body.credentials().is_err());
    }
}
