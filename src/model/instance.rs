//! Service instance request and response bodies.
use crate::core::error::Error;
use crate::json::Mapping;
use crate::model::context::PlatformContext;
use crate::model::{MaintenanceInfo, OperationState, field};

bound_type!(
    /// Body of `PUT /v2/service_instances/{id}`.
    ProvisionRequestBody => ProvisionRequest
);
bound_type!(
    /// Body of `PATCH /v2/service_instances/{id}`.
    UpdateRequestBody => UpdateRequest
);
bound_type!(PreviousValues => PreviousValues);
bound_type!(
    /// Free-form configuration parameters supplied by the platform user.
    Parameters => Parameters
);
bound_type!(ProvisionResponseBody => ProvisionResponse);
bound_type!(UpdateResponseBody => UpdateResponse);
bound_type!(DeprovisionResponseBody => DeprovisionResponse);
bound_type!(FetchInstanceResponseBody => FetchInstanceResponse);
bound_type!(
    /// Body of both last-operation polls.
    LastOperationBody => LastOperation
);

impl<M: std::borrow::Borrow<Mapping>> ProvisionRequestBody<M> {
    pub fn service_id(&self) -> Result<Option<&str>, Error> {
        self.get_str("service_id")
    }

    pub fn plan_id(&self) -> Result<Option<&str>, Error> {
        self.get_str("plan_id")
    }

    pub fn organization_guid(&self) -> Result<Option<&str>, Error> {
        self.get_str("organization_guid")
    }

    pub fn space_guid(&self) -> Result<Option<&str>, Error> {
        self.get_str("space_guid")
    }

    pub fn context(&self) -> Result<Option<PlatformContext<'_>>, Error> {
        PlatformContext::read(self, "context")
    }

    pub fn parameters(&self) -> Result<Option<Parameters<&Mapping>>, Error> {
        field(self, "parameters")
    }

    pub fn maintenance_info(&self) -> Result<Option<MaintenanceInfo<&Mapping>>, Error> {
        field(self, "maintenance_info")
    }
}

impl ProvisionRequestBody {
    pub fn with_ids(service_id: &str, plan_id: &str, organization_guid: &str, space_guid: &str) -> Self {
        let mut body = Self::new();
        body.insert("service_id", service_id);
        body.insert("plan_id", plan_id);
        body.insert("organization_guid", organization_guid);
        body.insert("space_guid", space_guid);
        body
    }
}

impl<M: std::borrow::Borrow<Mapping>> UpdateRequestBody<M> {
    pub fn service_id(&self) -> Result<Option<&str>, Error> {
        self.get_str("service_id")
    }

    pub fn plan_id(&self) -> Result<Option<&str>, Error> {
        self.get_str("plan_id")
    }

    pub fn context(&self) -> Result<Option<PlatformContext<'_>>, Error> {
        PlatformContext::read(self, "context")
    }

    pub fn parameters(&self) -> Result<Option<Parameters<&Mapping>>, Error> {
        field(self, "parameters")
    }

    pub fn previous_values(&self) -> Result<Option<PreviousValues<&Mapping>>, Error> {
        field(self, "previous_values")
    }

    pub fn maintenance_info(&self) -> Result<Option<MaintenanceInfo<&Mapping>>, Error> {
        field(self, "maintenance_info")
    }
}

impl<M: std::borrow::Borrow<Mapping>> PreviousValues<M> {
    pub fn service_id(&self) -> Result<Option<&str>, Error> {
        self.get_str("service_id")
    }

    pub fn plan_id(&self) -> Result<Option<&str>, Error> {
        self.get_str("plan_id")
    }

    pub fn organization_id(&self) -> Result<Option<&str>, Error> {
        self.get_str("organization_id")
    }

    pub fn space_id(&self) -> Result<Option<&str>, Error> {
        self.get_str("space_id")
    }
}

impl ProvisionResponseBody {
    pub fn set_dashboard_url(&mut self, url: impl Into<String>) -> &mut Self {
        self.insert("dashboard_url", url.into());
        self
    }

    pub fn set_operation(&mut self, operation: impl Into<String>) -> &mut Self {
        self.insert("operation", operation.into());
        self
    }
}

impl<M: std::borrow::Borrow<Mapping>> ProvisionResponseBody<M> {
    pub fn dashboard_url(&self) -> Result<Option<&str>, Error> {
        self.get_str("dashboard_url")
    }

    pub fn operation(&self) -> Result<Option<&str>, Error> {
        self.get_str("operation")
    }
}

impl UpdateResponseBody {
    pub fn set_dashboard_url(&mut self, url: impl Into<String>) -> &mut Self {
        self.insert("dashboard_url", url.into());
        self
    }

    pub fn set_operation(&mut self, operation: impl Into<String>) -> &mut Self {
        self.insert("operation", operation.into());
        self
    }
}

impl DeprovisionResponseBody {
    pub fn set_operation(&mut self, operation: impl Into<String>) -> &mut Self {
        self.insert("operation", operation.into());
        self
    }
}

impl FetchInstanceResponseBody {
    pub fn set_service_id(&mut self, service_id: impl Into<String>) -> &mut Self {
        self.insert("service_id", service_id.into());
        self
    }

    pub fn set_plan_id(&mut self, plan_id: impl Into<String>) -> &mut Self {
        self.insert("plan_id", plan_id.into());
        self
    }

    pub fn set_dashboard_url(&mut self, url: impl Into<String>) -> &mut Self {
        self.insert("dashboard_url", url.into());
        self
    }

    /// Stores a copy of `parameters`, re-tagged as this body's parameters object.
    pub fn set_parameters(&mut self, parameters: &Mapping) -> &mut Self {
        let copy = parameters.clone().into_kind(crate::json::ObjectKind::Parameters);
        self.insert("parameters", copy);
        self
    }
}

impl<M: std::borrow::Borrow<Mapping>> FetchInstanceResponseBody<M> {
    pub fn service_id(&self) -> Result<Option<&str>, Error> {
        self.get_str("service_id")
    }

    pub fn plan_id(&self) -> Result<Option<&str>, Error> {
        self.get_str("plan_id")
    }

    pub fn parameters(&self) -> Result<Option<Parameters<&Mapping>>, Error> {
        field(self, "parameters")
    }
}

impl LastOperationBody {
    pub fn with_state(state: OperationState) -> Self {
        let mut body = Self::new();
        body.insert("state", state.as_str());
        body
    }

    pub fn set_description(&mut self, description: impl Into<String>) -> &mut Self {
        self.insert("description", description.into());
        self
    }

    /// Only meaningful for instance polls after a failed update or deprovision.
    pub fn set_instance_usable(&mut self, usable: bool) -> &mut Self {
        self.insert("instance_usable", usable);
        self
    }
}

impl<M: std::borrow::Borrow<Mapping>> LastOperationBody<M> {
    pub fn state(&self) -> Result<Option<OperationState>, Error> {
        self.get_str("state")?.map(str::parse).transpose()
    }

    pub fn description(&self) -> Result<Option<&str>, Error> {
        self.get_str("description")
    }
}

#[cfg(test)]
mod tests {
    use super::{LastOperationBody, ProvisionRequestBody};
    use crate::json::{self, ObjectKind};
    use crate::model::{OperationState, PlatformContext};

    #[test]
    fn provision_body_exposes_typed_fields() {
        let text = r#"{
            "service_id": "svc", "plan_id": "plan",
            "organization_guid": "org", "space_guid": "space",
            "context": {"platform": "cloudfoundry", "space_guid": "space"},
            "parameters": {"size": 3}
        }"#;
        let body = json::parse_str(text, ObjectKind::ProvisionRequest).expect("parse");
        let body = ProvisionRequestBody::try_from(body).expect("kind");
        assert_eq!(body.service_id().expect("id"), Some("svc"));
        let parameters = body.parameters().expect("params").expect("present");
        assert_eq!(parameters.get_i64("size").expect("int"), Some(3));
        assert!(matches!(body.context().expect("context"), Some(PlatformContext::Other(_))));
    }

    #[test]
    fn last_operation_state_uses_protocol_strings() {
        let body = LastOperationBody::with_state(OperationState::InProgress);
        assert_eq!(json::mapping_to_string(&body), r#"{"state":"in progress"}"#);
        assert_eq!(body.state().expect("state"), Some(OperationState::InProgress));
    }
}
