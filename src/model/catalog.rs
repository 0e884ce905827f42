//! Catalog objects: services, plans and their schemas.
use crate::core::error::Error;
use crate::json::{Mapping, ObjectKind};
use crate::model::{field, items, set_items, set_strings};

bound_type!(
    /// Root of a `GET /v2/catalog` response.
    CatalogBody => Catalog
);
bound_type!(Service => Service);
bound_type!(ServiceMetadata => ServiceMetadata);
bound_type!(DashboardClient => DashboardClient);
bound_type!(Plan => Plan);
bound_type!(PlanMetadata => PlanMetadata);
bound_type!(MaintenanceInfo => MaintenanceInfo);
bound_type!(Schemas => Schemas);
bound_type!(ServiceInstanceSchema => ServiceInstanceSchema);
bound_type!(ServiceBindingSchema => ServiceBindingSchema);
bound_type!(Schema => Schema);
bound_type!(
    /// A JSON schema document; only `$schema` is checked.
    SchemaParameters => SchemaParameters
);

impl<M: std::borrow::Borrow<Mapping>> CatalogBody<M> {
    pub fn services(&self) -> Result<Vec<Service<&Mapping>>, Error> {
        Ok(items(self, "services")?.unwrap_or_default())
    }

    pub fn find_service(&self, service_id: &str) -> Result<Option<Service<&Mapping>>, Error> {
        for service in self.services()? {
            if service.id()? == Some(service_id) {
                return Ok(Some(service));
            }
        }
        Ok(None)
    }

    /// The plan `plan_id` of service `service_id`, if both exist.
    pub fn find_plan(&self, service_id: &str, plan_id: &str) -> Result<Option<Plan<&Mapping>>, Error> {
        let Some(service) = self.find_service(service_id)? else {
            return Ok(None);
        };
        // Views borrow the catalog, not the local service view.
        let plans: Vec<Plan<&Mapping>> = items(service.0, "plans")?.unwrap_or_default();
        for plan in plans {
            if plan.id()? == Some(plan_id) {
                return Ok(Some(plan));
            }
        }
        Ok(None)
    }
}

impl CatalogBody {
    pub fn set_services(&mut self, services: impl IntoIterator<Item = Service>) -> &mut Self {
        set_items(self, "services", ObjectKind::Service, services);
        self
    }
}

impl<M: std::borrow::Borrow<Mapping>> Service<M> {
    pub fn id(&self) -> Result<Option<&str>, Error> {
        self.get_str("id")
    }

    pub fn name(&self) -> Result<Option<&str>, Error> {
        self.get_str("name")
    }

    pub fn description(&self) -> Result<Option<&str>, Error> {
        self.get_str("description")
    }

    pub fn tags(&self) -> Result<Vec<&str>, Error> {
        Ok(self.get_str_items("tags")?.unwrap_or_default())
    }

    pub fn requires(&self) -> Result<Vec<&str>, Error> {
        Ok(self.get_str_items("requires")?.unwrap_or_default())
    }

    pub fn bindable(&self) -> Result<Option<bool>, Error> {
        self.get_bool("bindable")
    }

    pub fn instances_retrievable(&self) -> Result<bool, Error> {
        Ok(self.get_bool("instances_retrievable")?.unwrap_or(false))
    }

    pub fn bindings_retrievable(&self) -> Result<bool, Error> {
        Ok(self.get_bool("bindings_retrievable")?.unwrap_or(false))
    }

    pub fn plan_updateable(&self) -> Result<bool, Error> {
        Ok(self.get_bool("plan_updateable")?.unwrap_or(false))
    }

    pub fn metadata(&self) -> Result<Option<ServiceMetadata<&Mapping>>, Error> {
        field(self, "metadata")
    }

    pub fn dashboard_client(&self) -> Result<Option<DashboardClient<&Mapping>>, Error> {
        field(self, "dashboard_client")
    }

    pub fn plans(&self) -> Result<Vec<Plan<&Mapping>>, Error> {
        Ok(items(self, "plans")?.unwrap_or_default())
    }
}

impl Service {
    pub fn with_identity(id: &str, name: &str, description: &str) -> Self {
        let mut service = Self::new();
        service.insert("id", id);
        service.insert("name", name);
        service.insert("description", description);
        service
    }

    pub fn set_bindable(&mut self, bindable: bool) -> &mut Self {
        self.insert("bindable", bindable);
        self
    }

    pub fn set_plan_updateable(&mut self, updateable: bool) -> &mut Self {
        self.insert("plan_updateable", updateable);
        self
    }

    pub fn set_tags<S: Into<String>>(&mut self, tags: impl IntoIterator<Item = S>) -> &mut Self {
        set_strings(self, "tags", tags);
        self
    }

    pub fn set_metadata(&mut self, metadata: ServiceMetadata) -> &mut Self {
        self.insert("metadata", metadata);
        self
    }

    pub fn set_plans(&mut self, plans: impl IntoIterator<Item = Plan>) -> &mut Self {
        set_items(self, "plans", ObjectKind::Plan, plans);
        self
    }
}

impl<M: std::borrow::Borrow<Mapping>> DashboardClient<M> {
    pub fn id(&self) -> Result<Option<&str>, Error> {
        self.get_str("id")
    }

    pub fn secret(&self) -> Result<Option<&str>, Error> {
        self.get_str("secret")
    }

    pub fn redirect_uri(&self) -> Result<Option<&str>, Error> {
        self.get_str("redirect_uri")
    }
}

impl<M: std::borrow::Borrow<Mapping>> Plan<M> {
    pub fn id(&self) -> Result<Option<&str>, Error> {
        self.get_str("id")
    }

    pub fn name(&self) -> Result<Option<&str>, Error> {
        self.get_str("name")
    }

    pub fn description(&self) -> Result<Option<&str>, Error> {
        self.get_str("description")
    }

    /// Plans are free unless they say otherwise.
    pub fn free(&self) -> Result<bool, Error> {
        Ok(self.get_bool("free")?.unwrap_or(true))
    }

    pub fn bindable(&self) -> Result<Option<bool>, Error> {
        self.get_bool("bindable")
    }

    pub fn plan_updateable(&self) -> Result<Option<bool>, Error> {
        self.get_bool("plan_updateable")
    }

    pub fn maximum_polling_duration(&self) -> Result<Option<i64>, Error> {
        self.get_i64("maximum_polling_duration")
    }

    pub fn metadata(&self) -> Result<Option<PlanMetadata<&Mapping>>, Error> {
        field(self, "metadata")
    }

    pub fn schemas(&self) -> Result<Option<Schemas<&Mapping>>, Error> {
        field(self, "schemas")
    }

    pub fn maintenance_info(&self) -> Result<Option<MaintenanceInfo<&Mapping>>, Error> {
        field(self, "maintenance_info")
    }
}

impl Plan {
    pub fn with_identity(id: &str, name: &str, description: &str) -> Self {
        let mut plan = Self::new();
        plan.insert("id", id);
        plan.insert("name", name);
        plan.insert("description", description);
        plan
    }

    pub fn set_free(&mut self, free: bool) -> &mut Self {
        self.insert("free", free);
        self
    }

    pub fn set_metadata(&mut self, metadata: PlanMetadata) -> &mut Self {
        self.insert("metadata", metadata);
        self
    }

    pub fn set_schemas(&mut self, schemas: Schemas) -> &mut Self {
        self.insert("schemas", schemas);
        self
    }
}

impl<M: std::borrow::Borrow<Mapping>> MaintenanceInfo<M> {
    pub fn version(&self) -> Result<Option<&str>, Error> {
        self.get_str("version")
    }
}

impl<M: std::borrow::Borrow<Mapping>> Schemas<M> {
    pub fn service_instance(&self) -> Result<Option<ServiceInstanceSchema<&Mapping>>, Error> {
        field(self, "service_instance")
    }

    pub fn service_binding(&self) -> Result<Option<ServiceBindingSchema<&Mapping>>, Error> {
        field(self, "service_binding")
    }
}

impl<M: std::borrow::Borrow<Mapping>> ServiceInstanceSchema<M> {
    pub fn create(&self) -> Result<Option<Schema<&Mapping>>, Error> {
        field(self, "create")
    }

    pub fn update(&self) -> Result<Option<Schema<&Mapping>>, Error> {
        field(self, "update")
    }
}

impl<M: std::borrow::Borrow<Mapping>> ServiceBindingSchema<M> {
    pub fn create(&self) -> Result<Option<Schema<&Mapping>>, Error> {
        field(self, "create")
    }
}

impl<M: std::borrow::Borrow<Mapping>> Schema<M> {
    pub fn parameters(&self) -> Result<Option<SchemaParameters<&Mapping>>, Error> {
        field(self, "parameters")
    }
}

impl<M: std::borrow::Borrow<Mapping>> SchemaParameters<M> {
    pub fn schema_uri(&self) -> Result<Option<&str>, Error> {
        self.get_str("$schema")
    }
}
