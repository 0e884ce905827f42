//! Purpose: In-memory example broker served by `brokerkit serve`.
//! Exports: `DemoBroker`, `load_catalog`.
//! Role: Exercises every operation end to end; state lives only for the process lifetime.
//! Invariants: Every instance references a service and plan from the embedded catalog.
//! Invariants: Re-sending an identical provision or bind is answered with 200, a different one with 409.
//! Notes: With an async delay, provision, update and deprovision answer 202 and finish once the
//! delay has passed; a finished deprovision removes the instance, so polls then see 410.
use std::collections::HashMap;
use std::collections::hash_map::RandomState;
use std::hash::BuildHasher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use brokerkit::api::{
    BindRequest, BindResponse, BindingLastOperationRequest, BindingLastOperationResponse,
    BrokerHandler, CatalogRequest, CatalogResponse, Credentials, DeprovisionRequest,
    DeprovisionResponse, Error, ErrorKind, FetchBindingRequest, FetchBindingResponse,
    FetchInstanceRequest, FetchInstanceResponse, InstanceLastOperationRequest,
    InstanceLastOperationResponse, ProvisionRequest, ProvisionResponse, UnbindRequest,
    UnbindResponse, UpdateInstanceRequest, UpdateInstanceResponse,
};
use brokerkit::json::{self, Mapping, ObjectKind};
use brokerkit::model::{
    BindResponseBody, BindingCredentials, CatalogBody, DeprovisionResponseBody, FetchBindingResponseBody,
    FetchInstanceResponseBody, LastOperationBody, OperationState, ProvisionResponseBody,
    UpdateResponseBody, validate,
};

const CATALOG_JSON: &str = include_str!("catalog.json");
const DASHBOARD_BASE: &str = "https://dashboard.example.com/instances";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum PendingKind {
    Provision,
    Update,
    Deprovision,
}

impl PendingKind {
    fn as_str(self) -> &'static str {
        match self {
            PendingKind::Provision => "provision",
            PendingKind::Update => "update",
            PendingKind::Deprovision => "deprovision",
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Pending {
    kind: PendingKind,
    ready_at: Instant,
}

#[derive(Clone, Debug)]
struct InstanceRecord {
    service_id: String,
    plan_id: String,
    parameters: Option<Mapping>,
    pending: Option<Pending>,
}

impl InstanceRecord {
    fn same_request(&self, other: &InstanceRecord) -> bool {
        self.service_id == other.service_id
            && self.plan_id == other.plan_id
            && self.parameters == other.parameters
    }

    fn in_progress(&self, now: Instant) -> Option<PendingKind> {
        self.pending
            .filter(|pending| now < pending.ready_at)
            .map(|pending| pending.kind)
    }

    /// Bindings may not change while the instance is being created or removed.
    fn blocks_bindings(&self, now: Instant) -> bool {
        matches!(
            self.in_progress(now),
            Some(PendingKind::Provision | PendingKind::Deprovision)
        )
    }
}

#[derive(Clone, Debug)]
struct BindingRecord {
    app_guid: Option<String>,
    parameters: Option<Mapping>,
    credentials: BindingCredentials,
}

#[derive(Default)]
struct State {
    instances: HashMap<String, InstanceRecord>,
    bindings: HashMap<(String, String), BindingRecord>,
}

impl State {
    fn remove_instance(&mut self, instance_id: &str) -> bool {
        let removed = self.instances.remove(instance_id).is_some();
        self.bindings
            .retain(|(bound_to, _), _| bound_to.as_str() != instance_id);
        removed
    }

    /// Drops instances whose deprovisioning has finished.
    fn settle(&mut self, now: Instant) {
        let finished: Vec<String> = self
            .instances
            .iter()
            .filter(|(_, record)| {
                record.pending.is_some_and(|pending| {
                    pending.kind == PendingKind::Deprovision && now >= pending.ready_at
                })
            })
            .map(|(instance_id, _)| instance_id.clone())
            .collect();
        for instance_id in finished {
            self.remove_instance(&instance_id);
            tracing::info!(%instance_id, "instance deprovisioned");
        }
    }
}

pub struct DemoBroker {
    username: String,
    password: String,
    catalog: CatalogBody,
    state: Mutex<State>,
    secrets: RandomState,
    issued: AtomicU64,
    async_delay: Option<Duration>,
}

impl DemoBroker {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self, Error> {
        Ok(Self {
            username: username.into(),
            password: password.into(),
            catalog: load_catalog(CATALOG_JSON)?,
            state: Mutex::new(State::default()),
            secrets: RandomState::new(),
            issued: AtomicU64::new(0),
            async_delay: None,
        })
    }

    /// Answers provision, update and deprovision with 202 and completes them after `delay`.
    pub fn with_async_delay(mut self, delay: Duration) -> Self {
        self.async_delay = Some(delay);
        self
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, Error> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| Error::new(ErrorKind::Internal).with_message("demo state lock poisoned"))?;
        state.settle(Instant::now());
        Ok(state)
    }

    /// The pending operation to record, or `None` in synchronous mode.
    fn begin(&self, kind: PendingKind, accepts_incomplete: bool) -> Result<Option<Pending>, Error> {
        let Some(delay) = self.async_delay else {
            return Ok(None);
        };
        if !accepts_incomplete {
            return Err(Error::async_required());
        }
        Ok(Some(Pending {
            kind,
            ready_at: Instant::now() + delay,
        }))
    }

    fn operation_id(&self, kind: PendingKind) -> String {
        let serial = self.issued.fetch_add(1, Ordering::Relaxed);
        format!("{}-{serial}", kind.as_str())
    }

    fn require_plan(&self, service_id: Option<&str>, plan_id: Option<&str>) -> Result<(), Error> {
        let (Some(service_id), Some(plan_id)) = (service_id, plan_id) else {
            return Err(Error::bad_request("Unknown service or plan"));
        };
        match self.catalog.find_plan(service_id, plan_id)? {
            Some(_) => Ok(()),
            None => Err(Error::bad_request("Unknown service or plan")),
        }
    }

    fn issue_secret(&self, binding_id: &str) -> String {
        let serial = self.issued.fetch_add(1, Ordering::Relaxed);
        format!("{:016x}", self.secrets.hash_one((binding_id, serial)))
    }
}

/// Parses and validates a catalog document.
pub fn load_catalog(text: &str) -> Result<CatalogBody, Error> {
    let catalog = CatalogBody::try_from(json::parse_str(text, ObjectKind::Catalog)?)?;
    validate(&catalog)?;
    Ok(catalog)
}

fn dashboard_url(instance_id: &str) -> String {
    format!("{DASHBOARD_BASE}/{instance_id}")
}

fn owned_parameters(parameters: Option<impl std::ops::Deref<Target = Mapping>>) -> Option<Mapping> {
    parameters.map(|parameters| (*parameters).clone())
}

impl BrokerHandler for DemoBroker {
    fn authenticate(&self, credentials: &Credentials) -> Result<(), Error> {
        if credentials.matches_basic(&self.username, &self.password) {
            Ok(())
        } else {
            Err(Error::unauthorized())
        }
    }

    fn catalog(&self, _request: CatalogRequest) -> Result<CatalogResponse, Error> {
        Ok(CatalogResponse::new(self.catalog.clone()))
    }

    fn provision(&self, request: ProvisionRequest) -> Result<ProvisionResponse, Error> {
        let pending = self.begin(PendingKind::Provision, request.info.accepts_incomplete)?;
        let body = &request.body;
        self.require_plan(body.service_id()?, body.plan_id()?)?;
        let record = InstanceRecord {
            service_id: body.service_id()?.unwrap_or_default().to_string(),
            plan_id: body.plan_id()?.unwrap_or_default().to_string(),
            parameters: owned_parameters(body.parameters()?),
            pending,
        };

        let mut response = ProvisionResponseBody::new();
        response.set_dashboard_url(dashboard_url(&request.instance_id));

        let mut state = self.state()?;
        match state.instances.get(&request.instance_id) {
            Some(existing) if existing.same_request(&record) => {
                if existing.in_progress(Instant::now()) == Some(PendingKind::Provision) {
                    Ok(ProvisionResponse::accepted(response))
                } else {
                    Ok(ProvisionResponse::ok(response))
                }
            }
            Some(_) => Err(Error::conflict(
                "Instance already exists with different attributes",
            )),
            None => {
                state.instances.insert(request.instance_id.clone(), record);
                if pending.is_some() {
                    response.set_operation(self.operation_id(PendingKind::Provision));
                    tracing::info!(instance_id = %request.instance_id, "instance provisioning started");
                    return Ok(ProvisionResponse::accepted(response));
                }
                tracing::info!(instance_id = %request.instance_id, "instance provisioned");
                Ok(ProvisionResponse::created(response))
            }
        }
    }

    fn fetch_instance(&self, request: FetchInstanceRequest) -> Result<FetchInstanceResponse, Error> {
        let state = self.state()?;
        let Some(instance) = state.instances.get(&request.instance_id) else {
            return Err(Error::not_found("Unknown instance"));
        };
        let mut body = FetchInstanceResponseBody::new();
        body.set_service_id(instance.service_id.as_str())
            .set_plan_id(instance.plan_id.as_str())
            .set_dashboard_url(dashboard_url(&request.instance_id));
        if let Some(parameters) = &instance.parameters {
            body.set_parameters(parameters);
        }
        Ok(FetchInstanceResponse::new(body))
    }

    fn update_instance(&self, request: UpdateInstanceRequest) -> Result<UpdateInstanceResponse, Error> {
        let pending = self.begin(PendingKind::Update, request.info.accepts_incomplete)?;
        let body = &request.body;
        let mut state = self.state()?;
        let Some(instance) = state.instances.get_mut(&request.instance_id) else {
            return Err(Error::bad_request("Unknown instance"));
        };
        if instance.in_progress(Instant::now()).is_some() {
            return Err(Error::concurrency_error());
        }
        if let Some(plan_id) = body.plan_id()? {
            self.require_plan(Some(instance.service_id.as_str()), Some(plan_id))?;
            instance.plan_id = plan_id.to_string();
        }
        if let Some(parameters) = owned_parameters(body.parameters()?) {
            instance.parameters = Some(parameters);
        }
        instance.pending = pending;

        let mut response = UpdateResponseBody::new();
        if pending.is_some() {
            response.set_operation(self.operation_id(PendingKind::Update));
            tracing::info!(instance_id = %request.instance_id, "instance update started");
            return Ok(UpdateInstanceResponse::accepted(response));
        }
        tracing::info!(instance_id = %request.instance_id, "instance updated");
        Ok(UpdateInstanceResponse::ok(response))
    }

    fn deprovision(&self, request: DeprovisionRequest) -> Result<DeprovisionResponse, Error> {
        let pending = self.begin(PendingKind::Deprovision, request.info.accepts_incomplete)?;
        let mut state = self.state()?;
        let Some(instance) = state.instances.get_mut(&request.instance_id) else {
            return Err(Error::gone("Unknown instance"));
        };
        match instance.in_progress(Instant::now()) {
            Some(PendingKind::Deprovision) => {
                return Ok(DeprovisionResponse::accepted(DeprovisionResponseBody::new()));
            }
            Some(_) => return Err(Error::concurrency_error()),
            None => {}
        }
        if let Some(pending) = pending {
            instance.pending = Some(pending);
            let mut response = DeprovisionResponseBody::new();
            response.set_operation(self.operation_id(PendingKind::Deprovision));
            tracing::info!(instance_id = %request.instance_id, "instance deprovisioning started");
            return Ok(DeprovisionResponse::accepted(response));
        }
        state.remove_instance(&request.instance_id);
        tracing::info!(instance_id = %request.instance_id, "instance deprovisioned");
        Ok(DeprovisionResponse::ok())
    }

    fn instance_last_operation(
        &self,
        request: InstanceLastOperationRequest,
    ) -> Result<InstanceLastOperationResponse, Error> {
        let state = self.state()?;
        let Some(instance) = state.instances.get(&request.instance_id) else {
            return Err(Error::gone("Unknown instance"));
        };
        let progress = match instance.in_progress(Instant::now()) {
            Some(_) => OperationState::InProgress,
            None => OperationState::Succeeded,
        };
        Ok(InstanceLastOperationResponse::new(LastOperationBody::with_state(progress)))
    }

    fn bind(&self, request: BindRequest) -> Result<BindResponse, Error> {
        let body = &request.body;
        let mut state = self.state()?;
        match state.instances.get(&request.instance_id) {
            None => return Err(Error::not_found("Unknown instance")),
            Some(instance) if instance.blocks_bindings(Instant::now()) => {
                return Err(Error::concurrency_error());
            }
            Some(_) => {}
        }
        let app_guid = body.app_guid()?.map(str::to_string);
        let parameters = owned_parameters(body.parameters()?);
        let key = (request.instance_id.clone(), request.binding_id.clone());

        if let Some(existing) = state.bindings.get(&key) {
            if existing.app_guid == app_guid && existing.parameters == parameters {
                let mut response = BindResponseBody::new();
                response.set_credentials(existing.credentials.clone());
                return Ok(BindResponse::ok(response));
            }
            return Err(Error::conflict("Binding already exists with different attributes"));
        }

        let mut credentials = BindingCredentials::new();
        credentials
            .set("username", format!("user-{}", request.binding_id))
            .set("password", self.issue_secret(&request.binding_id))
            .set(
                "uri",
                format!("kv://{}.demo.internal:6379", request.instance_id),
            );
        state.bindings.insert(
            key,
            BindingRecord {
                app_guid,
                parameters,
                credentials: credentials.clone(),
            },
        );
        tracing::info!(
            instance_id = %request.instance_id,
            binding_id = %request.binding_id,
            "binding created"
        );
        let mut response = BindResponseBody::new();
        response.set_credentials(credentials);
        Ok(BindResponse::created(response))
    }

    fn fetch_binding(&self, request: FetchBindingRequest) -> Result<FetchBindingResponse, Error> {
        let state = self.state()?;
        let key = (request.instance_id, request.binding_id);
        let Some(binding) = state.bindings.get(&key) else {
            return Err(Error::not_found("Unknown binding"));
        };
        let mut body = FetchBindingResponseBody::new();
        body.set_credentials(binding.credentials.clone());
        if let Some(parameters) = &binding.parameters {
            body.set_parameters(parameters);
        }
        Ok(FetchBindingResponse::new(body))
    }

    fn unbind(&self, request: UnbindRequest) -> Result<UnbindResponse, Error> {
        let mut state = self.state()?;
        match state.instances.get(&request.instance_id) {
            None => return Err(Error::gone("Unknown instance")),
            Some(instance) if instance.blocks_bindings(Instant::now()) => {
                return Err(Error::concurrency_error());
            }
            Some(_) => {}
        }
        let key = (request.instance_id, request.binding_id);
        if state.bindings.remove(&key).is_none() {
            return Err(Error::gone("Unknown binding"));
        }
        tracing::info!(instance_id = %key.0, binding_id = %key.1, "binding removed");
        Ok(UnbindResponse::ok())
    }

    fn binding_last_operation(
        &self,
        request: BindingLastOperationRequest,
    ) -> Result<BindingLastOperationResponse, Error> {
        let key = (request.instance_id, request.binding_id);
        if !self.state()?.bindings.contains_key(&key) {
            return Err(Error::gone("Unknown binding"));
        }
        Ok(BindingLastOperationResponse::new(LastOperationBody::with_state(
            OperationState::Succeeded,
        )))
    }
}
