//! Purpose: End-to-end dispatch scenarios through `Broker::process` with an in-process handler.
//! Exports: Integration tests only.
//! Role: Pin the wire contract: status codes, envelopes, typed request contents.
//! Invariants: No network; every request is an `InboundRequest` built in memory.

use brokerkit::api::{
    BindRequest, BindResponse, Broker, BrokerHandler, CatalogRequest, CatalogResponse,
    Credentials, DeprovisionRequest, DeprovisionResponse, Error, ErrorLog, FailureStage,
    InboundRequest, InstanceLastOperationRequest, InstanceLastOperationResponse, Operation,
    OutgoingResponse, ProtocolVersion, ProvisionRequest, ProvisionResponse, UnbindRequest,
    UnbindResponse, UpdateInstanceRequest, UpdateInstanceResponse,
};
use brokerkit::model::{
    BindResponseBody, BindingCredentials, CatalogBody, LastOperationBody, OperationState, Plan,
    ProvisionResponseBody, Service, UpdateResponseBody,
};
use serde_json::Value;
use std::sync::{Arc, Mutex};

type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

const USER: &str = "broker";
const PASS: &str = "hunter2";

#[derive(Default)]
struct Seen {
    provision: Option<(String, Option<String>, bool)>,
    last_operation: Option<(String, Option<String>, Option<String>)>,
    deprovision: Option<(String, String)>,
    identity: Option<(String, String)>,
}

#[derive(Default)]
struct Scripted {
    seen: Mutex<Seen>,
}

impl Scripted {
    fn seen(&self) -> std::sync::MutexGuard<'_, Seen> {
        self.seen.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

impl BrokerHandler for Scripted {
    fn authenticate(&self, credentials: &Credentials) -> Result<(), Error> {
        if credentials.matches_basic(USER, PASS) {
            Ok(())
        } else {
            Err(Error::unauthorized())
        }
    }

    fn catalog(&self, _request: CatalogRequest) -> Result<CatalogResponse, Error> {
        let mut plan = Plan::with_identity("plan-1", "basic", "The basic plan");
        plan.set_free(true);
        let mut service = Service::with_identity("svc-1", "widgets", "Widgets as a service");
        service.set_bindable(true).set_plans([plan]);
        let mut catalog = CatalogBody::new();
        catalog.set_services([service]);
        Ok(CatalogResponse::new(catalog))
    }

    fn provision(&self, request: ProvisionRequest) -> Result<ProvisionResponse, Error> {
        let plan = request.body.plan_id()?.map(str::to_string);
        let mut seen = self.seen();
        seen.provision = Some((
            request.instance_id.clone(),
            plan,
            request.info.accepts_incomplete,
        ));
        if let Some(identity) = &request.info.originating_identity {
            seen.identity = Some((identity.platform().to_string(), identity.value().to_string()));
        }
        let mut body = ProvisionResponseBody::new();
        body.set_dashboard_url(format!("https://dash.example/{}", request.instance_id))
            .set_operation("create-1");
        if request.info.accepts_incomplete {
            return Ok(ProvisionResponse::accepted(body));
        }
        Ok(ProvisionResponse::created(body))
    }

    fn update_instance(&self, request: UpdateInstanceRequest) -> Result<UpdateInstanceResponse, Error> {
        if !request.info.accepts_incomplete {
            return Err(Error::async_required());
        }
        Ok(UpdateInstanceResponse::ok(UpdateResponseBody::new()))
    }

    fn deprovision(&self, request: DeprovisionRequest) -> Result<DeprovisionResponse, Error> {
        self.seen().deprovision = Some((request.service_id, request.plan_id));
        Ok(DeprovisionResponse::ok())
    }

    fn instance_last_operation(
        &self,
        request: InstanceLastOperationRequest,
    ) -> Result<InstanceLastOperationResponse, Error> {
        self.seen().last_operation = Some((request.instance_id, request.operation, request.service_id));
        Ok(InstanceLastOperationResponse::new(LastOperationBody::with_state(
            OperationState::InProgress,
        )))
    }

    fn bind(&self, request: BindRequest) -> Result<BindResponse, Error> {
        if request.binding_id == "taken" {
            return Err(Error::conflict("binding exists"));
        }
        if request.binding_id == "odd" {
            return Err(Error::business(200, "Weird", "not an error status"));
        }
        let mut credentials = BindingCredentials::new();
        credentials.set("password", "p/w");
        let mut body = BindResponseBody::new();
        body.set_credentials(credentials);
        Ok(BindResponse::created(body))
    }

    fn unbind(&self, _request: UnbindRequest) -> Result<UnbindResponse, Error> {
        Err(Error::unprocessable("ConcurrencyError", "busy"))
    }
}

#[derive(Clone, Default)]
struct Collected(Arc<Mutex<Vec<(FailureStage, Option<Operation>, String)>>>);

impl ErrorLog for Collected {
    fn log(&self, stage: FailureStage, operation: Option<Operation>, err: &Error) {
        if let Ok(mut entries) = self.0.lock() {
            entries.push((stage, operation, err.to_string()));
        }
    }
}

fn authorized(request: InboundRequest, version: &str) -> InboundRequest {
    let header = Credentials::basic(USER, PASS).to_header().unwrap_or_default();
    request
        .with_header("X-Broker-API-Version", version)
        .with_header("Authorization", header)
}

fn send(broker: &Broker, handler: &Scripted, request: InboundRequest) -> OutgoingResponse {
    let mut request = authorized(request, "2.14");
    broker.process(&mut request, handler)
}

fn body_json(response: &OutgoingResponse) -> TestResult<Value> {
    Ok(serde_json::from_slice(&response.body)?)
}

const PROVISION: &str = r#"{
    "service_id": "svc-1",
    "plan_id": "plan-1",
    "organization_guid": "org",
    "space_guid": "space",
    "parameters": {"size": 3, "ratio": 0.25}
}"#;

#[test]
fn provision_reaches_handler_with_typed_request() -> TestResult<()> {
    let broker = Broker::new();
    let handler = Scripted::default();
    let response = send(
        &broker,
        &handler,
        InboundRequest::put("/v2/service_instances/abc-123").with_json(PROVISION),
    );

    assert_eq!(response.status, 201);
    assert_eq!(response.content_type(), "application/json");
    let body = body_json(&response)?;
    assert_eq!(body["dashboard_url"], "https://dash.example/abc-123");
    assert_eq!(body["operation"], "create-1");
    assert_eq!(
        handler.seen().provision,
        Some(("abc-123".to_string(), Some("plan-1".to_string()), false))
    );
    Ok(())
}

#[test]
fn accepts_incomplete_selects_async_response() -> TestResult<()> {
    let broker = Broker::new();
    let handler = Scripted::default();
    let response = send(
        &broker,
        &handler,
        InboundRequest::put("/v2/service_instances/abc?accepts_incomplete=true").with_json(PROVISION),
    );
    assert_eq!(response.status, 202);
    assert_eq!(handler.seen().provision.as_ref().map(|seen| seen.2), Some(true));

    let response = send(
        &broker,
        &handler,
        InboundRequest::put("/v2/service_instances/abc?accepts_incomplete=TRUE").with_json(PROVISION),
    );
    assert_eq!(response.status, 201);
    Ok(())
}

#[test]
fn old_version_is_rejected_with_412() -> TestResult<()> {
    let broker = Broker::new();
    let handler = Scripted::default();
    let mut request = authorized(
        InboundRequest::put("/v2/service_instances/abc").with_json(PROVISION),
        "1.5",
    );
    let response = broker.process(&mut request, &handler);

    assert_eq!(response.status, 412);
    let body = body_json(&response)?;
    assert_eq!(body["error"], "InvalidBrokerAPIVersion");
    assert!(body["description"].is_string());
    assert_eq!(body.as_object().map(|object| object.len()), Some(2));
    assert!(handler.seen().provision.is_none());
    Ok(())
}

#[test]
fn missing_version_header_is_rejected() -> TestResult<()> {
    let broker = Broker::new();
    let handler = Scripted::default();
    let mut request = InboundRequest::get("/v2/catalog");
    let response = broker.process(&mut request, &handler);
    assert_eq!(response.status, 412);
    Ok(())
}

#[test]
fn malformed_body_is_bad_request() -> TestResult<()> {
    let broker = Broker::new();
    let handler = Scripted::default();
    let response = send(
        &broker,
        &handler,
        InboundRequest::put("/v2/service_instances/abc").with_json("not json"),
    );
    assert_eq!(response.status, 400);
    assert_eq!(body_json(&response)?["error"], "BadRequest");
    Ok(())
}

#[test]
fn invalid_body_names_the_missing_field() -> TestResult<()> {
    let broker = Broker::new();
    let handler = Scripted::default();
    let response = send(
        &broker,
        &handler,
        InboundRequest::put("/v2/service_instances/abc").with_json(r#"{"service_id": "svc-1"}"#),
    );
    assert_eq!(response.status, 400);
    let description = body_json(&response)?["description"].as_str().unwrap_or_default().to_string();
    assert!(description.contains("plan_id"), "{description}");
    Ok(())
}

#[test]
fn wrong_content_type_is_bad_request() -> TestResult<()> {
    let broker = Broker::new();
    let handler = Scripted::default();
    let response = send(
        &broker,
        &handler,
        InboundRequest::put("/v2/service_instances/abc")
            .with_header("Content-Type", "text/plain")
            .with_body(PROVISION),
    );
    assert_eq!(response.status, 400);
    assert!(handler.seen().provision.is_none());
    Ok(())
}

#[test]
fn last_operation_carries_query_and_state_string() -> TestResult<()> {
    let broker = Broker::new();
    let handler = Scripted::default();
    let response = send(
        &broker,
        &handler,
        InboundRequest::get(
            "/v2/service_instances/abc/last_operation?operation=task%2042+b&service_id=svc-1",
        ),
    );
    assert_eq!(response.status, 200);
    assert_eq!(response.body_text(), r#"{"state":"in progress"}"#);
    assert_eq!(
        handler.seen().last_operation,
        Some((
            "abc".to_string(),
            Some("task 42 b".to_string()),
            Some("svc-1".to_string())
        ))
    );
    Ok(())
}

#[test]
fn deprovision_requires_service_and_plan() -> TestResult<()> {
    let broker = Broker::new();
    let handler = Scripted::default();
    let response = send(
        &broker,
        &handler,
        InboundRequest::delete("/v2/service_instances/abc?service_id=svc-1"),
    );
    assert_eq!(response.status, 400);
    assert!(response.body_text().contains("plan_id"));

    let response = send(
        &broker,
        &handler,
        InboundRequest::delete("/v2/service_instances/abc?service_id=svc-1&plan_id=plan-1"),
    );
    assert_eq!(response.status, 200);
    assert_eq!(response.body_text(), "{}");
    assert_eq!(
        handler.seen().deprovision,
        Some(("svc-1".to_string(), "plan-1".to_string()))
    );
    Ok(())
}

#[test]
fn every_route_shape_dispatches_or_rejects() -> TestResult<()> {
    let broker = Broker::new();
    let handler = Scripted::default();
    let bind_body = r#"{"service_id": "svc-1", "plan_id": "plan-1"}"#;
    let update_body = r#"{"service_id": "svc-1"}"#;
    let cases: [(InboundRequest, u16); 10] = [
        (InboundRequest::get("/v2/catalog"), 200),
        (InboundRequest::put("/v2/service_instances/i").with_json(PROVISION), 201),
        // Handlers that do not override a fetch or poll report it as unsupported.
        (InboundRequest::get("/v2/service_instances/i"), 400),
        (
            InboundRequest::patch("/v2/service_instances/i?accepts_incomplete=true").with_json(update_body),
            200,
        ),
        (InboundRequest::delete("/v2/service_instances/i?service_id=s&plan_id=p"), 200),
        (InboundRequest::get("/v2/service_instances/i/last_operation"), 200),
        (
            InboundRequest::put("/v2/service_instances/i/service_bindings/b").with_json(bind_body),
            201,
        ),
        (InboundRequest::get("/v2/service_instances/i/service_bindings/b"), 400),
        (
            InboundRequest::delete("/v2/service_instances/i/service_bindings/b?service_id=s&plan_id=p"),
            422,
        ),
        (
            InboundRequest::get("/v2/service_instances/i/service_bindings/b/last_operation"),
            400,
        ),
    ];
    for (request, status) in cases {
        let response = send(&broker, &handler, request);
        assert_eq!(response.status, status, "{}", response.body_text());
    }

    for target in [
        "/v2/catalogs",
        "/v2/service_instances",
        "/v3/catalog",
        "/v2/service_instances/i/bindings/b",
        "/v2/service_instances//service_bindings/b",
    ] {
        let response = send(&broker, &handler, InboundRequest::get(target));
        assert_eq!(response.status, 400, "{target}");
        assert_eq!(body_json(&response)?["error"], "InvalidPath", "{target}");
    }
    let response = send(&broker, &handler, InboundRequest::new("POST", "/v2/service_instances/i"));
    assert_eq!(body_json(&response)?["error"], "InvalidPath");
    Ok(())
}

#[test]
fn business_errors_keep_their_status_and_code() -> TestResult<()> {
    let log = Collected::default();
    let broker = Broker::new().with_error_log(log.clone());
    let handler = Scripted::default();
    let bind_body = r#"{"service_id": "svc-1", "plan_id": "plan-1"}"#;

    let response = send(
        &broker,
        &handler,
        InboundRequest::put("/v2/service_instances/i/service_bindings/taken").with_json(bind_body),
    );
    assert_eq!(response.status, 409);
    assert_eq!(body_json(&response)?["error"], "Conflict");

    let response = send(
        &broker,
        &handler,
        InboundRequest::patch("/v2/service_instances/i").with_json(r#"{"service_id": "svc-1"}"#),
    );
    assert_eq!(response.status, 422);
    assert_eq!(body_json(&response)?["error"], "AsyncRequired");
    assert!(log.0.lock().map(|entries| entries.is_empty()).unwrap_or(false));

    let response = send(
        &broker,
        &handler,
        InboundRequest::put("/v2/service_instances/i/service_bindings/odd").with_json(bind_body),
    );
    assert_eq!(response.status, 500);
    let entries = log.0.lock().map(|entries| entries.len()).unwrap_or(0);
    assert_eq!(entries, 1);
    Ok(())
}

#[test]
fn credentials_escape_slashes_on_the_wire() -> TestResult<()> {
    let broker = Broker::new();
    let handler = Scripted::default();
    let response = send(
        &broker,
        &handler,
        InboundRequest::put("/v2/service_instances/i/service_bindings/b")
            .with_json(r#"{"service_id": "svc-1", "plan_id": "plan-1"}"#),
    );
    assert_eq!(response.body_text(), r#"{"credentials":{"password":"p\/w"}}"#);
    assert_eq!(body_json(&response)?["credentials"]["password"], "p/w");
    Ok(())
}

#[test]
fn catalog_is_serialized_from_typed_model() -> TestResult<()> {
    let broker = Broker::new();
    let handler = Scripted::default();
    let response = send(&broker, &handler, InboundRequest::get("/v2/catalog"));
    let body = body_json(&response)?;
    assert_eq!(body["services"][0]["name"], "widgets");
    assert_eq!(body["services"][0]["bindable"], true);
    assert_eq!(body["services"][0]["plans"][0]["free"], true);
    Ok(())
}

#[test]
fn originating_identity_is_decoded() -> TestResult<()> {
    let broker = Broker::new();
    let handler = Scripted::default();
    let response = send(
        &broker,
        &handler,
        InboundRequest::put("/v2/service_instances/abc")
            .with_header(
                "X-Broker-API-Originating-Identity",
                "cloudfoundry eyJ1c2VyX2lkIjogIjY4M2VhNzQ4In0=",
            )
            .with_json(PROVISION),
    );
    assert_eq!(response.status, 201);
    let seen = handler.seen();
    let (platform, value) = seen.identity.as_ref().ok_or("identity missing")?;
    assert_eq!(platform, "cloudfoundry");
    assert!(value.contains("683ea748"));
    drop(seen);

    let response = send(
        &broker,
        &handler,
        InboundRequest::put("/v2/service_instances/abc")
            .with_header("X-Broker-API-Originating-Identity", "cloudfoundry !!!")
            .with_json(PROVISION),
    );
    assert_eq!(response.status, 400);
    Ok(())
}

#[test]
fn unauthenticated_requests_never_reach_handler() -> TestResult<()> {
    let broker = Broker::new();
    let handler = Scripted::default();
    let mut request = InboundRequest::put("/v2/service_instances/abc")
        .with_header("X-Broker-API-Version", "2.14")
        .with_header("Authorization", "Bearer nope")
        .with_json(PROVISION);
    let response = broker.process(&mut request, &handler);
    assert_eq!(response.status, 401);
    assert_eq!(body_json(&response)?["error"], "Unauthorized");
    assert!(handler.seen().provision.is_none());
    Ok(())
}

#[test]
fn minimum_version_can_be_raised_at_runtime() -> TestResult<()> {
    let broker = Broker::new();
    let handler = Scripted::default();
    assert_eq!(send(&broker, &handler, InboundRequest::get("/v2/catalog")).status, 200);
    broker.set_min_version(ProtocolVersion::new(2, 15));
    assert_eq!(send(&broker, &handler, InboundRequest::get("/v2/catalog")).status, 412);
    Ok(())
}
