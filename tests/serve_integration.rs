//! Purpose: End-to-end tests for `brokerkit serve` over real HTTP.
//! Exports: None (integration test module).
//! Role: Validate the axum adapter, demo broker lifecycle and error envelopes across TCP.
//! Invariants: Uses loopback-only servers on freshly picked ports.
//! Invariants: Bounded waits avoid test flakiness.
//! Invariants: Server processes are cleaned up on drop.

use brokerkit::api::Credentials;
use serde_json::Value;
use std::io::Read;
use std::net::{SocketAddr, TcpListener};
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, MutexGuard};
use std::thread::sleep;
use std::time::{Duration, Instant};

type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

static SERVER_LOCK: Mutex<()> = Mutex::new(());

const USERNAME: &str = "admin";
const PASSWORD: &str = "s3cret";
const SERVICE: &str = "5b0c8f4e-7f1d-4a55-9a7e-1f2d3c4b5a60";
const SMALL: &str = "b3a1f0de-2c44-4e0e-8d0b-6f6a7d9c1e01";

struct TestServer {
    child: Child,
    base_url: String,
    _server_guard: MutexGuard<'static, ()>,
}

struct Reply {
    status: u16,
    content_type: Option<String>,
    body: String,
}

impl Reply {
    fn json(&self) -> TestResult<Value> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

impl TestServer {
    fn start() -> TestResult<Self> {
        Self::start_with_args(&[])
    }

    fn start_with_args(extra: &[&str]) -> TestResult<Self> {
        let guard = SERVER_LOCK
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        let mut last_err: Option<Box<dyn std::error::Error>> = None;
        for _attempt in 0..3 {
            let port = pick_port()?;
            let bind = format!("127.0.0.1:{port}");
            let base_url = format!("http://{bind}");

            let mut child = Command::new(env!("CARGO_BIN_EXE_brokerkit"))
                .arg("serve")
                .arg("--bind")
                .arg(&bind)
                .args(extra)
                .env("BROKERKIT_USERNAME", USERNAME)
                .env("BROKERKIT_PASSWORD", PASSWORD)
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .spawn()?;

            match wait_for_server(&mut child, bind.parse()?) {
                Ok(()) => {
                    return Ok(Self {
                        child,
                        base_url,
                        _server_guard: guard,
                    });
                }
                Err(err) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    last_err = Some(err);
                    sleep(Duration::from_millis(30));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| "server failed to start".into()))
    }

    fn send(&self, method: &str, path: &str, version: &str, body: Option<&str>) -> TestResult<Reply> {
        let auth = Credentials::basic(USERNAME, PASSWORD)
            .to_header()
            .ok_or("missing auth header")?;
        let request = ureq::request(method, &format!("{}{path}", self.base_url))
            .set("X-Broker-API-Version", version)
            .set("Authorization", &auth);
        let result = match body {
            Some(body) => request
                .set("Content-Type", "application/json")
                .send_string(body),
            None => request.call(),
        };
        reply(result)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn reply(result: Result<ureq::Response, ureq::Error>) -> TestResult<Reply> {
    let response = match result {
        Ok(response) => response,
        Err(ureq::Error::Status(_, response)) => response,
        Err(err) => return Err(err.into()),
    };
    let status = response.status();
    let content_type = response.header("Content-Type").map(str::to_string);
    Ok(Reply {
        status,
        content_type,
        body: response.into_string()?,
    })
}

fn provision_body() -> String {
    format!(
        r#"{{"service_id":"{SERVICE}","plan_id":"{SMALL}","organization_guid":"org-1","space_guid":"space-1",
            "context":{{"platform":"cloudfoundry","organization_guid":"org-1","space_guid":"space-1"}}}}"#
    )
}

#[test]
fn catalog_round_trip() -> TestResult<()> {
    let server = TestServer::start()?;
    let reply = server.send("GET", "/v2/catalog", "2.14", None)?;
    assert_eq!(reply.status, 200);
    assert_eq!(reply.content_type.as_deref(), Some("application/json"));
    let catalog = reply.json()?;
    assert_eq!(catalog["services"][0]["name"], "demo-kv");
    assert_eq!(catalog["services"][0]["plans"][0]["id"], SMALL);
    Ok(())
}

#[test]
fn instance_and_binding_lifecycle() -> TestResult<()> {
    let server = TestServer::start()?;
    let instance = "/v2/service_instances/inst-1";
    let binding = "/v2/service_instances/inst-1/service_bindings/bind-1";

    let created = server.send("PUT", instance, "2.14", Some(&provision_body()))?;
    assert_eq!(created.status, 201);
    assert!(
        created.json()?["dashboard_url"]
            .as_str()
            .is_some_and(|url| url.ends_with("/inst-1"))
    );
    assert_eq!(server.send("PUT", instance, "2.14", Some(&provision_body()))?.status, 200);

    let bind_body = format!(r#"{{"service_id":"{SERVICE}","plan_id":"{SMALL}","app_guid":"app-1"}}"#);
    let bound = server.send("PUT", binding, "2.14", Some(&bind_body))?;
    assert_eq!(bound.status, 201);
    assert_eq!(bound.json()?["credentials"]["username"], "user-bind-1");

    let fetched = server.send("GET", binding, "2.14", None)?;
    assert_eq!(fetched.status, 200);
    assert_eq!(fetched.json()?["credentials"], bound.json()?["credentials"]);

    let query = format!("?service_id={SERVICE}&plan_id={SMALL}");
    assert_eq!(server.send("DELETE", &format!("{binding}{query}"), "2.14", None)?.status, 200);
    assert_eq!(server.send("DELETE", &format!("{instance}{query}"), "2.14", None)?.status, 200);
    assert_eq!(server.send("DELETE", &format!("{instance}{query}"), "2.14", None)?.status, 410);
    Ok(())
}

#[test]
fn protocol_failures_use_error_envelope() -> TestResult<()> {
    let server = TestServer::start()?;

    let old = server.send("GET", "/v2/catalog", "2.3", None)?;
    assert_eq!(old.status, 412);
    assert_eq!(old.json()?["error"], "InvalidBrokerAPIVersion");

    let unknown = server.send("GET", "/v2/nothing/here", "2.14", None)?;
    assert_eq!(unknown.status, 400);
    assert_eq!(unknown.json()?["error"], "InvalidPath");

    let malformed = server.send(
        "PUT",
        "/v2/service_instances/inst-2",
        "2.14",
        Some(r#"{"service_id": }"#),
    )?;
    assert_eq!(malformed.status, 400);
    assert_eq!(malformed.json()?["error"], "BadRequest");

    let missing_query = server.send("DELETE", "/v2/service_instances/inst-2", "2.14", None)?;
    assert_eq!(missing_query.status, 400);
    assert!(missing_query.body.contains("service_id"));

    let anonymous = reply(
        ureq::get(&format!("{}/v2/catalog", server.base_url))
            .set("X-Broker-API-Version", "2.14")
            .call(),
    )?;
    assert_eq!(anonymous.status, 401);
    assert_eq!(anonymous.json()?["error"], "Unauthorized");
    Ok(())
}

#[test]
fn body_limit_flag_is_enforced() -> TestResult<()> {
    let server = TestServer::start_with_args(&["--max-body-bytes", "64"])?;
    let reply = server.send(
        "PUT",
        "/v2/service_instances/inst-3",
        "2.14",
        Some(&provision_body()),
    )?;
    assert_eq!(reply.status, 400);
    assert_eq!(reply.json()?["error"], "BadRequest");
    Ok(())
}

#[test]
fn min_version_flag_raises_floor() -> TestResult<()> {
    let server = TestServer::start_with_args(&["--min-version", "2.13"])?;
    assert_eq!(server.send("GET", "/v2/catalog", "2.12", None)?.status, 412);
    assert_eq!(server.send("GET", "/v2/catalog", "2.13", None)?.status, 200);
    Ok(())
}

#[test]
fn async_delay_flag_reports_operations_in_progress() -> TestResult<()> {
    let server = TestServer::start_with_args(&["--async-delay", "600"])?;
    let instance = "/v2/service_instances/inst-4";

    let refused = server.send("PUT", instance, "2.14", Some(&provision_body()))?;
    assert_eq!(refused.status, 422);
    assert_eq!(refused.json()?["error"], "AsyncRequired");

    let started = server.send(
        "PUT",
        &format!("{instance}?accepts_incomplete=true"),
        "2.14",
        Some(&provision_body()),
    )?;
    assert_eq!(started.status, 202);
    assert!(
        started.json()?["operation"]
            .as_str()
            .is_some_and(|op| op.starts_with("provision-"))
    );

    let polled = server.send("GET", &format!("{instance}/last_operation"), "2.14", None)?;
    assert_eq!(polled.status, 200);
    assert_eq!(polled.json()?["state"], "in progress");
    Ok(())
}

#[test]
fn check_catalog_prints_summary() -> TestResult<()> {
    let output = Command::new(env!("CARGO_BIN_EXE_brokerkit"))
        .arg("check-catalog")
        .arg(concat!(env!("CARGO_MANIFEST_DIR"), "/src/catalog.json"))
        .output()?;
    assert!(output.status.success());
    let summary: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(summary["services"][0]["plans"].as_array().map(Vec::len), Some(2));
    Ok(())
}

#[test]
fn check_catalog_rejects_invalid_catalog() -> TestResult<()> {
    let path = std::env::temp_dir().join(format!("brokerkit-empty-catalog-{}.json", std::process::id()));
    std::fs::write(&path, r#"{"services": []}"#)?;
    let output = Command::new(env!("CARGO_BIN_EXE_brokerkit"))
        .arg("check-catalog")
        .arg(&path)
        .output()?;
    let _ = std::fs::remove_file(&path);
    assert_eq!(output.status.code(), Some(2));
    let error: Value = serde_json::from_slice(&output.stderr)?;
    assert_eq!(error["error"]["kind"], "Validation");
    Ok(())
}

fn pick_port() -> TestResult<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

fn wait_for_server(child: &mut Child, addr: SocketAddr) -> TestResult<()> {
    // Any HTTP status means the listener is up; an unversioned request is answered with 412.
    let url = format!("http://{addr}/v2/catalog");
    let start = Instant::now();
    loop {
        match ureq::get(&url).call() {
            Ok(_) | Err(ureq::Error::Status(_, _)) => return Ok(()),
            Err(_) => {}
        }
        if let Some(status) = child.try_wait()? {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr);
            }
            let detail = stderr.trim();
            return Err(format!(
                "server exited before ready (status: {status}, stderr: {})",
                if detail.is_empty() { "<empty>" } else { detail }
            )
            .into());
        }
        if start.elapsed() > Duration::from_secs(8) {
            return Err("server did not start in time".into());
        }
        sleep(Duration::from_millis(20));
    }
}
