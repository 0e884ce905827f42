//! Purpose: HTTP transport adapter serving the demo broker over axum.
//! Exports: `ServeConfig`, `serve`.
//! Role: Converts each HTTP request into an `InboundRequest` and hands it to `Broker::process`.
//! Invariants: Routing and status mapping live in the library; this module only moves bytes.
//! Invariants: At most `max_body_bytes + 1` body bytes are buffered per request.
//! Notes: Dispatch is synchronous and runs on the blocking pool.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Router;
use bytes::{Bytes, BytesMut};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::time::Duration;
use tokio_stream::StreamExt;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use brokerkit::api::{
    Broker, Error, ErrorKind, InboundRequest, JSON_CONTENT_TYPE, OutgoingResponse,
    ProtocolVersion, SUPPORTED_MAJOR,
};
use brokerkit::json::ResourceLimits;

use crate::demo::DemoBroker;

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub username: String,
    pub password: String,
    pub min_version: ProtocolVersion,
    pub limits: ResourceLimits,
    /// Completion delay for asynchronous instance operations; `None` answers synchronously.
    pub async_delay: Option<Duration>,
}

struct AppState {
    broker: Arc<Broker>,
    handler: Arc<DemoBroker>,
    max_body_bytes: usize,
}

pub async fn serve(config: ServeConfig) -> Result<(), Error> {
    validate_config(&config)?;

    init_tracing();

    let max_body_bytes: usize = config.limits.max_body_bytes.try_into().map_err(|_| {
        Error::new(ErrorKind::Validation).with_message("--max-body-bytes is too large")
    })?;

    let mut handler = DemoBroker::new(config.username, config.password)?;
    if let Some(delay) = config.async_delay {
        handler = handler.with_async_delay(delay);
    }

    let broker = Broker::new()
        .with_min_version(config.min_version)
        .with_limits(config.limits);
    let state = Arc::new(AppState {
        broker: Arc::new(broker),
        handler: Arc::new(handler),
        max_body_bytes,
    });

    let app = Router::new()
        .fallback(dispatch)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to bind server")
                .with_source(err)
        })?;
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, min_version = %config.min_version, "broker listening");
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("server failed")
                    .with_source(err)
            })?;
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown requested");
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(Duration::from_secs(10), &mut server).await {
                Ok(result) => result.map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("server failed")
                        .with_source(err)
                })?,
                Err(_) => {
                    return Err(Error::new(ErrorKind::Io).with_message("server shutdown timed out"));
                }
            }
        }
    };
    Ok(())
}

fn validate_config(config: &ServeConfig) -> Result<(), Error> {
    if config.username.is_empty() || config.password.is_empty() {
        return Err(Error::new(ErrorKind::Validation)
            .with_message("--username and --password must not be empty"));
    }

    if config.min_version.major != SUPPORTED_MAJOR {
        return Err(Error::new(ErrorKind::Validation).with_message(format!(
            "--min-version must be a {SUPPORTED_MAJOR}.x version, got {}",
            config.min_version
        )));
    }

    if config.limits.max_body_bytes == 0 {
        return Err(Error::new(ErrorKind::Validation)
            .with_message("--max-body-bytes must be greater than zero"));
    }

    if config.limits.max_container_entries == 0 {
        return Err(Error::new(ErrorKind::Validation)
            .with_message("--max-entries must be greater than zero"));
    }

    if config.limits.max_depth == 0 {
        return Err(Error::new(ErrorKind::Validation)
            .with_message("--max-depth must be greater than zero"));
    }

    if config.limits.max_body_bytes >= usize::MAX as u64 {
        return Err(Error::new(ErrorKind::Validation)
            .with_message("--max-body-bytes exceeds platform limits"));
    }

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}

async fn dispatch(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let target = parts
        .uri
        .path_and_query()
        .map_or_else(|| parts.uri.path().to_string(), |pq| pq.as_str().to_string());

    let mut inbound = InboundRequest::new(parts.method.as_str(), &target);
    for (name, value) in &parts.headers {
        match value.to_str() {
            Ok(value) => inbound = inbound.with_header(name.as_str(), value),
            Err(_) => tracing::debug!(header = %name, "skipping non-ASCII header"),
        }
    }

    let body = match read_capped(body, state.max_body_bytes).await {
        Ok(body) => body,
        Err(err) => return to_response(state.broker.error_response(&err)),
    };
    inbound = inbound.with_body(body);

    let broker = Arc::clone(&state.broker);
    let handler = Arc::clone(&state.handler);
    let outcome =
        tokio::task::spawn_blocking(move || broker.process(&mut inbound, handler.as_ref())).await;
    match outcome {
        Ok(response) => to_response(response),
        Err(err) => {
            let err = Error::new(ErrorKind::Internal)
                .with_message("dispatch task failed")
                .with_source(err);
            to_response(state.broker.error_response(&err))
        }
    }
}

/// Buffers the body up to one byte past `max_body_bytes` so the parser can report `TooLarge`.
async fn read_capped(body: Body, max_body_bytes: usize) -> Result<Bytes, Error> {
    let cap = max_body_bytes.saturating_add(1);
    let mut stream = body.into_data_stream();
    let mut buffer = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|err| {
            Error::new(ErrorKind::InvalidRequest)
                .with_message("failed to read request body")
                .with_source(err)
        })?;
        let room = cap - buffer.len();
        if chunk.len() >= room {
            buffer.extend_from_slice(&chunk[..room]);
            break;
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(buffer.freeze())
}

fn to_response(response: OutgoingResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [(header::CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE))],
        response.body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::{ServeConfig, read_capped, serve, validate_config};
    use axum::body::Body;
    use brokerkit::api::{ErrorKind, ProtocolVersion};
    use brokerkit::json::ResourceLimits;

    fn config() -> ServeConfig {
        ServeConfig {
            bind: "127.0.0.1:0".parse().expect("bind"),
            username: "admin".to_string(),
            password: "secret".to_string(),
            min_version: ProtocolVersion::new(2, 4),
            limits: ResourceLimits::default(),
            async_delay: None,
        }
    }

    #[test]
    fn default_config_is_valid() {
        validate_config(&config()).expect("config ok");
    }

    #[test]
    fn credentials_must_not_be_empty() {
        let mut config = config();
        config.password.clear();
        let err = validate_config(&config).expect_err("expected validation error");
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn min_version_must_be_v2() {
        let mut config = config();
        config.min_version = ProtocolVersion::new(3, 0);
        let err = validate_config(&config).expect_err("expected validation error");
        assert!(err.message().unwrap_or_default().contains("2.x"));
    }

    #[test]
    fn safety_limits_require_positive_values() {
        for limits in [
            ResourceLimits::new(0, 10, 10),
            ResourceLimits::new(10, 0, 10),
            ResourceLimits::new(10, 10, 0),
        ] {
            let mut config = config();
            config.limits = limits;
            let err = validate_config(&config).expect_err("expected validation error");
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
    }

    #[tokio::test]
    async fn serve_rejects_invalid_config_before_binding() {
        let mut config = config();
        config.username.clear();
        let err = serve(config).await.expect_err("expected validation error");
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn body_is_capped_one_byte_past_the_limit() {
        let body = read_capped(Body::from(vec![b'x'; 64]), 16).await.expect("read");
        assert_eq!(body.len(), 17);

        let body = read_capped(Body::from("{}"), 16).await.expect("read");
        assert_eq!(&body[..], b"{}");
    }
}
