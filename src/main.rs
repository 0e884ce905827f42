//! Purpose: `brokerkit` CLI entry point.
//! Role: Binary crate root; parses args and runs the demo broker or the catalog checker.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
use std::io::{self, IsTerminal};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind};
use serde::Serialize;
use serde_json::{Map, Value, json};

mod demo;
mod serve;

use brokerkit::api::{Error, ErrorKind, ProtocolVersion, to_exit_code};
use brokerkit::json::ResourceLimits;
use brokerkit::model::CatalogBody;

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err(Error::new(ErrorKind::Validation).with_message(clap_error_summary(&err)));
            }
        },
    };

    match cli.command {
        Command::Serve(args) => {
            let config = serve::ServeConfig {
                bind: args.bind,
                username: args.username,
                password: args.password,
                min_version: args.min_version,
                limits: ResourceLimits::new(args.max_body_bytes, args.max_entries, args.max_depth),
                async_delay: args.async_delay.map(Duration::from_secs),
            };
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to start runtime")
                        .with_source(err)
                })?;
            runtime.block_on(serve::serve(config))?;
            Ok(RunOutcome::ok())
        }
        Command::CheckCatalog { file } => {
            let text = std::fs::read_to_string(&file).map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message(format!("failed to read {}", file.display()))
                    .with_source(err)
            })?;
            let catalog = demo::load_catalog(&text)?;
            emit_json(&catalog_summary(&catalog)?);
            Ok(RunOutcome::ok())
        }
    }
}

#[derive(Parser)]
#[command(
    name = "brokerkit",
    version,
    about = "Open Service Broker v2 dispatch engine with an in-memory demo broker",
    long_about = None,
    after_help = r#"EXAMPLES
  $ brokerkit serve --username admin --password secret
  $ curl -u admin:secret -H 'X-Broker-API-Version: 2.14' http://127.0.0.1:8080/v2/catalog
  $ brokerkit check-catalog catalog.json"#,
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Serve the demo broker over HTTP",
        long_about = r#"Serve the in-memory demo broker over HTTP.

Every request passes through version negotiation, basic authentication,
route resolution and bounded body parsing before reaching the broker.
State is kept in memory and lost on exit."#
    )]
    Serve(ServeArgs),
    #[command(
        arg_required_else_help = true,
        about = "Parse and validate a catalog document",
        after_help = r#"EXAMPLES
  $ brokerkit check-catalog catalog.json | jq '.services[].plans'"#
    )]
    CheckCatalog {
        #[arg(help = "Catalog JSON file", value_hint = ValueHint::FilePath)]
        file: PathBuf,
    },
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1:8080", help = "Address to bind")]
    bind: SocketAddr,
    #[arg(long, env = "BROKERKIT_USERNAME", help = "Basic-auth username accepted by the broker")]
    username: String,
    #[arg(
        long,
        env = "BROKERKIT_PASSWORD",
        hide_env_values = true,
        help = "Basic-auth password accepted by the broker"
    )]
    password: String,
    #[arg(long, default_value = "2.4", help = "Lowest accepted X-Broker-API-Version")]
    min_version: ProtocolVersion,
    #[arg(long, default_value_t = ResourceLimits::DEFAULT_MAX_BODY_BYTES, help = "Largest accepted request body")]
    max_body_bytes: u64,
    #[arg(long, default_value_t = ResourceLimits::DEFAULT_MAX_CONTAINER_ENTRIES, help = "Most entries in one JSON object or array")]
    max_entries: usize,
    #[arg(long, default_value_t = ResourceLimits::DEFAULT_MAX_DEPTH, help = "Deepest JSON nesting accepted")]
    max_depth: usize,
    #[arg(
        long,
        value_name = "SECONDS",
        help = "Run instance operations asynchronously, finishing after this many seconds"
    )]
    async_delay: Option<u64>,
}

#[derive(Serialize)]
struct CatalogSummary {
    services: Vec<ServiceSummary>,
}

#[derive(Serialize)]
struct ServiceSummary {
    id: String,
    name: String,
    bindable: bool,
    plans: Vec<PlanSummary>,
}

#[derive(Serialize)]
struct PlanSummary {
    id: String,
    name: String,
    free: bool,
}

fn catalog_summary(catalog: &CatalogBody) -> Result<CatalogSummary, Error> {
    let mut services = Vec::new();
    for service in catalog.services()? {
        let mut plans = Vec::new();
        for plan in service.plans()? {
            plans.push(PlanSummary {
                id: plan.id()?.unwrap_or_default().to_string(),
                name: plan.name()?.unwrap_or_default().to_string(),
                free: plan.free()?,
            });
        }
        services.push(ServiceSummary {
            id: service.id()?.unwrap_or_default().to_string(),
            name: service.name()?.unwrap_or_default().to_string(),
            bindable: service.bindable()?.unwrap_or(false),
            plans,
        });
    }
    Ok(CatalogSummary { services })
}

fn emit_json<T: Serialize>(value: &T) {
    let json = serde_json::to_string_pretty(value)
        .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }

    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Lex | ErrorKind::Parse => "malformed JSON".to_string(),
        ErrorKind::TooLarge => "input exceeds resource limits".to_string(),
        ErrorKind::Validation | ErrorKind::InvalidRequest => "invalid input".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
        _ => "internal error".to_string(),
    }
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(position) = err.position() {
        inner.insert("position".to_string(), json!(position));
    }
    let causes = err.causes();
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(position) = err.position() {
        lines.push(format!("position: {position}"));
    }
    for cause in err.causes() {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}
