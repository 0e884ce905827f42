//! Purpose: Crate-wide error type and its mapping onto broker error envelopes.
//! Exports: `Error`, `ErrorKind`, `ErrorEnvelope`, `to_http_status`, `to_exit_code`.
//! Role: Every pipeline stage and every handler reports failures through `Error`.
//! Invariants: `to_http_status` is total and stable; each kind maps to exactly one status
//! except `Business`, which carries its own.
//! Invariants: Envelopes for `Io`/`Internal` never include the underlying message.
use std::error::Error as StdError;
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    Lex,
    Parse,
    TooLarge,
    Validation,
    UnsupportedVersion,
    Authentication,
    RouteNotFound,
    InvalidRequest,
    Business,
    Io,
    Internal,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    code: Option<String>,
    status: Option<u16>,
    position: Option<u64>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            code: None,
            status: None,
            position: None,
            source: None,
        }
    }

    /// A business rejection with an explicit status and machine-readable code.
    pub fn business(status: u16, code: impl Into<String>, description: impl Into<String>) -> Self {
        let mut err = Self::new(ErrorKind::Business).with_message(description);
        err.status = Some(status);
        err.code = Some(code.into());
        err
    }

    pub fn bad_request(description: impl Into<String>) -> Self {
        Self::business(400, "BadRequest", description)
    }

    pub fn unauthorized() -> Self {
        Self::new(ErrorKind::Authentication).with_message("Unauthorized")
    }

    pub fn not_found(description: impl Into<String>) -> Self {
        Self::business(404, "NotFound", description)
    }

    pub fn conflict(description: impl Into<String>) -> Self {
        Self::business(409, "Conflict", description)
    }

    pub fn gone(description: impl Into<String>) -> Self {
        Self::business(410, "Gone", description)
    }

    pub fn unprocessable(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self::business(422, code, description)
    }

    pub fn async_required() -> Self {
        Self::unprocessable(
            "AsyncRequired",
            "This request requires client support for asynchronous service operations.",
        )
    }

    pub fn concurrency_error() -> Self {
        Self::unprocessable(
            "ConcurrencyError",
            "Another operation for this service instance is in progress.",
        )
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn position(&self) -> Option<u64> {
        self.position
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_position(mut self, position: u64) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// HTTP status this error is reported with.
    pub fn http_status(&self) -> u16 {
        match (self.kind, self.status) {
            (ErrorKind::Business | ErrorKind::Authentication, Some(status))
                if (400..=599).contains(&status) =>
            {
                status
            }
            _ => to_http_status(self.kind),
        }
    }

    /// Messages of the source chain, outermost first.
    pub fn causes(&self) -> Vec<String> {
        let mut causes = Vec::new();
        let mut current = self.source();
        while let Some(cause) = current {
            causes.push(cause.to_string());
            current = cause.source();
        }
        causes
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(code) = &self.code {
            write!(f, " [{code}]")?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(position) = self.position {
            write!(f, " (position: {position})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_http_status(kind: ErrorKind) -> u16 {
    match kind {
        ErrorKind::Lex
        | ErrorKind::Parse
        | ErrorKind::TooLarge
        | ErrorKind::Validation
        | ErrorKind::RouteNotFound
        | ErrorKind::InvalidRequest => 400,
        ErrorKind::Authentication => 401,
        ErrorKind::UnsupportedVersion => 412,
        ErrorKind::Business | ErrorKind::Io | ErrorKind::Internal => 500,
    }
}

/// Process exit code for a failure surfaced by the CLI.
pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Validation | ErrorKind::InvalidRequest => 2,
        ErrorKind::Lex | ErrorKind::Parse | ErrorKind::TooLarge => 3,
        ErrorKind::Io => 8,
        ErrorKind::UnsupportedVersion
        | ErrorKind::Authentication
        | ErrorKind::RouteNotFound
        | ErrorKind::Business
        | ErrorKind::Internal => 1,
    }
}

/// The two-field failure body: `{"error": .., "description": ..}`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ErrorEnvelope {
    pub status: u16,
    pub error: String,
    pub description: String,
}

pub const GENERIC_DESCRIPTION: &str = "Processing error";

impl ErrorEnvelope {
    pub fn new(status: u16, error: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            description: description.into(),
        }
    }

    pub fn from_error(err: &Error) -> Self {
        let status = err.http_status();
        if status >= 500 && err.kind() != ErrorKind::Business {
            return Self::new(status, "InternalError", GENERIC_DESCRIPTION);
        }
        let error = match (err.kind(), err.code()) {
            (_, Some(code)) => code.to_string(),
            (ErrorKind::RouteNotFound, None) => "InvalidPath".to_string(),
            (ErrorKind::UnsupportedVersion, None) => "InvalidBrokerAPIVersion".to_string(),
            (ErrorKind::Authentication, None) => "Unauthorized".to_string(),
            (ErrorKind::Business, None) if status >= 500 => "InternalError".to_string(),
            _ => "BadRequest".to_string(),
        };
        let description = match (err.message(), err.position()) {
            (Some(message), Some(position)) => format!("{message} at position {position}"),
            (Some(message), None) => message.to_string(),
            (None, _) => GENERIC_DESCRIPTION.to_string(),
        };
        Self::new(status, error, description)
    }
}
