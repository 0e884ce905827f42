//! Purpose: Decode the `X-Broker-API-Originating-Identity` header.
//! Exports: `OriginatingIdentity`, `ORIGINATING_IDENTITY_HEADER`.
//! Role: Tells the handler which platform user triggered the request.
//! Invariants: The header is `<platform> <base64 JSON object>`; anything else is `InvalidRequest`.
//! Notes: The embedded JSON goes through the bounded parser with strict limits.
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::core::error::{Error, ErrorKind};
use crate::json::{self, Mapping, ObjectKind, ResourceLimits};

pub const ORIGINATING_IDENTITY_HEADER: &str = "X-Broker-API-Originating-Identity";

#[derive(Clone, Debug, PartialEq)]
pub struct OriginatingIdentity {
    platform: String,
    value: String,
    properties: Mapping,
}

impl OriginatingIdentity {
    /// Parses a header value; `None` means the header was absent.
    pub fn from_header(header: Option<&str>) -> Result<Option<Self>, Error> {
        header.map(Self::parse).transpose()
    }

    pub fn parse(header: &str) -> Result<Self, Error> {
        let mut parts = header.split_whitespace();
        let (Some(platform), Some(encoded), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid("expected '<platform> <value>'"));
        };
        let decoded = STANDARD
            .decode(encoded)
            .map_err(|err| invalid("value is not valid base64").with_source(err))?;
        let value = String::from_utf8(decoded)
            .map_err(|err| invalid("value is not valid UTF-8").with_source(err))?;
        let properties = json::parse_reader(value.as_bytes(), ObjectKind::Generic, ResourceLimits::strict())
            .map_err(|err| invalid("value is not a JSON object").with_source(err))?;
        Ok(Self {
            platform: platform.to_string(),
            value,
            properties,
        })
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// The decoded JSON text exactly as sent.
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn properties(&self) -> &Mapping {
        &self.properties
    }

    /// Renders the header value for this identity.
    pub fn to_header(&self) -> String {
        format!("{} {}", self.platform, STANDARD.encode(&self.value))
    }
}

fn invalid(detail: &str) -> Error {
    Error::new(ErrorKind::InvalidRequest)
        .with_message(format!("{ORIGINATING_IDENTITY_HEADER} header is invalid: {detail}"))
}
