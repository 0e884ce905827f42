//! Purpose: Decode the `Authorization` header into typed credentials.
//! Exports: `Credentials`, `AUTHORIZATION_HEADER`.
//! Role: Feeds `BrokerHandler::authenticate`; never rejects a request by itself.
//! Invariants: Unknown schemes and undecodable payloads yield `None`; this never fails.
//! Invariants: `Debug` output never contains a password or token.
use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

pub const AUTHORIZATION_HEADER: &str = "Authorization";

#[derive(Clone, Eq, PartialEq)]
pub enum Credentials {
    None,
    Basic { username: String, password: String },
    Bearer { token: String },
}

impl Credentials {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Credentials::Bearer {
            token: token.into(),
        }
    }

    /// Decodes an `Authorization` header value.
    pub fn from_header(header: Option<&str>) -> Self {
        let Some(header) = header else {
            return Credentials::None;
        };
        let mut parts = header.split_whitespace();
        let (Some(scheme), Some(payload), None) = (parts.next(), parts.next(), parts.next()) else {
            return Credentials::None;
        };
        if scheme.eq_ignore_ascii_case("basic") {
            decode_basic(payload).unwrap_or(Credentials::None)
        } else if scheme.eq_ignore_ascii_case("bearer") {
            Credentials::bearer(payload)
        } else {
            Credentials::None
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Credentials::None)
    }

    /// True when these are Basic credentials with exactly this username and password.
    pub fn matches_basic(&self, expected_username: &str, expected_password: &str) -> bool {
        match self {
            Credentials::Basic { username, password } => {
                username == expected_username && password == expected_password
            }
            _ => false,
        }
    }

    /// Renders the header value these credentials decode from.
    pub fn to_header(&self) -> Option<String> {
        match self {
            Credentials::None => None,
            Credentials::Basic { username, password } => Some(format!(
                "Basic {}",
                STANDARD.encode(format!("{username}:{password}"))
            )),
            Credentials::Bearer { token } => Some(format!("Bearer {token}")),
        }
    }
}

// Basic payloads are ISO-8859-1: every byte is one code point.
fn decode_basic(payload: &str) -> Option<Credentials> {
    let bytes = STANDARD.decode(payload).ok()?;
    let text: String = bytes.iter().map(|&byte| char::from(byte)).collect();
    let (username, password) = text.split_once(':').unwrap_or((text.as_str(), ""));
    Some(Credentials::basic(username, password))
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::None => f.write_str("None"),
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Credentials;

    #[test]
    fn basic_credentials_decode() {
        // "user:pass"
        let credentials = Credentials::from_header(Some("Basic dXNlcjpwYXNz"));
        assert_eq!(credentials, Credentials::basic("user", "pass"));
        assert!(credentials.matches_basic("user", "pass"));
        assert!(!credentials.matches_basic("user", "other"));

        let credentials = Credentials::from_header(Some("basic   dXNlcjpwYXNz  "));
        assert_eq!(credentials, Credentials::basic("user", "pass"));
    }

    #[test]
    fn password_keeps_everything_after_first_colon() {
        let header = Credentials::basic("admin", "a:b:c").to_header().expect("header");
        assert_eq!(Credentials::from_header(Some(&header)), Credentials::basic("admin", "a:b:c"));
    }

    #[test]
    fn missing_colon_means_empty_password() {
        // "user"
        let credentials = Credentials::from_header(Some("Basic dXNlcg=="));
        assert_eq!(credentials, Credentials::basic("user", ""));
    }

    #[test]
    fn latin1_payload_maps_bytes_to_chars() {
        // "j\xf6rg:pw"
        let credentials = Credentials::from_header(Some("Basic avZyZzpwdw=="));
        assert_eq!(credentials, Credentials::basic("j\u{f6}rg", "pw"));
    }

    #[test]
    fn bearer_tokens_are_passed_through() {
        assert_eq!(
            Credentials::from_header(Some("Bearer abc.def")),
            Credentials::bearer("abc.def")
        );
        assert_eq!(
            Credentials::from_header(Some("BEARER abc")),
            Credentials::bearer("abc")
        );
    }

    #[test]
    fn malformed_headers_decode_to_none() {
        for header in [
            None,
            Some(""),
            Some("Basic"),
            Some("Basic !!!"),
            Some("Digest abc"),
            Some("Bearer a b"),
        ] {
            assert!(Credentials::from_header(header).is_none(), "{header:?}");
        }
    }

    #[test]
    fn debug_output_is_redacted() {
        let rendered = format!("{:?}", Credentials::basic("user", "s3cret"));
        assert!(rendered.contains("user"));
        assert!(!rendered.contains("s3cret"));
        let rendered = format!("{:?}", Credentials::bearer("tok3n"));
        assert!(!rendered.contains("tok3n"));
    }
}
