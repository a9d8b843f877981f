//! Namespace connection-string parsing.
//!
//! Connection strings are `;`-separated `key=value` pairs, for example
//! `Endpoint=sb://contoso.servicebus.windows.net/;SharedAccessKeyName=send;SharedAccessKey=...`.
//! Keys are matched case-insensitively and values may themselves contain `=`
//! (base64 keys usually end with padding).
use crate::{AuthError, AuthResult};
use url::Url;

const ENDPOINT_KEY: &str = "Endpoint";
const KEY_NAME_KEY: &str = "SharedAccessKeyName";
const KEY_KEY: &str = "SharedAccessKey";
const ENTITY_PATH_KEY: &str = "EntityPath";

/// Structured view of a namespace connection string.
///
/// The shared access key is kept only long enough to build a token provider;
/// `Debug` redacts it.
#[derive(Clone, PartialEq, Eq)]
pub struct ParsedConnection {
    /// First DNS label of the endpoint host.
    pub namespace: String,
    /// Remaining DNS labels of the endpoint host, e.g. `servicebus.windows.net`.
    pub suffix: String,
    pub key_name: String,
    pub key: String,
    pub entity_path: Option<String>,
}

impl std::fmt::Debug for ParsedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedConnection")
            .field("namespace", &self.namespace)
            .field("suffix", &self.suffix)
            .field("key_name", &self.key_name)
            .field("key", &"<redacted>")
            .field("entity_path", &self.entity_path)
            .finish()
    }
}

/// Parse a connection string into its namespace, suffix, and key material.
///
/// # Errors
/// - [`AuthError::MalformedSegment`] when a non-empty segment has no `=`.
/// - [`AuthError::InvalidEndpoint`] when the endpoint is not a URL whose host
///   has at least a namespace label and a suffix.
/// - [`AuthError::MissingField`] when `Endpoint`, `SharedAccessKeyName`, or
///   `SharedAccessKey` is absent or empty.
pub fn parse_connection_string(conn_str: &str) -> AuthResult<ParsedConnection> {
    let mut endpoint = None;
    let mut key_name = None;
    let mut key = None;
    let mut entity_path = None;

    for segment in conn_str.split(';') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        let (name, value) = segment
            .split_once('=')
            .ok_or_else(|| AuthError::MalformedSegment(redact_segment(segment)))?;
        let name = name.trim();
        if name.eq_ignore_ascii_case(ENDPOINT_KEY) {
            endpoint = Some(parse_endpoint(value)?);
        } else if name.eq_ignore_ascii_case(KEY_NAME_KEY) {
            key_name = Some(value.to_string());
        } else if name.eq_ignore_ascii_case(KEY_KEY) {
            key = Some(value.to_string());
        } else if name.eq_ignore_ascii_case(ENTITY_PATH_KEY) {
            entity_path = Some(value.to_string()).filter(|path| !path.is_empty());
        } else {
            tracing::debug!(key = name, "ignoring unknown connection string key");
        }
    }

    let (namespace, suffix) = endpoint.ok_or(AuthError::MissingField(ENDPOINT_KEY))?;
    Ok(ParsedConnection {
        namespace,
        suffix,
        key_name: required(key_name, KEY_NAME_KEY)?,
        key: required(key, KEY_KEY)?,
        entity_path,
    })
}

// `SharedAccessKey=` with nothing after it counts as absent.
fn required(value: Option<String>, field: &'static str) -> AuthResult<String> {
    value
        .filter(|value| !value.trim().is_empty())
        .ok_or(AuthError::MissingField(field))
}

fn parse_endpoint(value: &str) -> AuthResult<(String, String)> {
    let invalid = |reason: &str| AuthError::InvalidEndpoint {
        endpoint: value.to_string(),
        reason: reason.to_string(),
    };
    let url = Url::parse(value.trim()).map_err(|err| invalid(&err.to_string()))?;
    let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
    match host.split_once('.') {
        Some((namespace, suffix)) if !namespace.is_empty() && !suffix.is_empty() => {
            Ok((namespace.to_string(), suffix.to_string()))
        }
        _ => Err(invalid("host must contain a namespace and a suffix")),
    }
}

// A segment without `=` may be a pasted key; keep only a short prefix in errors.
fn redact_segment(segment: &str) -> String {
    segment.chars().take(16).collect()
}
