//! Flow records captured by the proxy and the field accessors the filter
//! engine matches against.
//!
//! A flow is a single observed exchange: a request, optionally a response,
//! or an error if the exchange broke down. The structs here mirror the JSON
//! shape the event feed delivers, so the transport layer can hand decoded
//! flows straight to the store.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// A single `name: value` header pair.
///
/// Serialized as a two-element array to match the feed's wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header(pub String, pub String);

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Header(name.into(), value.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn value(&self) -> &str {
        &self.1
    }
}

/// A captured request/response (or error) exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Request>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Response>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FlowError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_conn: Option<ConnInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_conn: Option<ConnInfo>,
    #[serde(default)]
    pub intercepted: bool,
}

impl Flow {
    /// A flow with the given id and no request, response or error yet.
    pub fn new(id: impl Into<String>) -> Self {
        Flow {
            id: id.into(),
            request: None,
            response: None,
            error: None,
            client_conn: None,
            server_conn: None,
            intercepted: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_version: Option<String>,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_end: Option<f64>,
}

impl Request {
    /// Reconstructs the display URL: `scheme://host[:port]path`, with the
    /// port omitted when it is the scheme's default (80 for http, 443 for
    /// https).
    pub fn pretty_url(&self) -> String {
        if default_port(&self.scheme) == Some(self.port) {
            format!("{}://{}{}", self.scheme, self.host, self.path)
        } else {
            format!("{}://{}:{}{}", self.scheme, self.host, self.port, self.path)
        }
    }

    /// The media type of the request body, if a `Content-Type` header is
    /// present. Parameters after `;` are stripped.
    pub fn content_type(&self) -> Option<&str> {
        header_content_type(&self.headers)
    }

    /// True if any header's `"name value"` joined form matches `regex`.
    pub fn match_header(&self, regex: &Regex) -> bool {
        header_matches(&self.headers, regex)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_version: Option<String>,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_end: Option<f64>,
}

impl Response {
    /// The media type of the response body, if a `Content-Type` header is
    /// present. Parameters after `;` are stripped.
    pub fn content_type(&self) -> Option<&str> {
        header_content_type(&self.headers)
    }

    /// True if any header's `"name value"` joined form matches `regex`.
    pub fn match_header(&self, regex: &Regex) -> bool {
        header_matches(&self.headers, regex)
    }
}

/// Why an exchange failed before completing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowError {
    pub msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

/// Peer address of the client or upstream server connection. Opaque to the
/// filter engine; carried through for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<(String, u16)>,
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

fn header_content_type(headers: &[Header]) -> Option<&str> {
    headers
        .iter()
        .find(|h| h.name().eq_ignore_ascii_case("content-type"))
        .map(|h| h.value().split(';').next().unwrap_or_default().trim())
}

fn header_matches(headers: &[Header], regex: &Regex) -> bool {
    headers
        .iter()
        .any(|h| regex.is_match(&format!("{} {}", h.name(), h.value())))
}
