//! ThingSpeak wire format.
//!
//! Covers both directions used by penwatch:
//!
//! - the channel `update` write, either issued directly over HTTP or sent as
//!   a literal request line through a serial modem, and
//! - the `feeds.json` read used by the alert bridge.
//!
//! ThingSpeak answers `update` with the new entry id as a plain-text body.
//! An id of `0` means the write was not stored (rate limit or wrong key) even
//! though the HTTP status is 200.

use serde::Deserialize;

use crate::error::CoreError;
use crate::types::{EntryId, Timestamp};

/// Public ThingSpeak API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.thingspeak.com";

/// Host used for plain-HTTP requests sent through the modem.
pub const DEFAULT_HOST: &str = "api.thingspeak.com";

/// Maximum accepted API key length. Real keys are 16 characters.
const MAX_API_KEY_LEN: usize = 64;

/// API keys are embedded unescaped in query strings, so only ASCII
/// alphanumerics are allowed.
pub fn is_valid_api_key(key: &str) -> bool {
    !key.is_empty() && key.len() <= MAX_API_KEY_LEN && key.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Build the `update` query string: `api_key=KEY&field1=4.50&field2=1`.
pub fn update_query(api_key: &str, fields: &[(u8, String)]) -> String {
    let mut query = format!("api_key={api_key}");
    for (idx, value) in fields {
        query.push_str(&format!("&field{idx}={value}"));
    }
    query
}

/// Path and query for a channel update, e.g. `/update?api_key=...`.
pub fn update_path(api_key: &str, fields: &[(u8, String)]) -> String {
    format!("/update?{}", update_query(api_key, fields))
}

/// The literal HTTP/1.1 GET request sent through a raw TCP socket.
pub fn http_get_request(host: &str, path: &str) -> String {
    format!("GET {path} HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n")
}

/// Extract the status code from an HTTP status line (`HTTP/1.1 200 OK`).
pub fn parse_status_line(line: &str) -> Result<u16, CoreError> {
    let mut parts = line.split_whitespace();
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(CoreError::Malformed(format!("not a status line: {line:?}")));
    }
    parts
        .next()
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| CoreError::Malformed(format!("missing status code: {line:?}")))
}

/// Status and body of a raw HTTP/1.x response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Parse a raw HTTP/1.x response as read off a TCP socket.
///
/// Anything before the status line (modem chatter) is skipped. Chunked
/// bodies are decoded; other transfer codings are passed through.
pub fn parse_http_response(raw: &str) -> Result<HttpResponse, CoreError> {
    let start = raw
        .find("HTTP/")
        .ok_or_else(|| CoreError::Malformed("no HTTP status line in response".into()))?;
    let raw = &raw[start..];

    let (head, body) = match raw.find("\r\n\r\n") {
        Some(i) => (&raw[..i], &raw[i + 4..]),
        None => (raw, ""),
    };

    let mut lines = head.lines();
    let status = parse_status_line(lines.next().unwrap_or_default())?;
    let chunked = lines.any(|line| {
        let lower = line.to_ascii_lowercase();
        lower.starts_with("transfer-encoding:") && lower.contains("chunked")
    });

    let body = if chunked {
        decode_chunked(body)?
    } else {
        body.to_string()
    };

    Ok(HttpResponse { status, body })
}

fn decode_chunked(body: &str) -> Result<String, CoreError> {
    let mut out = String::new();
    let mut rest = body;

    loop {
        let Some((size_line, after)) = rest.split_once("\r\n") else {
            // Peer closed before the terminating zero-size chunk.
            if rest.trim().is_empty() {
                break;
            }
            return Err(CoreError::Malformed(format!("truncated chunk: {rest:?}")));
        };

        let size_hex = size_line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_hex, 16)
            .map_err(|_| CoreError::Malformed(format!("bad chunk size: {size_line:?}")))?;
        if size == 0 {
            break;
        }

        let chunk = after
            .get(..size)
            .ok_or_else(|| CoreError::Malformed(format!("chunk shorter than {size} bytes")))?;
        out.push_str(chunk);

        let remainder = &after[size..];
        rest = remainder.strip_prefix("\r\n").unwrap_or(remainder);
    }

    Ok(out)
}

/// Parse the plain-text entry id returned by `update`.
///
/// Returns `None` when the body is not a number (e.g. an HTML error page).
pub fn parse_entry_id(body: &str) -> Option<EntryId> {
    body.trim().parse().ok()
}

/// Result of a single channel write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    pub status: u16,
    pub entry_id: Option<EntryId>,
}

impl WriteOutcome {
    pub fn from_response(status: u16, body: &str) -> Self {
        Self {
            status,
            entry_id: parse_entry_id(body),
        }
    }

    /// The write was stored: HTTP 200 and a non-zero entry id (or no id in
    /// the body at all).
    pub fn accepted(&self) -> bool {
        self.status == 200 && self.entry_id != Some(0)
    }
}

/// Response body of `GET /channels/{id}/feeds.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelFeed {
    #[serde(default)]
    pub feeds: Vec<FeedEntry>,
}

impl ChannelFeed {
    /// The most recent entry, if any. ThingSpeak returns entries in
    /// ascending order.
    pub fn latest(&self) -> Option<&FeedEntry> {
        self.feeds.iter().max_by_key(|e| e.entry_id)
    }
}

/// One stored channel entry. Field values are strings on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedEntry {
    pub entry_id: EntryId,
    pub created_at: Timestamp,
    pub field1: Option<String>,
    pub field2: Option<String>,
    pub field3: Option<String>,
    pub field4: Option<String>,
    pub field5: Option<String>,
    pub field6: Option<String>,
    pub field7: Option<String>,
    pub field8: Option<String>,
}

impl FeedEntry {
    /// Value of field `idx` (1-based). Empty strings count as missing.
    pub fn field(&self, idx: u8) -> Option<&str> {
        let value = match idx {
            1 => &self.field1,
            2 => &self.field2,
            3 => &self.field3,
            4 => &self.field4,
            5 => &self.field5,
            6 => &self.field6,
            7 => &self.field7,
            8 => &self.field8,
            _ => return None,
        };
        value.as_deref().filter(|v| !v.is_empty())
    }
}
