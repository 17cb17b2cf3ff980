use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, RateLimitError, Result};

pub const REQUESTS_REMAINING_HEADER: &str = "X-Rl";
pub const SECONDS_UNTIL_RESET_HEADER: &str = "X-Ttl";

/// Rate limit figures the provider reported on the last response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResponseMetadata {
    /// `X-Rl`
    pub requests_remaining: Option<u64>,
    /// `X-Ttl`
    pub seconds_until_reset: Option<u64>,
}

impl ResponseMetadata {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            requests_remaining: header_number(headers, REQUESTS_REMAINING_HEADER),
            seconds_until_reset: header_number(headers, SECONDS_UNTIL_RESET_HEADER),
        }
    }
}

fn header_number<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    let value = headers.get(name)?;
    let parsed = value.to_str().ok().and_then(|v| v.trim().parse().ok());
    if parsed.is_none() {
        tracing::warn!(header = name, ?value, "ignoring non-numeric rate limit header");
    }
    parsed
}

/// A decoded response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    /// `application/json` bodies
    Json(Value),
    /// Everything else, verbatim: XML, CSV, line, PHP, JSONP
    Text(String),
}

impl Payload {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Json(_) => None,
        }
    }

    pub fn into_json(self) -> Option<Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Text(_) => None,
        }
    }

    /// The provider's failure message, if this is a `"status": "fail"` object.
    pub fn failure_message(&self) -> Option<&str> {
        let object = self.as_json()?.as_object()?;
        if object.get("status").and_then(Value::as_str) != Some("fail") {
            return None;
        }
        Some(object.get("message").and_then(Value::as_str).unwrap_or("Unknown error"))
    }
}

/// Map a status code to an error, before the body is looked at.
pub fn check_status(status: StatusCode, headers: &HeaderMap) -> Result<()> {
    match status {
        StatusCode::UNPROCESSABLE_ENTITY => Err(Error::BatchValidation),
        StatusCode::TOO_MANY_REQUESTS => Err(RateLimitError::Server {
            seconds_until_reset: header_number(headers, SECONDS_UNTIL_RESET_HEADER),
        }
        .into()),
        s if !s.is_success() => Err(Error::Status { status: s.as_u16() }),
        _ => Ok(()),
    }
}

/// Decode `body` according to the declared content type.
pub fn decode_body(headers: &HeaderMap, body: String) -> Result<Payload> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    tracing::debug!(content_type, len = body.len(), "decoding response body");

    if content_type.contains("application/json") {
        let value = serde_json::from_str(&body)
            .map_err(|e| Error::InvalidResponse(format!("malformed JSON body: {}", e)))?;
        return Ok(Payload::Json(value));
    }

    Ok(Payload::Text(body))
}
