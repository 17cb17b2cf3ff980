//! Request shapes: formats, endpoint paths, query parameters and batch bodies.

use reqwest::Url;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Most targets a single batch request may carry.
pub const BATCH_LIMIT: usize = 100;

pub const BATCH_PATH: &str = "batch";

/// Response formats served by the single lookup endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Json,
    Xml,
    Csv,
    /// Newline separated values
    Line,
    /// Serialized PHP
    Php,
}

impl Format {
    pub fn as_str(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Xml => "xml",
            Format::Csv => "csv",
            Format::Line => "line",
            Format::Php => "php",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(Format::Json),
            "xml" => Ok(Format::Xml),
            "csv" => Ok(Format::Csv),
            "line" => Ok(Format::Line),
            "php" => Ok(Format::Php),
            other => Err(Error::InvalidArgument(format!("Unsupported format '{}'", other))),
        }
    }
}

/// Query string parameters, kept in the order they are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(&'static str, String)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields(mut self, fields: Option<String>) -> Self {
        if let Some(fields) = fields {
            self.pairs.push(("fields", fields));
        }
        self
    }

    pub fn callback(mut self, callback: Option<&str>) -> Self {
        if let Some(callback) = callback {
            self.pairs.push(("callback", callback.to_string()));
        }
        self
    }

    pub fn lang(mut self, lang: Option<&str>) -> Self {
        if let Some(lang) = lang {
            self.pairs.push(("lang", lang.to_string()));
        }
        self
    }

    pub fn key(mut self, key: Option<&str>) -> Self {
        if let Some(key) = key {
            self.pairs.push(("key", key.to_string()));
        }
        self
    }

    pub fn as_pairs(&self) -> &[(&'static str, String)] {
        &self.pairs
    }
}

/// One element of a `/batch` request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchItem {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

/// Build the body for a batch call. `fields` must already be serialized.
pub fn batch_items(targets: &[&str], fields: Option<&str>, lang: Option<&str>) -> Vec<BatchItem> {
    targets
        .iter()
        .map(|target| BatchItem {
            query: (*target).to_string(),
            fields: fields.map(str::to_string),
            lang: lang.map(str::to_string),
        })
        .collect()
}

/// Reject empty or oversized batches.
pub fn validate_batch_size(count: usize) -> Result<()> {
    if count == 0 {
        return Err(Error::InvalidArgument("Batch target list cannot be empty".to_string()));
    }
    if count > BATCH_LIMIT {
        return Err(Error::BatchLimit {
            count,
            max: BATCH_LIMIT,
        });
    }
    Ok(())
}

/// A JSONP callback only makes sense for JSON output.
pub fn validate_callback(format: Format, callback: Option<&str>) -> Result<()> {
    if callback.is_some() && format != Format::Json {
        return Err(Error::InvalidArgument(
            "callback parameter only works with JSON format".to_string(),
        ));
    }
    Ok(())
}

/// Append `segments` to `base`, percent-encoding each one.
pub fn endpoint_url(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| Error::Configuration(format!("Base URL '{}' cannot carry a path", base)))?;
        path.pop_if_empty();
        path.extend(segments);
    }
    Ok(url)
}

/// Path segments for a single lookup: `/{format}` or `/{format}/{target}`.
pub fn lookup_segments(format: Format, target: Option<&str>) -> Vec<&str> {
    match target {
        Some(target) if !target.is_empty() => vec![format.as_str(), target],
        _ => vec![format.as_str()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Url {
        Url::parse("http://ip-api.com").unwrap()
    }

    #[test]
    fn test_lookup_url_with_target() {
        let url = endpoint_url(&base(), &lookup_segments(Format::Json, Some("8.8.8.8"))).unwrap();
        assert_eq!(url.as_str(), "http://ip-api.com/json/8.8.8.8");
    }

    #[test]
    fn test_lookup_url_for_caller() {
        let url = endpoint_url(&base(), &lookup_segments(Format::Csv, None)).unwrap();
        assert_eq!(url.as_str(), "http://ip-api.com/csv");
    }

    #[test]
    fn test_url_keeps_base_path() {
        let base = Url::parse("http://127.0.0.1:9000/proxy/").unwrap();
        let url = endpoint_url(&base, &[BATCH_PATH]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9000/proxy/batch");
    }

    #[test]
    fn test_target_is_encoded_as_one_segment() {
        let url = endpoint_url(&base(), &lookup_segments(Format::Json, Some("a/b"))).unwrap();
        assert_eq!(url.as_str(), "http://ip-api.com/json/a%2Fb");
    }

    #[test]
    fn test_query_params_order() {
        let params = QueryParams::new()
            .fields(Some("country,query".to_string()))
            .callback(Some("cb1"))
            .lang(Some("de"))
            .key(None);
        assert_eq!(
            params.as_pairs(),
            [
                ("fields", "country,query".to_string()),
                ("callback", "cb1".to_string()),
                ("lang", "de".to_string()),
            ]
        );
    }

    #[test]
    fn test_batch_item_serialization() {
        let items = batch_items(&["8.8.8.8", "example.com"], Some("status,query"), None);
        assert_eq!(
            serde_json::to_value(&items).unwrap(),
            json!([
                {"query": "8.8.8.8", "fields": "status,query"},
                {"query": "example.com", "fields": "status,query"}
            ])
        );

        let items = batch_items(&["1.1.1.1"], None, Some("ja"));
        assert_eq!(serde_json::to_value(&items).unwrap(), json!([{"query": "1.1.1.1", "lang": "ja"}]));
    }

    #[test]
    fn test_batch_size_bounds() {
        assert!(matches!(validate_batch_size(0), Err(Error::InvalidArgument(_))));
        assert!(validate_batch_size(1).is_ok());
        assert!(validate_batch_size(100).is_ok());
        assert!(matches!(
            validate_batch_size(101),
            Err(Error::BatchLimit { count: 101, max: 100 })
        ));
    }

    #[test]
    fn test_callback_requires_json() {
        assert!(validate_callback(Format::Json, Some("cb1")).is_ok());
        assert!(validate_callback(Format::Xml, None).is_ok());
        assert!(matches!(
            validate_callback(Format::Xml, Some("cb1")),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("line".parse::<Format>().unwrap(), Format::Line);
        assert!("yaml".parse::<Format>().is_err());
    }
}
