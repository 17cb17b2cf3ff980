//! The ip-api.com client.

use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use reqwest::Url;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};

use crate::clock::{Clock, SystemClock};
use crate::config::{ClientConfig, ConfigValidator, Tier};
use crate::error::{Error, Result};
use crate::fields::Fields;
use crate::rate_limiter::{RateClass, RateLimitStatus, RateLimiter};
use crate::request::{self, Format, QueryParams, BATCH_PATH};
use crate::response::{self, Payload, ResponseMetadata};

/// Blocking client for single, batch and DNS lookups.
///
/// All methods take `&self`; the rate windows and the last response
/// metadata sit behind their own locks.
#[derive(Debug)]
pub struct Client {
    config: ClientConfig,
    base_url: Url,
    http: Mutex<Option<HttpClient>>,
    rate_limiter: RateLimiter,
    last_metadata: Mutex<Option<ResponseMetadata>>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Like [`Client::new`], measuring rate windows against `clock`.
    pub fn with_clock(config: ClientConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        ConfigValidator::validate_client_config(&config)?;

        let base_url = Url::parse(config.base_url())
            .map_err(|e| Error::Configuration(format!("Invalid base URL '{}': {}", config.base_url(), e)))?;
        let http = HttpClient::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        tracing::debug!(tier = ?config.tier(), base_url = %base_url, "ip-api client created");

        Ok(Self {
            config,
            base_url,
            http: Mutex::new(Some(http)),
            rate_limiter: RateLimiter::new(clock),
            last_metadata: Mutex::new(None),
        })
    }

    /// Run `f` with a fresh client, closing it afterwards whatever happens.
    pub fn scope<T, F>(config: ClientConfig, f: F) -> Result<T>
    where
        F: FnOnce(&Client) -> Result<T>,
    {
        Client::new(config)?.run_scoped(f)
    }

    fn run_scoped<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Client) -> Result<T>,
    {
        let result = f(self);
        self.close();
        result
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn tier(&self) -> Tier {
        self.config.tier()
    }

    /// Look up `ip`, or the caller's own address when `None`.
    pub fn lookup(
        &self,
        ip: Option<&str>,
        fields: Option<&Fields>,
        format: Format,
        callback: Option<&str>,
    ) -> Result<Payload> {
        request::validate_callback(format, callback)?;
        let params = self.query_params(fields, callback)?;
        let url = request::endpoint_url(&self.base_url, &request::lookup_segments(format, ip))?;
        self.ensure_open()?;
        self.check_rate_limit(RateClass::Single)?;

        let payload = self.send(|http| http.get(url), &params)?;

        if let Some(message) = payload.failure_message() {
            tracing::warn!(ip = ip.unwrap_or("<self>"), message, "lookup failed");
            // The provider reports malformed queries as "invalid query"; this
            // depends on its English wording.
            if message.to_lowercase().contains("invalid") {
                return Err(Error::InvalidIp(message.to_string()));
            }
            return Err(Error::Api(message.to_string()));
        }

        Ok(payload)
    }

    /// Resolve `domain` and geolocate the resulting address. Always JSON.
    pub fn dns_lookup(&self, domain: &str, fields: Option<&Fields>, callback: Option<&str>) -> Result<Payload> {
        let params = self.query_params(fields, callback)?;
        let url = request::endpoint_url(&self.base_url, &[Format::Json.as_str(), domain])?;
        self.ensure_open()?;
        self.check_rate_limit(RateClass::Single)?;

        let payload = self.send(|http| http.get(url), &params)?;

        if let Some(message) = payload.failure_message() {
            tracing::warn!(domain, message, "DNS lookup failed");
            return Err(Error::Api(message.to_string()));
        }

        Ok(payload)
    }

    /// Look up to 100 IP addresses in one request.
    pub fn batch(&self, ips: &[&str], fields: Option<&Fields>) -> Result<Vec<Value>> {
        self.batch_request(ips, fields)
    }

    /// Look up to 100 domains in one request.
    pub fn batch_dns(&self, domains: &[&str], fields: Option<&Fields>) -> Result<Vec<Value>> {
        self.batch_request(domains, fields)
    }

    fn batch_request(&self, targets: &[&str], fields: Option<&Fields>) -> Result<Vec<Value>> {
        request::validate_batch_size(targets.len())?;
        let fields = fields.map(Fields::to_param).transpose()?;
        let body = request::batch_items(targets, fields.as_deref(), self.config.lang_param());
        let params = QueryParams::new().key(self.config.api_key.as_deref());
        let url = request::endpoint_url(&self.base_url, &[BATCH_PATH])?;
        self.ensure_open()?;
        self.check_rate_limit(RateClass::Batch)?;

        match self.send(|http| http.post(url).json(&body), &params)? {
            Payload::Json(Value::Array(results)) => Ok(results),
            _ => Err(Error::InvalidResponse(
                "Expected list response from batch endpoint".to_string(),
            )),
        }
    }

    /// Figures from the most recent successful response, if any.
    pub fn get_rate_limit_info(&self) -> Option<ResponseMetadata> {
        *self.last_metadata.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// State of the local window for `class`. `None` on the pro tier.
    pub fn rate_limit_status(&self, class: RateClass) -> Result<Option<RateLimitStatus>> {
        match self.tier() {
            Tier::Pro => Ok(None),
            Tier::Free => self.rate_limiter.status(class).map(Some),
        }
    }

    /// Forget every request recorded in the local window for `class`.
    pub fn reset_rate_limit(&self, class: RateClass) -> Result<()> {
        match self.tier() {
            Tier::Pro => Ok(()),
            Tier::Free => self.rate_limiter.reset(class),
        }
    }

    /// Release the HTTP session. Further requests fail with [`Error::Closed`].
    pub fn close(&self) {
        let mut http = self.http.lock().unwrap_or_else(PoisonError::into_inner);
        if http.take().is_some() {
            tracing::debug!("ip-api client closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.http.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }

    fn query_params(&self, fields: Option<&Fields>, callback: Option<&str>) -> Result<QueryParams> {
        let fields = fields.map(Fields::to_param).transpose()?;
        Ok(QueryParams::new()
            .fields(fields)
            .callback(callback)
            .lang(self.config.lang_param())
            .key(self.config.api_key.as_deref()))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        Ok(())
    }

    fn check_rate_limit(&self, class: RateClass) -> Result<()> {
        match self.tier() {
            Tier::Pro => Ok(()),
            Tier::Free => self.rate_limiter.check(class),
        }
    }

    fn http(&self) -> Result<HttpClient> {
        let http = self
            .http
            .lock()
            .map_err(|_| Error::Internal("Failed to acquire lock on HTTP session".to_string()))?;
        // reqwest clients are handles onto a shared pool
        http.clone().ok_or(Error::Closed)
    }

    fn send<F>(&self, build: F, params: &QueryParams) -> Result<Payload>
    where
        F: FnOnce(&HttpClient) -> RequestBuilder,
    {
        let http = self.http()?;
        let builder = build(&http).query(params.as_pairs());
        tracing::debug!(params = ?redacted(params), "sending ip-api request");

        let resp = builder.send()?;
        let status = resp.status();
        let headers = resp.headers().clone();
        response::check_status(status, &headers)?;

        let metadata = ResponseMetadata::from_headers(&headers);
        *self
            .last_metadata
            .lock()
            .map_err(|_| Error::Internal("Failed to acquire lock on response metadata".to_string()))? =
            Some(metadata);

        let body = resp.text()?;
        response::decode_body(&headers, body)
    }
}

fn redacted(params: &QueryParams) -> Vec<(&'static str, &str)> {
    params
        .as_pairs()
        .iter()
        .map(|(name, value)| (*name, if *name == "key" { "***" } else { value.as_str() }))
        .collect()
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::RateLimitError;
    use crate::rate_limiter::{BATCH_RATE_LIMIT, SINGLE_RATE_LIMIT};

    // Nothing listens here; tests below must fail before any I/O.
    const UNREACHABLE: &str = "http://127.0.0.1:9";

    fn free_client() -> (Client, ManualClock) {
        let clock = ManualClock::new();
        let config = ClientConfig::default().with_base_url(UNREACHABLE);
        (Client::with_clock(config, Arc::new(clock.clone())).unwrap(), clock)
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = ClientConfig::default().with_lang("klingon");
        assert!(matches!(Client::new(config), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_callback_with_xml_fails_locally() {
        let (client, _clock) = free_client();
        let err = client.lookup(Some("8.8.8.8"), None, Format::Xml, Some("cb1")).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(client.rate_limit_status(RateClass::Single).unwrap().unwrap().used, 0);
    }

    #[test]
    fn test_invalid_fields_fail_locally() {
        let (client, _clock) = free_client();
        let fields = Fields::from(["country", "altitude"]);
        let err = client.lookup(None, Some(&fields), Format::Json, None).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(ref msg) if msg.contains("altitude")));

        let err = client.batch(&["8.8.8.8"], Some(&fields)).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(client.rate_limit_status(RateClass::Batch).unwrap().unwrap().used, 0);
    }

    #[test]
    fn test_batch_size_checked_before_rate_window() {
        let (client, _clock) = free_client();
        assert!(matches!(client.batch(&[], None), Err(Error::InvalidArgument(_))));

        let targets: Vec<String> = (0..101).map(|i| format!("10.0.0.{}", i)).collect();
        let targets: Vec<&str> = targets.iter().map(String::as_str).collect();
        assert!(matches!(
            client.batch_dns(&targets, None),
            Err(Error::BatchLimit { count: 101, max: 100 })
        ));
        assert_eq!(client.rate_limit_status(RateClass::Batch).unwrap().unwrap().used, 0);
    }

    #[test]
    fn test_local_window_exhaustion() {
        let (client, clock) = free_client();
        for _ in 0..SINGLE_RATE_LIMIT {
            client.rate_limiter.check(RateClass::Single).unwrap();
        }

        let err = client.lookup(Some("8.8.8.8"), None, Format::Json, None).unwrap_err();
        assert!(matches!(err, Error::RateLimit(RateLimitError::Local { .. })));
        let err = client.dns_lookup("example.com", None, None).unwrap_err();
        assert!(err.is_rate_limit());

        for _ in 0..BATCH_RATE_LIMIT {
            client.rate_limiter.check(RateClass::Batch).unwrap();
        }
        assert!(client.batch(&["8.8.8.8"], None).unwrap_err().is_rate_limit());

        clock.advance(std::time::Duration::from_secs(60));
        let status = client.rate_limit_status(RateClass::Single).unwrap().unwrap();
        assert_eq!(status.remaining, SINGLE_RATE_LIMIT);
    }

    #[test]
    fn test_pro_tier_has_no_window() {
        let config = ClientConfig::default()
            .with_api_key("secret")
            .with_base_url(UNREACHABLE);
        let client = Client::new(config).unwrap();
        assert_eq!(client.tier(), Tier::Pro);
        assert_eq!(client.rate_limit_status(RateClass::Single).unwrap(), None);
        for _ in 0..(SINGLE_RATE_LIMIT * 2) {
            assert!(client.check_rate_limit(RateClass::Single).is_ok());
        }
    }

    #[test]
    fn test_closed_client() {
        let (client, _clock) = free_client();
        assert!(!client.is_closed());
        client.close();
        client.close();
        assert!(client.is_closed());

        let err = client.lookup(None, None, Format::Json, None).unwrap_err();
        assert!(matches!(err, Error::Closed));
        assert_eq!(client.rate_limit_status(RateClass::Single).unwrap().unwrap().used, 0);
    }

    #[test]
    fn test_no_metadata_before_first_request() {
        let (client, _clock) = free_client();
        assert_eq!(client.get_rate_limit_info(), None);
    }

    #[test]
    fn test_scope_closes_on_error() {
        let config = ClientConfig::default().with_base_url(UNREACHABLE);
        let result: Result<()> = Client::scope(config, |client| {
            client.batch(&[], None)?;
            Ok(())
        });
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_scoped_run_releases_session() {
        let (client, _clock) = free_client();
        let result: Result<()> = client.run_scoped(|client| {
            client.batch(&[], None)?;
            Ok(())
        });
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        assert!(client.is_closed());

        let (client, _clock) = free_client();
        let tier = client.run_scoped(|client| Ok(client.tier())).unwrap();
        assert_eq!(tier, Tier::Free);
        assert!(client.is_closed());
    }

    #[test]
    fn test_close_recovers_poisoned_lock() {
        let (client, _clock) = free_client();
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = client.http.lock().unwrap();
            panic!("poison the session lock");
        }));
        assert!(client.http.is_poisoned());
        assert!(!client.is_closed());

        client.close();
        assert!(client.is_closed());
        assert_eq!(client.get_rate_limit_info(), None);
    }

    #[test]
    fn test_transport_error_hides_api_key() {
        let config = ClientConfig::default()
            .with_api_key("s3cr3tkey")
            .with_base_url(UNREACHABLE);
        let client = Client::new(config).unwrap();

        let err = client.lookup(Some("8.8.8.8"), None, Format::Json, None).unwrap_err();
        assert!(matches!(err, Error::Request(_)));
        assert!(!err.to_string().contains("s3cr3tkey"));

        let err = client.batch(&["8.8.8.8"], None).unwrap_err();
        assert!(!err.to_string().contains("s3cr3tkey"));
    }

    #[test]
    fn test_reset_rate_limit() {
        let (client, _clock) = free_client();
        for _ in 0..BATCH_RATE_LIMIT {
            client.rate_limiter.check(RateClass::Batch).unwrap();
        }
        assert!(client.batch(&["8.8.8.8"], None).unwrap_err().is_rate_limit());

        client.reset_rate_limit(RateClass::Batch).unwrap();
        let status = client.rate_limit_status(RateClass::Batch).unwrap().unwrap();
        assert_eq!(status.remaining, BATCH_RATE_LIMIT);
    }

    #[test]
    fn test_redacts_key() {
        let params = QueryParams::new().lang(Some("de")).key(Some("secret"));
        assert_eq!(redacted(&params), vec![("lang", "de"), ("key", "***")]);
    }
}
