//! Per-request options applied on top of the shared client

use reqwest::header::ACCEPT;
use reqwest::RequestBuilder;

/// Header carrying the caller's API key
pub const API_KEY_HEADER: &str = "X-API-KEY";

const DEFAULT_ACCEPT: &str = "application/json";

/// Headers and query parameters added to a GET request
///
/// Empty values are skipped, so options can be built straight from optional
/// configuration without checking each field first.
///
/// # Example
///
/// ```
/// use sumi_fetch::fetch::RequestOptions;
///
/// let options = RequestOptions::new()
///     .api_key("secret")
///     .query("owner", "0xabc")
///     .header("X-Trace", "");
/// assert_eq!(options.api_key_value(), Some("secret"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    api_key: Option<String>,
    bearer_token: Option<String>,
    basic_auth: Option<(String, Option<String>)>,
    accept: Option<String>,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends `X-API-KEY: <key>`; an empty key sends nothing
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.api_key = (!key.is_empty()).then_some(key);
        self
    }

    /// Sends `Authorization: Bearer <token>`; an empty token sends nothing
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.bearer_token = (!token.is_empty()).then_some(token);
        self
    }

    /// Sends `Authorization: Basic ...`; an empty user sends nothing
    pub fn basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        let user = user.into();
        let password = password.into();
        self.basic_auth = (!user.is_empty()).then(|| {
            let password = (!password.is_empty()).then_some(password);
            (user, password)
        });
        self
    }

    /// Overrides the default `Accept: application/json`
    pub fn accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    /// Adds an arbitrary header; an empty value is skipped
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.headers.push((name.into(), value));
        }
        self
    }

    /// Appends a query parameter; repeated keys are all sent
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn api_key_value(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Applies the options to a request
    pub(crate) fn apply(&self, mut request: RequestBuilder) -> RequestBuilder {
        request = request.header(ACCEPT, self.accept.as_deref().unwrap_or(DEFAULT_ACCEPT));

        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        if let Some((user, password)) = &self.basic_auth {
            request = request.basic_auth(user, password.as_ref());
        }

        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        if !self.query.is_empty() {
            request = request.query(&self.query);
        }

        request
    }
}
