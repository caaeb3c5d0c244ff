//! HTTP request building.
//!
//! Requests keep their query parameters and body structured so the encoding
//! stage of a pipeline can serialize them; the adapter only accepts requests
//! that went through that stage (see [`Request::is_encoded`]).
//!
//! # Example
//!
//! ```
//! use tether_core::{Request, Method};
//!
//! let request = Request::builder(Method::Get, "https://api.example.com".parse().unwrap())
//!     .header("Accept", "application/json")
//!     .query("page", "1")
//!     .build();
//! assert!(!request.is_encoded());
//! ```

use crate::{Body, Headers, Method, find_header, insert_header};

/// An HTTP request with method, URL, pending query pairs, headers, and optional body.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: url::Url,
    query: Vec<(String, String)>,
    headers: Headers,
    body: Option<Body>,
}

impl Request {
    /// Creates a new [`RequestBuilder`].
    #[must_use]
    pub fn builder(method: Method, url: url::Url) -> RequestBuilder {
        RequestBuilder::new(method, url)
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Request URL.
    #[must_use]
    pub fn url(&self) -> &url::Url {
        &self.url
    }

    /// Mutable access to the URL.
    #[must_use]
    pub fn url_mut(&mut self) -> &mut url::Url {
        &mut self.url
    }

    /// Query pairs not yet serialized into the URL.
    #[must_use]
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Mutable access to headers.
    #[must_use]
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Single header value by name, ignoring case.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Set a header, replacing any entry that differs only by case.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        insert_header(&mut self.headers, name, value);
    }

    /// Request body.
    #[must_use]
    pub const fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// Returns `true` when the query pairs live in the URL and the body is bytes.
    #[must_use]
    pub fn is_encoded(&self) -> bool {
        self.query.is_empty() && self.body.as_ref().is_none_or(Body::is_encoded)
    }

    /// Consume into (method, url, query, headers, body).
    #[must_use]
    pub fn into_parts(
        self,
    ) -> (
        Method,
        url::Url,
        Vec<(String, String)>,
        Headers,
        Option<Body>,
    ) {
        (self.method, self.url, self.query, self.headers, self.body)
    }

    /// Reassemble a request from its parts.
    #[must_use]
    pub fn from_parts(
        method: Method,
        url: url::Url,
        query: Vec<(String, String)>,
        headers: Headers,
        body: Option<Body>,
    ) -> Self {
        Self {
            method,
            url,
            query,
            headers,
            body,
        }
    }
}

/// Builder for constructing [`Request`] instances.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    method: Method,
    url: url::Url,
    query: Vec<(String, String)>,
    headers: Headers,
    body: Option<Body>,
}

impl RequestBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new(method: Method, url: url::Url) -> Self {
        Self {
            method,
            url,
            query: Vec::new(),
            headers: Headers::new(),
            body: None,
        }
    }

    /// Sets a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        insert_header(&mut self.headers, name, value);
        self
    }

    /// Sets multiple headers.
    #[must_use]
    pub fn headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        for (name, value) in headers {
            insert_header(&mut self.headers, name, value);
        }
        self
    }

    /// Adds a query parameter, serialized later by the encoding stage.
    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Adds multiple query parameters.
    #[must_use]
    pub fn query_pairs(mut self, pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        self.query.extend(pairs);
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets the request body if one is given.
    #[must_use]
    pub fn maybe_body(mut self, body: Option<Body>) -> Self {
        self.body = body;
        self
    }

    /// Builds the [`Request`].
    #[must_use]
    pub fn build(self) -> Request {
        Request {
            method: self.method,
            url: self.url,
            query: self.query,
            headers: self.headers,
            body: self.body,
        }
    }
}
