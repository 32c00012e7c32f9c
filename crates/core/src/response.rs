//! Request and response values that flow through the worker.
//!
//! A [`Response`] is deliberately not `Clone`. Its body is treated as a
//! single-read stream: the only way to obtain a second copy is
//! [`Response::tee`], which consumes the original and hands back two owned
//! values, one for the caller and one for storage.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// An intercepted request as seen by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub url: String,
    /// Navigation requests bring an uncontrolled client under control.
    pub navigate: bool,
}

impl Request {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self { method: method.into(), url: url.into(), navigate: false }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    /// A top-level page navigation.
    pub fn navigate(url: impl Into<String>) -> Self {
        Self { navigate: true, ..Self::get(url) }
    }
}

/// A response body plus the metadata the cache keeps alongside it.
#[derive(Debug, PartialEq, Eq)]
pub struct Response {
    url: String,
    status: u16,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl Response {
    pub fn new(url: impl Into<String>, status: u16, headers: Vec<(String, String)>, body: impl Into<Bytes>) -> Self {
        Self { url: url.into(), status, headers, body: body.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// Case-insensitive header lookup; returns the first value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Only complete `200` responses that do not forbid storage are persisted.
    pub fn is_cacheable(&self) -> bool {
        if self.status != 200 {
            return false;
        }
        match self.header("cache-control") {
            Some(cc) => !cc.split(',').any(|d| d.trim().eq_ignore_ascii_case("no-store")),
            None => true,
        }
    }

    /// Split into a live copy and a storage copy.
    ///
    /// Consumes `self`, so the original can never be read again after either
    /// copy has been handed out.
    pub fn tee(self) -> (Response, Response) {
        let copy = Response {
            url: self.url.clone(),
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
        };
        (self, copy)
    }
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Network,
    Cache,
}
