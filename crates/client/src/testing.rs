//! Scripted network double for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use swcache_core::{Error, Request, Response};

use crate::fetch::Fetcher;

#[derive(Clone)]
enum Reply {
    Respond { status: u16, headers: Vec<(String, String)>, body: String },
    Fail,
    Delay(Duration, u16, String),
}

/// Serves canned responses per URL and records every call.
///
/// Unknown URLs and any URL while offline fail with `NetworkUnavailable`.
#[derive(Default)]
pub struct ScriptedFetcher {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<String>>,
    offline: AtomicBool,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, status: u16, body: &str) -> &Self {
        self.respond_with_headers(url, status, vec![], body)
    }

    pub fn respond_with_headers(&self, url: &str, status: u16, headers: Vec<(&str, &str)>, body: &str) -> &Self {
        let headers = headers.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        self.replies
            .lock()
            .unwrap()
            .insert(url.to_string(), Reply::Respond { status, headers, body: body.to_string() });
        self
    }

    pub fn fail(&self, url: &str) -> &Self {
        self.replies.lock().unwrap().insert(url.to_string(), Reply::Fail);
        self
    }

    pub fn delay(&self, url: &str, delay: Duration, body: &str) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .insert(url.to_string(), Reply::Delay(delay, 200, body.to_string()));
        self
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of network calls made for exactly `url`.
    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.as_str() == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        self.calls.lock().unwrap().push(request.url.clone());

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::NetworkUnavailable(format!("{}: offline", request.url)));
        }

        let reply = self.replies.lock().unwrap().get(&request.url).cloned();
        match reply {
            Some(Reply::Respond { status, headers, body }) => Ok(Response::new(&request.url, status, headers, body)),
            Some(Reply::Delay(delay, status, body)) => {
                tokio::time::sleep(delay).await;
                Ok(Response::new(&request.url, status, vec![], body))
            }
            Some(Reply::Fail) | None => Err(Error::NetworkUnavailable(format!("{}: connection refused", request.url))),
        }
    }
}
