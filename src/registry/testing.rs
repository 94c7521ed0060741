//! In-memory stand-in for an upstream registry.
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;

use super::client::{RegistrySession, Upstream, UpstreamRequest, UpstreamResponse};
use crate::config::Credentials;
use crate::errors::Result;

#[derive(Clone)]
struct Canned {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

#[derive(Default)]
struct State {
    // a key with several queued responses serves them in order, then repeats the last one
    responses: HashMap<(String, String), Vec<Canned>>,
    delays: HashMap<(String, String), Duration>,
    // recorded when the response is produced, after any delay
    calls: Vec<UpstreamRequest>,
}

#[derive(Clone, Default)]
pub struct FakeRegistry {
    state: Arc<Mutex<State>>,
    delay: Option<Duration>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Hold responses for one method and path for `delay`, on top of any global delay.
    pub fn delay_path(&self, method: &str, path: &str, delay: Duration) {
        self.state
            .lock()
            .unwrap()
            .delays
            .insert((method.to_string(), path.to_string()), delay);
    }

    pub fn credentials() -> Credentials {
        Credentials::new("admin", "hunter2")
    }

    pub fn session(&self) -> RegistrySession {
        RegistrySession::new(Arc::new(self.clone()), Some(Self::credentials()))
    }

    pub fn respond(&self, method: &str, path: &str, status: u16, body: &str) {
        self.respond_with_headers(method, path, status, body, &[]);
    }

    pub fn respond_with_link(&self, method: &str, path: &str, status: u16, body: &str, link: &str) {
        self.respond_with_headers(method, path, status, body, &[("link", link)]);
    }

    pub fn respond_with_digest(&self, method: &str, path: &str, status: u16, body: &str, digest: &str) {
        self.respond_with_headers(
            method,
            path,
            status,
            body,
            &[("docker-content-digest", digest)],
        );
    }

    pub fn respond_with_headers(
        &self,
        method: &str,
        path: &str,
        status: u16,
        body: &str,
        headers: &[(&str, &str)],
    ) {
        let mut map = HeaderMap::new();
        for (k, v) in headers {
            map.insert(
                HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        let canned = Canned {
            status: StatusCode::from_u16(status).unwrap(),
            headers: map,
            body: Bytes::from(body.to_string()),
        };
        self.state
            .lock()
            .unwrap()
            .responses
            .entry((method.to_string(), path.to_string()))
            .or_default()
            .push(canned);
    }

    pub fn calls(&self) -> Vec<UpstreamRequest> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_to(&self, method: &str, path: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.method.as_str() == method && c.path == path)
            .count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Upstream for FakeRegistry {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let key = (request.method.to_string(), request.path.clone());
        let path_delay = self.state.lock().unwrap().delays.get(&key).copied();
        for delay in self.delay.into_iter().chain(path_delay) {
            tokio::time::sleep(delay).await;
        }

        let canned = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(request.clone());
            match state.responses.get_mut(&key) {
                Some(queue) if queue.len() > 1 => Some(queue.remove(0)),
                Some(queue) => queue.first().cloned(),
                None => None,
            }
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        Ok(match canned {
            Some(c) => UpstreamResponse {
                status: c.status,
                headers: c.headers,
                body: c.body,
            },
            None => UpstreamResponse {
                status: StatusCode::NOT_FOUND,
                headers: HeaderMap::new(),
                body: Bytes::from_static(
                    br#"{"errors":[{"code":"NAME_UNKNOWN","message":"not registered in fake"}]}"#,
                ),
            },
        })
    }
}
