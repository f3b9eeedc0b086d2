//! Test doubles for the worker: an in-memory network and a fixture builder.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use swcache_client::Network;
use swcache_core::{AppConfig, CacheDb, Error, ManualClock, Request, Response};

use super::Worker;

pub const T0: i64 = 1_700_000_000_000;
pub const ORIGIN: &str = "http://localhost:5000";

/// A scripted network: known paths answer 200, unknown paths 404.
#[derive(Default)]
pub struct MockNetwork {
    responses: Mutex<HashMap<String, Response>>,
    failing: Mutex<HashSet<String>>,
    offline: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl MockNetwork {
    /// Serves the default static asset set.
    pub fn site() -> Self {
        let network = Self::default();
        for path in AppConfig::default().static_urls {
            network.serve(&path, &format!("body of {path}"));
        }
        network
    }

    fn url(path: &str) -> String {
        format!("{ORIGIN}{path}")
    }

    pub fn serve(&self, path: &str, body: &str) {
        let url = Self::url(path);
        let response = Response::text(url.clone(), body);
        self.respond(path, response);
    }

    pub fn respond(&self, path: &str, response: Response) {
        self.responses.lock().unwrap().insert(Self::url(path), response);
    }

    /// Reject every fetch of `path`.
    pub fn fail(&self, path: &str) {
        self.failing.lock().unwrap().insert(Self::url(path));
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls_for(&self, path: &str) -> usize {
        let url = Self::url(path);
        self.calls.lock().unwrap().iter().filter(|c| **c == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Network for MockNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let url = request.url.to_string();
        self.calls.lock().unwrap().push(url.clone());

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network("offline".into()));
        }
        if self.failing.lock().unwrap().contains(&url) {
            return Err(Error::Network(format!("connection refused: {url}")));
        }

        let response = self.responses.lock().unwrap().get(&url).cloned();
        Ok(response.unwrap_or_else(|| Response { status: 404, ..Response::text(url, "not found") }))
    }
}

pub struct Fixture {
    pub worker: Arc<Worker>,
    pub network: Arc<MockNetwork>,
    pub clock: ManualClock,
}

impl Fixture {
    /// Install then activate.
    pub async fn activated(self) -> Self {
        self.worker.install().await.unwrap();
        self.worker.activate().await.unwrap();
        self
    }
}

pub async fn fixture() -> Fixture {
    fixture_with(AppConfig::default()).await
}

pub async fn fixture_with(config: AppConfig) -> Fixture {
    let db = CacheDb::open_in_memory().await.unwrap();
    let network = Arc::new(MockNetwork::site());
    let clock = ManualClock::new(T0);
    let worker = Worker::new(&config, db, network.clone(), Arc::new(clock.clone())).unwrap();
    Fixture { worker: Arc::new(worker), network, clock }
}
