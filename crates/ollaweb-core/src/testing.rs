//! Scriptable in-memory engine for tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tokio::sync::{mpsc, watch};

use ollaweb_engine::{ChatRequest, ChunkStream, EngineError, InferenceEngine};

pub(crate) const PULL_LINES: [&str; 4] = [
    "pulling manifest",
    "pulling 8eeb52dfb3bb 100%",
    "verifying sha256 digest",
    "success",
];

/// Sets a flag when dropped; lives inside the chat stream state.
struct ReleaseFlag(Arc<AtomicBool>);

impl Drop for ReleaseFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

pub(crate) struct FakeEngine {
    pub spawn_calls: AtomicUsize,
    pub health_calls: AtomicUsize,
    /// Number of upcoming spawns that fail.
    pub spawn_failures: AtomicUsize,
    pub list_fails: AtomicBool,
    /// Listings park after taking their snapshot while set.
    hold_listings: AtomicBool,
    parked_listings: AtomicUsize,
    installed: Mutex<HashSet<String>>,
    pull_calls: Mutex<Vec<String>>,
    failing: Mutex<HashMap<String, String>>,
    /// Pulls park after their first line while their model is held.
    hold_all: AtomicBool,
    held: Mutex<HashSet<String>>,
    gate: watch::Sender<u64>,
    chunks: Mutex<Vec<String>>,
    chunk_delay: Mutex<Duration>,
    fail_after: Mutex<Option<usize>>,
    pub chat_produced: Arc<AtomicUsize>,
    pub chat_released: Arc<AtomicBool>,
    last_chat: Mutex<Option<ChatRequest>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(0);
        Self {
            spawn_calls: AtomicUsize::new(0),
            health_calls: AtomicUsize::new(0),
            spawn_failures: AtomicUsize::new(0),
            list_fails: AtomicBool::new(false),
            hold_listings: AtomicBool::new(false),
            parked_listings: AtomicUsize::new(0),
            installed: Mutex::new(HashSet::new()),
            pull_calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashMap::new()),
            hold_all: AtomicBool::new(false),
            held: Mutex::new(HashSet::new()),
            gate,
            chunks: Mutex::new(vec!["Hello".to_string(), ", ".to_string(), "world".to_string()]),
            chunk_delay: Mutex::new(Duration::ZERO),
            fail_after: Mutex::new(None),
            chat_produced: Arc::new(AtomicUsize::new(0)),
            chat_released: Arc::new(AtomicBool::new(false)),
            last_chat: Mutex::new(None),
        }
    }

    pub fn with_installed(self, model: &str) -> Self {
        self.installed.lock().unwrap().insert(model.to_string());
        self
    }

    pub fn with_failing_pull(self, model: &str, reason: &str) -> Self {
        self.failing
            .lock()
            .unwrap()
            .insert(model.to_string(), reason.to_string());
        self
    }

    pub fn with_chunks(self, chunks: &[&str], delay: Duration) -> Self {
        *self.chunks.lock().unwrap() = chunks.iter().map(|c| c.to_string()).collect();
        *self.chunk_delay.lock().unwrap() = delay;
        self
    }

    pub fn with_chat_failure_after(self, chunks: usize) -> Self {
        *self.fail_after.lock().unwrap() = Some(chunks);
        self
    }

    pub fn hold_pulls(&self) {
        self.hold_all.store(true, Ordering::SeqCst);
        self.bump_gate();
    }

    pub fn release_pulls(&self) {
        self.hold_all.store(false, Ordering::SeqCst);
        self.bump_gate();
    }

    pub fn hold(&self, model: &str) {
        self.held.lock().unwrap().insert(model.to_string());
        self.bump_gate();
    }

    pub fn release(&self, model: &str) {
        self.held.lock().unwrap().remove(model);
        self.bump_gate();
    }

    pub fn hold_listings(&self) {
        self.hold_listings.store(true, Ordering::SeqCst);
        self.bump_gate();
    }

    pub fn release_listings(&self) {
        self.hold_listings.store(false, Ordering::SeqCst);
        self.bump_gate();
    }

    /// Listings currently parked with a snapshot in hand.
    pub fn parked_listings(&self) -> usize {
        self.parked_listings.load(Ordering::SeqCst)
    }

    fn bump_gate(&self) {
        self.gate.send_modify(|version| *version += 1);
    }

    fn is_held(&self, model: &str) -> bool {
        self.hold_all.load(Ordering::SeqCst) || self.held.lock().unwrap().contains(model)
    }

    pub fn pull_calls(&self) -> Vec<String> {
        self.pull_calls.lock().unwrap().clone()
    }

    pub fn last_chat(&self) -> Option<ChatRequest> {
        self.last_chat.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceEngine for FakeEngine {
    fn spawn_server(&self) -> Result<(), EngineError> {
        self.spawn_calls.fetch_add(1, Ordering::SeqCst);
        let failures = self.spawn_failures.load(Ordering::SeqCst);
        if failures > 0 {
            self.spawn_failures.store(failures - 1, Ordering::SeqCst);
            return Err(EngineError::SpawnFailed("ollama: not found".to_string()));
        }
        Ok(())
    }

    async fn health(&self) -> Result<(), EngineError> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_installed(&self) -> Result<Vec<String>, EngineError> {
        if self.list_fails.load(Ordering::SeqCst) {
            return Err(EngineError::ServerNotRunning("http://127.0.0.1:11434".to_string()));
        }
        let mut models: Vec<String> = self.installed.lock().unwrap().iter().cloned().collect();
        models.sort();

        let mut gate = self.gate.subscribe();
        if self.hold_listings.load(Ordering::SeqCst) {
            self.parked_listings.fetch_add(1, Ordering::SeqCst);
            while self.hold_listings.load(Ordering::SeqCst) {
                if gate.changed().await.is_err() {
                    break;
                }
            }
            self.parked_listings.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(models)
    }

    async fn pull(&self, model: &str, progress: mpsc::Sender<String>) -> Result<(), EngineError> {
        self.pull_calls.lock().unwrap().push(model.to_string());

        let _ = progress.send(PULL_LINES[0].to_string()).await;

        let mut gate = self.gate.subscribe();
        while self.is_held(model) {
            if gate.changed().await.is_err() {
                break;
            }
        }

        let failure = self.failing.lock().unwrap().get(model).cloned();
        if let Some(reason) = failure {
            let _ = progress.send(format!("Error: {}", reason)).await;
            return Err(EngineError::PullFailed(reason));
        }

        for line in &PULL_LINES[1..] {
            let _ = progress.send(line.to_string()).await;
        }
        self.installed.lock().unwrap().insert(model.to_string());
        Ok(())
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChunkStream, EngineError> {
        *self.last_chat.lock().unwrap() = Some(request);

        let chunks = self.chunks.lock().unwrap().clone();
        let delay = *self.chunk_delay.lock().unwrap();
        let fail_after = *self.fail_after.lock().unwrap();
        let produced = self.chat_produced.clone();
        self.chat_released.store(false, Ordering::SeqCst);
        let flag = ReleaseFlag(self.chat_released.clone());

        let stream = stream::unfold((0usize, flag), move |(index, flag)| {
            let chunks = chunks.clone();
            let produced = produced.clone();
            async move {
                if fail_after == Some(index) {
                    let err = EngineError::Stream("connection reset by peer".to_string());
                    return Some((Err(err), (usize::MAX, flag)));
                }
                let chunk = chunks.get(index)?.clone();
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                produced.fetch_add(1, Ordering::SeqCst);
                Some((Ok(chunk), (index + 1, flag)))
            }
        });

        Ok(stream.boxed())
    }
}
