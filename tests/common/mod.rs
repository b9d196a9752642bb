#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use relaybus::{
    BusConfig, EventData, EventHandler, EventRecord, HandlerError, JitterPolicy, ReconnectPolicy,
};

static TRACING: Once = Once::new();

/// Installs a test-writer subscriber once per test binary (`RUST_LOG` to tune).
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueSet {
    #[serde(flatten)]
    pub record: EventRecord,
    pub value: i64,
}

impl ValueSet {
    pub fn new(value: i64) -> Self {
        Self {
            record: EventRecord::from_source("tests"),
            value,
        }
    }
}

impl EventData for ValueSet {
    const NAME: &'static str = "ValueSet";
    fn record(&self) -> &EventRecord {
        &self.record
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unbound {
    #[serde(flatten)]
    pub record: EventRecord,
}

impl EventData for Unbound {
    const NAME: &'static str = "Unbound";
    fn record(&self) -> &EventRecord {
        &self.record
    }
}

/// Stores the last observed value and counts calls.
#[derive(Default)]
pub struct Tally {
    pub last: Mutex<Option<i64>>,
    pub calls: AtomicUsize,
}

impl Tally {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last(&self) -> Option<i64> {
        *self.last.lock().unwrap()
    }
}

/// Handler forwarding to a shared [`Tally`].
pub struct ValueHandler(pub Arc<Tally>);

#[async_trait]
impl EventHandler<ValueSet> for ValueHandler {
    async fn handle_event(&self, ev: &ValueSet) -> Result<(), HandlerError> {
        *self.0.last.lock().unwrap() = Some(ev.value);
        self.0.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Shared ordered log of handler activity.
#[derive(Default, Clone)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Remote config with short, deterministic reconnect delays.
pub fn fast_config() -> BusConfig {
    BusConfig {
        reconnect: ReconnectPolicy {
            first: Duration::from_millis(10),
            max: Duration::from_millis(50),
            factor: 2.0,
            jitter: JitterPolicy::None,
        },
        ..BusConfig::default()
    }
}

/// Polls `check` until it holds or `within` elapses.
pub async fn wait_until<F>(within: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Awaits `fut` with a timeout, panicking with `what` if it does not finish.
pub async fn within<T>(what: &str, fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .unwrap_or_else(|_| panic!("timed out: {what}"))
}
