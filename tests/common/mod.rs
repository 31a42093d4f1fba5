//! Shared harness for the integration suite: tracing setup and a scriptable
//! mock transport.

// Each test binary compiles its own copy and uses a different slice of it.
#![allow(dead_code)]

use async_trait::async_trait;
use petrel_client::connection::Connection;
use petrel_client::error::{Error, Result};
use petrel_client::transport::{ClientTransport, NegotiationResponse};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Helper to initialize tracing for tests.
pub fn init_tracing() {
    static TRACING_INIT: Once = Once::new();
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .init();
    });
}

pub const TEST_CONNECTION_ID: &str = "conn-42";
pub const TEST_CONNECTION_TOKEN: &str = "token-42";

/// A scriptable in-memory transport.
///
/// Counts every contract call, optionally fails either pipeline step, and
/// can gate `start` behind a [`Notify`] so a test can observe the connection
/// mid-attempt. The cancellation token of the most recent `start` is kept so
/// tests can assert the scope was signalled on `stop`.
pub struct MockTransport {
    pub negotiate_calls: AtomicUsize,
    pub start_calls: AtomicUsize,
    pub send_calls: AtomicUsize,
    pub abort_calls: AtomicUsize,
    pub dispose_calls: AtomicUsize,
    fail_negotiate: AtomicBool,
    fail_start: AtomicBool,
    start_gate: Option<Arc<Notify>>,
    sent: Mutex<Vec<String>>,
    last_cancel: Mutex<Option<CancellationToken>>,
}

impl MockTransport {
    fn base() -> Self {
        Self {
            negotiate_calls: AtomicUsize::new(0),
            start_calls: AtomicUsize::new(0),
            send_calls: AtomicUsize::new(0),
            abort_calls: AtomicUsize::new(0),
            dispose_calls: AtomicUsize::new(0),
            fail_negotiate: AtomicBool::new(false),
            fail_start: AtomicBool::new(false),
            start_gate: None,
            sent: Mutex::new(Vec::new()),
            last_cancel: Mutex::new(None),
        }
    }

    pub fn new() -> Arc<Self> {
        Arc::new(Self::base())
    }

    pub fn failing_negotiate() -> Arc<Self> {
        let transport = Self::base();
        transport.fail_negotiate.store(true, Ordering::SeqCst);
        Arc::new(transport)
    }

    pub fn failing_start() -> Arc<Self> {
        let transport = Self::base();
        transport.fail_start.store(true, Ordering::SeqCst);
        Arc::new(transport)
    }

    /// Returns a transport whose `start` parks until the gate is notified.
    pub fn gated_start() -> (Arc<Self>, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let mut transport = Self::base();
        transport.start_gate = Some(gate.clone());
        (Arc::new(transport), gate)
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last_cancel(&self) -> Option<CancellationToken> {
        self.last_cancel.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClientTransport for MockTransport {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn negotiate(&self, _connection: &Connection) -> Result<NegotiationResponse> {
        self.negotiate_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_negotiate.load(Ordering::SeqCst) {
            return Err(Error::Negotiate("scripted negotiate failure".into()));
        }
        Ok(NegotiationResponse {
            connection_id: TEST_CONNECTION_ID.into(),
            connection_token: TEST_CONNECTION_TOKEN.into(),
        })
    }

    async fn start(
        &self,
        _connection: &Connection,
        _initial_data: &str,
        cancel: CancellationToken,
    ) -> Result<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_cancel.lock().unwrap() = Some(cancel);
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(Error::Transport("scripted start failure".into()));
        }
        if let Some(gate) = &self.start_gate {
            gate.notified().await;
        }
        Ok(())
    }

    async fn send(&self, _connection: &Connection, data: &str) -> Result<()> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(data.to_string());
        Ok(())
    }

    fn abort(&self, _connection: &Connection) {
        self.abort_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn dispose(&self) {
        self.dispose_calls.fetch_add(1, Ordering::SeqCst);
    }
}
