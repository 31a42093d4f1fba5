//! 测试辅助工具模块
//! Test utilities module

use crate::connection::Connection;
use crate::error::Result;
use crate::transport::{ClientTransport, NegotiationResponse};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

/// A minimal always-succeeding transport that counts pipeline calls.
///
/// The integration suite carries a richer scriptable mock; this one exists
/// for unit tests that only need to observe how often the orchestrator runs
/// the negotiate + start pipeline.
pub(crate) struct MockTransport {
    negotiate_calls: AtomicUsize,
    start_calls: AtomicUsize,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self {
            negotiate_calls: AtomicUsize::new(0),
            start_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn negotiate_calls(&self) -> usize {
        self.negotiate_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientTransport for MockTransport {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn negotiate(&self, _connection: &Connection) -> Result<NegotiationResponse> {
        self.negotiate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(NegotiationResponse {
            connection_id: "conn-1".into(),
            connection_token: "token-1".into(),
        })
    }

    async fn start(
        &self,
        _connection: &Connection,
        _initial_data: &str,
        _cancel: CancellationToken,
    ) -> Result<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, _connection: &Connection, _data: &str) -> Result<()> {
        Ok(())
    }

    fn abort(&self, _connection: &Connection) {}

    fn dispose(&self) {}
}
