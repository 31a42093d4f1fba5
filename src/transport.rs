//! 核心消费的传输契约，由外部协作者实现。
//! The transport contract consumed by the core, implemented by external
//! collaborators.
//!
//! The core never performs I/O itself: long polling, server-sent events or
//! any future streaming mechanism plug in through [`ClientTransport`]. The
//! core hands each attempt's cancellation token to `start` and guarantees at
//! most one live transport per connection.
//!
//! 核心自身从不执行I/O：长轮询、服务器推送事件或任何未来的流式机制
//! 都通过 [`ClientTransport`] 接入。核心将每次尝试的取消令牌交给
//! `start`，并保证每个连接最多有一个活动的传输。

use crate::connection::Connection;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// The immutable result of the negotiation handshake.
///
/// The orchestrator consumes `connection_id` and `connection_token`; any
/// other negotiate-response fields are opaque to the core and stay with the
/// transport that parsed them.
///
/// 协商握手的不可变结果。
///
/// 编排器消费 `connection_id` 和 `connection_token`；
/// 任何其他协商响应字段对核心都是不透明的，留在解析它们的传输中。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationResponse {
    /// The server-assigned identity of this logical connection.
    /// 服务器分配的此逻辑连接的标识。
    #[serde(rename = "ConnectionId")]
    pub connection_id: String,

    /// The opaque token presented on every subsequent wire operation.
    /// 在后续每次线路操作中出示的不透明令牌。
    #[serde(rename = "ConnectionToken")]
    pub connection_token: String,
}

/// A pluggable streaming mechanism carrying one connection's live stream.
///
/// Implementations run their own read/write loops concurrently with the
/// orchestrator and report inbound traffic through the connection's
/// dispatch hooks (`on_received`, `on_error`, `ensure_reconnecting`, ...).
///
/// 承载一个连接实时流的可插拔流式机制。
///
/// 实现与编排器并发运行自己的读/写循环，并通过连接的分发钩子
/// （`on_received`、`on_error`、`ensure_reconnecting` 等）报告入站流量。
#[async_trait]
pub trait ClientTransport: Send + Sync + 'static {
    /// The transport's wire name, used for logging and negotiation urls.
    /// 传输的线路名称，用于日志记录和协商url。
    fn name(&self) -> &'static str;

    /// Performs the single request/response negotiation exchange.
    /// 执行单次请求/响应的协商交换。
    async fn negotiate(&self, connection: &Connection) -> Result<NegotiationResponse>;

    /// Starts the live stream for an established identity.
    ///
    /// `cancel` belongs to this connect attempt only; in-flight operations
    /// must observe its cancellation and unwind cooperatively.
    ///
    /// 为已建立的标识启动实时流。
    ///
    /// `cancel` 仅属于本次连接尝试；进行中的操作必须观察其取消并协作地退出。
    async fn start(
        &self,
        connection: &Connection,
        initial_data: &str,
        cancel: CancellationToken,
    ) -> Result<()>;

    /// Sends one payload over the live stream.
    /// 通过实时流发送一个负载。
    async fn send(&self, connection: &Connection, data: &str) -> Result<()>;

    /// Best-effort notification to the far end that the connection is going
    /// away. Must be safe to call at any time.
    /// 尽力而为地通知远端连接即将关闭。必须可在任何时刻安全调用。
    fn abort(&self, connection: &Connection);

    /// Releases transport-held resources. Idempotent.
    /// 释放传输持有的资源。幂等。
    fn dispose(&self);
}

/// An outgoing HTTP request as seen by the request-preparation hook.
///
/// Collaborators build the real request from this view after the hook has
/// augmented it with headers or credentials.
///
/// 请求准备钩子所看到的传出HTTP请求。
///
/// 协作者在钩子为其补充头部或凭据之后，从此视图构建真实请求。
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    /// The full request url.
    /// 完整的请求url。
    pub url: String,

    /// Headers to attach to the request.
    /// 要附加到请求的头部。
    pub headers: HashMap<String, String>,
}

impl OutgoingRequest {
    /// Creates a request view for the given url with no headers.
    /// 为给定url创建一个没有头部的请求视图。
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
        }
    }
}

/// The hook collaborators use to augment outgoing requests. The core's
/// default is a no-op.
/// 协作者用于补充传出请求的钩子。核心的默认实现是空操作。
pub type RequestPreparer = dyn Fn(&mut OutgoingRequest) + Send + Sync;
