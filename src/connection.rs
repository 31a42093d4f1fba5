//! 连接编排器：驱动 协商 → 启动传输 → 已连接 流水线。
//! The connection orchestrator: drives the negotiate → start-transport →
//! connected pipeline.
//!
//! A [`Connection`] owns exactly one logical session's lifecycle. Concurrent
//! `start`/`stop` calls are serialized by a dedicated async lock, state is
//! mutated only through the compare-and-swap state machine, and each connect
//! attempt owns a fresh cancellation scope that ties the transport's
//! in-flight operations to the attempt's lifetime.
//!
//! [`Connection`] 恰好拥有一个逻辑会话的生命周期。并发的 `start`/`stop`
//! 调用由专用的异步锁串行化，状态只通过比较并交换状态机改变，
//! 每次连接尝试拥有一个全新的取消作用域，将传输的进行中操作与
//! 该次尝试的生命周期绑定。

use crate::{
    config::ConnectionConfig,
    error::{Error, Result},
    events::ConnectionEvents,
    state::{ConnectionState, StateMachine},
    transport::{ClientTransport, OutgoingRequest, RequestPreparer},
};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Session identity assigned by negotiation and cleared on disconnect.
/// 由协商分配并在断开连接时清除的会话标识。
#[derive(Debug, Clone, Default)]
struct SessionIdentity {
    connection_id: String,
    connection_token: String,
    groups_token: String,
    last_message_id: String,
}

/// The shared result of one connect attempt.
///
/// Every caller that joins an in-flight `start` receives a clone of the same
/// operation; `wait` suspends until the negotiate + transport-start pipeline
/// resolves and then yields the shared outcome.
///
/// 一次连接尝试的共享结果。
///
/// 每个加入进行中 `start` 的调用者都会收到同一操作的克隆；
/// `wait` 挂起直到 协商 + 传输启动 流水线完成，然后产出共享的结果。
#[derive(Debug, Clone)]
pub struct ConnectOperation {
    outcome: watch::Receiver<Option<Result<()>>>,
}

impl ConnectOperation {
    fn channel() -> (watch::Sender<Option<Result<()>>>, Self) {
        let (tx, rx) = watch::channel(None);
        (tx, Self { outcome: rx })
    }

    fn resolved(result: Result<()>) -> Self {
        let (_tx, rx) = watch::channel(Some(result));
        Self { outcome: rx }
    }

    /// Waits for the attempt to resolve and returns its outcome.
    /// 等待尝试完成并返回其结果。
    pub async fn wait(&self) -> Result<()> {
        let mut outcome = self.outcome.clone();
        let resolved = outcome
            .wait_for(|value| value.is_some())
            .await
            .map_err(|_| Error::ChannelClosed)?;
        match resolved.as_ref() {
            Some(result) => result.clone(),
            None => Err(Error::ChannelClosed),
        }
    }

    /// Whether the attempt has already resolved.
    /// 尝试是否已经完成。
    pub fn is_resolved(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// Whether two handles observe the same underlying attempt.
    /// 两个句柄是否观察同一个底层尝试。
    pub fn same_operation(&self, other: &Self) -> bool {
        self.outcome.same_channel(&other.outcome)
    }
}

struct ConnectionInner {
    /// Normalized to end with `/`. Immutable after construction.
    /// 规范化为以 `/` 结尾。构造后不可变。
    url: String,
    config: ConnectionConfig,
    session: Mutex<SessionIdentity>,
    state: StateMachine,
    /// The currently bound transport; replaced, never mutated, on each start.
    /// 当前绑定的传输；每次启动时被替换，从不被修改。
    transport: Mutex<Option<Arc<dyn ClientTransport>>>,
    /// The cancellation scope of the active connect attempt.
    /// 活动连接尝试的取消作用域。
    cancel: Mutex<Option<CancellationToken>>,
    /// The pending result of the current negotiate+start pipeline.
    /// 当前 协商+启动 流水线的待定结果。
    connect_op: Mutex<Option<ConnectOperation>>,
    /// Serializes start/stop bookkeeping. Held across stop's await.
    /// 串行化 start/stop 的簿记。在 stop 的等待期间保持持有。
    start_stop: tokio::sync::Mutex<()>,
    prepare_request: Mutex<Option<Box<RequestPreparer>>>,
    events: ConnectionEvents,
}

/// A cheaply cloneable handle to one logical connection.
///
/// All clones observe the same lifecycle; transports keep a clone to call the
/// dispatch hooks from their read loops.
///
/// 一个可廉价克隆的逻辑连接句柄。
///
/// 所有克隆观察同一生命周期；传输保留一个克隆以便从其读取循环调用分发钩子。
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Clone for Connection {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Connection {
    /// Creates a connection to the given base url with default configuration.
    /// 使用默认配置创建到给定基础url的连接。
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_config(url, ConnectionConfig::default())
    }

    /// Creates a connection with explicit configuration.
    ///
    /// Fails synchronously with [`Error::EmptyUrl`] when `url` is empty. The
    /// url is normalized to end with a path separator.
    ///
    /// 使用显式配置创建连接。
    ///
    /// 当 `url` 为空时同步失败并返回 [`Error::EmptyUrl`]。
    /// url 会被规范化为以路径分隔符结尾。
    pub fn with_config(url: impl Into<String>, config: ConnectionConfig) -> Result<Self> {
        let mut url = url.into();
        if url.is_empty() {
            return Err(Error::EmptyUrl);
        }
        if !url.ends_with('/') {
            url.push('/');
        }

        Ok(Self {
            inner: Arc::new(ConnectionInner {
                url,
                config,
                session: Mutex::new(SessionIdentity::default()),
                state: StateMachine::new(),
                transport: Mutex::new(None),
                cancel: Mutex::new(None),
                connect_op: Mutex::new(None),
                start_stop: tokio::sync::Mutex::new(()),
                prepare_request: Mutex::new(None),
                events: ConnectionEvents::default(),
            }),
        })
    }

    /// The normalized base url.
    /// 规范化的基础url。
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// The protocol version exchanged with the server.
    /// 与服务器交换的协议版本。
    pub fn protocol_version(&self) -> &str {
        &self.inner.config.protocol_version
    }

    /// The caller-supplied query string, stored verbatim.
    /// 调用者提供的查询字符串，按原样存储。
    pub fn query_string(&self) -> &str {
        &self.inner.config.query_string
    }

    /// The current lifecycle state.
    /// 当前生命周期状态。
    pub fn state(&self) -> ConnectionState {
        self.inner.state.current()
    }

    /// The server-assigned connection id. Empty until negotiation succeeds.
    /// 服务器分配的连接id。协商成功前为空。
    pub fn connection_id(&self) -> String {
        lock(&self.inner.session).connection_id.clone()
    }

    /// The server-assigned connection token. Empty until negotiation succeeds.
    /// 服务器分配的连接令牌。协商成功前为空。
    pub fn connection_token(&self) -> String {
        lock(&self.inner.session).connection_token.clone()
    }

    /// The groups token last reported by the transport.
    /// 传输最后报告的组令牌。
    pub fn groups_token(&self) -> String {
        lock(&self.inner.session).groups_token.clone()
    }

    /// The id of the last message observed by the transport.
    /// 传输观察到的最后一条消息的id。
    pub fn last_message_id(&self) -> String {
        lock(&self.inner.session).last_message_id.clone()
    }

    /// Updates the groups token. Called by transports while streaming.
    /// 更新组令牌。由传输在流式传输期间调用。
    pub fn set_groups_token(&self, groups_token: impl Into<String>) {
        lock(&self.inner.session).groups_token = groups_token.into();
    }

    /// Updates the last observed message id. Called by transports while
    /// streaming.
    /// 更新最后观察到的消息id。由传输在流式传输期间调用。
    pub fn set_last_message_id(&self, message_id: impl Into<String>) {
        lock(&self.inner.session).last_message_id = message_id.into();
    }

    /// The currently bound transport, if any.
    /// 当前绑定的传输（如果有）。
    pub fn transport(&self) -> Option<Arc<dyn ClientTransport>> {
        lock(&self.inner.transport).clone()
    }

    /// The connection's notification channels.
    /// 连接的通知通道。
    pub fn events(&self) -> &ConnectionEvents {
        &self.inner.events
    }

    /// Installs the request-preparation hook applied to every outgoing wire
    /// operation. Replaces the default no-op.
    /// 安装应用于每次传出线路操作的请求准备钩子。替换默认的空操作。
    pub fn set_request_preparer(
        &self,
        preparer: impl Fn(&mut OutgoingRequest) + Send + Sync + 'static,
    ) {
        *lock(&self.inner.prepare_request) = Some(Box::new(preparer));
    }

    /// Lets collaborators augment an outgoing request before it hits the
    /// wire. No-op unless a preparer was installed.
    /// 让协作者在传出请求上线之前对其进行补充。未安装准备器时为空操作。
    pub fn prepare_request(&self, request: &mut OutgoingRequest) {
        if let Some(preparer) = lock(&self.inner.prepare_request).as_ref() {
            preparer(request);
        }
    }

    /// Starts the connection over the given transport and waits for the
    /// negotiate + transport-start pipeline to resolve.
    ///
    /// Idempotent under race: when another `start` already owns the attempt
    /// (or the connection is live) this joins the existing operation instead
    /// of starting a second one.
    ///
    /// 通过给定的传输启动连接，并等待 协商 + 传输启动 流水线完成。
    ///
    /// 竞争下幂等：当另一个 `start` 已拥有该尝试（或连接已活动）时，
    /// 这会加入既有操作而不是启动第二个。
    pub async fn start(&self, transport: Arc<dyn ClientTransport>) -> Result<()> {
        self.begin_start(transport).await.wait().await
    }

    /// Performs the bookkeeping half of [`Connection::start`] and returns the
    /// shared in-flight operation without waiting on it.
    ///
    /// 执行 [`Connection::start`] 的簿记部分，并在不等待的情况下返回共享的
    /// 进行中操作。
    pub async fn begin_start(&self, transport: Arc<dyn ClientTransport>) -> ConnectOperation {
        let _guard = self.inner.start_stop.lock().await;

        if !self.change_state(ConnectionState::Disconnected, ConnectionState::Connecting) {
            // Another operation owns the transition. Discard this attempt and
            // join the winner's; its transport and cancellation scope stay
            // untouched.
            trace!(state = ?self.state(), "start joined an existing attempt");
            if let Some(existing) = lock(&self.inner.connect_op).clone() {
                return existing;
            }
            return ConnectOperation::resolved(Ok(()));
        }

        debug!(
            url = %self.inner.url,
            transport = transport.name(),
            "starting connection"
        );

        let cancel = CancellationToken::new();
        *lock(&self.inner.transport) = Some(Arc::clone(&transport));
        *lock(&self.inner.cancel) = Some(cancel.clone());

        let (tx, operation) = ConnectOperation::channel();
        *lock(&self.inner.connect_op) = Some(operation.clone());

        let connection = self.clone();
        tokio::spawn(async move {
            let outcome = connection.run_connect_pipeline(transport, cancel).await;
            if let Err(error) = &outcome {
                debug!(%error, "connect attempt failed");
            }
            let _ = tx.send(Some(outcome));
        });

        operation
    }

    /// Negotiate, record the session identity, then start the transport.
    ///
    /// A failed step leaves the state where the failure found it; the caller
    /// resolves the half-open attempt with [`Connection::stop`].
    ///
    /// 先协商，记录会话标识，然后启动传输。
    ///
    /// 失败的步骤将状态保留在失败发生时的样子；
    /// 调用者通过 [`Connection::stop`] 解决半开的尝试。
    async fn run_connect_pipeline(
        &self,
        transport: Arc<dyn ClientTransport>,
        cancel: CancellationToken,
    ) -> Result<()> {
        trace!(transport = transport.name(), "negotiating");
        let response = transport.negotiate(self).await?;

        {
            let mut session = lock(&self.inner.session);
            session.connection_id = response.connection_id;
            session.connection_token = response.connection_token;
        }
        debug!(
            connection_id = %self.connection_id(),
            "negotiation complete, starting transport"
        );

        transport.start(self, "", cancel).await?;

        self.change_state(ConnectionState::Connecting, ConnectionState::Connected);
        Ok(())
    }

    /// Sends a pre-serialized payload over the live transport.
    ///
    /// Fails synchronously, without touching the transport, while
    /// `Disconnected` ([`Error::NotStarted`]) or `Connecting`
    /// ([`Error::NotEstablished`]).
    ///
    /// 通过活动传输发送预序列化的负载。
    ///
    /// 在 `Disconnected`（[`Error::NotStarted`]）或 `Connecting`
    /// （[`Error::NotEstablished`]）状态下同步失败，不触碰传输。
    pub async fn send(&self, data: &str) -> Result<()> {
        match self.state() {
            ConnectionState::Disconnected => Err(Error::NotStarted),
            ConnectionState::Connecting => Err(Error::NotEstablished),
            ConnectionState::Connected | ConnectionState::Reconnecting => {
                let transport = self.transport().ok_or(Error::NotStarted)?;
                transport.send(self, data).await
            }
        }
    }

    /// Serializes a structured payload to JSON and sends it.
    /// 将结构化负载序列化为JSON并发送。
    pub async fn send_json<T: Serialize>(&self, payload: &T) -> Result<()> {
        let data = serde_json::to_string(payload).map_err(|e| Error::Serialize(e.to_string()))?;
        self.send(&data).await
    }

    /// Stops the connection.
    ///
    /// Waits for any in-flight connect attempt to resolve (absorbing its
    /// failure — the connection is being torn down regardless), then cancels
    /// the attempt's scope, aborts the transport, transitions to
    /// `Disconnected` and disposes the transport. Safe to call when already
    /// disconnected.
    ///
    /// 停止连接。
    ///
    /// 等待任何进行中的连接尝试完成（吸收其失败——无论如何连接都在被拆除），
    /// 然后取消该尝试的作用域、中止传输、转换到 `Disconnected` 并释放传输。
    /// 已断开时调用是安全的。
    pub async fn stop(&self) {
        let _guard = self.inner.start_stop.lock().await;

        let pending = lock(&self.inner.connect_op).clone();
        if let Some(operation) = pending {
            if let Err(error) = operation.wait().await {
                debug!(%error, "in-flight connect attempt failed while stopping");
            }
        }

        if self.state() == ConnectionState::Disconnected {
            return;
        }

        let transport = self.transport();
        if let Some(cancel) = lock(&self.inner.cancel).take() {
            cancel.cancel();
        }
        if let Some(transport) = &transport {
            transport.abort(self);
        }

        self.disconnect();

        if let Some(transport) = transport {
            transport.dispose();
        }
    }

    /// Attempts the `Connected → Reconnecting` transition on behalf of a
    /// transport that lost its stream but intends to retry.
    ///
    /// Returns whether the connection is now (or already was) reconnecting.
    ///
    /// 代表丢失了流但打算重试的传输尝试 `Connected → Reconnecting` 转换。
    ///
    /// 返回连接现在是否（或先前已经）处于重连状态。
    pub fn ensure_reconnecting(&self) -> bool {
        if self.change_state(ConnectionState::Connected, ConnectionState::Reconnecting) {
            self.inner.events.reconnecting.emit(&());
        }
        self.state() == ConnectionState::Reconnecting
    }

    /// The compare-and-swap transition primitive.
    ///
    /// Succeeds only when the current state equals `from`; on success the
    /// state-changed event fires with the `(old, new)` pair. This is the only
    /// mutator of the connection state.
    ///
    /// 比较并交换的转换原语。
    ///
    /// 仅当当前状态等于 `from` 时成功；成功时以 `(旧, 新)` 状态对触发
    /// 状态变更事件。这是连接状态的唯一修改者。
    pub fn change_state(&self, from: ConnectionState, to: ConnectionState) -> bool {
        match self.inner.state.transition(from, to) {
            Some(change) => {
                debug!(old = ?change.old_state, new = ?change.new_state, "connection state changed");
                self.inner.events.state_changed.emit(&change);
                true
            }
            None => false,
        }
    }

    /// Transitions any live state to `Disconnected`, clearing the session
    /// identity atomically with the transition, then fires the closed event.
    ///
    /// 将任何活动状态转换到 `Disconnected`，并与转换原子地一起清除会话标识，
    /// 然后触发关闭事件。
    fn disconnect(&self) {
        let change = {
            let mut session = lock(&self.inner.session);
            self.inner
                .state
                .force_disconnect(|| *session = SessionIdentity::default())
        };

        if let Some(change) = change {
            info!(old = ?change.old_state, "connection disconnected");
            self.inner.events.state_changed.emit(&change);
            self.inner.events.closed.emit(&());
        }
    }

    /// Delivers an inbound message to the received subscribers.
    ///
    /// A subscriber fault is captured here and redirected into the error
    /// channel; it never unwinds into the transport's read loop and never
    /// stops delivery to the remaining subscribers.
    ///
    /// 将入站消息交付给 received 订阅者。
    ///
    /// 订阅者的故障在此被捕获并重定向到错误通道；
    /// 它永远不会展开到传输的读取循环中，也不会阻止向其余订阅者的交付。
    pub fn on_received(&self, message: &str) {
        let faults = self.inner.events.received.emit(message);
        for fault in faults {
            debug!(error = %fault, "received subscriber raised a fault");
            self.inner.events.error.emit(&fault);
        }
    }

    /// Reports a captured fault to the error subscribers.
    /// 向错误订阅者报告一个被捕获的故障。
    pub fn on_error(&self, error: Error) {
        self.inner.events.error.emit(&error);
    }

    /// Signals that the transport resumed its stream.
    /// 表明传输恢复了其流。
    pub fn on_reconnected(&self) {
        self.inner.events.reconnected.emit(&());
    }

    /// Signals degraded transport responsiveness.
    /// 表明传输响应性下降。
    pub fn on_connection_slow(&self) {
        self.inner.events.connection_slow.emit(&());
    }
}
