//! 生命周期、错误和消息通知的多播分发。
//! Multicast dispatch for lifecycle, error and message notifications.
//!
//! Each channel holds zero or more subscribers and is fired synchronously
//! from a well-defined point in the orchestrator. The handler list is
//! snapshotted before dispatch, so a handler may subscribe, unsubscribe or
//! trigger further transitions without deadlocking.
//!
//! 每个通道持有零个或多个订阅者，并在编排器中定义明确的时刻同步触发。
//! 分发前会对处理器列表做快照，因此处理器可以订阅、退订或触发进一步的
//! 状态转换而不会死锁。

use crate::error::{Error, Result};
use crate::state::StateChange;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A token identifying one registered handler, used to unsubscribe it.
/// 标识一个已注册处理器的令牌，用于退订。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription(u64);

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

fn next_subscription() -> Subscription {
    Subscription(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
}

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A notification channel with zero-or-more infallible subscribers.
///
/// Subscriber faults on these channels propagate to the immediate caller;
/// only the message-delivery channel ([`ReceivedEvent`]) isolates them.
///
/// 具有零个或多个不可失败订阅者的通知通道。
///
/// 这些通道上的订阅者故障会传播给直接调用者；
/// 只有消息交付通道（[`ReceivedEvent`]）会隔离它们。
pub struct Event<T> {
    handlers: Mutex<Vec<(Subscription, Handler<T>)>>,
}

impl<T> Event<T> {
    pub(crate) fn new() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
        }
    }

    /// Registers a handler and returns the token that removes it again.
    /// 注册一个处理器并返回可再次移除它的令牌。
    pub fn subscribe(&self, handler: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let subscription = next_subscription();
        self.lock().push((subscription, Arc::new(handler)));
        subscription
    }

    /// Removes a previously registered handler. Returns whether it was found.
    /// 移除先前注册的处理器。返回是否找到了它。
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut handlers = self.lock();
        let before = handlers.len();
        handlers.retain(|(id, _)| *id != subscription);
        handlers.len() != before
    }

    /// Delivers `value` to every subscriber, synchronously, in subscription
    /// order.
    /// 按订阅顺序同步地将 `value` 交付给每个订阅者。
    pub(crate) fn emit(&self, value: &T) {
        let snapshot: Vec<Handler<T>> =
            self.lock().iter().map(|(_, h)| Arc::clone(h)).collect();
        for handler in snapshot {
            handler(value);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(Subscription, Handler<T>)>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for Event<T> {
    fn default() -> Self {
        Self::new()
    }
}

type FallibleHandler = Arc<dyn Fn(&str) -> Result<()> + Send + Sync>;

/// The message-delivery channel.
///
/// Handlers are fallible; a fault from one handler must not prevent delivery
/// to the remaining handlers or unwind into the transport's read loop, so
/// `emit` collects the faults and hands them back to the dispatch site,
/// which redirects each into the error channel.
///
/// 消息交付通道。
///
/// 处理器是可失败的；一个处理器的故障不得阻止向其余处理器的交付，
/// 也不得展开到传输的读取循环中，因此 `emit` 收集故障并交回分发点，
/// 由分发点将每个故障重定向到错误通道。
pub struct ReceivedEvent {
    handlers: Mutex<Vec<(Subscription, FallibleHandler)>>,
}

impl ReceivedEvent {
    pub(crate) fn new() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
        }
    }

    /// Registers a message handler.
    /// 注册一个消息处理器。
    pub fn subscribe(
        &self,
        handler: impl Fn(&str) -> Result<()> + Send + Sync + 'static,
    ) -> Subscription {
        let subscription = next_subscription();
        self.lock().push((subscription, Arc::new(handler)));
        subscription
    }

    /// Removes a previously registered handler. Returns whether it was found.
    /// 移除先前注册的处理器。返回是否找到了它。
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut handlers = self.lock();
        let before = handlers.len();
        handlers.retain(|(id, _)| *id != subscription);
        handlers.len() != before
    }

    /// Delivers `message` to every subscriber and returns the faults raised
    /// along the way.
    /// 将 `message` 交付给每个订阅者，并返回途中产生的故障。
    pub(crate) fn emit(&self, message: &str) -> Vec<Error> {
        let snapshot: Vec<FallibleHandler> =
            self.lock().iter().map(|(_, h)| Arc::clone(h)).collect();
        let mut faults = Vec::new();
        for handler in snapshot {
            if let Err(fault) = handler(message) {
                faults.push(fault);
            }
        }
        faults
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(Subscription, FallibleHandler)>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ReceivedEvent {
    fn default() -> Self {
        Self::new()
    }
}

/// The seven notification channels of a connection.
///
/// 连接的七个通知通道。
#[derive(Default)]
pub struct ConnectionEvents {
    /// Fired on every successful state transition with the `(old, new)` pair.
    /// 每次成功的状态转换时以 `(旧, 新)` 状态对触发。
    pub state_changed: Event<StateChange>,

    /// Fired for every message arriving from the transport.
    /// 对从传输到达的每条消息触发。
    pub received: ReceivedEvent,

    /// Fired for every captured fault, including faults raised by `received`
    /// subscribers.
    /// 对每个被捕获的故障触发，包括 `received` 订阅者产生的故障。
    pub error: Event<Error>,

    /// Fired on the transition into `Disconnected` from a live state.
    /// 从活动状态转换到 `Disconnected` 时触发。
    pub closed: Event<()>,

    /// Fired on the transition into `Reconnecting`.
    /// 转换到 `Reconnecting` 时触发。
    pub reconnecting: Event<()>,

    /// Fired when the transport signals successful resumption.
    /// 传输发出成功恢复信号时触发。
    pub reconnected: Event<()>,

    /// Fired when the transport signals degraded responsiveness.
    /// 传输发出响应性下降信号时触发。
    pub connection_slow: Event<()>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn emit_reaches_every_subscriber_in_order() {
        let event = Event::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = seen.clone();
        event.subscribe(move |value| first.lock().expect("lock").push(("first", *value)));
        let second = seen.clone();
        event.subscribe(move |value| second.lock().expect("lock").push(("second", *value)));

        event.emit(&7);
        assert_eq!(
            *seen.lock().expect("lock"),
            vec![("first", 7), ("second", 7)]
        );
    }

    #[test]
    fn unsubscribed_handler_is_not_invoked() {
        let event = Event::<()>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let subscription = event.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        event.emit(&());
        assert!(event.unsubscribe(subscription));
        event.emit(&());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // The token is spent; a second removal finds nothing.
        assert!(!event.unsubscribe(subscription));
    }

    #[test]
    fn handler_may_unsubscribe_itself_during_dispatch() {
        let event = Arc::new(Event::<()>::new());
        let slot = Arc::new(Mutex::new(None::<Subscription>));

        let event_ref = event.clone();
        let slot_ref = slot.clone();
        let subscription = event.subscribe(move |_| {
            if let Some(sub) = slot_ref.lock().expect("lock").take() {
                event_ref.unsubscribe(sub);
            }
        });
        *slot.lock().expect("lock") = Some(subscription);

        // Must not deadlock.
        event.emit(&());
        event.emit(&());
    }

    #[test]
    fn received_faults_are_collected_without_stopping_delivery() {
        let received = ReceivedEvent::new();
        let delivered = Arc::new(AtomicUsize::new(0));

        received.subscribe(|_| Err(Error::Transport("handler exploded".into())));
        let counter = delivered.clone();
        received.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let faults = received.emit("{\"M\":[]}");
        assert_eq!(faults.len(), 1);
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }
}
