//! 定义了连接的生命周期状态机。
//! Defines the connection lifecycle state machine.
//!
//! 状态只能通过 [`StateMachine`] 的比较并交换原语改变；
//! 没有任何代码路径直接修改状态。
//!
//! The state can only change through the [`StateMachine`]'s compare-and-swap
//! primitive; no code path mutates the state directly.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// The lifecycle state of a connection.
/// 连接的生命周期状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session is established. Initial and terminal state of a lifecycle.
    /// 未建立会话。生命周期的初始和终止状态。
    Disconnected,

    /// A connect attempt owns the lifecycle: negotiation or transport start
    /// is in flight.
    /// 一次连接尝试拥有生命周期：协商或传输启动正在进行。
    Connecting,

    /// The transport stream is live and messages can flow.
    /// 传输流已建立，消息可以流动。
    Connected,

    /// The transport lost the stream but intends to resume the session.
    /// 传输丢失了流，但打算恢复会话。
    Reconnecting,
}

/// The `(old, new)` pair delivered to subscribers at the moment of a
/// transition. Never stored.
///
/// 在转换时刻交付给订阅者的 `(旧, 新)` 状态对。从不存储。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    /// The state the connection was in before the transition.
    /// 转换之前连接所处的状态。
    pub old_state: ConnectionState,
    /// The state the connection is in after the transition.
    /// 转换之后连接所处的状态。
    pub new_state: ConnectionState,
}

/// The single writer of the connection state.
///
/// Transitions are linearized by the internal mutex, but the lock is never
/// held while subscriber callbacks run: the caller receives the resulting
/// [`StateChange`] and fires events after the critical section, so a handler
/// may itself request further transitions without deadlocking.
///
/// 连接状态的唯一写入者。
///
/// 转换由内部互斥锁线性化，但在订阅者回调运行期间从不持有锁：
/// 调用者在临界区之后收到 [`StateChange`] 并触发事件，
/// 因此处理器自身可以请求进一步的转换而不会死锁。
#[derive(Debug)]
pub(crate) struct StateMachine {
    current: Mutex<ConnectionState>,
}

impl StateMachine {
    pub(crate) fn new() -> Self {
        Self {
            current: Mutex::new(ConnectionState::Disconnected),
        }
    }

    /// Returns the current state.
    /// 返回当前状态。
    pub(crate) fn current(&self) -> ConnectionState {
        *self.lock()
    }

    /// Atomically swaps `from` for `to`.
    ///
    /// Returns the resulting change on success, `None` when the current state
    /// is not `from` — the caller must treat that as "another operation
    /// already owns this transition".
    ///
    /// 原子地将 `from` 替换为 `to`。
    ///
    /// 成功时返回产生的变化；当前状态不是 `from` 时返回 `None` ——
    /// 调用者必须将其视为"另一个操作已拥有此转换"。
    pub(crate) fn transition(
        &self,
        from: ConnectionState,
        to: ConnectionState,
    ) -> Option<StateChange> {
        let mut current = self.lock();
        if *current != from {
            return None;
        }
        *current = to;
        Some(StateChange {
            old_state: from,
            new_state: to,
        })
    }

    /// Moves any non-`Disconnected` state to `Disconnected`, invoking `clear`
    /// inside the same critical section so session identity is wiped
    /// atomically with the transition.
    ///
    /// 将任何非 `Disconnected` 状态移至 `Disconnected`，并在同一临界区内
    /// 调用 `clear`，使会话标识与转换原子地一起被清除。
    pub(crate) fn force_disconnect(&self, clear: impl FnOnce()) -> Option<StateChange> {
        let mut current = self.lock();
        if *current == ConnectionState::Disconnected {
            return None;
        }
        let old_state = *current;
        *current = ConnectionState::Disconnected;
        clear();
        Some(StateChange {
            old_state,
            new_state: ConnectionState::Disconnected,
        })
    }

    fn lock(&self) -> MutexGuard<'_, ConnectionState> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
