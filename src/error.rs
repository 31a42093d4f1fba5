//! 定义了库中所有可能的错误类型。
//! Defines all possible error types in the library.

use thiserror::Error;

/// The primary error type for the push-messaging client.
///
/// Every variant carries owned string payloads so the error can be cloned:
/// the result of a connect attempt is shared between all callers that joined
/// the same in-flight operation.
///
/// 推送消息客户端的主要错误类型。
///
/// 所有变体都携带自有的字符串负载，因此错误可以被克隆：
/// 连接尝试的结果会在所有加入同一进行中操作的调用者之间共享。
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The base url supplied at construction was empty.
    /// 构造时提供的基础url为空。
    #[error("the connection url must not be empty")]
    EmptyUrl,

    /// `send` was called before `start`.
    /// 在 `start` 之前调用了 `send`。
    #[error("the start method must be called before data can be sent")]
    NotStarted,

    /// `send` was called while the connection was still being established.
    /// 在连接仍在建立时调用了 `send`。
    #[error("the connection has not been established")]
    NotEstablished,

    /// The negotiation handshake with the server failed.
    /// 与服务器的协商握手失败。
    #[error("negotiation with the server failed: {0}")]
    Negotiate(String),

    /// The transport reported a failure while starting or carrying the stream.
    /// 传输在启动或承载流时报告了失败。
    #[error("transport error: {0}")]
    Transport(String),

    /// An in-flight operation observed cancellation of its connect attempt.
    /// 进行中的操作观察到其连接尝试被取消。
    #[error("the connect attempt was aborted")]
    Aborted,

    /// An outgoing payload could not be serialized.
    /// 无法序列化传出的负载。
    #[error("failed to serialize payload: {0}")]
    Serialize(String),

    /// An internal channel for sharing the connect result was closed unexpectedly.
    /// 用于共享连接结果的内部通道意外关闭。
    #[error("internal channel is broken")]
    ChannelClosed,
}

/// A specialized `Result` type for this library.
/// 本库专用的 `Result` 类型。
pub type Result<T> = std::result::Result<T, Error>;
