//! 定义了连接的可配置参数。
//! Defines configurable parameters for a connection.

/// The protocol version sent to the server during negotiation unless the
/// caller overrides it.
///
/// 协商期间发送给服务器的协议版本号，除非调用者覆盖它。
pub const DEFAULT_PROTOCOL_VERSION: &str = "1.3";

/// A structure containing all configurable parameters for a connection.
///
/// 包含连接所有可配置参数的结构体。
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// The protocol version string exchanged with the server.
    /// 与服务器交换的协议版本字符串。
    pub protocol_version: String,

    /// An extra query string appended by transports to every wire operation.
    /// The core stores it verbatim and does not interpret it.
    ///
    /// 由传输附加到每次线路操作的额外查询字符串。
    /// 核心按原样存储，不做解释。
    pub query_string: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_string(),
            query_string: String::new(),
        }
    }
}
