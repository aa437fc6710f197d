// src/error.rs

//! 错误类型：
//! - `CommandError`：命令执行失败，统一以 `-ERR <message>` 回复给客户端
//! - `ProtocolError`：请求帧解析失败，由网络层转换成 unknown command 回复

use thiserror::Error;

/// 命令层错误，永远不会让进程退出
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// 参数个数不足，携带小写的命令名
    #[error("wrong number of arguments for '{0}' command")]
    WrongArity(String),

    /// 对错误类型的 key 执行了操作（如对 String 执行 LPUSH）
    #[error("Operation against a key holding the wrong kind of value")]
    WrongType,

    /// INCR/DECR 的值不是整数，或数值参数无法解析
    #[error("value is not an integer or out of range")]
    NotAnInteger,

    #[error("unknown command")]
    UnknownCommand,
}

/// 请求帧解析错误
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// 帧不完整：声明的部分还没有全部到达
    #[error("incomplete frame")]
    Incomplete,

    #[error("expected '{expected}' but found byte {found:#04x}")]
    UnexpectedTag { expected: char, found: u8 },

    #[error("invalid length header: {0:?}")]
    InvalidLength(String),

    #[error("missing CRLF terminator")]
    MissingTerminator,

    #[error("frame declares zero parts")]
    EmptyFrame,

    #[error("part is not valid UTF-8")]
    InvalidUtf8,
}
