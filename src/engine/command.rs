// src/engine/command.rs

//! 命令解析：把 (命令名, 参数列表) 转换成带类型的 `Command`
//!
//! 参数个数检查先于一切：不足时返回 WrongArity，不会触碰存储。
//! 多余的参数被忽略。

use crate::error::CommandError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Set { key: String, value: String },
    Get { key: String },
    Del { key: String },
    Expire { key: String, seconds: i64 },
    Ttl { key: String },
    Incr { key: String },
    Decr { key: String },
    LPush { key: String, values: Vec<String> },
    RPush { key: String, values: Vec<String> },
    LPop { key: String },
    RPop { key: String },
    LRange { key: String, start: i64, stop: i64 },
    /// 客户端握手 / 空操作
    Command,
    Ping,
}

/// 至少需要 `min` 个参数
fn arity(name: &str, args: &[String], min: usize) -> Result<(), CommandError> {
    if args.len() < min {
        Err(CommandError::WrongArity(name.to_lowercase()))
    } else {
        Ok(())
    }
}

fn int_arg(s: &str) -> Result<i64, CommandError> {
    s.parse::<i64>().map_err(|_| CommandError::NotAnInteger)
}

impl Command {
    /// 按命令名（大小写不敏感）解析
    pub fn parse(name: &str, args: &[String]) -> Result<Command, CommandError> {
        let upper = name.to_uppercase();
        let key = || args[0].clone();

        let cmd = match upper.as_str() {
            "SET" => {
                arity(name, args, 2)?;
                Command::Set { key: key(), value: args[1].clone() }
            }
            "GET" => {
                arity(name, args, 1)?;
                Command::Get { key: key() }
            }
            "DEL" => {
                arity(name, args, 1)?;
                Command::Del { key: key() }
            }
            "EXPIRE" => {
                arity(name, args, 2)?;
                Command::Expire { key: key(), seconds: int_arg(&args[1])? }
            }
            "TTL" => {
                arity(name, args, 1)?;
                Command::Ttl { key: key() }
            }
            "INCR" => {
                arity(name, args, 1)?;
                Command::Incr { key: key() }
            }
            "DECR" => {
                arity(name, args, 1)?;
                Command::Decr { key: key() }
            }
            "LPUSH" => {
                arity(name, args, 2)?;
                Command::LPush { key: key(), values: args[1..].to_vec() }
            }
            "RPUSH" => {
                arity(name, args, 2)?;
                Command::RPush { key: key(), values: args[1..].to_vec() }
            }
            "LPOP" => {
                arity(name, args, 1)?;
                Command::LPop { key: key() }
            }
            "RPOP" => {
                arity(name, args, 1)?;
                Command::RPop { key: key() }
            }
            "LRANGE" => {
                arity(name, args, 3)?;
                Command::LRange {
                    key: key(),
                    start: int_arg(&args[1])?,
                    stop: int_arg(&args[2])?,
                }
            }
            "COMMAND" => Command::Command,
            "PING" => Command::Ping,
            _ => return Err(CommandError::UnknownCommand),
        };
        Ok(cmd)
    }

    /// 规范化（大写）的命令名，用于 AOF 记录与配置匹配
    pub fn name(&self) -> &'static str {
        match self {
            Command::Set { .. } => "SET",
            Command::Get { .. } => "GET",
            Command::Del { .. } => "DEL",
            Command::Expire { .. } => "EXPIRE",
            Command::Ttl { .. } => "TTL",
            Command::Incr { .. } => "INCR",
            Command::Decr { .. } => "DECR",
            Command::LPush { .. } => "LPUSH",
            Command::RPush { .. } => "RPUSH",
            Command::LPop { .. } => "LPOP",
            Command::RPop { .. } => "RPOP",
            Command::LRange { .. } => "LRANGE",
            Command::Command => "COMMAND",
            Command::Ping => "PING",
        }
    }

    /// 第一个参数作为 key 的命令返回该 key，用于统一惰性过期
    pub fn key(&self) -> Option<&str> {
        match self {
            Command::Set { key, .. }
            | Command::Get { key }
            | Command::Del { key }
            | Command::Expire { key, .. }
            | Command::Ttl { key }
            | Command::Incr { key }
            | Command::Decr { key }
            | Command::LPush { key, .. }
            | Command::RPush { key, .. }
            | Command::LPop { key }
            | Command::RPop { key }
            | Command::LRange { key, .. } => Some(key.as_str()),
            Command::Command | Command::Ping => None,
        }
    }

    /// 会修改存储、需要写入 AOF 的命令
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Command::Set { .. }
                | Command::Del { .. }
                | Command::Expire { .. }
                | Command::Incr { .. }
                | Command::Decr { .. }
                | Command::LPush { .. }
                | Command::RPush { .. }
                | Command::LPop { .. }
                | Command::RPop { .. }
        )
    }
}

/// 所有会写 AOF 的命令名，作为配置 `aof_commands` 的默认值
pub const WRITE_COMMANDS: [&str; 9] = [
    "SET", "DEL", "EXPIRE", "INCR", "DECR", "LPUSH", "RPUSH", "LPOP", "RPOP",
];
