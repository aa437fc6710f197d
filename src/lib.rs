// src/lib.rs
//! emberkv 库：protocol / server / engine / expire / persistence / types

pub mod config;      // JSON 配置
pub mod engine;      // 存储 + 命令分发
pub mod error;       // 命令错误 & 协议错误
pub mod expire;      // 过期策略
pub mod persistence; // 快照 / AOF
pub mod protocol;    // 协议编解码
pub mod server;      // 网络层
pub mod types;       // String / List
