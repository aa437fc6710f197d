// src/types/string.rs

//! String 类型的存取操作
//!
//! - SET key value → 覆盖写入，旧类型与旧过期时间一并清除
//! - GET key → 返回 value；key 不存在或类型不是 String 时返回 None
//! - DEL key → 1（删除成功）或 0（key 不存在）
//! - INCR / DECR key → 按十进制整数加减 1
//!
//! 惰性过期由 engine 在分发前统一处理，这里不再检查

use crate::engine::store::{Entry, Store};
use crate::error::CommandError;

/// 将一个字符串写入指定的键，已有值（任意类型）会被覆盖。
pub fn set(store: &mut Store, key: &str, value: &str) {
    store.insert(key, Entry::String(value.to_string()));
}

/// 读取字符串值；List 类型视为不存在
pub fn get(store: &Store, key: &str) -> Option<String> {
    match store.get(key) {
        Some(Entry::String(s)) => Some(s.clone()),
        _ => None,
    }
}

/// 删除指定键（任意类型）
pub fn del(store: &mut Store, key: &str) -> i64 {
    if store.remove(key).is_some() { 1 } else { 0 }
}

pub fn incr(store: &mut Store, key: &str) -> Result<i64, CommandError> {
    incr_by(store, key, 1)
}

pub fn decr(store: &mut Store, key: &str) -> Result<i64, CommandError> {
    incr_by(store, key, -1)
}

/// key 不存在时以 `delta` 作为初始值；已有值必须是合法的 i64，
/// 解析失败或溢出时返回 NotAnInteger，原值保持不变。已有的过期时间保留
fn incr_by(store: &mut Store, key: &str, delta: i64) -> Result<i64, CommandError> {
    match store.get_mut(key) {
        None => {
            store.insert(key, Entry::String(delta.to_string()));
            Ok(delta)
        }
        Some(Entry::String(s)) => {
            let new = s
                .parse::<i64>()
                .ok()
                .and_then(|old| old.checked_add(delta))
                .ok_or(CommandError::NotAnInteger)?;
            *s = new.to_string();
            Ok(new)
        }
        Some(Entry::List(_)) => Err(CommandError::WrongType),
    }
}
