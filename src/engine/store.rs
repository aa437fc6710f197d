// src/engine/store.rs

//! 内存存储：key → Entry 映射 + key → 过期时间 映射
//!
//! 两个映射必须保持同步：任何删除路径（DEL、惰性过期、后台清理、SET 覆盖）
//! 都走 `Store::remove`，保证不会出现只有过期时间、没有数据的 key。

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// 单个 key 存储的值
///
/// 序列化形式为 `{"kind": "string", "value": "bar"}` 或
/// `{"kind": "list", "value": ["a", "b"]}`，与快照文件格式一致
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Entry {
    String(String),
    List(VecDeque<String>),
}

impl Entry {
    pub fn kind(&self) -> &'static str {
        match self {
            Entry::String(_) => "string",
            Entry::List(_) => "list",
        }
    }
}

/// 数据 + 过期索引
///
/// 整个结构直接序列化为快照：`{"store": {...}, "expirationTimes": {...}}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    #[serde(rename = "store", default)]
    entries: HashMap<String, Entry>,
    /// 绝对过期时间（UNIX 毫秒）
    #[serde(rename = "expirationTimes", default)]
    expirations: HashMap<String, u64>,
}

impl Store {
    pub fn new() -> Self {
        Store::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Entry> {
        self.entries.get_mut(key)
    }

    /// 写入（覆盖）一个 key，同时清掉旧的过期时间
    pub fn insert(&mut self, key: &str, entry: Entry) {
        self.expirations.remove(key);
        self.entries.insert(key.to_string(), entry);
    }

    /// 唯一的删除路径：数据和过期时间一起删除
    pub fn remove(&mut self, key: &str) -> Option<Entry> {
        self.expirations.remove(key);
        self.entries.remove(key)
    }

    pub fn expiration(&self, key: &str) -> Option<u64> {
        self.expirations.get(key).copied()
    }

    /// 为已存在的 key 设置过期时间；key 不存在时返回 false 且不做任何修改
    pub fn set_expiration(&mut self, key: &str, at_ms: u64) -> bool {
        if !self.entries.contains_key(key) {
            return false;
        }
        self.expirations.insert(key.to_string(), at_ms);
        true
    }

    pub fn is_expired(&self, key: &str, now_ms: u64) -> bool {
        self.expirations.get(key).is_some_and(|&at| at <= now_ms)
    }

    /// 所有在 `now_ms` 时已过期的 key
    pub fn expired_keys(&self, now_ms: u64) -> Vec<String> {
        self.expirations
            .iter()
            .filter(|&(_, &at)| at <= now_ms)
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// 把另一个 Store 合并进来（快照加载用）
    ///
    /// 同名 key 以 `other` 为准；没有对应数据的过期时间会被丢弃
    pub fn merge(&mut self, other: Store) {
        let Store {
            entries,
            expirations,
        } = other;
        for (key, entry) in entries {
            self.insert(&key, entry);
        }
        for (key, at) in expirations {
            self.set_expiration(&key, at);
        }
    }
}
