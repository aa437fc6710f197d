// src/expire.rs

//! 过期策略：
//! - 惰性过期：每个带 key 的命令执行前先调用 `remove_if_expired`
//! - 可选的后台清理任务 `start_cleaner`，与惰性过期共用 `Store::remove` 删除路径

use std::time::{SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};

use crate::engine::{SharedEngine, lock};
use crate::engine::store::Store;

/// 返回当前的 UNIX 毫秒
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// 设置 key 的过期时间：now + secs * 1000
///
/// 返回 1 表示设置成功，0 表示 key 不存在。负数秒数得到一个已经过去的时间点，
/// key 会在下次访问时被删除
pub fn expire(store: &mut Store, key: &str, secs: i64) -> i64 {
    remove_if_expired(store, key);
    let at = (now_ms() as i64).saturating_add(secs.saturating_mul(1000)).max(0) as u64;
    if store.set_expiration(key, at) { 1 } else { 0 }
}

/// 查询 key 剩余秒数
/// - key 不存在（或已过期）→ -2
/// - key 没有过期时间 → -1
/// - 否则 floor(剩余毫秒 / 1000)，结果不大于 0 时同样返回 -2
pub fn ttl(store: &mut Store, key: &str) -> i64 {
    let now = now_ms();
    if remove_if_expired_at(store, key, now) || !store.contains(key) {
        return -2;
    }
    match store.expiration(key) {
        None => -1,
        Some(at) => {
            let secs = (at.saturating_sub(now) / 1000) as i64;
            if secs > 0 { secs } else { -2 }
        }
    }
}

/// 检查 key 是否过期，是则删除；返回是否发生了删除
pub fn remove_if_expired(store: &mut Store, key: &str) -> bool {
    remove_if_expired_at(store, key, now_ms())
}

pub fn remove_if_expired_at(store: &mut Store, key: &str, now: u64) -> bool {
    if store.is_expired(key, now) {
        store.remove(key);
        true
    } else {
        false
    }
}

/// 删除所有已过期的 key，返回删除数量
pub fn purge_expired(store: &mut Store, now: u64) -> usize {
    let expired = store.expired_keys(now);
    for key in &expired {
        store.remove(key);
    }
    expired.len()
}

/// 后台定时清理任务；调用方通过返回的 JoinHandle::abort() 取消
pub fn start_cleaner(engine: SharedEngine, interval_ms: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut iv = interval(Duration::from_millis(interval_ms.max(1)));
        iv.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // 第一次 tick 立即返回，跳过
        iv.tick().await;
        loop {
            iv.tick().await;
            let removed = {
                let mut guard = lock(&engine);
                purge_expired(guard.store_mut(), now_ms())
            };
            if removed > 0 {
                tracing::debug!(removed, "expired keys evicted by sweep");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::store::Entry;
    use std::thread::sleep;

    fn store_with(key: &str) -> Store {
        let mut store = Store::new();
        store.insert(key, Entry::String("v".into()));
        store
    }

    #[test]
    fn test_expire_and_ttl() {
        let mut store = store_with("k");

        // 没有过期时间
        assert_eq!(ttl(&mut store, "k"), -1);
        // SET + EXPIRE
        assert_eq!(expire(&mut store, "k", 1), 1);
        // 剩余不足 1 秒：向下取整为 0，按 -2 报告，但 key 仍然存在
        let t1 = ttl(&mut store, "k");
        assert_eq!(t1, -2);
        assert!(store.contains("k"));
        // 睡眠 1.1s
        sleep(std::time::Duration::from_millis(1100));
        // TTL 返回 -2，且 key 被删除
        assert_eq!(ttl(&mut store, "k"), -2);
        assert!(!store.contains("k"));
    }

    #[test]
    fn test_ttl_reports_missing_for_final_second() {
        let mut store = store_with("k");
        let now = now_ms();
        store.set_expiration("k", now + 400);
        assert_eq!(ttl(&mut store, "k"), -2);
        assert!(store.contains("k"), "未到期的 key 不会被删除");

        store.set_expiration("k", now + 2_500);
        assert!((1..=2).contains(&ttl(&mut store, "k")));
    }

    #[test]
    fn test_expire_missing_key() {
        let mut store = Store::new();
        assert_eq!(expire(&mut store, "nope", 10), 0);
        assert_eq!(ttl(&mut store, "nope"), -2);
    }

    #[test]
    fn test_ttl_counts_down_from_requested() {
        let mut store = store_with("k");
        expire(&mut store, "k", 100);
        let t = ttl(&mut store, "k");
        assert!(t <= 100 && t >= 98, "ttl = {}", t);
    }

    #[test]
    fn test_negative_expire_removes_on_next_touch() {
        let mut store = store_with("k");
        assert_eq!(expire(&mut store, "k", -5), 1);
        assert!(remove_if_expired(&mut store, "k"));
        assert!(!store.contains("k"));
        assert_eq!(store.expiration("k"), None);
    }

    #[test]
    fn test_purge_expired_uses_same_delete_path() {
        let mut store = Store::new();
        for key in ["a", "b", "c"] {
            store.insert(key, Entry::String(key.into()));
        }
        store.set_expiration("a", 10);
        store.set_expiration("b", 20);
        store.set_expiration("c", 1_000);

        assert_eq!(purge_expired(&mut store, 20), 2);
        assert!(!store.contains("a") && !store.contains("b"));
        assert_eq!(store.expiration("a"), None);
        assert_eq!(store.expiration("c"), Some(1_000));
    }

    #[tokio::test]
    async fn test_cleaner_evicts_in_background() {
        use crate::engine::Engine;

        let mut engine = Engine::new();
        engine.store_mut().insert("old", Entry::String("v".into()));
        engine.store_mut().insert("keep", Entry::String("v".into()));
        engine.store_mut().set_expiration("old", 1);
        let shared = engine.into_shared();

        let task = start_cleaner(shared.clone(), 10);
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        task.abort();

        let guard = lock(&shared);
        assert!(!guard.store().contains("old"), "后台清理应删除过期 key");
        assert!(guard.store().contains("keep"));
    }
}
