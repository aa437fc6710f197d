// src/types/list.rs

//! # List Type Support
//!
//! Lists are stored as a `VecDeque<String>` inside [`Entry::List`], which gives
//! cheap pushes and pops at both ends.
//!
//! Supported commands:
//! - `LPUSH`
//! - `RPUSH`
//! - `LPOP`
//! - `RPOP`
//! - `LRANGE`
//!
//! A list that becomes empty after a pop stays in the store as an empty list.

use std::collections::VecDeque;

use crate::engine::store::{Entry, Store};
use crate::error::CommandError;

/// Fetch the list at `key`, creating an empty one if the key is absent.
///
/// # Errors
///
/// Returns [`CommandError::WrongType`] if `key` holds a string.
fn list_or_create<'a>(store: &'a mut Store, key: &str) -> Result<&'a mut VecDeque<String>, CommandError> {
    if !store.contains(key) {
        store.insert(key, Entry::List(VecDeque::new()));
    }
    match store.get_mut(key) {
        Some(Entry::List(list)) => Ok(list),
        _ => Err(CommandError::WrongType),
    }
}

/// Execute LPUSH:
/// Prepend `values` to the list at `key` as one block, keeping their given
/// order, so that `LPUSH k a` followed by `LPUSH k b` reads back as `b, a`.
///
/// # Returns
///
/// The new length of the list.
pub fn lpush(store: &mut Store, key: &str, values: &[String]) -> Result<i64, CommandError> {
    let list = list_or_create(store, key)?;
    for value in values.iter().rev() {
        list.push_front(value.clone());
    }
    Ok(list.len() as i64)
}

/// Execute RPUSH:
/// Append `values` to the tail (right) of the list at `key`, in order.
///
/// # Returns
///
/// The new length of the list.
pub fn rpush(store: &mut Store, key: &str, values: &[String]) -> Result<i64, CommandError> {
    let list = list_or_create(store, key)?;
    list.extend(values.iter().cloned());
    Ok(list.len() as i64)
}

/// Execute LPOP:
/// Pop the head element, or `None` if the key is absent, empty, or not a list.
pub fn lpop(store: &mut Store, key: &str) -> Option<String> {
    match store.get_mut(key) {
        Some(Entry::List(list)) => list.pop_front(),
        _ => None,
    }
}

/// Execute RPOP:
/// Pop the tail element, or `None` if the key is absent, empty, or not a list.
pub fn rpop(store: &mut Store, key: &str) -> Option<String> {
    match store.get_mut(key) {
        Some(Entry::List(list)) => list.pop_back(),
        _ => None,
    }
}

/// Execute LRANGE:
/// Return the elements in the inclusive range `[start, stop]`.
///
/// Negative indices count from the end (`-1` is the last element). Indices past
/// either end are clamped, and an empty vector is returned when the range
/// selects nothing.
///
/// # Returns
///
/// `None` if the key is absent or not a list.
pub fn lrange(store: &Store, key: &str, start: i64, stop: i64) -> Option<Vec<String>> {
    let list = match store.get(key) {
        Some(Entry::List(list)) => list,
        _ => return None,
    };
    let total = list.len() as i64;
    // Normalize negative indices
    let s = (if start < 0 { total + start } else { start }).max(0);
    let e = (if stop < 0 { total + stop } else { stop }).min(total - 1);
    if s > e {
        return Some(Vec::new());
    }
    Some(
        list.iter()
            .skip(s as usize)
            .take((e - s + 1) as usize)
            .cloned()
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vals(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    /// Basic tests for List commands: LPUSH, RPUSH, LPOP, RPOP, LRANGE
    #[test]
    fn test_list_basic() {
        let mut store = Store::new();

        // LPUSH / RPUSH
        assert_eq!(lpush(&mut store, "L", &vals(&["a"])), Ok(1));
        assert_eq!(lpush(&mut store, "L", &vals(&["b"])), Ok(2)); // b, a
        assert_eq!(rpush(&mut store, "L", &vals(&["c"])), Ok(3)); // b, a, c

        // LRANGE full and single-element
        assert_eq!(lrange(&store, "L", 0, 2), Some(vals(&["b", "a", "c"])));
        assert_eq!(lrange(&store, "L", 1, 1), Some(vals(&["a"])));

        // LPOP, RPOP
        assert_eq!(lpop(&mut store, "L").as_deref(), Some("b"));
        assert_eq!(rpop(&mut store, "L").as_deref(), Some("c"));
        assert_eq!(lrange(&store, "L", 0, -1), Some(vals(&["a"])));

        // Exhaust and empty pops
        assert_eq!(lpop(&mut store, "L").as_deref(), Some("a"));
        assert_eq!(lpop(&mut store, "L"), None);
        assert_eq!(rpop(&mut store, "L"), None);
        assert_eq!(lrange(&store, "L", 0, -1), Some(vec![]));
    }

    #[test]
    fn test_multi_value_push_order() {
        let mut store = Store::new();
        assert_eq!(rpush(&mut store, "L", &vals(&["x", "y"])), Ok(2));
        assert_eq!(lpush(&mut store, "L", &vals(&["a", "b"])), Ok(4));
        assert_eq!(
            lrange(&store, "L", 0, -1),
            Some(vals(&["a", "b", "x", "y"]))
        );
    }

    #[test]
    fn test_push_on_string_is_wrong_type() {
        let mut store = Store::new();
        store.insert("s", Entry::String("v".into()));
        assert_eq!(lpush(&mut store, "s", &vals(&["a"])), Err(CommandError::WrongType));
        assert_eq!(rpush(&mut store, "s", &vals(&["a"])), Err(CommandError::WrongType));
        assert_eq!(store.get("s"), Some(&Entry::String("v".into())));
    }

    #[test]
    fn test_pop_and_range_on_wrong_kind_or_missing() {
        let mut store = Store::new();
        store.insert("s", Entry::String("v".into()));
        assert_eq!(lpop(&mut store, "s"), None);
        assert_eq!(rpop(&mut store, "missing"), None);
        assert_eq!(lrange(&store, "s", 0, -1), None);
        assert_eq!(lrange(&store, "missing", 0, -1), None);
    }

    #[test]
    fn test_lrange_clamping() {
        let mut store = Store::new();
        rpush(&mut store, "L", &vals(&["a", "b", "c", "d"])).unwrap();

        assert_eq!(lrange(&store, "L", -2, -1), Some(vals(&["c", "d"])));
        assert_eq!(lrange(&store, "L", -100, 1), Some(vals(&["a", "b"])));
        assert_eq!(lrange(&store, "L", 2, 100), Some(vals(&["c", "d"])));
        assert_eq!(lrange(&store, "L", 3, 1), Some(vec![]));
        assert_eq!(lrange(&store, "L", 10, 20), Some(vec![]));
        assert_eq!(lrange(&store, "L", 0, -5), Some(vec![]));
    }
}
