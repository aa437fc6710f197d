// src/engine/mod.rs

//! # 引擎模块
//!
//! `engine` 模块是服务器的核心。它：
//! - 从网络层（或 AOF 重放）接收命令名和参数列表
//! - 解析成带类型的 `Command`，统一做惰性过期后分发给 `types` 下的具体实现
//! - 写命令成功后（非重放时）把原始命令提交给 AOF 写入队列
//! - 返回一个 `Reply`，由协议层序列化
pub mod command;
pub mod store;

pub use command::Command;
pub use store::{Entry, Store};

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::Config;
use crate::expire;
use crate::persistence::AofHandle;
use crate::protocol::Reply;
use crate::types::{list, string};

/// 服务器内共享的引擎；命令处理是同步的，锁只在单条命令执行期间持有
pub type SharedEngine = Arc<Mutex<Engine>>;

/// 获取引擎锁；某个任务 panic 导致的中毒不影响数据结构本身，直接继续使用
pub fn lock(engine: &SharedEngine) -> MutexGuard<'_, Engine> {
    engine.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 一个独立的存储实例 + 命令分发
pub struct Engine {
    store: Store,
    aof: Option<AofHandle>,
    /// 允许写入 AOF 的命令名（大写）
    aof_commands: HashSet<String>,
}

impl Default for Engine {
    fn default() -> Self {
        Engine::with_config(&Config::default())
    }
}

impl Engine {
    pub fn new() -> Self {
        Engine::default()
    }

    pub fn with_config(cfg: &Config) -> Self {
        Engine {
            store: Store::new(),
            aof: None,
            aof_commands: cfg.aof_commands.iter().map(|c| c.to_uppercase()).collect(),
        }
    }

    /// 挂上 AOF 写入队列；之后成功的写命令都会被提交
    pub fn attach_aof(&mut self, handle: AofHandle) {
        self.aof = Some(handle);
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    pub fn into_shared(self) -> SharedEngine {
        Arc::new(Mutex::new(self))
    }

    /// 执行单个命令
    ///
    /// # 参数
    ///
    /// * `name` - 命令名，大小写不敏感
    /// * `args` - 命令参数（不含命令名）
    /// * `replaying` - 是否来自 AOF 重放；重放的命令不会再次写入 AOF
    pub fn execute(&mut self, name: &str, args: &[String], replaying: bool) -> Reply {
        tracing::debug!(command = name, ?args, replaying, "execute");

        // 1. 解析 + 参数个数检查，失败时不修改任何数据
        let cmd = match Command::parse(name, args) {
            Ok(cmd) => cmd,
            Err(e) => return e.into(),
        };

        // 2. 统一惰性过期
        if let Some(key) = cmd.key() {
            expire::remove_if_expired(&mut self.store, key);
        }

        let is_write = cmd.is_write();
        let cmd_name = cmd.name();
        let reply = self.apply(cmd);

        // 3. 写命令成功后提交 AOF，不等待写入完成
        if is_write && !replaying && !reply.is_error() {
            self.log_write(cmd_name, args);
        }
        reply
    }

    fn apply(&mut self, cmd: Command) -> Reply {
        let store = &mut self.store;
        match cmd {
            // --- String commands ---
            Command::Set { key, value } => {
                string::set(store, &key, &value);
                Reply::Ok
            }
            Command::Get { key } => match string::get(store, &key) {
                Some(v) => Reply::Bulk(v),
                None => Reply::NullBulk,
            },
            Command::Del { key } => Reply::Integer(string::del(store, &key)),
            Command::Incr { key } => string::incr(store, &key).map_or_else(Reply::from, Reply::Integer),
            Command::Decr { key } => string::decr(store, &key).map_or_else(Reply::from, Reply::Integer),

            // --- Expiration commands ---
            Command::Expire { key, seconds } => Reply::Integer(expire::expire(store, &key, seconds)),
            Command::Ttl { key } => Reply::Integer(expire::ttl(store, &key)),

            // --- List commands ---
            Command::LPush { key, values } => {
                list::lpush(store, &key, &values).map_or_else(Reply::from, Reply::Integer)
            }
            Command::RPush { key, values } => {
                list::rpush(store, &key, &values).map_or_else(Reply::from, Reply::Integer)
            }
            Command::LPop { key } => list::lpop(store, &key).map_or(Reply::NullBulk, Reply::Bulk),
            Command::RPop { key } => list::rpop(store, &key).map_or(Reply::NullBulk, Reply::Bulk),
            Command::LRange { key, start, stop } => {
                list::lrange(store, &key, start, stop).map_or(Reply::NullBulk, Reply::Array)
            }

            // --- Connection / Control commands ---
            Command::Command => Reply::Ok,
            Command::Ping => Reply::Status("PONG"),
        }
    }

    /// 以 `<COMMAND> <args...>` 形式提交到 AOF（空格拼接，不做转义）
    fn log_write(&self, name: &str, args: &[String]) {
        let Some(aof) = &self.aof else {
            return;
        };
        if !self.aof_commands.contains(name) {
            return;
        }
        let mut record = String::from(name);
        for arg in args {
            record.push(' ');
            record.push_str(arg);
        }
        aof.submit(record);
    }
}
