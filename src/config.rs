// src/config.rs

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf};

use crate::engine::command::WRITE_COMMANDS;

/// 持久化模式，三者互斥
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceMode {
    /// 纯内存
    #[default]
    None,
    /// 定时全量快照
    Snapshot,
    /// 追加写命令日志
    AppendOnly,
}

/// 进程启动后读到的全局配置，所有字段都可以在 JSON 中省略
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub persistence: PersistenceMode,
    /// 快照周期（毫秒）
    pub snapshot_interval_ms: u64,
    pub snapshot_path: PathBuf,
    pub aof_path: PathBuf,
    /// 允许写入 AOF 的命令名
    pub aof_commands: Vec<String>,
    /// AOF 写入队列容量，满了之后新的记录会被丢弃
    pub aof_queue_capacity: usize,
    /// 后台过期清理周期（毫秒），0 表示只做惰性过期
    pub expire_sweep_interval_ms: u64,
    /// 半个请求帧最多等待多久（毫秒），超时后按 unknown command 回复
    pub frame_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: "127.0.0.1".to_string(),
            port: 6379,
            persistence: PersistenceMode::None,
            snapshot_interval_ms: 60_000,
            snapshot_path: PathBuf::from("dump.json"),
            aof_path: PathBuf::from("appendonly.aof"),
            aof_commands: WRITE_COMMANDS.iter().map(|s| s.to_string()).collect(),
            aof_queue_capacity: 1024,
            expire_sweep_interval_ms: 0,
            frame_timeout_ms: 1_000,
        }
    }
}

impl Config {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// 从指定路径读取并反序列化 JSON 配置
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path_ref = path.as_ref();

    // 如果配置文件不存在，创建默认配置
    if !path_ref.exists() {
        let default_cfg = Config::default();
        let default_json = serde_json::to_string_pretty(&default_cfg)?;
        fs::write(path_ref, default_json)
            .with_context(|| format!("Failed to write default config {:?}", path_ref))?;
        tracing::info!(path = ?path_ref, "config file not found, default configuration created");
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path_ref)
        .with_context(|| format!("Failed to read config file {:?}", path_ref))?;
    let cfg: Config = serde_json::from_str(&data)
        .with_context(|| format!("Failed to parse config file {:?}", path_ref))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_creates_default() -> Result<()> {
        let tmp = tempdir()?;
        let path = tmp.path().join("config.json");

        let cfg = load(&path)?;
        assert_eq!(cfg, Config::default());
        assert!(path.exists(), "默认配置应被写入磁盘");

        // 再次读取得到相同配置
        assert_eq!(load(&path)?, cfg);
        Ok(())
    }

    #[test]
    fn test_partial_file_uses_defaults() -> Result<()> {
        let tmp = tempdir()?;
        let path = tmp.path().join("config.json");
        fs::write(
            &path,
            r#"{ "persistence": "appendonly", "aof_commands": ["SET", "DEL"], "port": 7000 }"#,
        )?;

        let cfg = load(&path)?;
        assert_eq!(cfg.persistence, PersistenceMode::AppendOnly);
        assert_eq!(cfg.aof_commands, vec!["SET", "DEL"]);
        assert_eq!(cfg.port, 7000);
        assert_eq!(cfg.snapshot_interval_ms, 60_000);
        assert_eq!(cfg.frame_timeout_ms, 1_000);
        assert_eq!(cfg.addr(), "127.0.0.1:7000");
        Ok(())
    }

    #[test]
    fn test_invalid_mode_is_rejected() -> Result<()> {
        let tmp = tempdir()?;
        let path = tmp.path().join("config.json");
        fs::write(&path, r#"{ "persistence": "rdb" }"#)?;
        assert!(load(&path).is_err());
        Ok(())
    }
}
