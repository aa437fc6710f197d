// src/persistence.rs

//! 持久化器：快照（snapshot）或追加日志（AOF），二者互斥
//!
//! - 快照：启动时加载，之后定时全量序列化 Store，写临时文件再 rename 覆盖
//! - AOF：写命令以 `<COMMAND> <arg1> <arg2> ...` 一行一条追加；启动时按顺序重放
//!
//! 所有 I/O 失败只记录日志，不会传给客户端，也不会中断启动

use anyhow::{Context, Result, anyhow};
use std::{
    io::ErrorKind,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::{
    fs::{self, File, OpenOptions},
    io::AsyncWriteExt,
    sync::{
        mpsc::{self, error::TrySendError},
        oneshot,
    },
    task::JoinHandle,
    time::{Duration, MissedTickBehavior, interval},
};

use crate::config::{Config, PersistenceMode};
use crate::engine::{Engine, SharedEngine, Store, lock};
use crate::protocol::Reply;

/// 写入结果，通过 oneshot 回传给等待方
type Ack = oneshot::Sender<Result<(), String>>;

/// AOF 写入任务接收的请求
pub enum AofRequest {
    /// 追加一条记录；`done` 为 None 时即发即忘
    Append { record: String, done: Option<Ack> },
    /// 屏障：之前排队的记录全部写入并 fsync 后回复
    Sync { done: Ack },
}

/// AOF 写入队列的发送端，可以廉价 clone
///
/// 队列有界：`submit` 在队列满时直接丢弃记录并计数，不会阻塞命令执行
#[derive(Clone)]
pub struct AofHandle {
    tx: mpsc::Sender<AofRequest>,
    rejected: Arc<AtomicU64>,
}

impl AofHandle {
    /// 创建一个有界队列；接收端交给写入任务（或测试）
    pub fn channel(capacity: usize) -> (AofHandle, mpsc::Receiver<AofRequest>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            AofHandle {
                tx,
                rejected: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// 非阻塞提交，返回记录是否进入队列
    pub fn submit(&self, record: String) -> bool {
        match self.tx.try_send(AofRequest::Append { record, done: None }) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let total = self.rejected.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(rejected = total, "aof queue full, record dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::error!("aof writer stopped, record dropped");
                false
            }
        }
    }

    /// 等待队列有空位并等待这条记录真正写入文件
    pub async fn append(&self, record: String) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.tx
            .send(AofRequest::Append {
                record,
                done: Some(done),
            })
            .await
            .map_err(|_| anyhow!("aof writer stopped"))?;
        rx.await
            .map_err(|_| anyhow!("aof writer stopped"))?
            .map_err(|e| anyhow!(e))
    }

    /// 等待此前提交的所有记录落盘
    pub async fn sync(&self) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.tx
            .send(AofRequest::Sync { done })
            .await
            .map_err(|_| anyhow!("aof writer stopped"))?;
        rx.await
            .map_err(|_| anyhow!("aof writer stopped"))?
            .map_err(|e| anyhow!(e))
    }

    /// 因队列已满而被丢弃的记录数
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// 序列化整个 Store（数据 + 过期时间）
pub fn encode_snapshot(store: &Store) -> Result<Vec<u8>> {
    serde_json::to_vec(store).context("failed to serialize snapshot")
}

pub fn decode_snapshot(data: &[u8]) -> Result<Store> {
    serde_json::from_slice(data).context("failed to parse snapshot")
}

pub struct Persistence {
    cfg: Config,
}

impl Persistence {
    pub fn new(cfg: Config) -> Self {
        Persistence { cfg }
    }

    pub fn mode(&self) -> PersistenceMode {
        self.cfg.persistence
    }

    pub fn snapshot_path(&self) -> &PathBuf {
        &self.cfg.snapshot_path
    }

    pub fn aof_path(&self) -> &PathBuf {
        &self.cfg.aof_path
    }

    /// 启动时按配置的模式恢复数据，必须在开始接受连接之前调用
    pub async fn restore(&self, engine: &mut Engine) {
        match self.cfg.persistence {
            PersistenceMode::None => {
                tracing::info!("persistence mode: in-memory");
            }
            PersistenceMode::Snapshot => {
                tracing::info!(path = ?self.cfg.snapshot_path, "persistence mode: snapshot");
                self.load_snapshot(engine.store_mut()).await;
            }
            PersistenceMode::AppendOnly => {
                tracing::info!(path = ?self.cfg.aof_path, "persistence mode: appendonly");
                self.replay_aof(engine).await;
            }
        }
    }

    // ---------- 快照 ----------

    /// 读取快照并合并进 `store`，返回加载的 key 数量；文件不存在或损坏时返回 0
    pub async fn load_snapshot(&self, store: &mut Store) -> usize {
        let path = &self.cfg.snapshot_path;
        let data = match fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return 0,
            Err(e) => {
                tracing::error!(path = ?path, error = %e, "failed to read snapshot");
                return 0;
            }
        };
        if data.is_empty() {
            return 0;
        }
        match decode_snapshot(&data) {
            Ok(loaded) => {
                let count = loaded.len();
                store.merge(loaded);
                tracing::info!(keys = count, path = ?path, "snapshot loaded");
                count
            }
            Err(e) => {
                tracing::error!(path = ?path, error = %e, "failed to load snapshot");
                0
            }
        }
    }

    /// 对共享引擎做快照：持锁序列化（时间点一致），释放锁后再写文件
    pub async fn checkpoint(&self, engine: &SharedEngine) -> Result<()> {
        let data = {
            let guard = lock(engine);
            encode_snapshot(guard.store())?
        };
        self.write_snapshot(&data).await
    }

    /// 写入临时文件，再原子替换
    async fn write_snapshot(&self, data: &[u8]) -> Result<()> {
        let path = &self.cfg.snapshot_path;
        let tmp = path.with_extension("tmp");
        let mut f = File::create(&tmp)
            .await
            .with_context(|| format!("failed to create {:?}", tmp))?;
        f.write_all(data).await?;
        f.sync_all().await?;
        drop(f);

        fs::rename(&tmp, path)
            .await
            .with_context(|| format!("failed to replace {:?}", path))?;
        tracing::info!(path = ?path, bytes = data.len(), "snapshot saved");
        Ok(())
    }

    /// 定时快照任务；调用方通过 JoinHandle::abort() 停止，正在进行的那次写入会继续完成
    pub fn start_snapshot_task(self: &Arc<Self>, engine: SharedEngine) -> JoinHandle<()> {
        let pers = Arc::clone(self);
        tokio::spawn(async move {
            let period = Duration::from_millis(pers.cfg.snapshot_interval_ms.max(1));
            let mut iv = interval(period);
            iv.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // 第一次 tick 立即返回，跳过
            iv.tick().await;
            loop {
                iv.tick().await;
                // 单次写入放在独立任务里，abort 定时任务不会打断写到一半的临时文件
                let write = {
                    let pers = Arc::clone(&pers);
                    let engine = engine.clone();
                    tokio::spawn(async move { pers.checkpoint(&engine).await })
                };
                match write.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::error!(error = %e, "snapshot failed"),
                    Err(e) => tracing::error!(error = %e, "snapshot task panicked"),
                }
            }
        })
    }

    // ---------- AOF ----------

    /// 启动时重放 AOF，返回成功执行的记录数
    ///
    /// 单条记录出错（空、未知命令、参数不足、数字非法）只跳过该条
    pub async fn replay_aof(&self, engine: &mut Engine) -> usize {
        let path = &self.cfg.aof_path;
        let data = match fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return 0,
            Err(e) => {
                tracing::error!(path = ?path, error = %e, "failed to read aof");
                return 0;
            }
        };

        let text = String::from_utf8_lossy(&data);
        let mut applied = 0;
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split(' ');
            let name = parts.next().unwrap_or_default();
            let args: Vec<String> = parts.map(str::to_string).collect();

            match engine.execute(name, &args, true) {
                Reply::Error(e) => {
                    tracing::warn!(line = idx + 1, record = line, error = %e, "skipping aof record");
                }
                _ => applied += 1,
            }
        }
        tracing::info!(records = applied, path = ?path, "aof replayed");
        applied
    }

    /// 以追加模式打开 AOF 并启动写入任务
    pub async fn open_aof(&self) -> Result<(AofHandle, JoinHandle<()>)> {
        let path = self.cfg.aof_path.clone();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("failed to open aof {:?}", path))?;

        let (handle, rx) = AofHandle::channel(self.cfg.aof_queue_capacity);
        let task = tokio::spawn(run_aof_writer(file, path, rx));
        Ok((handle, task))
    }
}

/// 单个写入任务串行处理队列，记录按提交顺序落盘
async fn run_aof_writer(mut file: File, path: PathBuf, mut rx: mpsc::Receiver<AofRequest>) {
    while let Some(req) = rx.recv().await {
        match req {
            AofRequest::Append { record, done } => {
                let res = write_record(&mut file, &record).await;
                if let Err(e) = &res {
                    tracing::error!(path = ?path, error = %e, "failed to append to aof");
                }
                if let Some(done) = done {
                    let _ = done.send(res.map_err(|e| e.to_string()));
                }
            }
            AofRequest::Sync { done } => {
                let res = file.sync_data().await;
                if let Err(e) = &res {
                    tracing::error!(path = ?path, error = %e, "failed to sync aof");
                }
                let _ = done.send(res.map_err(|e| e.to_string()));
            }
        }
    }
    // 所有发送端都已关闭
    if let Err(e) = file.sync_all().await {
        tracing::error!(path = ?path, error = %e, "failed to sync aof on close");
    }
}

async fn write_record(file: &mut File, record: &str) -> std::io::Result<()> {
    let mut line = String::with_capacity(record.len() + 1);
    line.push_str(record);
    line.push('\n');
    file.write_all(line.as_bytes()).await?;
    file.flush().await
}
