// src/server.rs
//! 网络层：
//! - 按配置恢复数据、启动后台任务（快照 / AOF 写入 / 过期清理）
//! - 监听 TCP 连接，每个连接一个异步任务
//! - 从字节流中解码请求帧，调度到 engine 执行
//! - 把 `Reply` 序列化后写回
//! - 收到 Ctrl-C 后停止接受连接，做最后一次快照或 AOF 落盘
use anyhow::{Context, Result};
use bytes::BytesMut;
use std::{sync::Arc, time::Duration};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    time::{sleep, timeout},
};

use crate::{
    config::{Config, PersistenceMode},
    engine::{Engine, SharedEngine, lock},
    error::CommandError,
    expire,
    persistence::Persistence,
    protocol::{self, Reply},
};

/// accept 失败后的等待时间
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// 启动服务，直到收到 Ctrl-C
pub async fn run(cfg: Config) -> Result<()> {
    let pers = Arc::new(Persistence::new(cfg.clone()));

    // 1. 恢复数据，必须在接受连接之前完成
    let mut engine = Engine::with_config(&cfg);
    pers.restore(&mut engine).await;

    // 2. AOF 模式下打开日志并挂到引擎上
    let mut aof = None;
    if pers.mode() == PersistenceMode::AppendOnly {
        let (handle, writer) = pers.open_aof().await?;
        engine.attach_aof(handle.clone());
        aof = Some((handle, writer));
    }
    let engine = engine.into_shared();

    // 3. 后台任务
    let mut tasks = Vec::new();
    if pers.mode() == PersistenceMode::Snapshot {
        tasks.push(pers.start_snapshot_task(engine.clone()));
    }
    if cfg.expire_sweep_interval_ms > 0 {
        tasks.push(expire::start_cleaner(engine.clone(), cfg.expire_sweep_interval_ms));
    }

    // 4. 监听
    let addr = cfg.addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!(addr = %addr, "emberkv server listening");

    let frame_timeout = Duration::from_millis(cfg.frame_timeout_ms.max(1));
    let result = tokio::select! {
        res = serve(listener, engine.clone(), frame_timeout) => res,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            Ok(())
        }
    };

    // 5. 关闭：停掉后台任务，再做最后一次持久化
    for task in tasks {
        task.abort();
    }
    match pers.mode() {
        PersistenceMode::Snapshot => {
            if let Err(e) = pers.checkpoint(&engine).await {
                tracing::error!(error = %e, "final snapshot failed");
            }
        }
        PersistenceMode::AppendOnly => {
            if let Some((handle, writer)) = aof {
                if let Err(e) = handle.sync().await {
                    tracing::error!(error = %e, "final aof sync failed");
                }
                // 引擎里的发送端仍然存活，写入任务不会自行结束
                writer.abort();
            }
        }
        PersistenceMode::None => {}
    }
    tracing::info!("server stopped");
    result
}

/// 接受循环：不断 accept 新连接并 spawn 出去一个异步任务
///
/// `frame_timeout` 是半个请求帧在缓冲区里最多等待的时间
pub async fn serve(listener: TcpListener, engine: SharedEngine, frame_timeout: Duration) -> Result<()> {
    loop {
        let Some((stream, peer)) = accepted(listener.accept().await).await else {
            continue;
        };
        tracing::info!(%peer, "client connected");

        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, engine, frame_timeout).await {
                tracing::warn!(%peer, error = %err, "connection error");
            }
        });
    }
}

/// accept 失败（例如 EMFILE）时记录日志并稍等片刻，返回 None 让循环继续
async fn accepted<T>(res: std::io::Result<T>) -> Option<T> {
    match res {
        Ok(conn) => Some(conn),
        Err(e) => {
            tracing::warn!(error = %e, "accept failed");
            sleep(ACCEPT_BACKOFF).await;
            None
        }
    }
}

/// 单个连接的处理逻辑
///
/// 一次读取可能包含多个请求帧，也可能只有半个；解码器在帧不完整时返回 None，
/// 继续读取即可。帧格式错误，或半个帧在 `frame_timeout` 内没有补全时，
/// 丢弃缓冲区里剩余的字节，回复一个错误，连接保持打开。
async fn handle_connection(
    mut stream: TcpStream,
    engine: SharedEngine,
    frame_timeout: Duration,
) -> Result<()> {
    let peer = stream.peer_addr()?;
    let mut input = BytesMut::with_capacity(4096);
    let mut output = BytesMut::with_capacity(4096);

    loop {
        // 空闲连接可以无限等待；只有缓冲区里有半个帧时才计时
        let n = if input.is_empty() {
            stream.read_buf(&mut input).await?
        } else {
            match timeout(frame_timeout, stream.read_buf(&mut input)).await {
                Ok(res) => res?,
                Err(_) => {
                    tracing::warn!(%peer, pending = input.len(), "incomplete request timed out");
                    input.clear();
                    Reply::Error(CommandError::UnknownCommand).serialize(&mut output);
                    stream.write_all(&output).await?;
                    output.clear();
                    continue;
                }
            }
        };
        if n == 0 {
            tracing::info!(%peer, "client disconnected");
            return Ok(());
        }

        loop {
            let reply = match protocol::decode(&mut input) {
                Ok(Some(frame)) => {
                    let mut guard = lock(&engine);
                    guard.execute(&frame.command, &frame.args, false)
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(%peer, error = %e, "malformed request");
                    input.clear();
                    Reply::Error(CommandError::UnknownCommand)
                }
            };
            reply.serialize(&mut output);
        }

        if !output.is_empty() {
            stream.write_all(&output).await?;
            output.clear();
        }
    }
}
