// src/main.rs
use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use emberkv::{config, server};

/// emberkv - 内存键值服务器
#[derive(Parser, Debug)]
#[command(name = "emberkv")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// 配置文件路径，不存在时写入默认配置
    #[arg(short, long, default_value = "config.json")]
    config: String,

    /// 覆盖配置中的监听端口
    #[arg(short, long)]
    port: Option<u16>,

    /// 覆盖配置中的监听地址
    #[arg(long)]
    bind: Option<String>,
}

fn init_tracing() {
    // RUST_LOG 优先，默认 info
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut cfg = config::load(&cli.config)?;
    if let Some(port) = cli.port {
        cfg.port = port;
    }
    if let Some(bind) = cli.bind {
        cfg.bind = bind;
    }

    server::run(cfg).await
}
