//! khinsider 专辑下载器。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置/日志/命名清理/调试快照等基础设施
//! - `album`：专辑页抓取与解析
//! - `network`：HTTP 客户端抽象、站点常量、曲目页解析
//! - `download`：并发下载调度与进度事件
//! - `ui`：命令行交互

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::Parser;
use tracing::info;

mod album;
mod base_system;
mod download;
mod error;
mod network;
mod ui;

use base_system::config::load_or_create_with_base;
use base_system::context::Config;
use base_system::logging::{LogOptions, LogSystem};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "khinsider-downloader")]
#[command(about = "Download whole soundtrack albums from downloads.khinsider.com")]
struct Cli {
    /// 专辑页地址（`--track` 时为单曲详情页地址）
    url: Option<String>,

    /// 把地址当作单曲详情页，只下载这一首
    #[arg(long, default_value_t = false)]
    track: bool,

    /// 保存目录，覆盖配置文件中的 save_path
    #[arg(long)]
    dest: Option<String>,

    /// 同时下载的曲目数，覆盖配置文件中的 max_workers
    #[arg(long)]
    workers: Option<usize>,

    /// 启用调试日志，并保存抓到的专辑页
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// 数据目录路径（存放 config.yml、logs、debug 等）
    #[arg(long)]
    data_dir: Option<String>,

    /// 显示版本信息后退出
    #[arg(long, default_value_t = false)]
    version: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("khinsider-downloader v{}", VERSION);
        return Ok(());
    }

    let Some(url) = cli.url.clone() else {
        return Err(anyhow!("missing album url, see --help"));
    };

    let data_dir = cli.data_dir.as_ref().map(PathBuf::from);
    let _log = init_logging(cli.debug, data_dir.as_deref())?;
    info!(target: "startup", "khinsider-downloader v{}", VERSION);

    let mut config = load_or_create_with_base::<Config>(data_dir.as_deref())
        .map_err(|e| anyhow!(e.to_string()))?;
    apply_overrides(&mut config, &cli);

    let opts = ui::cli::RunOptions {
        url,
        single_track: cli.track,
        data_dir: data_dir.unwrap_or_else(|| PathBuf::from(".")),
    };
    ui::cli::run(&config, opts)
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(dest) = cli.dest.as_deref() {
        config.save_path = dest.trim().to_string();
    }
    if let Some(workers) = cli.workers {
        config.max_workers = workers.max(1);
    }
    if cli.debug {
        config.debug_dump_html = true;
    }
}

fn init_logging(debug: bool, base_dir: Option<&std::path::Path>) -> Result<LogSystem> {
    let opts = LogOptions {
        debug,
        use_color: true,
        archive_on_exit: true,
        // 进度条模式下由 UI 打印事件，控制台日志只在调试时打开
        console: debug,
    };
    LogSystem::init_with_base(opts, base_dir).map_err(|e| anyhow!(e))
}
