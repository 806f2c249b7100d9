//! 命令行交互：抓专辑 → 打印信息 → 带进度条批量下载 → 汇总。
//!
//! 下载任务在 tokio 运行时里跑；进度事件经 crossbeam 通道交给独立线程渲染，
//! 回调本身不碰终端。

use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, unbounded};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use reqwest::Url;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::album::fetch_album;
use crate::album::models::AlbumInfo;
use crate::base_system::context::Config;
use crate::base_system::fs_names::{clean_file_name, clean_folder_name, has_audio_ext};
use crate::download::{BatchEvent, DownloadResult, EventCallback, TrackEvent, download_track, run_batch};
use crate::error::FetchError;
use crate::network::client::{Fetcher, HttpConfig, HttpFetcher};
use crate::network::resolver::resolve_audio_url;

pub struct RunOptions {
    pub url: String,
    /// `url` 是单曲详情页而不是专辑页。
    pub single_track: bool,
    /// 调试快照的落盘目录（通常是数据目录）。
    pub data_dir: PathBuf,
}

// ── 事件分级 ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

impl Level {
    pub fn of(event: &TrackEvent) -> Self {
        match event {
            TrackEvent::Downloading { .. } | TrackEvent::Skipped { .. } => Self::Info,
            TrackEvent::Completed { .. } => Self::Success,
            TrackEvent::Cancelled { .. } => Self::Warning,
            TrackEvent::Failed { .. } => Self::Error,
        }
    }
}

pub fn event_prefix(event: &TrackEvent) -> &'static str {
    match event {
        TrackEvent::Downloading { .. } => "⬇",
        TrackEvent::Completed { .. } => "✓",
        TrackEvent::Failed { .. } => "✗",
        TrackEvent::Skipped { .. } => "⊘",
        TrackEvent::Cancelled { .. } => "⏹",
    }
}

/// 终端上的一行：图标 + 曲名，跳过与取消带上原因后缀。
pub fn display_line(event: &TrackEvent) -> String {
    let prefix = event_prefix(event);
    match event {
        TrackEvent::Failed { name, message } => format!("{prefix} {name} - {message}"),
        TrackEvent::Skipped {
            name,
            duplicate: true,
        } => format!("{prefix} {name} (duplicate)"),
        TrackEvent::Skipped { name, .. } => format!("{prefix} {name} (already exists)"),
        TrackEvent::Cancelled { name } => format!("{prefix} {name} (cancelled)"),
        other => format!("{prefix} {}", other.name()),
    }
}

fn log_event(ev: &BatchEvent) {
    let label = ev.label();
    match Level::of(&ev.event) {
        Level::Info | Level::Success => info!(target: "progress", "[{}/{}] {label}", ev.completed, ev.total),
        Level::Warning => warn!(target: "progress", "[{}/{}] {label}", ev.completed, ev.total),
        Level::Error => error!(target: "progress", "[{}/{}] {label}", ev.completed, ev.total),
    }
}

// ── 入口 ────────────────────────────────────────────────────────

pub fn run(config: &Config, opts: RunOptions) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        if let Err(err) = ctrlc::set_handler(move || {
            eprintln!("\nStopping, waiting for in-flight tracks...");
            cancel.cancel();
        }) {
            warn!(target: "cli", "failed to install Ctrl-C handler: {err}");
        }
    }

    let fetcher = Arc::new(HttpFetcher::new(HttpConfig::from(config))?);

    if opts.single_track {
        return runtime.block_on(single_track(fetcher.as_ref(), config, &opts.url, &cancel));
    }

    let Some((album, folder)) =
        runtime.block_on(prepare_album(fetcher.as_ref(), config, &opts, &cancel))?
    else {
        println!("\nDownload cancelled.");
        return Ok(());
    };
    if album.tracks.is_empty() {
        return Ok(());
    }

    let start = Instant::now();
    let (tx, rx) = unbounded::<BatchEvent>();
    let renderer = spawn_renderer(rx, album.tracks.len());
    let on_event: EventCallback = Arc::new(move |ev| {
        let _ = tx.send(ev);
    });

    let result = runtime.block_on(run_batch(
        fetcher,
        &album.tracks,
        &folder,
        config.max_workers,
        cancel,
        on_event,
    ));
    // 回调（连同发送端）随 run_batch 一起释放，渲染线程读空后退出
    let _ = renderer.join();

    print_summary(&result, start.elapsed().as_secs_f64());

    if config.auto_open_folder && !result.was_cancelled() && folder_has_audio(&folder) {
        if let Err(err) = open_in_default_app(&folder) {
            warn!(target: "cli", "failed to open {}: {err}", folder.display());
        }
    }
    Ok(())
}

/// 在取消信号与 `fut` 之间竞速；取消时返回 `Ok(None)`。
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<Option<T>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Ok(None),
        res = fut => res.map(Some),
    }
}

/// 抓专辑并建好目标文件夹。加载期间收到取消则什么都不创建，返回 `None`。
async fn prepare_album<F: Fetcher>(
    fetcher: &F,
    config: &Config,
    opts: &RunOptions,
    cancel: &CancellationToken,
) -> Result<Option<(AlbumInfo, PathBuf)>> {
    let Some(album) = until_cancelled(cancel, load_album(fetcher, config, opts)).await? else {
        info!(target: "cli", "cancelled while loading {}", opts.url.trim());
        return Ok(None);
    };
    print_album(&album);

    let folder = config.default_save_dir().join(clean_folder_name(&album.title));
    if album.tracks.is_empty() {
        println!("No tracks to download.");
        return Ok(Some((album, folder)));
    }

    fs::create_dir_all(&folder)
        .with_context(|| format!("failed to create {}", folder.display()))?;
    info!(target: "cli", "album folder ready: {}", folder.display());
    println!("Saving to: {}\n", folder.display());
    Ok(Some((album, folder)))
}

async fn load_album<F: Fetcher>(fetcher: &F, config: &Config, opts: &RunOptions) -> Result<AlbumInfo> {
    if config.validate_before_download && !fetcher.is_reachable(opts.url.trim()).await {
        return Err(anyhow!("album page is not reachable: {}", opts.url.trim()));
    }
    let dump_dir = config.debug_dump_html.then_some(opts.data_dir.as_path());
    let album = fetch_album(fetcher, &opts.url, dump_dir)
        .await
        .with_context(|| format!("failed to load album {}", opts.url.trim()))?;
    Ok(album)
}

fn print_album(album: &AlbumInfo) {
    println!("\nAlbum: {}", album.title);
    if !album.cover_url.is_empty() {
        println!("Cover: {}", album.cover_url);
    }
    println!("Tracks: {}", album.tracks.len());
}

fn spawn_renderer(rx: Receiver<BatchEvent>, total: usize) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let bar = ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::stderr());
        if let Ok(style) =
            ProgressStyle::with_template("[{elapsed_precise}] {wide_bar} {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("##-"));
        }

        for ev in rx.iter() {
            log_event(&ev);
            bar.println(display_line(&ev.event));
            bar.set_position(ev.completed as u64);
            if !ev.event.is_terminal() {
                bar.set_message(ev.event.name().to_string());
            }
        }
        bar.finish_and_clear();
    })
}

fn print_summary(result: &DownloadResult, secs: f64) {
    if result.was_cancelled() {
        println!("\nDownload cancelled. {}/{} tracks settled.", result.settled(), result.total);
    } else {
        println!(
            "\nDownload completed! {}/{} tracks processed",
            result.settled(),
            result.total
        );
    }
    println!(
        "  downloaded {}, skipped {}, duplicates {}, failed {}, cancelled {} ({:.1}s)",
        result.success, result.skipped, result.duplicates, result.failed, result.canceled, secs
    );
    info!(target: "cli", "summary: {:?}", result);
}

// ── 单曲模式 ────────────────────────────────────────────────────

async fn single_track<F: Fetcher>(
    fetcher: &F,
    config: &Config,
    track_page_url: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    let track_page_url = track_page_url.trim();
    let resolve = async {
        resolve_audio_url(fetcher, track_page_url)
            .await
            .map_err(anyhow::Error::from)
    };
    let Some(audio_url) = until_cancelled(cancel, resolve).await? else {
        println!("\nDownload cancelled.");
        return Ok(());
    };

    let name = track_file_name(&audio_url)
        .ok_or_else(|| anyhow!("cannot derive a file name from {audio_url}"))?;
    let dir = config.default_save_dir();
    fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(&name);

    let bar = ProgressBar::with_draw_target(Some(100), ProgressDrawTarget::stderr());
    if let Ok(style) = ProgressStyle::with_template("{msg} {wide_bar} {pos}%") {
        bar.set_style(style.progress_chars("##-"));
    }
    bar.set_message(name.clone());

    let res = download_track(fetcher, &audio_url, &path, cancel, |pct| {
        bar.set_position(pct as u64)
    })
    .await;
    bar.finish_and_clear();

    let bytes = match res {
        Err(FetchError::Cancelled) => {
            println!("\nDownload cancelled.");
            return Ok(());
        }
        other => other.with_context(|| format!("failed to download {name}"))?,
    };
    println!("Saved {} ({} bytes)", path.display(), bytes);
    Ok(())
}

/// 取音频地址的最后一段做文件名（先整段百分号解码）。
fn track_file_name(audio_url: &str) -> Option<String> {
    let url = Url::parse(audio_url).ok()?;
    let last = url.path_segments()?.rev().find(|s| !s.is_empty())?;
    let decoded = urlencoding::decode_binary(last.as_bytes());
    let name = clean_file_name(&String::from_utf8_lossy(&decoded));
    (!name.is_empty()).then_some(name)
}

// ── 收尾 ────────────────────────────────────────────────────────

fn folder_has_audio(folder: &Path) -> bool {
    fs::read_dir(folder)
        .map(|entries| {
            entries
                .flatten()
                .any(|e| has_audio_ext(&e.file_name().to_string_lossy()))
        })
        .unwrap_or(false)
}

fn open_in_default_app(path: &Path) -> std::io::Result<()> {
    if cfg!(target_os = "windows") {
        Command::new("explorer").arg(path).spawn()?;
        return Ok(());
    }
    if cfg!(target_os = "macos") {
        Command::new("open").arg(path).spawn()?;
        return Ok(());
    }
    Command::new("xdg-open").arg(path).spawn()?;
    Ok(())
}
