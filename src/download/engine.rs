//! 整批下载调度。
//!
//! 每首曲目一开始就各起一个任务，随即在固定大小的信号量上排队，
//! 同一时刻最多 `max_workers` 个任务在做网络/磁盘操作。单曲流程：
//! 取名额 → 检查取消 → 解析音频地址 → 去重 → 已存在检查 → 流式写盘。
//! 单曲失败只降级为 `Failed` 事件；取消后不再发放名额，所有曲目最终都会落到终态。

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::StreamExt;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::models::{BatchEvent, DownloadResult, EventCallback, TrackEvent, TrackOutcome};
use super::progress::BatchProgress;
use crate::album::models::TrackInfo;
use crate::base_system::fs_names::ensure_audio_ext;
use crate::error::FetchError;
use crate::network::client::{AudioStream, Fetcher};
use crate::network::resolver::resolve_audio_url;

/// 写盘缓冲，同时也是单次写入的上限。
pub const CHUNK_SIZE: usize = 8 * 1024;

const PART_EXT: &str = ".part";

/// 在取消信号与 I/O 之间竞速；取消优先。
async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, FetchError>>,
) -> Result<T, FetchError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FetchError::Cancelled),
        res = fut => res,
    }
}

struct TrackCtx<F> {
    fetcher: Arc<F>,
    progress: Arc<BatchProgress>,
    slots: Arc<Semaphore>,
    cancel: CancellationToken,
    on_event: EventCallback,
    dest: PathBuf,
}

impl<F> Clone for TrackCtx<F> {
    fn clone(&self) -> Self {
        Self {
            fetcher: self.fetcher.clone(),
            progress: self.progress.clone(),
            slots: self.slots.clone(),
            cancel: self.cancel.clone(),
            on_event: self.on_event.clone(),
            dest: self.dest.clone(),
        }
    }
}

impl<F> TrackCtx<F> {
    fn emit(&self, completed: usize, event: TrackEvent) {
        (self.on_event)(BatchEvent {
            completed,
            total: self.progress.total(),
            event,
        });
    }

    /// 终态：计数自增后上报，保证最终 completed == total。
    fn settle(&self, event: TrackEvent, outcome: TrackOutcome) -> TrackOutcome {
        let completed = self.progress.finish_one();
        self.emit(completed, event);
        outcome
    }
}

/// 下载一批曲目到 `dest`。单曲失败不会中断整批，也不会以错误形式返回。
pub async fn run_batch<F: Fetcher>(
    fetcher: Arc<F>,
    tracks: &[TrackInfo],
    dest: &Path,
    max_workers: usize,
    cancel: CancellationToken,
    on_event: EventCallback,
) -> DownloadResult {
    let workers = max_workers.max(1);
    info!(target: "download", "batch start: {} tracks, {} workers -> {}", tracks.len(), workers, dest.display());

    let ctx = TrackCtx {
        fetcher,
        progress: Arc::new(BatchProgress::new(tracks.len())),
        slots: Arc::new(Semaphore::new(workers)),
        cancel,
        on_event,
        dest: dest.to_path_buf(),
    };

    let mut set = JoinSet::new();
    for track in tracks.iter().cloned() {
        set.spawn(run_track(ctx.clone(), track));
    }

    let mut result = DownloadResult::new(tracks.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(outcome) => result.record(outcome),
            Err(err) => {
                // 任务 panic：仍然计入终态，保持计数闭合
                error!(target: "download", "track worker aborted: {err}");
                let outcome = ctx.settle(
                    TrackEvent::Failed {
                        name: "unknown track".to_string(),
                        message: err.to_string(),
                    },
                    TrackOutcome::Failed,
                );
                result.record(outcome);
            }
        }
    }

    info!(
        target: "download",
        "batch done: {} ok, {} skipped, {} duplicate, {} failed, {} cancelled",
        result.success, result.skipped, result.duplicates, result.failed, result.canceled
    );
    result
}

async fn run_track<F: Fetcher>(ctx: TrackCtx<F>, track: TrackInfo) -> TrackOutcome {
    let name = track.name.clone();

    let permit = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => None,
        permit = ctx.slots.clone().acquire_owned() => permit.ok(),
    };
    // 拿到名额的瞬间也可能已经取消
    let Some(_permit) = permit.filter(|_| !ctx.cancel.is_cancelled()) else {
        return ctx.settle(TrackEvent::Cancelled { name }, TrackOutcome::Cancelled);
    };

    match process_track(&ctx, &track).await {
        Ok(TrackOutcome::SkippedDuplicate) => ctx.settle(
            TrackEvent::Skipped {
                name,
                duplicate: true,
            },
            TrackOutcome::SkippedDuplicate,
        ),
        Ok(TrackOutcome::SkippedExisting) => ctx.settle(
            TrackEvent::Skipped {
                name,
                duplicate: false,
            },
            TrackOutcome::SkippedExisting,
        ),
        Ok(_) => ctx.settle(TrackEvent::Completed { name }, TrackOutcome::Completed),
        Err(FetchError::Cancelled) => {
            debug!(target: "download", "cancelled: {name}");
            ctx.settle(TrackEvent::Cancelled { name }, TrackOutcome::Cancelled)
        }
        Err(err) => {
            warn!(target: "download", "failed: {name} ({}): {err}", track.url);
            ctx.settle(
                TrackEvent::Failed {
                    name,
                    message: err.to_string(),
                },
                TrackOutcome::Failed,
            )
        }
    }
}

async fn process_track<F: Fetcher>(
    ctx: &TrackCtx<F>,
    track: &TrackInfo,
) -> Result<TrackOutcome, FetchError> {
    let audio_url = cancellable(&ctx.cancel, resolve_audio_url(ctx.fetcher.as_ref(), &track.url)).await?;

    if !ctx.progress.claim(&audio_url) {
        debug!(target: "download", "duplicate audio url {audio_url} for {}", track.name);
        return Ok(TrackOutcome::SkippedDuplicate);
    }

    let path = ctx.dest.join(ensure_audio_ext(track.name.clone()));
    if already_downloaded(&path).await {
        return Ok(TrackOutcome::SkippedExisting);
    }

    ctx.emit(
        ctx.progress.completed(),
        TrackEvent::Downloading {
            name: track.name.clone(),
        },
    );

    let bytes = stream_to_file(ctx.fetcher.as_ref(), &audio_url, &path, &ctx.cancel, |_| {}).await?;
    debug!(target: "download", "{} bytes -> {}", bytes, path.display());
    Ok(TrackOutcome::Completed)
}

/// 已存在且非空即视为下载过；不校验内容完整性。
pub async fn already_downloaded(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

/// 单曲下载：`on_progress` 收到 0..=100 的百分比，仅当响应声明了长度时才会调用。
pub async fn download_track<F: Fetcher>(
    fetcher: &F,
    audio_url: &str,
    path: &Path,
    cancel: &CancellationToken,
    on_progress: impl FnMut(f64) + Send,
) -> Result<u64, FetchError> {
    stream_to_file(fetcher, audio_url, path, cancel, on_progress).await
}

/// 先写同目录临时文件，完整后再改名为 `path`；失败或取消只删临时文件，
/// 目标路径上不会出现半截文件，也不会误删别的任务写好的同名文件。
async fn stream_to_file<F: Fetcher>(
    fetcher: &F,
    audio_url: &str,
    path: &Path,
    cancel: &CancellationToken,
    on_progress: impl FnMut(f64) + Send,
) -> Result<u64, FetchError> {
    let stream = cancellable(cancel, fetcher.open_audio(audio_url)).await?;
    let part = part_path(path);
    let res = match write_stream(stream, &part, cancel, on_progress).await {
        Ok(written) => tokio::fs::rename(&part, path)
            .await
            .map(|_| written)
            .map_err(|e| FetchError::io(path, e)),
        Err(err) => Err(err),
    };
    if res.is_err() {
        let _ = tokio::fs::remove_file(&part).await;
    }
    res
}

/// 同目录下的临时文件名，每次调用唯一；同名曲目并发写入时互不覆盖。
fn part_path(path: &Path) -> PathBuf {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}.{seq}{PART_EXT}", std::process::id()));
    path.with_file_name(name)
}

async fn write_stream(
    stream: AudioStream,
    path: &Path,
    cancel: &CancellationToken,
    mut on_progress: impl FnMut(f64) + Send,
) -> Result<u64, FetchError> {
    let file = File::create(path)
        .await
        .map_err(|e| FetchError::io(path, e))?;
    let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);
    let mut body = stream.body;
    let mut written = 0u64;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            next = body.next() => next,
        };
        let Some(chunk) = next else {
            break;
        };
        let chunk = chunk?;
        for piece in chunk.chunks(CHUNK_SIZE) {
            writer
                .write_all(piece)
                .await
                .map_err(|e| FetchError::io(path, e))?;
        }
        written += chunk.len() as u64;

        if let Some(total) = stream.content_length {
            on_progress((written as f64 / total as f64 * 100.0).min(100.0));
        }
    }

    writer.flush().await.map_err(|e| FetchError::io(path, e))?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::album::extractor::extract;
    use crate::network::client::AudioStream;
    use bytes::Bytes;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const SLOW: &str = "https://cdn.test/slow.mp3";

    #[derive(Default)]
    struct MockFetcher {
        pages: HashMap<String, String>,
        audio: HashMap<String, Vec<u8>>,
        failing: HashSet<String>,
        /// 首块之后流中断
        broken: HashSet<String>,
        declare_length: bool,
        page_delay: Option<Duration>,
        audio_requests: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl MockFetcher {
        fn with_track(mut self, listing: &str, audio_url: &str, bytes: &[u8]) -> Self {
            self.pages.insert(
                listing.to_string(),
                format!(r#"<html><audio src="{audio_url}"></audio></html>"#),
            );
            self.audio.insert(audio_url.to_string(), bytes.to_vec());
            self
        }

        fn requested(&self, audio_url: &str) -> usize {
            self.audio_requests
                .lock()
                .unwrap()
                .iter()
                .filter(|u| *u == audio_url)
                .count()
        }
    }

    impl Fetcher for MockFetcher {
        async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.page_delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                })
        }

        async fn open_audio(&self, url: &str) -> Result<AudioStream, FetchError> {
            self.audio_requests.lock().unwrap().push(url.to_string());
            if url == SLOW {
                std::future::pending::<()>().await;
            }
            if self.failing.contains(url) {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: 500,
                });
            }
            let data = self.audio.get(url).cloned().unwrap_or_default();
            let content_length = self.declare_length.then_some(data.len() as u64);
            // 拆成多个小块模拟网络分片
            let mut chunks: Vec<Result<Bytes, FetchError>> = data
                .chunks(3000)
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect();
            if self.broken.contains(url) {
                chunks.truncate(1);
                chunks.push(Err(FetchError::Network("connection reset".into())));
            }
            Ok(AudioStream {
                content_length,
                body: futures::stream::iter(chunks).boxed(),
            })
        }

        async fn is_reachable(&self, _url: &str) -> bool {
            true
        }
    }

    fn track(name: &str, listing: &str) -> TrackInfo {
        TrackInfo::new(name.to_string(), listing.to_string())
    }

    fn recorder() -> (EventCallback, Arc<Mutex<Vec<BatchEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let cb: EventCallback = Arc::new(move |ev| sink.lock().unwrap().push(ev));
        (cb, events)
    }

    fn labels(events: &Arc<Mutex<Vec<BatchEvent>>>) -> Vec<String> {
        events.lock().unwrap().iter().map(|e| e.label()).collect()
    }

    fn terminal_count(events: &Arc<Mutex<Vec<BatchEvent>>>) -> usize {
        events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event.is_terminal())
            .count()
    }

    #[tokio::test]
    async fn downloads_every_track_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = MockFetcher::default()
            .with_track("https://s/1", "https://cdn/1.mp3", &[1u8; 10_000])
            .with_track("https://s/2", "https://cdn/2.mp3", &[2u8; 20]);
        let tracks = [track("One.mp3", "https://s/1"), track("Two.mp3", "https://s/2")];
        let (cb, events) = recorder();

        let result = run_batch(
            Arc::new(fetcher),
            &tracks,
            dir.path(),
            5,
            CancellationToken::new(),
            cb,
        )
        .await;

        assert_eq!(result.success, 2);
        assert_eq!(std::fs::read(dir.path().join("One.mp3")).unwrap(), vec![1u8; 10_000]);
        assert_eq!(std::fs::read(dir.path().join("Two.mp3")).unwrap().len(), 20);

        let events = events.lock().unwrap();
        let last = events.iter().map(|e| e.completed).max().unwrap();
        assert_eq!(last, 2);
        assert!(events.iter().all(|e| e.total == 2));
        assert_eq!(events.iter().filter(|e| !e.event.is_terminal()).count(), 2);
    }

    #[tokio::test]
    async fn tracks_sharing_an_audio_url_download_once() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(
            MockFetcher::default()
                .with_track("https://s/a", "https://cdn/same.mp3", b"abc")
                .with_track("https://s/b", "https://cdn/same.mp3", b"abc")
                .with_track("https://s/c", "https://cdn/same.mp3", b"abc")
                .with_track("https://s/d", "https://cdn/other.mp3", b"xyz"),
        );
        let tracks = [
            track("A.mp3", "https://s/a"),
            track("B.mp3", "https://s/b"),
            track("C.mp3", "https://s/c"),
            track("D.mp3", "https://s/d"),
        ];
        let (cb, events) = recorder();

        let result = run_batch(
            fetcher.clone(),
            &tracks,
            dir.path(),
            4,
            CancellationToken::new(),
            cb,
        )
        .await;

        assert_eq!(fetcher.requested("https://cdn/same.mp3"), 1);
        assert_eq!(result.duplicates, 2);
        assert_eq!(result.success, 2);
        assert_eq!(terminal_count(&events), 4);
        let dup_labels = labels(&events)
            .into_iter()
            .filter(|l| l.ends_with("(duplicate)"))
            .count();
        assert_eq!(dup_labels, 2);
    }

    #[tokio::test]
    async fn existing_non_empty_files_are_not_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Have.mp3"), b"old").unwrap();
        std::fs::write(dir.path().join("Empty.mp3"), b"").unwrap();

        let fetcher = Arc::new(
            MockFetcher::default()
                .with_track("https://s/have", "https://cdn/have.mp3", b"new")
                .with_track("https://s/empty", "https://cdn/empty.mp3", b"fresh"),
        );
        let tracks = [
            track("Have.mp3", "https://s/have"),
            track("Empty.mp3", "https://s/empty"),
        ];
        let (cb, events) = recorder();

        let result = run_batch(
            fetcher.clone(),
            &tracks,
            dir.path(),
            2,
            CancellationToken::new(),
            cb,
        )
        .await;

        assert_eq!(result.skipped, 1);
        assert_eq!(result.success, 1);
        assert_eq!(fetcher.requested("https://cdn/have.mp3"), 0);
        assert_eq!(std::fs::read(dir.path().join("Have.mp3")).unwrap(), b"old");
        assert_eq!(std::fs::read(dir.path().join("Empty.mp3")).unwrap(), b"fresh");
        assert!(labels(&events).contains(&"Skipped: Have.mp3".to_string()));
    }

    #[tokio::test]
    async fn failures_are_reported_and_do_not_stop_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let mut fetcher = MockFetcher::default()
            .with_track("https://s/bad", "https://cdn/bad.mp3", b"")
            .with_track("https://s/good", "https://cdn/good.mp3", b"ok");
        fetcher.failing.insert("https://cdn/bad.mp3".to_string());
        fetcher.pages.insert(
            "https://s/silent".to_string(),
            "<html><a href='/forum'>Forum</a></html>".to_string(),
        );
        let tracks = [
            track("Bad.mp3", "https://s/bad"),
            track("Silent.mp3", "https://s/silent"),
            track("Missing.mp3", "https://s/missing"),
            track("Good.mp3", "https://s/good"),
        ];
        let (cb, events) = recorder();

        let result = run_batch(
            Arc::new(fetcher),
            &tracks,
            dir.path(),
            1,
            CancellationToken::new(),
            cb,
        )
        .await;

        assert_eq!(result.failed, 3);
        assert_eq!(result.success, 1);
        assert_eq!(result.settled(), 4);
        assert!(!dir.path().join("Bad.mp3").exists());

        let labels = labels(&events);
        assert!(labels.contains(&"Failed: Bad.mp3 - HTTP 500 for https://cdn/bad.mp3".to_string()));
        assert!(labels.contains(&"Failed: Silent.mp3 - no audio source found on https://s/silent".to_string()));
        assert!(labels.iter().any(|l| l.starts_with("Failed: Missing.mp3 - HTTP 404")));
        assert!(labels.contains(&"Completed: Good.mp3".to_string()));
    }

    fn leftover_parts(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(PART_EXT))
            .count()
    }

    #[tokio::test]
    async fn same_named_tracks_never_clobber_a_finished_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut fetcher = MockFetcher::default()
            .with_track("https://s/disc1", "https://cdn/disc1/intro.mp3", &[1u8; 9000])
            .with_track("https://s/disc2", "https://cdn/disc2/intro.mp3", &[2u8; 9000]);
        fetcher.broken.insert("https://cdn/disc2/intro.mp3".to_string());
        fetcher.page_delay = Some(Duration::from_millis(5));
        let tracks = [
            track("Intro.mp3", "https://s/disc1"),
            track("Intro.mp3", "https://s/disc2"),
        ];
        let (cb, _events) = recorder();

        let result = run_batch(
            Arc::new(fetcher),
            &tracks,
            dir.path(),
            2,
            CancellationToken::new(),
            cb,
        )
        .await;

        // 另一首要么中途失败，要么看到已完成的文件而跳过
        assert_eq!(result.success, 1);
        assert_eq!(result.failed + result.skipped, 1);
        assert_eq!(
            std::fs::read(dir.path().join("Intro.mp3")).unwrap(),
            vec![1u8; 9000]
        );
        assert_eq!(leftover_parts(dir.path()), 0);
    }

    #[tokio::test]
    async fn broken_streams_leave_no_partial_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut fetcher =
            MockFetcher::default().with_track("https://s/1", "https://cdn/1.mp3", &[5u8; 9000]);
        fetcher.broken.insert("https://cdn/1.mp3".to_string());

        let path = dir.path().join("one.mp3");
        let err = download_track(
            &fetcher,
            "https://cdn/1.mp3",
            &path,
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap_err();

        assert!(matches!(err, FetchError::Network(_)));
        assert!(!path.exists());
        assert_eq!(leftover_parts(dir.path()), 0);
    }

    #[test]
    fn part_paths_are_unique_siblings() {
        let path = Path::new("/music/album/Intro.mp3");
        let a = part_path(path);
        let b = part_path(path);
        assert_ne!(a, b);
        assert_eq!(a.parent(), path.parent());
        assert!(a.to_string_lossy().ends_with(PART_EXT));
    }

    #[tokio::test]
    async fn concurrency_is_bounded_by_the_worker_budget() {
        let dir = tempfile::tempdir().unwrap();
        let mut fetcher = MockFetcher::default();
        let mut tracks = Vec::new();
        for i in 0..8 {
            let listing = format!("https://s/{i}");
            fetcher = fetcher.with_track(&listing, &format!("https://cdn/{i}.mp3"), b"x");
            tracks.push(track(&format!("T{i}.mp3"), &listing));
        }
        fetcher.page_delay = Some(Duration::from_millis(20));
        let fetcher = Arc::new(fetcher);
        let (cb, _events) = recorder();

        let result = run_batch(
            fetcher.clone(),
            &tracks,
            dir.path(),
            2,
            CancellationToken::new(),
            cb,
        )
        .await;

        assert_eq!(result.success, 8);
        assert!(fetcher.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn cancelling_mid_batch_settles_every_track() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(
            MockFetcher::default()
                .with_track("https://s/slow", SLOW, b"never")
                .with_track("https://s/2", "https://cdn/2.mp3", b"two")
                .with_track("https://s/3", "https://cdn/3.mp3", b"three"),
        );
        let tracks = [
            track("Slow.mp3", "https://s/slow"),
            track("Two.mp3", "https://s/2"),
            track("Three.mp3", "https://s/3"),
        ];

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<BatchEvent>();
        let cb: EventCallback = Arc::new(move |ev| {
            let _ = tx.send(ev);
        });
        let cancel = CancellationToken::new();

        let batch = {
            let fetcher = fetcher.clone();
            let cancel = cancel.clone();
            let dest = dir.path().to_path_buf();
            tokio::spawn(async move { run_batch(fetcher, &tracks, &dest, 1, cancel, cb).await })
        };

        // 等到某首曲目开始下载后再取消
        let mut seen = Vec::new();
        loop {
            let ev = rx.recv().await.unwrap();
            let started_slow = ev.event == TrackEvent::Downloading { name: "Slow.mp3".into() };
            seen.push(ev);
            if started_slow {
                break;
            }
        }
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), batch)
            .await
            .expect("batch must wind down after cancel")
            .unwrap();
        while let Ok(ev) = rx.try_recv() {
            seen.push(ev);
        }

        assert_eq!(result.settled(), 3);
        assert!(result.canceled >= 1);
        assert_eq!(seen.iter().filter(|e| e.event.is_terminal()).count(), 3);
        assert_eq!(seen.iter().map(|e| e.completed).max(), Some(3));
        assert!(
            seen.iter()
                .any(|e| e.event == TrackEvent::Cancelled { name: "Slow.mp3".into() })
        );
        assert!(!dir.path().join("Slow.mp3").exists());
    }

    #[tokio::test]
    async fn a_pre_cancelled_batch_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(MockFetcher::default().with_track(
            "https://s/1",
            "https://cdn/1.mp3",
            b"1",
        ));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (cb, events) = recorder();

        let result = run_batch(
            fetcher.clone(),
            &[track("One.mp3", "https://s/1")],
            dir.path(),
            3,
            cancel,
            cb,
        )
        .await;

        assert_eq!(result.canceled, 1);
        assert_eq!(fetcher.max_in_flight.load(Ordering::SeqCst), 0);
        assert_eq!(labels(&events), ["Cancelled: One.mp3"]);
    }

    #[tokio::test]
    async fn album_scenario_with_repeat_and_existing_file() {
        let html = r#"<html><body><h2>Example Game Soundtrack</h2>
            <table id="songlist">
              <tr><td><a href="/game-soundtracks/album/example-ost/01.mp3">Opening</a></td></tr>
              <tr><td><a href="/game-soundtracks/album/example-ost/02.mp3">Field</a></td></tr>
              <tr><td><a href="/game-soundtracks/album/example-ost/02.mp3">Field</a></td></tr>
            </table></body></html>"#;
        let album = extract(
            html,
            "https://downloads.khinsider.com/game-soundtracks/album/example-ost",
        )
        .unwrap();
        assert_eq!(album.tracks.len(), 2);

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Opening.mp3"), b"already here").unwrap();

        let fetcher = Arc::new(
            MockFetcher::default()
                .with_track(&album.tracks[0].url, "https://cdn/01.mp3", b"one")
                .with_track(&album.tracks[1].url, "https://cdn/02.mp3", b"two"),
        );
        let (cb, events) = recorder();

        let result = run_batch(
            fetcher,
            &album.tracks,
            dir.path(),
            1,
            CancellationToken::new(),
            cb,
        )
        .await;

        assert_eq!(result.skipped, 1);
        assert_eq!(result.success, 1);
        let labels = labels(&events);
        assert!(labels.contains(&"Skipped: Opening.mp3".to_string()));
        assert!(labels.contains(&"Completed: Field.mp3".to_string()));
        assert_eq!(
            events.lock().unwrap().iter().map(|e| e.completed).max(),
            Some(2)
        );
    }

    #[tokio::test]
    async fn single_track_reports_percentages_when_length_is_known() {
        let dir = tempfile::tempdir().unwrap();
        let mut fetcher =
            MockFetcher::default().with_track("https://s/1", "https://cdn/1.mp3", &[9u8; 9000]);
        fetcher.declare_length = true;

        let mut seen = Vec::new();
        let path = dir.path().join("one.mp3");
        let n = download_track(
            &fetcher,
            "https://cdn/1.mp3",
            &path,
            &CancellationToken::new(),
            |p| seen.push(p),
        )
        .await
        .unwrap();

        assert_eq!(n, 9000);
        assert_eq!(seen.len(), 3);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(seen.last().copied(), Some(100.0));

        fetcher.declare_length = false;
        let mut calls = 0;
        download_track(
            &fetcher,
            "https://cdn/1.mp3",
            &dir.path().join("two.mp3"),
            &CancellationToken::new(),
            |_| calls += 1,
        )
        .await
        .unwrap();
        assert_eq!(calls, 0);
    }
}
