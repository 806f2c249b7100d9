//! 一批下载内跨任务共享的可变状态：完成计数与去重账本。
//!
//! 其余状态（曲名、地址、路径）都是任务私有的，不需要更大范围的锁。

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug)]
pub struct BatchProgress {
    total: usize,
    completed: AtomicUsize,
    claimed: Mutex<HashSet<String>>,
}

impl BatchProgress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
            claimed: Mutex::new(HashSet::new()),
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// 自增并返回新值。
    pub fn finish_one(&self) -> usize {
        self.completed.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// 插入即占有：同一音频地址只有第一个调用者拿到 `true`。
    pub fn claim(&self, audio_url: &str) -> bool {
        let mut claimed = self.claimed.lock().unwrap_or_else(|e| e.into_inner());
        claimed.insert(audio_url.to_string())
    }

    #[cfg(test)]
    fn claimed_len(&self) -> usize {
        self.claimed.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn claim_is_insert_if_absent() {
        let p = BatchProgress::new(3);
        assert!(p.claim("https://a/1.mp3"));
        assert!(!p.claim("https://a/1.mp3"));
        assert!(p.claim("https://a/2.mp3"));
        assert_eq!(p.claimed_len(), 2);
    }

    #[test]
    fn concurrent_claims_have_a_single_winner() {
        let p = Arc::new(BatchProgress::new(16));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let p = p.clone();
                std::thread::spawn(move || {
                    let won = p.claim("https://a/same.mp3");
                    p.finish_one();
                    won
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(p.completed(), p.total());
    }
}
