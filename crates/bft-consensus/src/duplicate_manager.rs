//! `DuplicateManager` (spec §4.D): a sliding-window defense against
//! re-proposing or re-executing the same client batch.
//!
//! Grounded line-for-line on
//! `examples/original_source/platform/consensus/execution/duplicate_manager.{h,cpp}`:
//! two independent hash sets (proposed, executed), each backed by a
//! time-ordered queue so the eviction loop only ever has to look at the
//! queue head.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

struct HashWindow {
    set: HashMap<Vec<u8>, u64>,
    order: VecDeque<(Instant, Vec<u8>)>,
}

impl HashWindow {
    fn new() -> Self {
        Self {
            set: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Returns `true` if `hash` was already present; otherwise records it
    /// with `value` and returns `false`.
    fn check_and_add(&mut self, hash: &[u8], value: u64, now: Instant) -> bool {
        if self.set.contains_key(hash) {
            return true;
        }
        self.set.insert(hash.to_vec(), value);
        self.order.push_back((now, hash.to_vec()));
        false
    }

    fn get(&self, hash: &[u8]) -> Option<u64> {
        self.set.get(hash).copied()
    }

    /// Evicts every entry whose insertion time is older than `window` as of
    /// `now`. Per spec §4.D, eviction never removes an entry younger than
    /// the window — only the queue head is ever inspected, so entries are
    /// evicted in insertion order.
    fn evict_older_than(&mut self, window: Duration, now: Instant) {
        while let Some((inserted_at, _)) = self.order.front() {
            if now.duration_since(*inserted_at) < window {
                break;
            }
            let (_, hash) = self.order.pop_front().unwrap();
            self.set.remove(&hash);
        }
    }
}

/// Defends against replaying a client batch within a sliding time window.
///
/// Two independent windows track proposed hashes (defeats re-proposing a
/// batch the primary already broadcast) and executed hashes (defeats
/// re-executing a batch that already produced a result), per spec §4.D.
pub struct DuplicateManager {
    proposed: Arc<Mutex<HashWindow>>,
    executed: Arc<Mutex<HashWindow>>,
    window: Duration,
    stop: Arc<AtomicBool>,
    eviction_task: Mutex<Option<JoinHandle<()>>>,
}

impl DuplicateManager {
    /// Constructs a manager and spawns its background eviction task.
    ///
    /// `frequency` is the eviction tick period; `window` is how long an
    /// entry remains queryable after insertion (spec default: 5s / 20s).
    #[must_use]
    pub fn new(frequency: Duration, window: Duration) -> Arc<Self> {
        let manager = Arc::new(Self {
            proposed: Arc::new(Mutex::new(HashWindow::new())),
            executed: Arc::new(Mutex::new(HashWindow::new())),
            window,
            stop: Arc::new(AtomicBool::new(false)),
            eviction_task: Mutex::new(None),
        });

        let proposed = manager.proposed.clone();
        let executed = manager.executed.clone();
        let stop = manager.stop.clone();
        let task_window = window;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(frequency);
            ticker.tick().await; // first tick fires immediately
            loop {
                if stop.load(Ordering::Relaxed) {
                    return;
                }
                ticker.tick().await;
                if stop.load(Ordering::Relaxed) {
                    return;
                }
                let now = Instant::now();
                proposed.lock().evict_older_than(task_window, now);
                executed.lock().evict_older_than(task_window, now);
            }
        });
        *manager.eviction_task.lock() = Some(handle);
        manager
    }

    /// Constructs a manager using the spec's defaults (5s tick, 20s window).
    #[must_use]
    pub fn with_defaults() -> Arc<Self> {
        Self::new(Duration::from_secs(5), Duration::from_secs(20))
    }

    /// Returns whether `hash` is already in the proposed set; if not,
    /// records it.
    pub fn check_and_add_proposed(&self, hash: &[u8]) -> bool {
        self.proposed.lock().check_and_add(hash, 0, Instant::now())
    }

    /// Returns whether `hash` is already in the executed set; if not,
    /// records it along with the seq it executed at.
    pub fn check_and_add_executed(&self, hash: &[u8], seq: u64) -> bool {
        self.executed.lock().check_and_add(hash, seq, Instant::now())
    }

    /// The seq a previously-executed hash ran at, if still within the window.
    #[must_use]
    pub fn executed_seq_of(&self, hash: &[u8]) -> Option<u64> {
        self.executed.lock().get(hash)
    }

    /// Stops the background eviction task. Checked at each loop iteration,
    /// so shutdown completes within one tick (spec §5 cancellation model).
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

impl Drop for DuplicateManager {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.eviction_task.lock().take() {
            handle.abort();
        }
    }
}
