//! Trailing-window membership tracking.
//!
//! Every admitted item is inserted into each configured window and gets one
//! expiry timer per window. An item inserted twice is counted once, but stays
//! a member until the last of its scheduled removals fires.
//!
//! Reads compare each member's latest deadline against the clock, so an item
//! is never reported at or past `inserted + duration`, even if its timer task
//! has not been polled yet.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::debug;

pub const WINDOW_30_SECS: Duration = Duration::from_secs(30);
pub const WINDOW_1_MIN: Duration = Duration::from_secs(60);
pub const WINDOW_5_MIN: Duration = Duration::from_secs(5 * 60);
pub const WINDOW_30_MIN: Duration = Duration::from_secs(30 * 60);
pub const WINDOW_1_HOUR: Duration = Duration::from_secs(60 * 60);

pub const DEFAULT_WINDOWS: [Duration; 5] = [
    WINDOW_30_SECS,
    WINDOW_1_MIN,
    WINDOW_5_MIN,
    WINDOW_30_MIN,
    WINDOW_1_HOUR,
];

/// Receives a notification after an item has been added to every window.
///
/// Called synchronously from [`WindowCollector::add_item`], outside the
/// collector's lock, so implementations may read sizes or call `clear()`.
pub trait NewItemListener<T>: Send + Sync {
    fn on_new_item(&self, collector: &WindowCollector<T>, item: &T);
}

struct Member {
    // removals still scheduled for the item
    pending: usize,
    expires_at: Instant,
}

struct Window<T> {
    duration: Duration,
    members: HashMap<T, Member>,
}

impl<T: Eq + Hash> Window<T> {
    fn active_len(&self, now: Instant) -> usize {
        self.members
            .values()
            .filter(|m| m.expires_at > now)
            .count()
    }

    fn is_active(&self, item: &T, now: Instant) -> bool {
        self.members
            .get(item)
            .is_some_and(|m| m.expires_at > now)
    }
}

struct Windows<T> {
    windows: Vec<Window<T>>,
    timers: HashMap<u64, AbortHandle>,
    next_timer: u64,
    generation: u64,
}

pub struct WindowCollector<T> {
    state: Arc<Mutex<Windows<T>>>,
    listeners: Mutex<Vec<Arc<dyn NewItemListener<T>>>>,
}

impl<T> WindowCollector<T>
where
    T: Eq + Hash + Clone + Send + Sync + 'static,
{
    pub fn new(durations: impl IntoIterator<Item = Duration>) -> Self {
        let windows = durations
            .into_iter()
            .map(|duration| Window {
                duration,
                members: HashMap::new(),
            })
            .collect();
        Self {
            state: Arc::new(Mutex::new(Windows {
                windows,
                timers: HashMap::new(),
                next_timer: 0,
                generation: 0,
            })),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Collector with the 30s, 1m, 5m, 30m and 1h windows.
    pub fn with_default_windows() -> Self {
        Self::new(DEFAULT_WINDOWS)
    }

    pub fn subscribe(&self, listener: Arc<dyn NewItemListener<T>>) {
        lock(&self.listeners).push(listener);
    }

    /// Admits `item` into every window, in configured order, then notifies
    /// listeners. Must be called from within a tokio runtime.
    pub fn add_item(&self, item: T) {
        {
            let mut state = lock(&self.state);
            let generation = state.generation;
            let now = Instant::now();
            for index in 0..state.windows.len() {
                let window = &mut state.windows[index];
                let deadline = now + window.duration;
                let member = window.members.entry(item.clone()).or_insert(Member {
                    pending: 0,
                    expires_at: deadline,
                });
                member.pending += 1;
                member.expires_at = member.expires_at.max(deadline);

                let timer_id = state.next_timer;
                state.next_timer = state.next_timer.wrapping_add(1);

                let shared = Arc::clone(&self.state);
                let expired = item.clone();
                let handle = tokio::spawn(async move {
                    tokio::time::sleep_until(deadline).await;
                    expire(&shared, generation, index, timer_id, &expired);
                });
                state.timers.insert(timer_id, handle.abort_handle());
            }
        }

        let listeners = lock(&self.listeners).clone();
        for listener in listeners {
            listener.on_new_item(self, &item);
        }
    }

    /// Cancels every pending expiry timer and empties every window.
    pub fn clear(&self) {
        let mut state = lock(&self.state);
        state.generation = state.generation.wrapping_add(1);
        let cancelled = state.timers.len();
        for (_, timer) in state.timers.drain() {
            timer.abort();
        }
        for window in &mut state.windows {
            window.members.clear();
        }
        debug!(cancelled_timers = cancelled, "Collector cleared");
    }

    /// Distinct items currently active in the window at `index`.
    pub fn size(&self, index: usize) -> Option<usize> {
        let now = Instant::now();
        lock(&self.state)
            .windows
            .get(index)
            .map(|w| w.active_len(now))
    }

    /// Distinct items currently active in the first window of `duration`.
    pub fn size_of(&self, duration: Duration) -> Option<usize> {
        let now = Instant::now();
        lock(&self.state)
            .windows
            .iter()
            .find(|w| w.duration == duration)
            .map(|w| w.active_len(now))
    }

    pub fn contains(&self, duration: Duration, item: &T) -> bool {
        let now = Instant::now();
        lock(&self.state)
            .windows
            .iter()
            .find(|w| w.duration == duration)
            .is_some_and(|w| w.is_active(item, now))
    }

    pub fn pending_timers(&self) -> usize {
        lock(&self.state).timers.len()
    }

    pub fn last_30_secs(&self) -> usize {
        self.size_of(WINDOW_30_SECS).unwrap_or(0)
    }

    pub fn last_1_min(&self) -> usize {
        self.size_of(WINDOW_1_MIN).unwrap_or(0)
    }

    pub fn last_5_min(&self) -> usize {
        self.size_of(WINDOW_5_MIN).unwrap_or(0)
    }

    pub fn last_30_min(&self) -> usize {
        self.size_of(WINDOW_30_MIN).unwrap_or(0)
    }

    pub fn last_1_hour(&self) -> usize {
        self.size_of(WINDOW_1_HOUR).unwrap_or(0)
    }
}

impl<T> Default for WindowCollector<T>
where
    T: Eq + Hash + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::with_default_windows()
    }
}

fn expire<T: Eq + Hash>(
    state: &Mutex<Windows<T>>,
    generation: u64,
    index: usize,
    timer_id: u64,
    item: &T,
) {
    let mut state = lock(state);
    // A clear() happened after this timer was scheduled.
    if state.generation != generation {
        return;
    }
    state.timers.remove(&timer_id);
    let Some(window) = state.windows.get_mut(index) else {
        return;
    };
    let remaining = match window.members.get_mut(item) {
        Some(member) => {
            member.pending = member.pending.saturating_sub(1);
            member.pending
        }
        None => return,
    };
    if remaining == 0 {
        window.members.remove(item);
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
