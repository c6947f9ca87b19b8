/// Cancellation token returned by [`TimerScheduler::schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

#[derive(Debug, Clone)]
struct PendingTimer<E> {
    id: TimerId,
    due_ms: u64,
    event: E,
}

/// Fixed-delay timers on a virtual millisecond clock. Nothing fires until the
/// host advances the clock, so runs are deterministic and testable without a
/// real timer source.
#[derive(Debug, Clone)]
pub struct TimerScheduler<E> {
    now_ms: u64,
    next_id: u64,
    /// Sorted by `(due_ms, id)` so equal deadlines fire in scheduling order.
    pending: Vec<PendingTimer<E>>,
}

impl<E> Default for TimerScheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> TimerScheduler<E> {
    pub fn new() -> Self {
        TimerScheduler {
            now_ms: 0,
            next_id: 0,
            pending: Vec::new(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn schedule(&mut self, delay_ms: u64, event: E) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let due_ms = self.now_ms.saturating_add(delay_ms);
        let slot = self
            .pending
            .partition_point(|timer| (timer.due_ms, timer.id) <= (due_ms, id));
        self.pending.insert(slot, PendingTimer { id, due_ms, event });
        id
    }

    /// Drops a pending timer. Returns `false` if it already fired or was
    /// cancelled before.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|timer| timer.id != id);
        self.pending.len() != before
    }

    /// Pops the earliest timer due at or before `deadline_ms`, moving the clock
    /// to its due time. Timers scheduled while handling it are measured from
    /// that instant, not from the deadline.
    pub fn pop_due(&mut self, deadline_ms: u64) -> Option<(TimerId, E)> {
        let first = self.pending.first()?;
        if first.due_ms > deadline_ms {
            return None;
        }
        let timer = self.pending.remove(0);
        self.now_ms = self.now_ms.max(timer.due_ms);
        Some((timer.id, timer.event))
    }

    /// Moves the clock forward without firing anything still pending.
    pub fn settle(&mut self, deadline_ms: u64) {
        self.now_ms = self.now_ms.max(deadline_ms);
    }
}
