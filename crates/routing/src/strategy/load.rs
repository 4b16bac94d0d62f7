use std::sync::atomic::{AtomicU64, Ordering};

use vendor::prelude::DashMap;

use super::{TopoHashBuilder, TashMap};

/// Rolling counters of one child.
#[derive(Debug, Default)]
struct Slot {
    /// failure score, +1 on failure and halved on success.
    score: AtomicU64,
    /// tick of the last recorded attempt, 0 if never used.
    last_used: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time copy of a child's counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadStats {
    pub id: String,
    pub score: u64,
    pub last_used: u64,
    pub successes: u64,
    pub failures: u64,
}

/// Load state of a load-balanced group, the only mutable state of a
/// topology. Children are ranked by ascending failure score, then by
/// least recently used, then by configured position, so healthy
/// children take turns and failing ones sink to the back until
/// successes decay their score.
///
/// Updates are lock-free read-modify-write on atomics, many dispatches
/// may record into the same table concurrently.
#[derive(Debug)]
pub struct LoadTable {
    ids: Vec<String>,
    slots: TashMap<String, Slot>,
    clock: AtomicU64,
}

impl LoadTable {
    pub fn new<I, S>(child_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = child_ids.into_iter().map(Into::into).collect();
        let slots = DashMap::with_capacity_and_hasher(ids.len(), TopoHashBuilder::default());
        for id in ids.iter() {
            slots.insert(id.clone(), Slot::default());
        }
        Self {
            ids,
            slots,
            clock: AtomicU64::new(0),
        }
    }

    /// Record the result of an attempt that went through child `id`,
    /// returns false if the child is unknown to this table.
    pub fn record(&self, id: &str, success: bool) -> bool {
        let slot = match self.slots.get(id) {
            Some(slot) => slot,
            None => return false,
        };
        let tick = self.clock.fetch_add(1, Ordering::AcqRel) + 1;
        if success {
            slot.successes.fetch_add(1, Ordering::Relaxed);
            let _ = slot
                .score
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |score| Some(score / 2));
        } else {
            slot.failures.fetch_add(1, Ordering::Relaxed);
            slot.score.fetch_add(1, Ordering::AcqRel);
        }
        slot.last_used.fetch_max(tick, Ordering::AcqRel);
        true
    }

    /// Positions of the children in the order they should be tried.
    pub fn order(&self) -> Vec<usize> {
        let mut ranked: Vec<(u64, u64, usize)> = self
            .ids
            .iter()
            .enumerate()
            .map(|(idx, id)| {
                self.slots
                    .get(id)
                    .map(|slot| {
                        (
                            slot.score.load(Ordering::Acquire),
                            slot.last_used.load(Ordering::Acquire),
                            idx,
                        )
                    })
                    .unwrap_or((0, 0, idx))
            })
            .collect();
        ranked.sort_unstable();
        ranked.into_iter().map(|(_, _, idx)| idx).collect()
    }

    #[inline]
    pub fn score(&self, id: &str) -> Option<u64> {
        self.slots.get(id).map(|slot| slot.score.load(Ordering::Acquire))
    }

    /// Counters of every child, in configured order.
    pub fn snapshot(&self) -> Vec<LoadStats> {
        self.ids
            .iter()
            .filter_map(|id| {
                self.slots.get(id).map(|slot| LoadStats {
                    id: id.clone(),
                    score: slot.score.load(Ordering::Acquire),
                    last_used: slot.last_used.load(Ordering::Acquire),
                    successes: slot.successes.load(Ordering::Acquire),
                    failures: slot.failures.load(Ordering::Acquire),
                })
            })
            .collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::LoadTable;

    #[test]
    fn fresh_table_keeps_configured_order() {
        let table = LoadTable::new(["s.a", "s.b", "s.c"]);
        assert_eq!(table.order(), vec![0, 1, 2]);
        assert!(!table.record("s.x", true));
    }

    #[test]
    fn healthy_children_take_turns() {
        let table = LoadTable::new(["s.a", "s.b"]);
        assert!(table.record("s.a", true));
        assert_eq!(table.order(), vec![1, 0]);
        table.record("s.b", true);
        assert_eq!(table.order(), vec![0, 1]);
    }

    #[test]
    fn failures_sink_and_decay() {
        let table = LoadTable::new(["s.a", "s.b"]);
        table.record("s.a", false);
        table.record("s.a", false);
        table.record("s.b", true);
        assert_eq!(table.score("s.a"), Some(2));
        assert_eq!(table.order(), vec![1, 0]);

        table.record("s.a", true);
        table.record("s.a", true);
        assert_eq!(table.score("s.a"), Some(0));
        // both healthy, "s.b" was used longer ago
        assert_eq!(table.order(), vec![1, 0]);
    }

    #[test]
    fn concurrent_records_are_not_lost() {
        const THREADS: u64 = 8;
        const ROUNDS: u64 = 500;
        let table = Arc::new(LoadTable::new(["s.a", "s.b"]));
        let mut tasks = vec![];
        for t in 0..THREADS {
            let table = table.clone();
            tasks.push(std::thread::spawn(move || {
                for _ in 0..ROUNDS {
                    table.record(if t % 2 == 0 { "s.a" } else { "s.b" }, false);
                }
            }));
        }
        for t in tasks {
            let _ = t.join();
        }
        let stats = table.snapshot();
        let failures: u64 = stats.iter().map(|s| s.failures).sum();
        assert_eq!(failures, THREADS * ROUNDS);
        assert_eq!(stats[0].score, THREADS / 2 * ROUNDS);
        assert_eq!(stats.iter().map(|s| s.last_used).max(), Some(THREADS * ROUNDS));
    }
}
