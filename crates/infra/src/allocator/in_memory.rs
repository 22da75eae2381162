use std::collections::HashMap;
use std::sync::{Mutex, TryLockError};
use std::time::{Duration, Instant};

use fiscalio_core::TenantId;
use fiscalio_numbering::{
    AllocatedNumber, AllocationError, SequenceAllocator, Series, MAX_SEQUENCE,
};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

type PartitionKey = (TenantId, Series, i32);

/// In-memory sequence allocator.
///
/// Intended for tests/dev: counters live in process memory, so the gap-free
/// guarantee only spans one process. Lock acquisition is bounded the same way
/// the durable adapter bounds its row lock.
#[derive(Debug)]
pub struct InMemorySequenceAllocator {
    counters: Mutex<HashMap<PartitionKey, u32>>,
    lock_timeout: Duration,
}

impl InMemorySequenceAllocator {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Seed a partition's counter, e.g. when taking over numbering from a
    /// legacy system mid-year. The next allocation returns `last_sequence + 1`.
    pub fn seed_partition(
        &self,
        tenant_id: TenantId,
        series: Series,
        fiscal_year: i32,
        last_sequence: u32,
    ) -> Result<(), AllocationError> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| AllocationError::Storage("counter lock poisoned".to_string()))?;
        counters.insert((tenant_id, series, fiscal_year), last_sequence);
        Ok(())
    }
}

impl Default for InMemorySequenceAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceAllocator for InMemorySequenceAllocator {
    fn allocate(
        &self,
        tenant_id: TenantId,
        series: &Series,
        fiscal_year: i32,
    ) -> Result<AllocatedNumber, AllocationError> {
        let started = Instant::now();
        let mut counters = loop {
            match self.counters.try_lock() {
                Ok(guard) => break guard,
                Err(TryLockError::WouldBlock) => {
                    if started.elapsed() >= self.lock_timeout {
                        return Err(AllocationError::Timeout {
                            waited_ms: started.elapsed().as_millis() as u64,
                        });
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(TryLockError::Poisoned(_)) => {
                    return Err(AllocationError::Storage(
                        "counter lock poisoned".to_string(),
                    ));
                }
            }
        };

        let key = (tenant_id, series.clone(), fiscal_year);
        let last = counters.get(&key).copied().unwrap_or(0);
        if last >= MAX_SEQUENCE {
            return Err(AllocationError::Exhausted {
                series: series.to_string(),
                year: fiscal_year,
            });
        }
        let next = last + 1;
        counters.insert(key, next);
        // Only the counter bump happens under the lock; formatting does not.
        drop(counters);

        AllocatedNumber::new(series.clone(), fiscal_year, next)
            .map_err(|e| AllocationError::Storage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn series(s: &str) -> Series {
        Series::new(s).unwrap()
    }

    #[test]
    fn sequences_are_dense_within_a_partition() {
        let allocator = InMemorySequenceAllocator::new();
        let tenant = TenantId::new();

        for expected in 1..=3u32 {
            let allocated = allocator.allocate(tenant, &series("F"), 2026).unwrap();
            assert_eq!(allocated.sequence(), expected);
        }
    }

    #[test]
    fn partitions_do_not_share_counters() {
        let allocator = InMemorySequenceAllocator::new();
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();

        allocator.allocate(tenant_a, &series("F"), 2026).unwrap();
        allocator.allocate(tenant_a, &series("F"), 2026).unwrap();

        // Different tenant, series or year each start at 1.
        assert_eq!(
            allocator.allocate(tenant_b, &series("F"), 2026).unwrap().sequence(),
            1
        );
        assert_eq!(
            allocator.allocate(tenant_a, &series("G"), 2026).unwrap().sequence(),
            1
        );
        assert_eq!(
            allocator.allocate(tenant_a, &series("F"), 2027).unwrap().sequence(),
            1
        );
    }

    #[test]
    fn seeded_partition_continues_from_seed() {
        let allocator = InMemorySequenceAllocator::new();
        let tenant = TenantId::new();
        allocator
            .seed_partition(tenant, series("F"), 2026, 41)
            .unwrap();

        let allocated = allocator.allocate(tenant, &series("F"), 2026).unwrap();
        assert_eq!(allocated.sequence(), 42);
        assert_eq!(allocated.formatted(), "F-2026-000042");
    }

    #[test]
    fn exhausted_partition_refuses_allocation() {
        let allocator = InMemorySequenceAllocator::new();
        let tenant = TenantId::new();
        allocator
            .seed_partition(tenant, series("F"), 2026, MAX_SEQUENCE)
            .unwrap();

        assert!(matches!(
            allocator.allocate(tenant, &series("F"), 2026),
            Err(AllocationError::Exhausted { .. })
        ));
    }

    #[test]
    fn concurrent_allocations_are_unique_and_gap_free() {
        let allocator = Arc::new(InMemorySequenceAllocator::new());
        let tenant = TenantId::new();
        let threads = 16;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let allocator = allocator.clone();
                std::thread::spawn(move || {
                    allocator
                        .allocate(tenant, &series("F"), 2026)
                        .unwrap()
                        .sequence()
                })
            })
            .collect();

        let mut sequences: Vec<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        sequences.sort_unstable();
        assert_eq!(sequences, (1..=threads).collect::<Vec<u32>>());
    }
}
