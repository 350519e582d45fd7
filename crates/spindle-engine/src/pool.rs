//! Generation-tagged object pool
//!
//! A fixed-capacity ring of slots that hands out revocable handles. Each
//! slot carries an atomic generation id whose parity encodes liveness: odd
//! means unused, even means occupied. A handle stores the generation it was
//! issued with and dereferences successfully only while the slot still
//! carries that exact id, so a handle that survives a full lap of the ring
//! can never be confused with the slot's next tenant.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Any odd value marks a slot as unused.
const UNUSED_GENERATION: u64 = 1;

/// Even, never issued to a handle; parks a slot while its payload drops.
const TOMBSTONE_GENERATION: u64 = 0;

/// Revocable reference to a pool slot.
///
/// A handle stays cheap to copy and never dangles: once the slot is
/// destroyed or recycled, every operation through the old handle reports the
/// handle as invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolHandle {
    generation: u64,
    index: u32,
}

struct Slot<T> {
    generation: AtomicU64,
    payload: UnsafeCell<MaybeUninit<T>>,
}

/// Fixed-capacity pool issuing generation-tagged handles.
///
/// Allocation is lock-free and can spuriously refuse when the insertion ring
/// catches a long-lived allocation; callers treat refusal as back-pressure,
/// not as an error.
pub struct GenerationPool<T> {
    slots: Box<[Slot<T>]>,
    id_generator: AtomicU64,
    cursor: AtomicU64,
}

// Payloads move in and out under the slot-claim protocol below; the pool
// itself never hands out references that outlive a claim.
unsafe impl<T: Send> Send for GenerationPool<T> {}
unsafe impl<T: Send> Sync for GenerationPool<T> {}

impl<T> GenerationPool<T> {
    /// Create a pool with `capacity` slots. Capacity must be a power of two.
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two(),
            "pool capacity must be a power of two"
        );
        let slots = (0..capacity)
            .map(|_| Slot {
                generation: AtomicU64::new(UNUSED_GENERATION),
                payload: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();
        Self {
            slots,
            id_generator: AtomicU64::new(TOMBSTONE_GENERATION),
            cursor: AtomicU64::new(0),
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Move `value` into the next ring slot and return a handle to it.
    ///
    /// Returns `None` when the candidate slot is still occupied — the ring
    /// has caught itself. There is no probing; the cursor has already moved
    /// on, so a later allocation targets the next slot.
    pub fn alloc(&self, value: T) -> Option<PoolHandle> {
        let index = (self.cursor.fetch_add(1, Ordering::Relaxed) as usize) & (self.slots.len() - 1);
        let slot = &self.slots[index];

        let current = slot.generation.load(Ordering::Acquire);
        if current & 1 == 0 {
            // still in use
            return None;
        }

        // fresh even id, unique until the 64-bit generator wraps
        let generation = self.id_generator.fetch_add(2, Ordering::Relaxed) + 2;

        // Claim before constructing; an allocator a full lap ahead racing
        // for the same slot loses the exchange. The handle is not visible
        // until the payload write below has completed.
        if slot
            .generation
            .compare_exchange(current, generation, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return None;
        }

        unsafe { (*slot.payload.get()).write(value) };

        Some(PoolHandle {
            generation,
            index: index as u32,
        })
    }

    /// Whether `handle` still refers to the payload it was issued for.
    pub fn is_valid(&self, handle: PoolHandle) -> bool {
        self.slots[handle.index as usize]
            .generation
            .load(Ordering::Acquire)
            == handle.generation
    }

    /// Drop the payload behind `handle` and mark the slot unused.
    ///
    /// Returns `false` if the handle is stale (the slot was already
    /// destroyed, possibly recycled) — a benign outcome.
    pub fn destroy(&self, handle: PoolHandle) -> bool {
        let slot = &self.slots[handle.index as usize];

        // Park the slot on the tombstone while the payload drops: still
        // even, so allocators refuse it, but no handle matches it.
        if slot
            .generation
            .compare_exchange(
                handle.generation,
                TOMBSTONE_GENERATION,
                Ordering::AcqRel,
                Ordering::Relaxed,
            )
            .is_err()
        {
            return false;
        }

        unsafe { ptr::drop_in_place((*slot.payload.get()).as_mut_ptr()) };
        slot.generation.store(UNUSED_GENERATION, Ordering::Release);
        true
    }
}

impl<T> Drop for GenerationPool<T> {
    fn drop(&mut self) {
        for slot in self.slots.iter() {
            let generation = slot.generation.load(Ordering::Acquire);
            if generation & 1 == 0 && generation != TOMBSTONE_GENERATION {
                unsafe { ptr::drop_in_place((*slot.payload.get()).as_mut_ptr()) };
                slot.generation.store(UNUSED_GENERATION, Ordering::Release);
            }
        }
    }
}
