//! # Min-First Allocation
//!
//! Fills buckets one unit at a time, always into the least filled bucket
//! that still has capacity (lowest index wins ties). Instead of looping per
//! unit, each step fills the minimum bucket in one chunk up to the next
//! fill level above it, splitting the chunk evenly when several buckets
//! share the minimum. The result equals the one-unit-at-a-time order.

use crate::errors::{CoreResult, StakingCoreError};

/// Distribute `amount` units over buckets with the given fill levels and
/// capacities. Returns the units actually allocated and the new fill
/// levels; fewer than `amount` are allocated only when every bucket is full.
pub fn allocate(counts: &[u64], capacities: &[u64], amount: u64) -> CoreResult<(u64, Vec<u64>)> {
    if counts.len() != capacities.len() {
        return Err(StakingCoreError::LengthMismatch(counts.len(), capacities.len()));
    }

    let mut allocations = counts.to_vec();
    let mut allocated = 0u64;
    while allocated < amount {
        let step = allocate_to_best_candidate(&mut allocations, capacities, amount - allocated);
        if step == 0 {
            break;
        }
        allocated += step;
    }

    Ok((allocated, allocations))
}

/// One chunked step. Returns the units placed, zero when all buckets are full.
fn allocate_to_best_candidate(allocations: &mut [u64], capacities: &[u64], budget: u64) -> u64 {
    let mut best_index = None;
    let mut best_allocation = u64::MAX;
    let mut best_count = 0u64;

    for (i, (&allocation, &capacity)) in allocations.iter().zip(capacities).enumerate() {
        if allocation >= capacity {
            continue;
        }
        if allocation < best_allocation {
            best_index = Some(i);
            best_allocation = allocation;
            best_count = 1;
        } else if allocation == best_allocation {
            best_count += 1;
        }
    }

    let Some(best_index) = best_index else {
        return 0;
    };

    // Never lift the candidate past the next fill level above it
    let mut upper_bound = capacities[best_index];
    for (&allocation, &capacity) in allocations.iter().zip(capacities) {
        if allocation < capacity && allocation > best_allocation && allocation < upper_bound {
            upper_bound = allocation;
        }
    }

    let share = if best_count > 1 {
        budget.div_ceil(best_count)
    } else {
        budget
    };
    let step = share.min(upper_bound - best_allocation);
    allocations[best_index] += step;
    step
}
