//! The swap engine: victim selection and the swap-out/swap-in mechanics
//! that back `AddressSpace::handle_fault` once physical memory fills up.
//! Grounded on upstream `userprog/swap.cc`'s `PickVictim`/`DoSwapOut`; the
//! CLOCK pass structure follows `swap.cc`'s four-pass loop over
//! `clockFrames` (translated here to repeated scans of the coremap's
//! residency order, since there is one shared list rather than a second
//! clock-specific one — see `coremap.rs`).

use std::sync::Arc;

use crate::config::SwapPolicy;
use crate::machine::memory::PhysicalMemory;
use crate::machine::rng::Rng;
use crate::machine::stats::Statistics;
use crate::thread::Thread;
use crate::vm::coremap::Coremap;
use crate::vm::VmError;

/// Picks a frame to evict under `policy`, without evicting it. Returns
/// `None` only if the coremap has no resident frames at all, which a
/// caller should never see since it only calls this when `find` already
/// failed (i.e. every frame is occupied).
fn pick_victim(coremap: &Coremap, policy: SwapPolicy, rng: &mut Rng) -> Option<usize> {
    match policy {
        SwapPolicy::Fifo => coremap.oldest(),
        SwapPolicy::Random => {
            let frames = coremap.order_snapshot();
            if frames.is_empty() {
                None
            } else {
                Some(frames[rng.below(frames.len())])
            }
        }
        SwapPolicy::Clock => pick_victim_clock(coremap),
    }
}

/// The CLOCK sweep: four passes over the (circular, here snapshotted)
/// residency order. Pass 1 takes the first `use=0, dirty=0` frame. Pass 2
/// takes the first `use=0, dirty=1` frame, clearing the use bit and
/// rotating every `use=1` frame it passes to give it a second chance.
/// Pass 3 repeats pass 1 over the now-updated order. Pass 4 gives up and
/// evicts whatever is oldest.
fn pick_victim_clock(coremap: &Coremap) -> Option<usize> {
    let state = |frame: usize| -> (bool, bool) {
        let (space, vpn) = coremap.owner_of(frame).expect("resident frame always has an owner");
        let entry = space.page_table_entry(vpn as usize);
        (entry.use_bit, entry.dirty)
    };

    let frames = coremap.order_snapshot();
    if frames.is_empty() {
        return None;
    }

    for &frame in &frames {
        let (used, dirty) = state(frame);
        if !used && !dirty {
            return Some(frame);
        }
    }

    for &frame in &frames {
        let (used, dirty) = state(frame);
        if !used && dirty {
            return Some(frame);
        }
        if used {
            let (space, vpn) = coremap.owner_of(frame).expect("resident frame always has an owner");
            space.clear_use_bit(vpn as usize);
            coremap.rotate_to_back(frame);
        }
    }

    for &frame in coremap.order_snapshot().iter() {
        let (used, dirty) = state(frame);
        if !used && !dirty {
            return Some(frame);
        }
    }

    coremap.oldest()
}

/// Evicts one resident frame, writing it back to its owning address
/// space's swap file if dirty or never previously swapped, and returns
/// the now-free frame number. Mirrors `DoSwapOut`.
pub fn swap_out(
    me: &Arc<Thread>,
    coremap: &Coremap,
    policy: SwapPolicy,
    rng: &mut Rng,
    memory: &PhysicalMemory,
    stats: &Statistics,
) -> Result<usize, VmError> {
    let victim = pick_victim(coremap, policy, rng).ok_or(VmError::NoFreeFrames)?;
    let (space, vpn) = coremap.owner_of(victim).expect("picked victim is resident");
    let vpn = vpn as usize;

    let entry = space.page_table_entry(vpn);
    if entry.dirty || !space.is_in_swap(vpn) {
        let data = memory.read_frame(victim);
        space.write_swap_page(me, vpn, &data)?;
    }

    space.invalidate_page(vpn);
    coremap.clear(victim);
    stats.swap_out();
    Ok(victim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_victim_stays_within_resident_frames() {
        let coremap = Coremap::new(4);
        // With no resident frames, picking a victim is never attempted
        // by real callers (find() would have succeeded); pick_victim
        // itself degrades to None rather than panicking.
        let mut rng = Rng::new(1);
        assert_eq!(pick_victim(&coremap, SwapPolicy::Random, &mut rng), None);
    }
}
