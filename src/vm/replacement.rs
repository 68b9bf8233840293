//! Page-replacement policies: FIFO, enhanced second-chance ("clock" with
//! four rounds), and random. Grounded on `original_source/code/userprog/
//! address_space.cc`'s `PickVictim`/`ClockPolicy` free functions.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// rand >=0.9 renamed `gen_range`/`thread_rng` to `random_range`/`rng`; this
// crate targets that API surface.

use crate::vm::coremap::{Coremap, FrameOwner};

/// Per-frame `(use, dirty)` bits, consulted and (for the clock policy)
/// mutated mid-scan. Kept separate from [`Coremap`] because those bits are
/// owned by the occupying address space's page table, not the coremap
/// entry itself (`SPEC_FULL.md` §3's Coremap shape has no use/dirty field) --
/// a `SpaceTable` is the natural implementor.
pub trait FrameBits {
    fn bits(&self, owner: FrameOwner) -> (bool, bool);
    fn clear_use(&self, owner: FrameOwner);
}

pub trait ReplacementPolicy: Send {
    /// Picks a frame to evict. Panics if every frame is unoccupied (the
    /// caller only invokes this once `Coremap::allocate` has already failed).
    fn pick_victim(&mut self, coremap: &Coremap, bits: &dyn FrameBits) -> usize;
}

/// Monotonic index modulo the frame count.
pub struct Fifo {
    next: usize,
    num_frames: usize,
}

impl Fifo {
    pub fn new(num_frames: usize) -> Self {
        Self { next: 0, num_frames }
    }
}

impl ReplacementPolicy for Fifo {
    fn pick_victim(&mut self, _coremap: &Coremap, _bits: &dyn FrameBits) -> usize {
        let victim = self.next;
        self.next = (self.next + 1) % self.num_frames;
        victim
    }
}

pub struct Random {
    rng: StdRng,
    num_frames: usize,
}

impl Random {
    pub fn new(num_frames: usize, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            num_frames,
        }
    }
}

impl ReplacementPolicy for Random {
    fn pick_victim(&mut self, _coremap: &Coremap, _bits: &dyn FrameBits) -> usize {
        self.rng.random_range(0..self.num_frames)
    }
}

/// Second-chance clock with four rounds: rounds 1 and 3 look for `(use=0,
/// dirty=0)`; rounds 2 and 4 look for `(use=0, dirty=1)`, clearing every
/// scanned entry's `use` bit on round 2 so round 3 can find a candidate.
pub struct EnhancedClock {
    hand: usize,
    num_frames: usize,
}

impl EnhancedClock {
    pub fn new(num_frames: usize) -> Self {
        Self { hand: 0, num_frames }
    }

    fn advance(&mut self) -> usize {
        let frame = self.hand;
        self.hand = (self.hand + 1) % self.num_frames;
        frame
    }
}

impl ReplacementPolicy for EnhancedClock {
    fn pick_victim(&mut self, coremap: &Coremap, bits: &dyn FrameBits) -> usize {
        for round in 1..=4 {
            for _ in 0..self.num_frames {
                let frame = self.advance();
                let Some(owner) = coremap.owner(frame) else {
                    return frame;
                };
                let (use_bit, dirty) = bits.bits(owner);
                match round {
                    1 | 3 => {
                        if !use_bit && !dirty {
                            return frame;
                        }
                    }
                    2 | 4 => {
                        if !use_bit && dirty {
                            return frame;
                        }
                        if round == 2 {
                            bits.clear_use(owner);
                        }
                    }
                    _ => unreachable!(),
                }
            }
        }
        unreachable!("four rounds over every frame always finds a victim")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::coremap::SpaceId;
    use std::collections::HashMap;

    struct FakeBits(std::cell::RefCell<HashMap<(SpaceId, u32), (bool, bool)>>);

    impl FrameBits for FakeBits {
        fn bits(&self, owner: FrameOwner) -> (bool, bool) {
            self.0.borrow().get(&(owner.space, owner.vpn)).copied().unwrap_or((false, false))
        }
        fn clear_use(&self, owner: FrameOwner) {
            self.0.borrow_mut().insert((owner.space, owner.vpn), (false, self.bits(owner).1));
        }
    }

    #[test]
    fn fifo_cycles_through_all_frames() {
        let coremap = Coremap::new(3);
        let bits = FakeBits(std::cell::RefCell::new(HashMap::new()));
        let mut fifo = Fifo::new(3);
        assert_eq!(fifo.pick_victim(&coremap, &bits), 0);
        assert_eq!(fifo.pick_victim(&coremap, &bits), 1);
        assert_eq!(fifo.pick_victim(&coremap, &bits), 2);
        assert_eq!(fifo.pick_victim(&coremap, &bits), 0);
    }

    #[test]
    fn clock_prefers_unoccupied_frame() {
        let coremap = Coremap::new(2);
        let bits = FakeBits(std::cell::RefCell::new(HashMap::new()));
        let mut clock = EnhancedClock::new(2);
        assert_eq!(clock.pick_victim(&coremap, &bits), 0);
    }

    #[test]
    fn clock_picks_clean_unused_frame_first() {
        let mut coremap = Coremap::new(2);
        let space = SpaceId::fresh();
        coremap.allocate(space, 0).unwrap();
        coremap.allocate(space, 1).unwrap();
        let bits = FakeBits(std::cell::RefCell::new(HashMap::new()));
        bits.0.borrow_mut().insert((space, 0), (true, false));
        bits.0.borrow_mut().insert((space, 1), (false, false));
        let mut clock = EnhancedClock::new(2);
        assert_eq!(clock.pick_victim(&coremap, &bits), 1);
    }

    #[test]
    fn clock_needs_all_four_rounds_when_everything_is_used_and_dirty() {
        let mut coremap = Coremap::new(3);
        let space = SpaceId::fresh();
        for vpn in 0..3 {
            coremap.allocate(space, vpn).unwrap();
        }
        let bits = FakeBits(std::cell::RefCell::new(HashMap::new()));
        for vpn in 0..3 {
            bits.0.borrow_mut().insert((space, vpn), (true, true));
        }
        let mut clock = EnhancedClock::new(3);
        // Round 1 (0,0): no match, everything is (1,1).
        // Round 2 (0,1): still no match (use bit set everywhere), but every
        // entry's use bit is cleared while scanning, leaving (0,1).
        // Round 3 (0,0): no match, dirty is still set everywhere.
        // Round 4 (0,1): the first frame scanned matches.
        assert_eq!(clock.pick_victim(&coremap, &bits), 0);
        for vpn in 0..3 {
            assert_eq!(bits.bits(FrameOwner { space, vpn }), (false, true));
        }
    }
}
