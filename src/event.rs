//! The global event queue and the system of arrays it drives.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use rand::Rng;

use crate::array::{Array, ArrayState};
use crate::disk::DiskState;

/// How often (in events popped) the interrupt flag is polled, when the
/// per-event check isn't already cheap enough on its own.
const INTERRUPT_POLL_INTERVAL: u64 = 1 << 14;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Event {
    time: f64,
    disk_idx: usize,
    array_idx: usize,
    seq: u64,
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; flip the comparison so the earliest
        // absolute time is always on top. Ties break FIFO by insertion
        // order, which spec doesn't require but keeps the heap total.
        other
            .time
            .partial_cmp(&self.time)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// What one iteration of the event loop contributed, before any damage
/// model has been applied.
#[derive(Debug, Clone, Copy, Default)]
pub struct IterationOutcome {
    /// Sum of `critical_region * data_fraction` over every array that
    /// failed this iteration.
    pub raid_failure_area: f64,
    /// How many arrays failed this iteration.
    pub arrays_failed: u32,
    /// Total latent sector errors observed across every array this
    /// iteration, failed or not.
    pub lse_total: u64,
}

/// A system of arrays sharing one global, time-ordered event queue.
#[derive(Debug)]
pub struct System {
    mission_time: f64,
    arrays: Vec<Array>,
    queue: BinaryHeap<Event>,
    available_arrays: usize,
    next_seq: u64,
}

impl System {
    pub fn new(mission_time: f64, arrays: Vec<Array>) -> Self {
        let available_arrays = arrays.len();
        Self {
            mission_time,
            arrays,
            queue: BinaryHeap::new(),
            available_arrays,
            next_seq: 0,
        }
    }

    pub fn arrays(&self) -> &[Array] {
        &self.arrays
    }

    /// Re-seeds every array's disks and repopulates the event queue with
    /// every failure landing inside the mission window.
    pub fn reset(&mut self, rng: &mut impl Rng) {
        self.queue.clear();
        self.available_arrays = self.arrays.len();
        self.next_seq = 0;
        let mission_time = self.mission_time;
        for array_idx in 0..self.arrays.len() {
            let events = self.arrays[array_idx].reset(rng, mission_time);
            for (disk_idx, time) in events {
                self.push(time, disk_idx, array_idx);
            }
        }
    }

    fn push(&mut self, time: f64, disk_idx: usize, array_idx: usize) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Event {
            time,
            disk_idx,
            array_idx,
            seq,
        });
    }

    /// Runs the event loop to completion (queue exhausted, every array
    /// failed, or `interrupted` flips) and returns the iteration's raw
    /// contribution.
    pub fn run(&mut self, rng: &mut impl Rng, interrupted: &AtomicBool) -> IterationOutcome {
        let mut popped: u64 = 0;

        while self.available_arrays > 0 {
            popped += 1;
            if popped % INTERRUPT_POLL_INTERVAL == 0
                && interrupted.load(AtomicOrdering::Relaxed)
            {
                break;
            }

            let event = match self.queue.pop() {
                Some(e) => e,
                None => break,
            };
            debug_assert!(event.time <= self.mission_time);

            let array = &mut self.arrays[event.array_idx];
            if array.state() == ArrayState::Failed {
                continue;
            }

            let disk_was_ok = array.disk_state(event.disk_idx) == DiskState::Ok;
            let next_time = if disk_was_ok {
                array.degrade(rng, event.disk_idx, event.time)
            } else {
                array.upgrade(rng, event.disk_idx)
            };

            if next_time <= self.mission_time {
                self.push(next_time, event.disk_idx, event.array_idx);
            }

            // Only a FAIL event can push an array past its fault-tolerance
            // threshold; a REPAIR event never triggers a damage check.
            if disk_was_ok {
                if self.arrays[event.array_idx].check_failure() {
                    self.available_arrays -= 1;
                } else {
                    self.arrays[event.array_idx].check_sectors_lost(rng);
                }
            }
        }

        let mut outcome = IterationOutcome::default();
        for array in &self.arrays {
            if array.state() == ArrayState::Failed {
                outcome.raid_failure_area += array.corrupted_area();
                outcome.arrays_failed += 1;
            }
            outcome.lse_total += array.lse_count();
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::McCode;
    use crate::disk::DiskParams;
    use crate::stochastic::{Poisson, Weibull};
    use std::sync::atomic::AtomicBool;

    fn guaranteed_failure_params() -> DiskParams {
        DiskParams {
            fail_dist: Weibull::try_new(1.0, 1.0, 0.0).unwrap(),
            repair_dist: Weibull::try_new(1.0, 1e9, 0.0).unwrap(),
            lse_dist: Poisson::try_new(0.001).unwrap(),
            scrub_dist: Weibull::try_new(1.0, 10.0, 0.0).unwrap(),
        }
    }

    #[test]
    fn trivial_no_failure_mission() {
        let code = McCode::parse("mds_7_1").unwrap();
        let array = Array::new(code, 1_000_000, guaranteed_failure_params());
        let mut system = System::new(0.0, vec![array]);
        let mut rng = rand::rng();
        system.reset(&mut rng);
        let flag = AtomicBool::new(false);
        let outcome = system.run(&mut rng, &flag);
        assert_eq!(outcome.arrays_failed, 0);
        assert_eq!(outcome.raid_failure_area, 0.0);
    }

    #[test]
    fn guaranteed_failure_mission_fails_the_array() {
        let code = McCode::parse("mds_2_1").unwrap();
        let array = Array::new(code, 1_000_000, guaranteed_failure_params());
        let mut system = System::new(1_000_000.0, vec![array]);
        let mut rng = rand::rng();
        system.reset(&mut rng);
        let flag = AtomicBool::new(false);
        let outcome = system.run(&mut rng, &flag);
        assert_eq!(outcome.arrays_failed, 1);
    }

    #[test]
    fn every_popped_event_respects_the_mission_window() {
        let code = McCode::parse("mds_4_2").unwrap();
        let array = Array::new(code, 1_000_000, guaranteed_failure_params());
        let mut system = System::new(500.0, vec![array]);
        let mut rng = rand::rng();
        system.reset(&mut rng);
        for event in system.queue.iter() {
            assert!(event.time <= 500.0);
        }
    }

    #[test]
    fn interrupt_flag_stops_the_loop_early() {
        let code = McCode::parse("mds_7_1").unwrap();
        let array = Array::new(code, 1_000_000, guaranteed_failure_params());
        let mut system = System::new(1e12, vec![array]);
        let mut rng = rand::rng();
        system.reset(&mut rng);
        let flag = AtomicBool::new(true);
        // even pre-set, run() should return promptly without hanging.
        let _ = system.run(&mut rng, &flag);
    }
}
