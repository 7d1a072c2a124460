//! Per-disk state machine: the OK/FAILED clock each array disk runs on.

use rand::Rng;

use crate::stochastic::{Poisson, Weibull};

pub const SECTOR_SIZE: u64 = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskState {
    Ok,
    Failed,
}

/// The four distributions that drive a disk's clocks.
#[derive(Debug, Clone, Copy)]
pub struct DiskParams {
    pub fail_dist: Weibull,
    pub repair_dist: Weibull,
    pub lse_dist: Poisson,
    pub scrub_dist: Weibull,
}

/// A single disk within an array.
///
/// All operations here are total functions with documented preconditions;
/// calling them outside those preconditions is a programmer error and
/// panics rather than returning a `Result`: it can never happen from a
/// correctly driven event loop.
#[derive(Debug)]
pub struct Disk {
    params: DiskParams,
    state: DiskState,
    fail_time: f64,
    repair_time: f64,
    repair_start_time: f64,
}

impl Disk {
    pub fn new(params: DiskParams) -> Self {
        Self {
            params,
            state: DiskState::Ok,
            fail_time: 0.0,
            repair_time: 0.0,
            repair_start_time: 0.0,
        }
    }

    pub fn state(&self) -> DiskState {
        self.state
    }

    /// Resets the disk to OK with a freshly drawn failure time. Returns it.
    pub fn reset(&mut self, rng: &mut impl Rng) -> f64 {
        self.state = DiskState::Ok;
        self.repair_time = 0.0;
        self.repair_start_time = 0.0;
        self.fail_time = self.params.fail_dist.draw(rng);
        self.fail_time
    }

    /// OK -> FAILED. Returns the newly drawn repair completion time.
    pub fn fail(&mut self, now: f64, rng: &mut impl Rng) -> f64 {
        assert_eq!(
            self.state,
            DiskState::Ok,
            "fail() called on a disk that is not OK"
        );
        self.state = DiskState::Failed;
        self.repair_start_time = now;
        self.repair_time = now + self.params.repair_dist.draw(rng);
        self.fail_time = 0.0;
        self.repair_time
    }

    /// FAILED -> OK. Returns the newly drawn failure time, measured forward
    /// from the repair completion so event times never move backward.
    pub fn repair(&mut self, rng: &mut impl Rng) -> f64 {
        assert_eq!(
            self.state,
            DiskState::Failed,
            "repair() called on a disk that is not FAILED"
        );
        self.state = DiskState::Ok;
        self.fail_time = self.repair_time + self.params.fail_dist.draw(rng);
        self.repair_time = 0.0;
        self.repair_start_time = 0.0;
        self.fail_time
    }

    /// Valid only while OK.
    pub fn fail_time(&self) -> f64 {
        debug_assert_eq!(self.state, DiskState::Ok);
        self.fail_time
    }

    /// Valid only while FAILED.
    pub fn repair_time(&self) -> f64 {
        debug_assert_eq!(self.state, DiskState::Failed);
        self.repair_time
    }

    /// Fraction of the repair window elapsed, clamped to [0, 1]. Valid only
    /// while FAILED.
    pub fn repair_progress(&self, now: f64) -> f64 {
        assert_eq!(
            self.state,
            DiskState::Failed,
            "repair_progress() is only defined while FAILED"
        );
        let span = self.repair_time - self.repair_start_time;
        if span <= 0.0 {
            return 1.0;
        }
        ((now - self.repair_start_time) / span).clamp(0.0, 1.0)
    }

    pub fn scrub_time(&self, rng: &mut impl Rng) -> f64 {
        self.params.scrub_dist.draw(rng)
    }

    pub fn sector_errors(&self, rng: &mut impl Rng, window: f64) -> u64 {
        self.params.lse_dist.draw(rng, window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> DiskParams {
        DiskParams {
            fail_dist: Weibull::try_new(1.2, 1000.0, 0.0).unwrap(),
            repair_dist: Weibull::try_new(2.0, 12.0, 6.0).unwrap(),
            lse_dist: Poisson::try_new(1.08 / 10000.0).unwrap(),
            scrub_dist: Weibull::try_new(3.0, 168.0, 6.0).unwrap(),
        }
    }

    #[test]
    fn reset_draws_a_positive_fail_time() {
        let mut disk = Disk::new(params());
        let mut rng = rand::rng();
        let t = disk.reset(&mut rng);
        assert_eq!(disk.state(), DiskState::Ok);
        assert_eq!(t, disk.fail_time());
        assert!(t >= 0.0);
    }

    #[test]
    fn fail_then_repair_round_trips_to_ok() {
        let mut disk = Disk::new(params());
        let mut rng = rand::rng();
        disk.reset(&mut rng);
        let fail_at = disk.fail_time();
        let repair_at = disk.fail(fail_at, &mut rng);
        assert_eq!(disk.state(), DiskState::Failed);
        assert!(repair_at > fail_at);

        let next_fail = disk.repair(&mut rng);
        assert_eq!(disk.state(), DiskState::Ok);
        // additive reset: the next failure is always measured forward from
        // the moment repair completed.
        assert!(next_fail > repair_at);
    }

    #[test]
    fn repair_progress_is_clamped() {
        let mut disk = Disk::new(params());
        let mut rng = rand::rng();
        disk.reset(&mut rng);
        let fail_at = disk.fail_time();
        let repair_at = disk.fail(fail_at, &mut rng);
        assert_eq!(disk.repair_progress(fail_at), 0.0);
        assert_eq!(disk.repair_progress(repair_at), 1.0);
        assert_eq!(disk.repair_progress(repair_at + 1000.0), 1.0);
    }

    #[test]
    #[should_panic]
    fn repair_on_ok_disk_panics() {
        let mut disk = Disk::new(params());
        let mut rng = rand::rng();
        disk.reset(&mut rng);
        disk.repair(&mut rng);
    }

    #[test]
    #[should_panic]
    fn fail_on_failed_disk_panics() {
        let mut disk = Disk::new(params());
        let mut rng = rand::rng();
        disk.reset(&mut rng);
        let fail_at = disk.fail_time();
        disk.fail(fail_at, &mut rng);
        disk.fail(fail_at, &mut rng);
    }
}
