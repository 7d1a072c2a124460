//! The erasure group: a collection of disks with an MDS `(data, parity)`
//! code, its critical region, and the damage it has accumulated this
//! iteration.

use rand::Rng;

use crate::disk::{Disk, DiskParams, DiskState, SECTOR_SIZE};
use crate::error::ConfigError;

/// An MDS code, parsed from a `"mds_<data>_<parity>"` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct McCode {
    pub data: u32,
    pub parity: u32,
}

impl McCode {
    pub fn parse(raid_type: &str) -> Result<Self, ConfigError> {
        let bad = || ConfigError::InvalidRaidType(raid_type.to_string());

        let mut parts = raid_type.split('_');
        let (tag, data, parity, rest) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        );
        if tag != Some("mds") || rest.is_some() {
            return Err(bad());
        }
        let data: u32 = data.ok_or_else(bad)?.parse().map_err(|_| bad())?;
        let parity: u32 = parity.ok_or_else(bad)?.parse().map_err(|_| bad())?;
        if data == 0 || parity == 0 {
            return Err(bad());
        }
        Ok(Self { data, parity })
    }

    pub fn n(&self) -> u32 {
        self.data + self.parity
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayState {
    Ok,
    Failed,
}

/// One erasure-coded group of disks.
#[derive(Debug)]
pub struct Array {
    code: McCode,
    disk_capacity: u64,
    disks: Vec<Disk>,
    failed_count: u32,
    failed_bitmap: u64,
    critical_region: f64,
    state: ArrayState,
    bytes_lost: f64,
    lse_count: u64,
}

impl Array {
    pub fn new(code: McCode, disk_capacity: u64, disk_params: DiskParams) -> Self {
        let n = code.n() as usize;
        assert!(
            n <= 64,
            "erasure groups wider than 64 disks need a bitset wider than u64"
        );
        Self {
            code,
            disk_capacity,
            disks: (0..n).map(|_| Disk::new(disk_params)).collect(),
            failed_count: 0,
            failed_bitmap: 0,
            critical_region: 0.0,
            state: ArrayState::Ok,
            bytes_lost: 0.0,
            lse_count: 0,
        }
    }

    pub fn state(&self) -> ArrayState {
        self.state
    }

    pub fn failed_count(&self) -> u32 {
        self.failed_count
    }

    /// Only meaningful once `failed_count >= parity`.
    pub fn critical_region(&self) -> f64 {
        self.critical_region
    }

    pub fn bytes_lost(&self) -> f64 {
        self.bytes_lost
    }

    pub fn lse_count(&self) -> u64 {
        self.lse_count
    }

    pub fn data_fraction(&self) -> f64 {
        self.code.data as f64 / self.code.n() as f64
    }

    /// `critical_region * data_fraction`, the quantity damage models treat
    /// as the corrupted fraction of the array once it has failed.
    pub fn corrupted_area(&self) -> f64 {
        self.critical_region * self.data_fraction()
    }

    pub fn disk_state(&self, disk_idx: usize) -> DiskState {
        self.disks[disk_idx].state()
    }

    /// Resets every disk and returns `(disk_idx, fail_time)` for every disk
    /// whose freshly drawn failure lands within the mission window.
    pub fn reset(&mut self, rng: &mut impl Rng, mission_time: f64) -> Vec<(usize, f64)> {
        self.failed_count = 0;
        self.failed_bitmap = 0;
        self.critical_region = 0.0;
        self.state = ArrayState::Ok;
        self.bytes_lost = 0.0;
        self.lse_count = 0;

        self.disks
            .iter_mut()
            .enumerate()
            .map(|(i, d)| (i, d.reset(rng)))
            .filter(|(_, t)| *t <= mission_time)
            .collect()
    }

    fn recompute_critical_region(&mut self, now: f64) {
        self.critical_region = self
            .disks
            .iter()
            .enumerate()
            .filter(|(i, _)| self.failed_bitmap & (1u64 << i) != 0)
            .map(|(_, d)| 1.0 - d.repair_progress(now))
            .fold(1.0_f64, f64::min);
    }

    /// Applies a FAIL event to `disk_idx`. Returns the disk's next event
    /// time (its repair completion time).
    pub fn degrade(&mut self, rng: &mut impl Rng, disk_idx: usize, now: f64) -> f64 {
        let next = self.disks[disk_idx].fail(now, rng);
        self.failed_count += 1;
        self.failed_bitmap |= 1u64 << disk_idx;
        if self.failed_count >= self.code.parity {
            self.recompute_critical_region(now);
        }
        next
    }

    /// Applies a REPAIR event to `disk_idx`. Returns the disk's next event
    /// time (its next failure time).
    pub fn upgrade(&mut self, rng: &mut impl Rng, disk_idx: usize) -> f64 {
        let next = self.disks[disk_idx].repair(rng);
        self.failed_count -= 1;
        self.failed_bitmap &= !(1u64 << disk_idx);
        self.critical_region = 0.0;
        next
    }

    /// Returns true iff the array has just become unrecoverable. Terminal
    /// for this iteration: no further events are applied to a failed array.
    pub fn check_failure(&mut self) -> bool {
        if self.failed_count <= self.code.parity {
            return false;
        }
        self.state = ArrayState::Failed;
        self.bytes_lost =
            self.disk_capacity as f64 * SECTOR_SIZE as f64 * self.corrupted_area();
        true
    }

    /// Scrubs every healthy disk, gated by a per-disk Bernoulli draw on
    /// `critical_region` (only disks the coin flip selects are scrubbed at
    /// all). Returns true iff at least one sector error was found.
    pub fn check_sectors_lost(&mut self, rng: &mut impl Rng) -> bool {
        if self.failed_count < self.code.parity {
            return false;
        }
        let region = self.critical_region.clamp(0.0, 1.0);
        let mut count = 0u64;
        for (i, disk) in self.disks.iter().enumerate() {
            if self.failed_bitmap & (1u64 << i) != 0 {
                continue;
            }
            if rng.random_bool(region) {
                let window = disk.scrub_time(rng);
                count += disk.sector_errors(rng, window);
            }
        }
        self.lse_count += count;
        count > 0
    }
}
