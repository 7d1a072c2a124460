//! Configuration, presets, and the adaptive Monte-Carlo driver.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use rand::Rng;

use crate::array::{Array, McCode};
use crate::damage::{self, DamageModel, DamageModelSelector};
use crate::disk::DiskParams;
use crate::error::ConfigError;
use crate::event::System;
use crate::samples::Samples;
use crate::stochastic::{Poisson, Weibull};

/// A disk's capacity expressed in 512-byte sectors, before `capacity_factor`
/// scaling: 1 TiB.
pub const BASE_DISK_CAPACITY_SECTORS: u64 = 2 * 1024 * 1024 * 1024;

/// A `(shape, scale, location)` Weibull tuple as read from configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistParams {
    pub shape: f64,
    pub scale: f64,
    pub location: f64,
}

impl DistParams {
    pub fn new(shape: f64, scale: f64, location: f64) -> Self {
        Self {
            shape,
            scale,
            location,
        }
    }

    fn weibull(&self) -> Result<Weibull, ConfigError> {
        Weibull::try_new(self.shape, self.scale, self.location)
    }
}

/// A named bundle of disk-failure/repair/scrub/LSE parameters, captured
/// bit-for-bit from the field studies they're named after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Elerath2009,
    Elerath2014A,
    Elerath2014B,
}

impl Preset {
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name {
            "Elerath2009" => Ok(Self::Elerath2009),
            "Elerath2014A" => Ok(Self::Elerath2014A),
            "Elerath2014B" => Ok(Self::Elerath2014B),
            _ => Err(ConfigError::UnknownPreset(name.to_string())),
        }
    }

    /// `(fail, repair, lse_rate, scrub)`, with `capacity_factor` applied to
    /// every scale/location the way larger disks take proportionally
    /// longer to repair and scrub.
    pub fn params(self, capacity_factor: f64) -> (DistParams, DistParams, f64, DistParams) {
        match self {
            Preset::Elerath2009 => (
                DistParams::new(1.2, 461386.0, 0.0),
                DistParams::new(2.0, 12.0 * capacity_factor, 6.0 * capacity_factor),
                1.08 / 10000.0,
                DistParams::new(3.0, 168.0 * capacity_factor, 6.0 * capacity_factor),
            ),
            Preset::Elerath2014A => (
                DistParams::new(1.13, 302016.0, 0.0),
                DistParams::new(1.65, 22.7 * capacity_factor, 0.0),
                1.0 / 12325.0,
                DistParams::new(1.0, 186.0 * capacity_factor, 0.0),
            ),
            Preset::Elerath2014B => (
                DistParams::new(0.576, 4833522.0, 0.0),
                DistParams::new(1.15, 20.25 * capacity_factor, 0.0),
                1.0 / 42857.0,
                DistParams::new(0.97, 160.0 * capacity_factor, 0.0),
            ),
        }
    }
}

/// Everything needed to construct a [`Simulator`].
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub mission_time: f64,
    pub iterations: u64,
    pub raid_type: String,
    pub raid_num: u32,
    pub disk_capacity: u64,
    pub capacity_factor: f64,
    pub disk_fail_parms: DistParams,
    pub disk_repair_parms: DistParams,
    pub disk_lse_rate: f64,
    pub disk_scrubbing_parms: DistParams,
    pub force_re: bool,
    pub required_re: f64,
    pub damage_model: DamageModelSelector,
    pub trace_path: Option<PathBuf>,
}

impl Default for SimConfig {
    fn default() -> Self {
        let (fail, repair, lse_rate, scrub) = Preset::Elerath2014A.params(1.0);
        Self {
            mission_time: 87600.0,
            iterations: 10_000,
            raid_type: "mds_7_1".to_string(),
            raid_num: 1,
            disk_capacity: BASE_DISK_CAPACITY_SECTORS,
            capacity_factor: 1.0,
            disk_fail_parms: fail,
            disk_repair_parms: repair,
            disk_lse_rate: lse_rate,
            disk_scrubbing_parms: scrub,
            force_re: false,
            required_re: 0.05,
            damage_model: DamageModelSelector::default(),
            trace_path: None,
        }
    }
}

impl SimConfig {
    /// Overwrites the disk distribution fields with a named preset, scaled
    /// by the config's current `capacity_factor`. Also rescales
    /// `disk_capacity` to match.
    pub fn apply_preset(&mut self, preset: Preset) {
        let (fail, repair, lse_rate, scrub) = preset.params(self.capacity_factor);
        self.disk_fail_parms = fail;
        self.disk_repair_parms = repair;
        self.disk_lse_rate = lse_rate;
        self.disk_scrubbing_parms = scrub;
        self.disk_capacity =
            (BASE_DISK_CAPACITY_SECTORS as f64 * self.capacity_factor) as u64;
    }
}

/// The two aggregators, event counters, and final iteration count a run
/// produces. Formatting this for a human is the caller's job.
#[derive(Debug)]
pub struct SimResult {
    pub array_failure: Samples,
    pub lse: Samples,
    pub iterations: u64,
    pub raid_failure_events: u64,
    pub sector_error_events: u64,
    pub df: f64,
}

const TARGET_CONFIDENCE: f64 = 0.95;
const MIN_ADDITIONAL_ITERATIONS: u64 = 10_000;

/// The Monte-Carlo reliability simulator: owns one [`System`] and runs it
/// for as many iterations as configured, optionally extending the run
/// until both samples are within the required relative error.
pub struct Simulator {
    config: SimConfig,
    code: McCode,
    disk_params: DiskParams,
    damage_model: Box<dyn DamageModel>,
    interrupted: Arc<AtomicBool>,
}

impl Simulator {
    pub fn new(config: SimConfig) -> Result<Self, ConfigError> {
        let code = McCode::parse(&config.raid_type)?;
        let disk_params = DiskParams {
            fail_dist: config.disk_fail_parms.weibull()?,
            repair_dist: config.disk_repair_parms.weibull()?,
            lse_dist: Poisson::try_new(config.disk_lse_rate)?,
            scrub_dist: config.disk_scrubbing_parms.weibull()?,
        };
        let damage_model = damage::build(config.damage_model, config.trace_path.as_deref())?;
        info!(
            "resolved config: raid_type={}, raid_num={}, mission_time={}, iterations={}",
            config.raid_type, config.raid_num, config.mission_time, config.iterations
        );
        Ok(Self {
            config,
            code,
            disk_params,
            damage_model,
            interrupted: Arc::new(AtomicBool::new(false)),
        })
    }

    /// A shared flag the caller can flip (e.g. from a Ctrl-C handler) to
    /// stop the run cooperatively and still get valid partial statistics.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    fn build_system(&self) -> System {
        let arrays = (0..self.config.raid_num)
            .map(|_| Array::new(self.code, self.config.disk_capacity, self.disk_params))
            .collect();
        System::new(self.config.mission_time, arrays)
    }

    fn run_n_iterations(
        &self,
        rng: &mut impl Rng,
        system: &mut System,
        count: u64,
        array_failure: &mut Samples,
        lse: &mut Samples,
        raid_failure_events: &mut u64,
        sector_error_events: &mut u64,
    ) -> u64 {
        let mut done = 0u64;
        for _ in 0..count {
            if self.interrupted.load(Ordering::Relaxed) {
                break;
            }
            system.reset(rng);
            let outcome = system.run(rng, &self.interrupted);
            debug!(
                "iteration: raid_failure_area={:.6}, arrays_failed={}, lse_total={}",
                outcome.raid_failure_area, outcome.arrays_failed, outcome.lse_total
            );

            let array_failure_value = if outcome.arrays_failed > 0 {
                self.damage_model.raid_failure(outcome.raid_failure_area)
            } else {
                0.0
            };
            let lse_value = if outcome.lse_total > 0 {
                self.damage_model.sector_error(rng, outcome.lse_total)
            } else {
                0.0
            };

            if outcome.arrays_failed > 0 {
                *raid_failure_events += 1;
            }
            if outcome.lse_total > 0 {
                *sector_error_events += 1;
            }

            array_failure.add(array_failure_value);
            lse.add(lse_value);
            done += 1;
        }
        done
    }

    /// Runs the configured number of iterations, then (if
    /// `config.force_re` is set) keeps extending the run until both
    /// samples' relative error falls within `config.required_re`.
    pub fn run(&mut self) -> Result<SimResult, ConfigError> {
        let mut rng = rand::rng();
        let mut system = self.build_system();
        let mut array_failure = Samples::new();
        let mut lse = Samples::new();
        let mut raid_failure_events = 0u64;
        let mut sector_error_events = 0u64;

        let mut total_iterations = self.run_n_iterations(
            &mut rng,
            &mut system,
            self.config.iterations,
            &mut array_failure,
            &mut lse,
            &mut raid_failure_events,
            &mut sector_error_events,
        );

        if self.config.force_re {
            loop {
                if self.interrupted.load(Ordering::Relaxed) {
                    break;
                }
                let value_re = array_failure.value_re(TARGET_CONFIDENCE)?;
                let lse_re = lse.value_re(TARGET_CONFIDENCE)?;
                let worst_re = value_re.max(lse_re);
                if worst_re <= self.config.required_re {
                    break;
                }

                let additional = ((worst_re / self.config.required_re - 1.0)
                    * total_iterations as f64)
                    .ceil()
                    .max(0.0) as u64;
                let additional = additional.max(MIN_ADDITIONAL_ITERATIONS);
                warn!(
                    "relative error {:.4} above target {:.4}, running {} more iterations",
                    worst_re, self.config.required_re, additional
                );

                total_iterations += self.run_n_iterations(
                    &mut rng,
                    &mut system,
                    additional,
                    &mut array_failure,
                    &mut lse,
                    &mut raid_failure_events,
                    &mut sector_error_events,
                );
            }
        }

        Ok(SimResult {
            array_failure,
            lse,
            iterations: total_iterations,
            raid_failure_events,
            sector_error_events,
            df: self.damage_model.df(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_match_published_constants_bit_for_bit() {
        let (fail, repair, lse_rate, scrub) = Preset::Elerath2009.params(1.0);
        assert_eq!(fail, DistParams::new(1.2, 461386.0, 0.0));
        assert_eq!(repair, DistParams::new(2.0, 12.0, 6.0));
        assert_eq!(lse_rate, 1.08 / 10000.0);
        assert_eq!(scrub, DistParams::new(3.0, 168.0, 6.0));

        let (fail, repair, lse_rate, scrub) = Preset::Elerath2014A.params(1.0);
        assert_eq!(fail, DistParams::new(1.13, 302016.0, 0.0));
        assert_eq!(repair, DistParams::new(1.65, 22.7, 0.0));
        assert_eq!(lse_rate, 1.0 / 12325.0);
        assert_eq!(scrub, DistParams::new(1.0, 186.0, 0.0));

        let (fail, repair, lse_rate, scrub) = Preset::Elerath2014B.params(1.0);
        assert_eq!(fail, DistParams::new(0.576, 4833522.0, 0.0));
        assert_eq!(repair, DistParams::new(1.15, 20.25, 0.0));
        assert_eq!(lse_rate, 1.0 / 42857.0);
        assert_eq!(scrub, DistParams::new(0.97, 160.0, 0.0));
    }

    #[test]
    fn unknown_preset_name_is_an_error() {
        assert!(Preset::parse("Elerath1999").is_err());
    }

    #[test]
    fn trivial_zero_mission_time_never_loses_anything() {
        let mut config = SimConfig::default();
        config.mission_time = 0.0;
        config.iterations = 50;
        let mut sim = Simulator::new(config).unwrap();
        let result = sim.run().unwrap();
        assert_eq!(result.raid_failure_events, 0);
        assert_eq!(result.sector_error_events, 0);
        assert_eq!(result.array_failure.value_mean(), 0.0);
    }

    #[test_log::test]
    fn guaranteed_failure_scenario_fails_almost_every_iteration() {
        let mut config = SimConfig::default();
        config.raid_type = "mds_2_1".to_string();
        config.mission_time = 1_000_000.0;
        config.iterations = 200;
        config.disk_fail_parms = DistParams::new(1.0, 1.0, 0.0);
        config.disk_repair_parms = DistParams::new(1.0, 1e9, 0.0);
        let mut sim = Simulator::new(config).unwrap();
        let result = sim.run().unwrap();
        let prob = result.array_failure.prob_mean();
        assert!(prob >= 0.95, "expected near-certain array failure, got {prob}");
    }

    #[test_log::test]
    fn adaptive_loop_bounds_total_iterations() {
        let mut config = SimConfig::default();
        config.raid_type = "mds_14_2".to_string();
        config.mission_time = 10_000.0;
        config.iterations = 500;
        config.force_re = true;
        config.required_re = 0.05;
        let initial = config.iterations;
        let mut sim = Simulator::new(config).unwrap();
        let result = sim.run().unwrap();
        assert!(result.iterations <= 4 * initial.max(MIN_ADDITIONAL_ITERATIONS) + initial);
    }

    #[test]
    fn invalid_raid_type_fails_fast() {
        let mut config = SimConfig::default();
        config.raid_type = "not_a_raid_type".to_string();
        assert!(Simulator::new(config).is_err());
    }
}
