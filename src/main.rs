use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use clap::Parser;
use raid::damage::DamageModelSelector;
use raid::error::ConfigError;
use raid::simulator::{DistParams, Preset, SimConfig, SimResult, Simulator};
use raid::Samples;

/// Monte-Carlo storage reliability simulator.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Mission duration, in hours.
    #[arg(short = 'm', long = "mission-time", default_value_t = 87600.0)]
    mission_time: f64,

    /// Number of Monte-Carlo iterations to run.
    #[arg(short = 'i', long = "iterations", default_value_t = 10_000)]
    iterations: u64,

    /// Erasure code, as "mds_<data>_<parity>".
    #[arg(short = 'r', long = "raid", default_value = "mds_7_1")]
    raid: String,

    /// Number of independent arrays in the system.
    #[arg(short = 'n', long = "raid-num", default_value_t = 1)]
    raid_num: u32,

    /// Per-disk capacity, in 512-byte sectors.
    #[arg(short = 'c', long = "capacity", default_value_t = raid::simulator::BASE_DISK_CAPACITY_SECTORS)]
    capacity: u64,

    /// A capacity scale factor applied to repair/scrub durations.
    #[arg(long = "capacity-factor", default_value_t = 1.0)]
    capacity_factor: f64,

    /// A named parameter preset: Elerath2009, Elerath2014A, Elerath2014B.
    #[arg(short = 'p', long = "parameters")]
    parameters: Option<String>,

    /// Disk failure distribution, as "shape,scale[,location]".
    #[arg(short = 'F', long = "disk-fail-dist")]
    disk_fail_dist: Option<String>,

    /// Disk repair distribution, as "shape,scale[,location]".
    #[arg(short = 'R', long = "disk-repair-dist")]
    disk_repair_dist: Option<String>,

    /// Latent sector error rate (errors per disk-hour), as a bare number.
    #[arg(short = 'L', long = "disk-lse-dist")]
    disk_lse_dist: Option<f64>,

    /// Disk scrubbing distribution, as "shape,scale[,location]".
    #[arg(short = 'S', long = "disk-scrubbing-dist")]
    disk_scrubbing_dist: Option<String>,

    /// Keep running until the required relative error is reached.
    #[arg(short = 'a', long = "accuracy")]
    accuracy: Option<f64>,

    /// Path to a damage trace file (required by the file-level and dedup
    /// variants).
    #[arg(short = 'f', long = "trace")]
    trace: Option<PathBuf>,

    /// Model damage at file granularity instead of chunk granularity.
    #[arg(long)]
    filelevel: bool,

    /// Model content-defined deduplication via the loaded trace.
    #[arg(long)]
    dedup: bool,

    /// Weight damage by chunk/file size instead of raw count.
    #[arg(long)]
    weighted: bool,
}

fn parse_dist_tuple(raw: &str) -> Result<DistParams, ConfigError> {
    let bad = || ConfigError::InvalidDistribution(raw.to_string());
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    let nums: Result<Vec<f64>, _> = parts.iter().map(|p| p.parse::<f64>()).collect();
    let nums = nums.map_err(|_| bad())?;
    match nums.as_slice() {
        [scale] => Ok(DistParams::new(1.0, *scale, 0.0)),
        [shape, scale] => Ok(DistParams::new(*shape, *scale, 0.0)),
        [shape, scale, location] => Ok(DistParams::new(*shape, *scale, *location)),
        _ => Err(bad()),
    }
}

fn build_config(cli: &Cli) -> Result<SimConfig, ConfigError> {
    let mut config = SimConfig::default();
    config.mission_time = cli.mission_time;
    config.iterations = cli.iterations;
    config.raid_type = cli.raid.clone();
    config.raid_num = cli.raid_num;
    config.disk_capacity = cli.capacity;
    config.capacity_factor = cli.capacity_factor;

    if let Some(name) = &cli.parameters {
        config.apply_preset(Preset::parse(name)?);
    }
    if let Some(raw) = &cli.disk_fail_dist {
        config.disk_fail_parms = parse_dist_tuple(raw)?;
    }
    if let Some(raw) = &cli.disk_repair_dist {
        config.disk_repair_parms = parse_dist_tuple(raw)?;
    }
    if let Some(rate) = cli.disk_lse_dist {
        config.disk_lse_rate = rate;
    }
    if let Some(raw) = &cli.disk_scrubbing_dist {
        config.disk_scrubbing_parms = parse_dist_tuple(raw)?;
    }
    if let Some(required) = cli.accuracy {
        config.force_re = true;
        config.required_re = required;
    }
    config.damage_model = DamageModelSelector {
        filelevel: cli.filelevel,
        dedup: cli.dedup,
        weighted: cli.weighted,
    };
    config.trace_path = cli.trace.clone();

    Ok(config)
}

fn print_result(cli: &Cli, result: &SimResult) -> anyhow::Result<()> {
    const CONFIDENCE: f64 = 0.95;
    let code = raid::McCode::parse(&cli.raid)?;
    let total_capacity_tb = code.data as f64 * cli.capacity as f64 * cli.raid_num as f64
        * 512.0
        / 1024.0
        / 1024.0
        / 1024.0
        / 1024.0
        * result.df;

    let data_loss_events = result.raid_failure_events + result.sector_error_events;
    let error_ratio = if result.sector_error_events == 0 {
        0.0
    } else {
        result.raid_failure_events as f64 / result.sector_error_events as f64
    };

    let prob = &result.array_failure;
    let lse: &Samples = &result.lse;
    let (prob_ci, _) = prob.ci_half(CONFIDENCE)?;
    let (lse_ci, _) = lse.ci_half(CONFIDENCE)?;

    println!("*******************");
    println!(
        "System: {:.2}TB data, {} of {} RAID, {} iterations",
        total_capacity_tb, cli.raid_num, cli.raid, result.iterations
    );
    println!("*******************");
    println!(
        "Summary: {} data loss events ({} by raid failures, {} by lse), ER = {:.4}",
        data_loss_events, result.raid_failure_events, result.sector_error_events, error_ratio
    );
    println!("*******************");
    println!(
        "Estimated reliability: {:e} +/- {:.4}%, CI ({:e},{:e}), StdDev: {:e}",
        prob.value_mean(),
        100.0 * prob.value_re(CONFIDENCE)?,
        prob.value_mean() - prob_ci,
        prob.value_mean() + prob_ci,
        prob.value_dev()
    );
    println!("*******************");
    println!(
        "Average bytes lost: {:.5} +/- {:.4}%, CI ({:.5},{:.5}), StdDev: {:.5}",
        lse.value_mean(),
        100.0 * lse.value_re(CONFIDENCE)?,
        lse.value_mean() - lse_ci,
        lse.value_mean() + lse_ci,
        lse.value_dev()
    );
    println!("*******************");
    let nomdl = if total_capacity_tb == 0.0 {
        0.0
    } else {
        lse.value_mean() / total_capacity_tb
    };
    println!(
        "NOMDL (Normalized Magnitude of Data Loss): {:.5} bytes per TB (ratio {:.5})",
        nomdl,
        error_ratio / (error_ratio + 1.0)
    );
    println!("*******************");
    Ok(())
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = build_config(cli)?;
    let mut simulator = Simulator::new(config)?;

    let interrupted = simulator.interrupt_handle();
    ctrlc::set_handler(move || {
        log::warn!("interrupt received, finishing the in-flight iteration");
        interrupted.store(true, Ordering::Relaxed);
    })?;

    let result = simulator.run()?;
    print_result(cli, &result)?;
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
