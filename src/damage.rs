//! Damage models: translating the raw corrupted fraction and LSE counts a
//! `System` iteration produces into actual bytes/files/chunks lost,
//! optionally weighted by a deduplication trace.

use std::path::Path;

use rand::{Rng, RngCore};

use crate::error::{ConfigError, TraceError};

/// Which of the six damage model variants to build.
#[derive(Debug, Clone, Copy, Default)]
pub struct DamageModelSelector {
    /// Model damage at file granularity instead of chunk granularity.
    pub filelevel: bool,
    /// Model content-defined deduplication via a loaded trace.
    pub dedup: bool,
    /// Weight damage by chunk/file size instead of raw count. Ignored when
    /// `dedup` is set at chunk granularity, since a dedup trace always
    /// carries its own per-entry weights.
    pub weighted: bool,
}

/// Converts the raw simulation outputs (corrupted area fraction, LSE
/// count) into the quantity that actually gets recorded as "damage".
pub trait DamageModel: std::fmt::Debug {
    /// Magnitude of a catastrophic array failure, given the fraction of
    /// the array's address space that was unprotected when it failed.
    fn raid_failure(&self, corrupted_area: f64) -> f64;
    /// Magnitude of residual damage from `lse_count` latent sector errors.
    fn sector_error(&self, rng: &mut dyn RngCore, lse_count: u64) -> f64;
    /// The model's deduplication factor (1.0 when deduplication isn't
    /// modeled).
    fn df(&self) -> f64;
}

const CURVE_LEN: usize = 101;

/// A loaded file-system damage trace: a 0%-100% cumulative loss curve,
/// optionally preceded by per-entry weights and a deduplication factor.
///
/// Text format: a header line identifying the variant, then `lse_range`
/// weight values (possibly zero of them), then (dedup variants only) one
/// deduplication-factor value, then exactly 101 cumulative curve values.
#[derive(Debug, Clone)]
struct Trace {
    weights: Vec<f64>,
    df: f64,
    curve: [f64; CURVE_LEN],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TraceShape {
    /// No trailing df entry; non-dedup variants with optional weights.
    Plain,
    /// A df entry immediately precedes the curve; dedup variants.
    Dedup,
}

impl Trace {
    fn load(path: &Path, expected_header: &str, shape: TraceShape) -> Result<Self, TraceError> {
        let text = std::fs::read_to_string(path)?;
        let mut lines = text.lines();
        let header = lines
            .next()
            .ok_or(TraceError::TooShort {
                need: CURVE_LEN,
                found: 0,
            })?
            .trim();
        if header != expected_header {
            return Err(TraceError::BadHeader {
                expected: expected_header.to_string(),
                found: header.to_string(),
            });
        }

        let mut values = Vec::new();
        for (i, line) in lines.enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let v: f64 = line.parse().map_err(|_| TraceError::BadValue {
                line: i + 2,
                value: line.to_string(),
            })?;
            values.push(v);
        }

        let min_len = match shape {
            TraceShape::Plain => CURVE_LEN,
            TraceShape::Dedup => CURVE_LEN + 1,
        };
        if values.len() < min_len {
            return Err(TraceError::TooShort {
                need: min_len,
                found: values.len(),
            });
        }

        let curve_start = values.len() - CURVE_LEN;
        let (df, weights_end) = match shape {
            TraceShape::Plain => (1.0, curve_start),
            TraceShape::Dedup => (values[curve_start - 1], curve_start - 1),
        };
        let mut curve = [0.0f64; CURVE_LEN];
        curve.copy_from_slice(&values[curve_start..]);
        let weights = values[..weights_end].to_vec();

        Ok(Self { weights, df, curve })
    }

    /// `1 - curve[100 - k]` where `k = clamp(round((corrupted_area + 0.005) * 100), 0, 100)`.
    fn raid_failure(&self, corrupted_area: f64) -> f64 {
        let k = ((corrupted_area + 0.005) * 100.0) as usize;
        let k = k.min(CURVE_LEN - 1);
        1.0 - self.curve[CURVE_LEN - 1 - k]
    }

    fn sample_weight(&self, rng: &mut dyn RngCore) -> f64 {
        if self.weights.is_empty() {
            return 0.0;
        }
        let idx = rng.random_range(0..self.weights.len());
        self.weights[idx]
    }
}

/// Chunk-level, no deduplication, raw error count.
#[derive(Debug, Default)]
pub struct ChunkNoDedupUnweighted;

impl DamageModel for ChunkNoDedupUnweighted {
    fn raid_failure(&self, corrupted_area: f64) -> f64 {
        corrupted_area
    }
    fn sector_error(&self, _rng: &mut dyn RngCore, lse_count: u64) -> f64 {
        lse_count as f64
    }
    fn df(&self) -> f64 {
        1.0
    }
}

/// Chunk-level, no deduplication, each LSE weighted by a fixed 8 KiB
/// file-system block.
#[derive(Debug, Default)]
pub struct ChunkNoDedupWeighted;

const FS_BLOCK_SIZE: f64 = 8192.0;

impl DamageModel for ChunkNoDedupWeighted {
    fn raid_failure(&self, corrupted_area: f64) -> f64 {
        corrupted_area
    }
    fn sector_error(&self, _rng: &mut dyn RngCore, lse_count: u64) -> f64 {
        lse_count as f64 * FS_BLOCK_SIZE
    }
    fn df(&self) -> f64 {
        1.0
    }
}

/// Chunk-level with deduplication: damage is read off a reference-counted
/// chunk trace.
#[derive(Debug)]
pub struct ChunkDedup {
    trace: Trace,
}

impl ChunkDedup {
    pub fn load(path: &Path) -> Result<Self, TraceError> {
        Ok(Self {
            trace: Trace::load(path, "CHUNK:DEDUP", TraceShape::Dedup)?,
        })
    }
}

impl DamageModel for ChunkDedup {
    fn raid_failure(&self, corrupted_area: f64) -> f64 {
        self.trace.raid_failure(corrupted_area)
    }
    fn sector_error(&self, rng: &mut dyn RngCore, lse_count: u64) -> f64 {
        (0..lse_count).map(|_| self.trace.sample_weight(rng)).sum()
    }
    fn df(&self) -> f64 {
        self.trace.df
    }
}

/// File-level, no deduplication, an LSE destroys exactly one file
/// (unweighted by file size).
#[derive(Debug)]
pub struct FileNoDedupUnweighted {
    trace: Trace,
}

impl FileNoDedupUnweighted {
    pub fn load(path: &Path) -> Result<Self, TraceError> {
        Ok(Self {
            trace: Trace::load(path, "FILE:NODEDUP:UNWEIGHTED", TraceShape::Plain)?,
        })
    }
}

impl DamageModel for FileNoDedupUnweighted {
    fn raid_failure(&self, corrupted_area: f64) -> f64 {
        self.trace.raid_failure(corrupted_area)
    }
    fn sector_error(&self, _rng: &mut dyn RngCore, lse_count: u64) -> f64 {
        lse_count as f64
    }
    fn df(&self) -> f64 {
        1.0
    }
}

/// File-level, no deduplication, each LSE weighted by the actual size of
/// the file it lands in.
#[derive(Debug)]
pub struct FileNoDedupWeighted {
    trace: Trace,
}

impl FileNoDedupWeighted {
    pub fn load(path: &Path) -> Result<Self, TraceError> {
        Ok(Self {
            trace: Trace::load(path, "FILE:NODEDUP:WEIGHTED", TraceShape::Plain)?,
        })
    }
}

impl DamageModel for FileNoDedupWeighted {
    fn raid_failure(&self, corrupted_area: f64) -> f64 {
        self.trace.raid_failure(corrupted_area)
    }
    fn sector_error(&self, rng: &mut dyn RngCore, lse_count: u64) -> f64 {
        (0..lse_count).map(|_| self.trace.sample_weight(rng)).sum()
    }
    fn df(&self) -> f64 {
        1.0
    }
}

/// File-level with deduplication, weighted or not by file size. Both share
/// the same trace shape; only the header and the meaning of each trace
/// entry differ (a reference count vs. a byte size).
#[derive(Debug)]
pub struct FileDedup {
    trace: Trace,
}

impl FileDedup {
    pub fn load(path: &Path, weighted: bool) -> Result<Self, TraceError> {
        let header = if weighted {
            "FILE:DEDUP:WEIGHTED"
        } else {
            "FILE:DEDUP"
        };
        Ok(Self {
            trace: Trace::load(path, header, TraceShape::Dedup)?,
        })
    }
}

impl DamageModel for FileDedup {
    fn raid_failure(&self, corrupted_area: f64) -> f64 {
        self.trace.raid_failure(corrupted_area)
    }
    fn sector_error(&self, rng: &mut dyn RngCore, lse_count: u64) -> f64 {
        (0..lse_count).map(|_| self.trace.sample_weight(rng)).sum()
    }
    fn df(&self) -> f64 {
        self.trace.df
    }
}

/// Builds the damage model named by `selector`, loading a trace from
/// `trace_path` if the selected variant needs one.
pub fn build(
    selector: DamageModelSelector,
    trace_path: Option<&Path>,
) -> Result<Box<dyn DamageModel>, ConfigError> {
    let trace_path = || trace_path.ok_or(ConfigError::MissingTrace);

    match (selector.filelevel, selector.dedup, selector.weighted) {
        (false, false, false) => Ok(Box::new(ChunkNoDedupUnweighted)),
        (false, false, true) => Ok(Box::new(ChunkNoDedupWeighted)),
        (false, true, _) => Ok(Box::new(ChunkDedup::load(trace_path()?)?)),
        (true, false, false) => Ok(Box::new(FileNoDedupUnweighted::load(trace_path()?)?)),
        (true, false, true) => Ok(Box::new(FileNoDedupWeighted::load(trace_path()?)?)),
        (true, true, weighted) => Ok(Box::new(FileDedup::load(trace_path()?, weighted)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_no_dedup_raid_failure_is_identity() {
        let model = ChunkNoDedupUnweighted;
        assert_eq!(model.raid_failure(0.0), 0.0);
        assert_eq!(model.raid_failure(0.37), 0.37);
    }

    #[test]
    fn chunk_no_dedup_weighted_scales_by_block_size() {
        let model = ChunkNoDedupWeighted;
        let mut rng = rand::rng();
        assert_eq!(model.sector_error(&mut rng, 3), 3.0 * FS_BLOCK_SIZE);
    }

    fn linear_curve_trace(header: &str, df_line: Option<f64>) -> String {
        let mut lines = vec![header.to_string()];
        if let Some(df) = df_line {
            lines.push(df.to_string());
        }
        for i in 0..=100 {
            lines.push((i as f64 / 100.0).to_string());
        }
        lines.join("\n")
    }

    // The curve is indexed from its tail (`curve[100 - k]`), so a linear
    // curve makes `raid_failure` approximate its input `x`, not `1 - x`.
    #[test]
    fn dedup_variant_with_linear_curve_approximates_x() {
        let dir = std::env::temp_dir();
        let path = dir.join("raid_experiments_test_trace_chunk_dedup.txt");
        std::fs::write(&path, linear_curve_trace("CHUNK:DEDUP", Some(1.0))).unwrap();

        let model = ChunkDedup::load(&path).unwrap();
        // curve[i] = i/100, so raid_failure(x) = 1 - curve[100-k] = 1 - (100-k)/100 = k/100 ~= x
        let got = model.raid_failure(0.3);
        assert!((got - 0.3).abs() < 0.02, "got {got}");
        assert_eq!(model.df(), 1.0);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn trace_header_mismatch_is_rejected() {
        let dir = std::env::temp_dir();
        let path = dir.join("raid_experiments_test_trace_bad_header.txt");
        std::fs::write(&path, linear_curve_trace("NOT:A:REAL:HEADER", Some(1.0))).unwrap();

        let err = ChunkDedup::load(&path);
        assert!(err.is_err());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn build_without_trace_path_fails_fast_for_dedup_variants() {
        let selector = DamageModelSelector {
            filelevel: false,
            dedup: true,
            weighted: false,
        };
        assert!(build(selector, None).is_err());
    }

    #[test]
    fn build_resolves_the_simple_variants_without_a_trace() {
        let selector = DamageModelSelector::default();
        assert!(build(selector, None).is_ok());
    }
}
