//! Stochastic primitives: the Weibull and Poisson samplers every disk's
//! failure/repair/scrubbing/LSE clocks are drawn from.

use rand::Rng;
use rand_distr::Distribution;

use crate::error::ConfigError;

/// A two-parameter Weibull distribution, truncated upward at `location`.
///
/// `draw` samples the standard Weibull and, if the sample lands below
/// `location`, returns `location` instead. This is the truncated form; the
/// legacy convention of simply adding `location` to every sample is not
/// implemented.
#[derive(Debug, Clone, Copy)]
pub struct Weibull {
    shape: f64,
    scale: f64,
    location: f64,
}

impl Weibull {
    pub fn try_new(shape: f64, scale: f64, location: f64) -> Result<Self, ConfigError> {
        if !(shape.is_finite() && shape > 0.0)
            || !(scale.is_finite() && scale > 0.0)
            || !(location.is_finite() && location >= 0.0)
        {
            return Err(ConfigError::InvalidDistribution(format!(
                "({shape}, {scale}, {location})"
            )));
        }
        Ok(Self {
            shape,
            scale,
            location,
        })
    }

    pub fn shape(&self) -> f64 {
        self.shape
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn location(&self) -> f64 {
        self.location
    }

    pub fn draw(&self, rng: &mut impl Rng) -> f64 {
        let dist = rand_distr::Weibull::new(self.scale, self.shape)
            .expect("shape and scale are validated positive at construction");
        let sample = dist.sample(rng);
        if sample < self.location {
            self.location
        } else {
            sample
        }
    }
}

/// A Poisson arrival process with a fixed hourly rate.
///
/// `draw(rng, t)` returns the number of arrivals over a window of length
/// `t`. Below `lambda = rate * t == 20` this uses Knuth's multiplicative
/// algorithm directly; above it, `L = e^-lambda` underflows long before the
/// loop would terminate, so the draw switches to `rand_distr`'s transformed
/// rejection sampler instead.
#[derive(Debug, Clone, Copy)]
pub struct Poisson {
    rate: f64,
}

const KNUTH_LAMBDA_CUTOFF: f64 = 20.0;

impl Poisson {
    pub fn try_new(rate: f64) -> Result<Self, ConfigError> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(ConfigError::InvalidDistribution(format!("rate={rate}")));
        }
        Ok(Self { rate })
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn draw(&self, rng: &mut impl Rng, t: f64) -> u64 {
        let lambda = self.rate * t;
        if lambda <= 0.0 {
            return 0;
        }
        if lambda > KNUTH_LAMBDA_CUTOFF {
            let dist =
                rand_distr::Poisson::new(lambda).expect("lambda is positive and finite here");
            return dist.sample(rng) as u64;
        }

        let l = (-lambda).exp();
        let mut k: u64 = 0;
        let mut p = 1.0f64;
        loop {
            k += 1;
            let u: f64 = rng.random_range(0.0..1.0);
            p *= u;
            if p <= l {
                break;
            }
        }
        k - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weibull_rejects_bad_params() {
        assert!(Weibull::try_new(0.0, 1.0, 0.0).is_err());
        assert!(Weibull::try_new(1.0, -1.0, 0.0).is_err());
        assert!(Weibull::try_new(1.0, 1.0, -1.0).is_err());
        assert!(Weibull::try_new(f64::NAN, 1.0, 0.0).is_err());
    }

    #[test]
    fn weibull_truncates_at_location() {
        // a huge location with a tiny scale means almost every raw draw
        // lands below it, so the truncation should dominate the output.
        let dist = Weibull::try_new(1.0, 0.001, 1000.0).unwrap();
        let mut rng = rand::rng();
        for _ in 0..1000 {
            assert!(dist.draw(&mut rng) >= 1000.0);
        }
    }

    #[test]
    fn poisson_degenerate_window_is_zero() {
        let dist = Poisson::try_new(0.5).unwrap();
        let mut rng = rand::rng();
        assert_eq!(dist.draw(&mut rng, 0.0), 0);
    }

    #[test]
    fn poisson_large_lambda_does_not_hang() {
        // rate * t well above the Knuth cutoff; this must take the stable path.
        let dist = Poisson::try_new(10.0).unwrap();
        let mut rng = rand::rng();
        let count = dist.draw(&mut rng, 100.0);
        assert!(count > 0);
    }

    #[test]
    fn poisson_rejects_bad_rate() {
        assert!(Poisson::try_new(0.0).is_err());
        assert!(Poisson::try_new(-1.0).is_err());
    }
}
