pub mod array;
pub mod damage;
pub mod disk;
pub mod error;
pub mod event;
pub mod samples;
pub mod simulator;
pub mod stochastic;

pub use array::{Array, ArrayState, McCode};
pub use damage::{DamageModel, DamageModelSelector};
pub use disk::{Disk, DiskParams, DiskState};
pub use error::{ConfigError, TraceError};
pub use event::{IterationOutcome, System};
pub use samples::Samples;
pub use simulator::{DistParams, Preset, SimConfig, SimResult, Simulator};
pub use stochastic::{Poisson, Weibull};
