pub mod config;
pub mod controller;
pub mod state;

pub use config::{DetectorConfig, RearmPolicy};
pub use controller::{DetectorSnapshot, FallDetectorController, FallStatusEvent};
pub use state::{
    magnitude, round_magnitude, AccelSample, DetectorPhase, DetectorState, FallAlert,
    ResetSchedule, SampleOutcome,
};
