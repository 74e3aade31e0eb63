// lib.rs
#![cfg_attr(not(test), no_std)]

#[macro_use]
pub mod macros;

pub mod attitude;
pub mod blackboard;
pub mod config;
pub mod datacells;
pub mod fc;
pub mod fusion;
pub mod monitor;
pub mod readings;
pub mod servo;
pub mod telemetry;

pub use config::{FcParams, FusionParams, Params, ServoParams};
pub use fc::{FcContext, FcInputs, FcOutputs, FcState, FcStatus};
pub use fusion::{FusedAlt, FusionEngine};
pub use readings::{BaroReading, ImuAReading, ImuBReading, SensorError};
pub use servo::{ServoRange, ServoStatus, StallWatchdog};
pub use telemetry::{SystemInputs, TelemetryRecord};

/// Standard gravity used for all vertical-kinematics math (m/s^2).
pub const G0_MPS2: f32 = 9.80665;
