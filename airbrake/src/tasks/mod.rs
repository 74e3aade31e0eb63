pub mod fc;
pub mod fusion;
pub mod monitor;
pub mod servo;
pub mod telemetry;
