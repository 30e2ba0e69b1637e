pub mod controller;
pub mod worker;

pub use controller::{
    CaptureController, ControlError, ControllerOptions, StartOutcome, Status, StopOutcome,
};
