//! IMU Motion Filter
//!
//! Converts gyroscope samples into integer pointer deltas for air-mouse control.

use crate::domain::models::{MotionSample, PointerDelta};
use thiserror::Error;
use tracing::debug;

/// Scale from device angular rate to pixels
pub const SENSITIVITY: f64 = 25.0;
/// Weight of the previous smoothed value (single-pole low-pass)
pub const SMOOTHING: f64 = 0.8;
/// Integer deltas with a smaller magnitude are treated as sensor noise
pub const DEAD_ZONE: i32 = 2;
/// Angular rates beyond this are not physical readings
pub const MAX_ANGULAR_RATE: f64 = 1000.0;

#[derive(Debug, Error, PartialEq)]
pub enum SampleError {
    #[error("Malformed sample: {0:?}")]
    MalformedSample(MotionSample),
}

/// Smoothed per-axis accumulators, in screen axes. Always finite.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FilterState {
    pub x: f64,
    pub y: f64,
}

/// Exponential smoother + dead-zone quantizer
#[derive(Debug, Default)]
pub struct MotionFilter {
    state: FilterState,
}

impl MotionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> FilterState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = FilterState::default();
    }

    /// Feed one sample and return the pointer delta, if any.
    ///
    /// Malformed samples are dropped as a zero-delta tick and leave the
    /// accumulators untouched.
    pub fn apply(&mut self, sample: MotionSample) -> Option<PointerDelta> {
        match self.try_apply(sample) {
            Ok(delta) => delta,
            Err(e) => {
                debug!("Dropping sample: {}", e);
                None
            }
        }
    }

    fn try_apply(&mut self, sample: MotionSample) -> Result<Option<PointerDelta>, SampleError> {
        validate(&sample)?;

        // Yaw (device z) drives horizontal motion, pitch (device x) drives vertical.
        // Device y (roll) is ignored.
        let raw_x = sample.z * SENSITIVITY;
        let raw_y = sample.x * SENSITIVITY;

        self.state.x = smooth(self.state.x, raw_x);
        self.state.y = smooth(self.state.y, raw_y);

        let delta = PointerDelta::new(quantize(self.state.x), quantize(self.state.y));
        if delta.is_zero() {
            return Ok(None);
        }
        Ok(Some(delta))
    }
}

fn validate(sample: &MotionSample) -> Result<(), SampleError> {
    let in_range = |v: f64| v.is_finite() && v.abs() <= MAX_ANGULAR_RATE;
    if in_range(sample.x) && in_range(sample.y) && in_range(sample.z) {
        Ok(())
    } else {
        Err(SampleError::MalformedSample(*sample))
    }
}

/// `prev * SMOOTHING + raw * (1 - SMOOTHING)`, written as a lerp toward `raw`
fn smooth(prev: f64, raw: f64) -> f64 {
    raw + (prev - raw) * SMOOTHING
}

fn quantize(value: f64) -> i32 {
    let truncated = value.trunc() as i32;
    if truncated.abs() < DEAD_ZONE {
        0
    } else {
        truncated
    }
}
