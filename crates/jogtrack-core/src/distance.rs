//! Great-circle distance accumulation over a stream of position samples.

use jogtrack_types::PositionSample;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Haversine distance in meters between two samples.
pub fn haversine_meters(from: &PositionSample, to: &PositionSample) -> f64 {
    let phi1 = from.lat.to_radians();
    let phi2 = to.lat.to_radians();
    let d_phi = (to.lat - from.lat).to_radians();
    let d_lambda = (to.lng - from.lng).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push `a` a hair past 1 for antipodal points.
    let a = a.clamp(0.0, 1.0);
    2.0 * EARTH_RADIUS_METERS * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Increment contributed by `next` given the previous sample of the session.
///
/// The first sample of a session (`prev == None`) contributes nothing.
pub fn add_sample(prev: Option<&PositionSample>, next: &PositionSample) -> f64 {
    match prev {
        Some(prev) => haversine_meters(prev, next),
        None => 0.0,
    }
}

/// Running distance total over the samples of one session.
///
/// The total only ever grows: every increment is a non-negative haversine
/// distance, and non-finite increments (from non-finite coordinates) are
/// dropped rather than poisoning the total.
#[derive(Debug, Clone, Default)]
pub struct DistanceAccumulator {
    last: Option<PositionSample>,
    total_meters: f64,
    increments: usize,
}

impl DistanceAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next sample and return the increment it contributed.
    pub fn push(&mut self, sample: PositionSample) -> f64 {
        let increment = add_sample(self.last.as_ref(), &sample);
        let increment = if increment.is_finite() { increment } else { 0.0 };
        if self.last.is_some() {
            self.increments += 1;
        }
        self.total_meters += increment;
        self.last = Some(sample);
        increment
    }

    /// Total distance in meters since the session started.
    pub fn total_meters(&self) -> f64 {
        self.total_meters
    }

    /// Number of increments added (one less than the number of samples).
    pub fn increments(&self) -> usize {
        self.increments
    }

    /// The most recent sample.
    pub fn last(&self) -> Option<&PositionSample> {
        self.last.as_ref()
    }

    /// Forget all samples.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Total path length in meters, summing increments in the given order.
pub fn path_length_meters(path: &[PositionSample]) -> f64 {
    let mut accumulator = DistanceAccumulator::new();
    for sample in path {
        accumulator.push(*sample);
    }
    accumulator.total_meters()
}
