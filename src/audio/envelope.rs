//! Output gain with a single in-flight ramp

use std::time::Duration;

/// Lowest gain an exponential ramp targets; it cannot reach zero
pub const GAIN_FLOOR: f32 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampShape {
    Linear,
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Ramp {
    from: f32,
    to: f32,
    start: Duration,
    end: Duration,
    shape: RampShape,
}

/// Gain in 0..=1 on the output timeline
///
/// At most one ramp is in flight. A new ramp starts from the value at the
/// moment it is requested and replaces the previous target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainEnvelope {
    value: f32,
    ramp: Option<Ramp>,
}

impl Default for GainEnvelope {
    fn default() -> Self {
        Self::unity()
    }
}

impl GainEnvelope {
    pub fn unity() -> Self {
        Self {
            value: 1.0,
            ramp: None,
        }
    }

    pub fn value_at(&self, now: Duration) -> f32 {
        let Some(ramp) = self.ramp else {
            return self.value;
        };
        if now >= ramp.end {
            return ramp.to;
        }
        if now <= ramp.start {
            return ramp.from;
        }
        let span = (ramp.end - ramp.start).as_secs_f32();
        let t = (now - ramp.start).as_secs_f32() / span;
        match ramp.shape {
            RampShape::Linear => ramp.from + (ramp.to - ramp.from) * t,
            RampShape::Exponential => ramp.from * (ramp.to / ramp.from).powf(t),
        }
    }

    /// Target of the ramp in flight, if any
    pub fn target(&self) -> Option<f32> {
        self.ramp.map(|r| r.to)
    }

    pub fn is_ramping(&self, now: Duration) -> bool {
        self.ramp.map_or(false, |r| now < r.end)
    }

    /// Start a ramp from the current value
    pub fn ramp_to(&mut self, target: f32, now: Duration, duration: Duration, shape: RampShape) {
        let from = self.value_at(now);
        let mut to = target.clamp(0.0, 1.0);
        let mut shape = shape;
        if shape == RampShape::Exponential {
            if from <= 0.0 {
                shape = RampShape::Linear;
            } else {
                to = to.max(GAIN_FLOOR);
            }
        }

        if duration.is_zero() {
            self.set(to);
            return;
        }
        self.value = from;
        self.ramp = Some(Ramp {
            from,
            to,
            start: now,
            end: now + duration,
            shape,
        });
    }

    /// Jump to a value and drop any ramp
    pub fn set(&mut self, value: f32) {
        self.value = value.clamp(0.0, 1.0);
        self.ramp = None;
    }
}
