use rand::Rng;
use serde::{Deserialize, Serialize};

/// Transient spike injection: with `probability`, the next value is drawn
/// uniformly from `[low, high]` instead of following the walk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spike {
    pub probability: f64,
    pub low: f64,
    pub high: f64,
}

/// Bounded random walk used by every numeric reading.
///
/// Each step moves the previous value by a uniform draw from
/// `[-amplitude, +amplitude]`, optionally overridden by a spike, then clamps
/// into `[lower, upper]` and rounds to `precision` decimal places.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundedRandomWalk {
    pub lower: f64,
    pub upper: f64,
    pub amplitude: f64,
    pub spike: Option<Spike>,
    /// Decimal places kept after every step (0 = integer readings)
    pub precision: u32,
}

impl BoundedRandomWalk {
    pub fn new(lower: f64, upper: f64, amplitude: f64) -> Self {
        Self {
            lower,
            upper,
            amplitude,
            spike: None,
            precision: 0,
        }
    }

    pub fn with_spike(mut self, probability: f64, low: f64, high: f64) -> Self {
        self.spike = Some(Spike {
            probability,
            low,
            high,
        });
        self
    }

    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = precision;
        self
    }

    /// Produce the next value from `previous`.
    ///
    /// The spike roll is drawn on every step whether or not a spike fires, so
    /// the number of draws per step is fixed for a given configuration.
    pub fn step<R: Rng + ?Sized>(&self, previous: f64, rng: &mut R) -> f64 {
        let delta = if self.amplitude > 0.0 && (2.0 * self.amplitude).is_finite() {
            rng.gen_range(-self.amplitude..=self.amplitude)
        } else {
            0.0
        };
        let mut next = previous + delta;

        if let Some(spike) = &self.spike {
            if rng.gen_bool(spike.probability) {
                next = if spike.low < spike.high && (spike.high - spike.low).is_finite() {
                    rng.gen_range(spike.low..=spike.high)
                } else {
                    spike.low
                };
            }
        }

        self.settle(next)
    }

    /// Clamp and round a candidate value into the walk's domain.
    ///
    /// Non-finite input settles on the lower bound.
    pub fn settle(&self, value: f64) -> f64 {
        if !value.is_finite() {
            return self.lower;
        }
        let clamped = value.clamp(self.lower, self.upper);
        let factor = 10f64.powi(self.precision as i32);
        let rounded = (clamped * factor).round() / factor;
        // Rounding may step past a bound that is not on the precision grid
        rounded.clamp(self.lower, self.upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_step_without_spike_stays_within_amplitude() {
        let walk = BoundedRandomWalk::new(0.0, 120.0, 5.0);
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..1000 {
            let next = walk.step(70.0, &mut rng);
            assert!((65.0..=75.0).contains(&next), "got {}", next);
            assert_eq!(next.fract(), 0.0);
        }
    }

    #[test]
    fn test_unsampleable_widths_stay_in_bounds() {
        let mut rng = StdRng::seed_from_u64(3);
        let wide = BoundedRandomWalk::new(0.0, 10.0, 1e308);
        let spiky = BoundedRandomWalk::new(0.0, 10.0, 1.0).with_spike(1.0, -1e308, 1e308);

        for _ in 0..20 {
            assert!((0.0..=10.0).contains(&wide.step(5.0, &mut rng)));
            assert!((0.0..=10.0).contains(&spiky.step(5.0, &mut rng)));
        }
    }

    #[test]
    fn test_spike_overrides_walk() {
        let walk = BoundedRandomWalk::new(0.0, 120.0, 1.0).with_spike(1.0, 100.0, 110.0);
        let mut rng = StdRng::seed_from_u64(1);

        for _ in 0..200 {
            let next = walk.step(40.0, &mut rng);
            assert!((100.0..=110.0).contains(&next), "got {}", next);
        }
    }

    #[test]
    fn test_clamps_at_bounds() {
        let walk = BoundedRandomWalk::new(0.0, 10.0, 50.0);
        let mut rng = StdRng::seed_from_u64(3);

        let mut saw_lower = false;
        let mut saw_upper = false;
        for _ in 0..500 {
            let next = walk.step(5.0, &mut rng);
            assert!((0.0..=10.0).contains(&next));
            saw_lower |= next == 0.0;
            saw_upper |= next == 10.0;
        }
        assert!(saw_lower && saw_upper);
    }

    #[test]
    fn test_precision_rounding() {
        let walk = BoundedRandomWalk::new(180.0, 260.0, 2.0).with_precision(1);
        assert_eq!(walk.settle(231.26), 231.3);
        assert_eq!(walk.settle(231.24), 231.2);

        let walk = BoundedRandomWalk::new(0.0, 1.0, 0.1).with_precision(2);
        assert_eq!(walk.settle(0.456), 0.46);
    }

    #[test]
    fn test_rounding_never_leaves_bounds() {
        let walk = BoundedRandomWalk::new(0.05, 0.95, 0.0).with_precision(0);
        assert_eq!(walk.settle(0.06), 0.05);
        assert_eq!(walk.settle(0.94), 0.95);
    }

    #[test]
    fn test_non_finite_settles_on_lower_bound() {
        let walk = BoundedRandomWalk::new(30.0, 120.0, 5.0);
        assert_eq!(walk.settle(f64::NAN), 30.0);
        assert_eq!(walk.settle(f64::INFINITY), 30.0);
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let walk = BoundedRandomWalk::new(0.0, 2000.0, 40.0).with_spike(0.1, 1500.0, 1900.0);
        let mut a = StdRng::seed_from_u64(99);
        let mut b = StdRng::seed_from_u64(99);

        let mut va = 600.0;
        let mut vb = 600.0;
        for _ in 0..100 {
            va = walk.step(va, &mut a);
            vb = walk.step(vb, &mut b);
            assert_eq!(va, vb);
        }
    }

    proptest! {
        #[test]
        fn prop_output_within_bounds(
            seed in any::<u64>(),
            lower in -500.0f64..500.0,
            width in 0.0f64..1000.0,
            start in -2000.0f64..2000.0,
            amplitude in 0.0f64..200.0,
            spike_probability in 0.0f64..=1.0,
            spike_low in -3000.0f64..3000.0,
            spike_width in 0.0f64..3000.0,
            precision in 0u32..4,
        ) {
            let upper = lower + width;
            let walk = BoundedRandomWalk::new(lower, upper, amplitude)
                .with_spike(spike_probability, spike_low, spike_low + spike_width)
                .with_precision(precision);
            let mut rng = StdRng::seed_from_u64(seed);

            let mut value = start;
            for _ in 0..50 {
                value = walk.step(value, &mut rng);
                prop_assert!(value >= lower && value <= upper);
            }
        }
    }
}
