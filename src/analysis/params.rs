/// The seven parameters of the rotated Gaussian spot, with bounds and vary flags.

use ndarray::Array2;

use crate::error::{Result, SpotError};

pub const NUM_PARAMS: usize = 7;

/// Initial rotation angle (radians).
pub const DEFAULT_ANGLE: f64 = -1.0;
/// Initial sigma along both principal axes.
pub const DEFAULT_SIGMA: f64 = 200.0;
/// Initial spot centre, both axes.
pub const DEFAULT_CENTER: f64 = 360.0;
/// Centre coordinates are limited to ±this value.
pub const CENTER_LIMIT: f64 = 2500.0;
/// Smallest sigma the optimizer may visit.
pub const SIGMA_FLOOR: f64 = 1e-3;

/// Slot of a parameter in every 7-element parameter array.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum ParamId {
    Amplitude = 0,
    Angle = 1,
    SigmaX = 2,
    SigmaY = 3,
    CenterX = 4,
    CenterY = 5,
    Offset = 6,
}

impl ParamId {
    pub const ALL: [ParamId; NUM_PARAMS] = [
        ParamId::Amplitude,
        ParamId::Angle,
        ParamId::SigmaX,
        ParamId::SigmaY,
        ParamId::CenterX,
        ParamId::CenterY,
        ParamId::Offset,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            ParamId::Amplitude => "A",
            ParamId::Angle => "t",
            ParamId::SigmaX => "sx",
            ParamId::SigmaY => "sy",
            ParamId::CenterX => "x0",
            ParamId::CenterY => "y0",
            ParamId::Offset => "C",
        }
    }
}

/// Plain values of the model parameters.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SpotParams {
    /// Peak height above the offset.
    pub amplitude: f64,
    /// Rotation of the principal axes (radians).
    pub angle: f64,
    pub sigma_x: f64,
    pub sigma_y: f64,
    pub x0: f64,
    pub y0: f64,
    /// Uniform pedestal.
    pub offset: f64,
}

impl SpotParams {
    pub fn to_array(&self) -> [f64; NUM_PARAMS] {
        [
            self.amplitude,
            self.angle,
            self.sigma_x,
            self.sigma_y,
            self.x0,
            self.y0,
            self.offset,
        ]
    }

    pub fn from_array(v: [f64; NUM_PARAMS]) -> Self {
        SpotParams {
            amplitude: v[0],
            angle: v[1],
            sigma_x: v[2],
            sigma_y: v[3],
            x0: v[4],
            y0: v[5],
            offset: v[6],
        }
    }

    pub fn get(&self, id: ParamId) -> f64 {
        self.to_array()[id.index()]
    }
}

/// One named parameter: value, closed bound interval, vary flag.
///
/// Infinite bounds mean "unbounded on that side".
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FitParameter {
    pub name: &'static str,
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub vary: bool,
}

impl FitParameter {
    pub fn new(name: &'static str, value: f64) -> Self {
        FitParameter {
            name,
            value,
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
            vary: true,
        }
    }

    pub fn with_min(mut self, min: f64) -> Self {
        self.min = min;
        self
    }

    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Whether the optimizer moves this parameter. A closed interval with
    /// `min == max` pins it like `vary = false`.
    pub fn is_free(&self) -> bool {
        self.vary && self.min < self.max
    }

    /// Initial value pulled into the bound interval.
    pub fn clamped_value(&self) -> f64 {
        self.value.max(self.min).min(self.max)
    }

    // Bounded parameters are optimized in an unbounded internal coordinate:
    // two-sided  ext = min + (sin(int) + 1) (max - min) / 2
    // lower only ext = min - 1 + sqrt(int^2 + 1)
    // upper only ext = max + 1 - sqrt(int^2 + 1)

    pub(crate) fn to_internal(&self, ext: f64) -> f64 {
        match (self.min.is_finite(), self.max.is_finite()) {
            (true, true) => (2.0 * (ext - self.min) / (self.max - self.min) - 1.0)
                .clamp(-1.0, 1.0)
                .asin(),
            (true, false) => ((ext - self.min + 1.0).powi(2) - 1.0).max(0.0).sqrt(),
            (false, true) => ((self.max - ext + 1.0).powi(2) - 1.0).max(0.0).sqrt(),
            (false, false) => ext,
        }
    }

    pub(crate) fn to_external(&self, int: f64) -> f64 {
        match (self.min.is_finite(), self.max.is_finite()) {
            (true, true) => self.min + (int.sin() + 1.0) * (self.max - self.min) / 2.0,
            (true, false) => self.min - 1.0 + (int * int + 1.0).sqrt(),
            (false, true) => self.max + 1.0 - (int * int + 1.0).sqrt(),
            (false, false) => int,
        }
    }

    /// d(external) / d(internal) at `int`.
    pub(crate) fn scale_gradient(&self, int: f64) -> f64 {
        match (self.min.is_finite(), self.max.is_finite()) {
            (true, true) => int.cos() * (self.max - self.min) / 2.0,
            (true, false) => int / (int * int + 1.0).sqrt(),
            (false, true) => -int / (int * int + 1.0).sqrt(),
            (false, false) => 1.0,
        }
    }
}

/// The closed set of model parameters, one slot per [`ParamId`].
#[derive(Clone, Debug, PartialEq)]
pub struct ParamSet {
    slots: [FitParameter; NUM_PARAMS],
}

impl ParamSet {
    /// Default bounds around the given starting values.
    pub fn from_values(v: SpotParams) -> Self {
        ParamSet {
            slots: [
                FitParameter::new("A", v.amplitude).with_min(0.0),
                FitParameter::new("t", v.angle),
                FitParameter::new("sx", v.sigma_x).with_min(SIGMA_FLOOR),
                FitParameter::new("sy", v.sigma_y).with_min(SIGMA_FLOOR),
                FitParameter::new("x0", v.x0).with_bounds(-CENTER_LIMIT, CENTER_LIMIT),
                FitParameter::new("y0", v.y0).with_bounds(-CENTER_LIMIT, CENTER_LIMIT),
                FitParameter::new("C", v.offset),
            ],
        }
    }

    /// Starting point derived from the image.
    ///
    /// `A` is half the brightest finite sample and `C` the first corner
    /// sample (or the first finite sample in row-major order if the corner
    /// is NaN). Angle, sigmas and centre are fixed defaults.
    pub fn initial_guess(data: &Array2<f64>) -> Self {
        let peak = data
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .fold(f64::NEG_INFINITY, f64::max);
        let amplitude = if peak.is_finite() { peak / 2.0 } else { 0.0 };

        let offset = data
            .iter()
            .copied()
            .find(|v| !v.is_nan())
            .unwrap_or(0.0);

        ParamSet::from_values(SpotParams {
            amplitude,
            angle: DEFAULT_ANGLE,
            sigma_x: DEFAULT_SIGMA,
            sigma_y: DEFAULT_SIGMA,
            x0: DEFAULT_CENTER,
            y0: DEFAULT_CENTER,
            offset,
        })
    }

    pub fn get(&self, id: ParamId) -> &FitParameter {
        &self.slots[id.index()]
    }

    pub fn get_mut(&mut self, id: ParamId) -> &mut FitParameter {
        &mut self.slots[id.index()]
    }

    pub fn set_value(&mut self, id: ParamId, value: f64) {
        self.slots[id.index()].value = value;
    }

    pub fn set_bounds(&mut self, id: ParamId, min: f64, max: f64) {
        let slot = &mut self.slots[id.index()];
        slot.min = min;
        slot.max = max;
    }

    pub fn set_vary(&mut self, id: ParamId, vary: bool) {
        self.slots[id.index()].vary = vary;
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParamId, &FitParameter)> {
        ParamId::ALL.iter().copied().zip(self.slots.iter())
    }

    /// Current values, clamped into their bounds.
    pub fn values(&self) -> SpotParams {
        let mut v = [0.0; NUM_PARAMS];
        for (dst, slot) in v.iter_mut().zip(self.slots.iter()) {
            *dst = slot.clamped_value();
        }
        SpotParams::from_array(v)
    }

    pub fn varying(&self) -> usize {
        self.slots.iter().filter(|s| s.is_free()).count()
    }

    pub fn validate(&self) -> Result<()> {
        for slot in &self.slots {
            if slot.min.is_nan() || slot.max.is_nan() || slot.min > slot.max {
                return Err(SpotError::InvalidParameter {
                    name: slot.name,
                    reason: format!("empty bound interval [{}, {}]", slot.min, slot.max),
                });
            }
            if !slot.value.is_finite() {
                return Err(SpotError::InvalidParameter {
                    name: slot.name,
                    reason: format!("initial value {} is not finite", slot.value),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_initial_guess_defaults() {
        let data = array![[7.0, 1.0, 2.0], [3.0, 40.0, 5.0]];
        let p = ParamSet::initial_guess(&data).values();
        assert_eq!(p.amplitude, 20.0);
        assert_eq!(p.angle, -1.0);
        assert_eq!(p.sigma_x, 200.0);
        assert_eq!(p.sigma_y, 200.0);
        assert_eq!(p.x0, 360.0);
        assert_eq!(p.y0, 360.0);
        assert_eq!(p.offset, 7.0);
    }

    #[test]
    fn test_initial_guess_skips_nan() {
        let data = array![[f64::NAN, 4.0], [f64::NAN, 10.0]];
        let p = ParamSet::initial_guess(&data).values();
        assert_eq!(p.amplitude, 5.0);
        assert_eq!(p.offset, 4.0);
    }

    #[test]
    fn test_default_bounds() {
        let set = ParamSet::initial_guess(&array![[1.0]]);
        assert_eq!(set.get(ParamId::Amplitude).min, 0.0);
        assert!(set.get(ParamId::Angle).min.is_infinite());
        assert!(set.get(ParamId::SigmaX).min > 0.0);
        assert_eq!(set.get(ParamId::CenterY).max, 2500.0);
        assert!(set.get(ParamId::Offset).max.is_infinite());
        assert_eq!(set.varying(), 7);
    }

    #[test]
    fn test_transform_roundtrip_and_gradient() {
        let params = [
            FitParameter::new("two", 0.3).with_bounds(-2.0, 5.0),
            FitParameter::new("lower", 12.0).with_min(1.0),
            FitParameter::new("upper", -3.0).with_bounds(f64::NEG_INFINITY, 4.0),
            FitParameter::new("free", -7.5),
        ];
        for p in &params {
            let int = p.to_internal(p.value);
            assert!((p.to_external(int) - p.value).abs() < 1e-9, "{}", p.name);

            let h = 1e-6;
            let numeric = (p.to_external(int + h) - p.to_external(int - h)) / (2.0 * h);
            assert!(
                (numeric - p.scale_gradient(int)).abs() < 1e-6,
                "{}: {} vs {}",
                p.name,
                numeric,
                p.scale_gradient(int)
            );
        }
    }

    #[test]
    fn test_values_are_clamped() {
        let mut set = ParamSet::initial_guess(&array![[1.0]]);
        set.set_value(ParamId::CenterX, 9000.0);
        assert_eq!(set.values().x0, 2500.0);
    }

    #[test]
    fn test_validate_rejects_empty_interval() {
        let mut set = ParamSet::initial_guess(&array![[1.0]]);
        set.set_bounds(ParamId::SigmaX, 10.0, 5.0);
        assert!(matches!(
            set.validate(),
            Err(SpotError::InvalidParameter { name: "sx", .. })
        ));
    }

    #[test]
    fn test_point_interval_pins_parameter() {
        let mut set = ParamSet::initial_guess(&array![[1.0]]);
        assert_eq!(set.varying(), 7);
        set.set_bounds(ParamId::CenterX, -900.0, -900.0);
        assert!(set.validate().is_ok());
        assert!(set.get(ParamId::CenterX).vary);
        assert!(!set.get(ParamId::CenterX).is_free());
        assert_eq!(set.varying(), 6);
        assert_eq!(set.values().x0, -900.0);
    }
}
