use palette::{LinSrgb, Mix, Srgb};

// ---------------------------------------------------------------------------
// Colormap – scalar in [0, 1] → RGB
// ---------------------------------------------------------------------------

/// Viridis sampled at nine evenly spaced points.
const VIRIDIS_STOPS: [(u8, u8, u8); 9] = [
    (68, 1, 84),
    (71, 44, 122),
    (59, 81, 139),
    (44, 113, 142),
    (33, 144, 141),
    (39, 173, 129),
    (92, 200, 99),
    (170, 220, 50),
    (253, 231, 37),
];

/// A piecewise-linear colormap, interpolated in linear RGB.
#[derive(Debug, Clone)]
pub struct Colormap {
    stops: Vec<LinSrgb>,
}

impl Default for Colormap {
    fn default() -> Self {
        Self::viridis()
    }
}

impl Colormap {
    pub fn viridis() -> Self {
        let stops = VIRIDIS_STOPS
            .iter()
            .map(|&(r, g, b)| {
                let encoded = Srgb::new(f32::from(r) / 255.0, f32::from(g) / 255.0, f32::from(b) / 255.0);
                let linear: LinSrgb = encoded.into_linear();
                linear
            })
            .collect();
        Self { stops }
    }

    /// Color at position `t`, clamped to `[0, 1]`.
    pub fn map(&self, t: f32) -> [u8; 3] {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let segments = (self.stops.len() - 1) as f32;
        let scaled = t * segments;
        let lo = (scaled.floor() as usize).min(self.stops.len() - 2);
        let frac = scaled - lo as f32;

        let linear = self.stops[lo].mix(self.stops[lo + 1], frac);
        let encoded: Srgb = Srgb::from_linear(linear);
        let rgb: Srgb<u8> = encoded.into_format();
        [rgb.red, rgb.green, rgb.blue]
    }
}

// ---------------------------------------------------------------------------
// ColorScale – the value range behind one legend
// ---------------------------------------------------------------------------

/// Value range of a single image, used to normalise pixels and to label its
/// color-scale legend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorScale {
    pub min: f32,
    pub max: f32,
}

impl ColorScale {
    /// Range over the finite values; `[0, 0]` when there are none.
    pub fn from_values<'a>(values: impl IntoIterator<Item = &'a f32>) -> Self {
        let (min, max) = values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        if min > max {
            Self { min: 0.0, max: 0.0 }
        } else {
            Self { min, max }
        }
    }

    /// Position of `value` inside the range, `None` for NaN.
    /// A flat range maps everything to the low end.
    pub fn normalize(&self, value: f32) -> Option<f32> {
        if value.is_nan() {
            return None;
        }
        let range = self.max - self.min;
        if range.abs() < f32::EPSILON {
            return Some(0.0);
        }
        Some(((value - self.min) / range).clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn colormap_hits_its_end_stops() {
        let cmap = Colormap::viridis();
        let low = cmap.map(0.0);
        let high = cmap.map(1.0);
        for (got, want) in low.iter().zip([68u8, 1, 84]) {
            assert!(got.abs_diff(want) <= 1, "{low:?}");
        }
        for (got, want) in high.iter().zip([253u8, 231, 37]) {
            assert!(got.abs_diff(want) <= 1, "{high:?}");
        }
        assert_eq!(cmap.map(-3.0), cmap.map(0.0));
        assert_eq!(cmap.map(7.0), cmap.map(1.0));
    }

    #[test]
    fn scale_ignores_non_finite_values() {
        let scale = ColorScale::from_values(&[2.0, f32::NAN, -1.0, f32::INFINITY]);
        assert_relative_eq!(scale.min, -1.0);
        assert_relative_eq!(scale.max, 2.0);
        assert_relative_eq!(scale.normalize(0.5).unwrap(), 0.5);
        assert_eq!(scale.normalize(f32::NAN), None);
    }

    #[test]
    fn flat_scale_maps_to_low_end() {
        let scale = ColorScale::from_values(&[3.0, 3.0]);
        assert_eq!(scale.normalize(3.0), Some(0.0));
        assert_eq!(ColorScale::from_values(&[]), ColorScale { min: 0.0, max: 0.0 });
    }
}
