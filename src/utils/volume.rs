//! Volume scale conversion
//!
//! Human volume is a 0..100 slider value; device volume is the 0..1 gain
//! handed to the audio output. The mapping is logarithmic so that the
//! slider feels linear to the ear.

/// Default base of the logarithmic curve
pub const VOLUME_BASE: f64 = 35.0;

/// Convert a 0..100 slider value to 0..1 device gain
pub fn log_volume(volume: f64, base: f64) -> f64 {
    (base.powf(volume / 100.0) - 1.0) / (base - 1.0)
}

/// Convert 0..1 device gain back to a 0..100 slider value
pub fn real_volume(device_volume: f64, base: f64) -> f64 {
    ((base - 1.0) * device_volume + 1.0).ln() / base.ln() * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_bounds() {
        assert_eq!(log_volume(0.0, VOLUME_BASE), 0.0);
        assert!((log_volume(100.0, VOLUME_BASE) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_volume_round_trip() {
        for v in 0..=100 {
            let v = v as f64;
            let back = real_volume(log_volume(v, VOLUME_BASE), VOLUME_BASE);
            assert!((back - v).abs() < 1e-9, "{} -> {}", v, back);
        }
    }

    #[test]
    fn test_low_volume_is_compressed() {
        // Half the slider is well under half the gain
        assert!(log_volume(50.0, VOLUME_BASE) < 0.2);
    }
}
