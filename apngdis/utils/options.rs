use crate::decoders::png::Delay;
use log::warn;

/// Knobs for a single decode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeOptions {
    /// Check every chunk's CRC and fail with `IntegrityCheckFailed` on mismatch.
    pub verify_crc: bool,
    /// Display scale recorded on the decoded image (2.0 for "@2x" assets).
    pub scale: f64,
    /// Delay given to the single frame of a non-animated PNG.
    pub default_delay: Delay,
    /// Upper bound on canvas and frame area, in pixels.
    pub max_pixels: u64,
}

impl Default for DecodeOptions {
    fn default() -> DecodeOptions {
        DecodeOptions {
            verify_crc: true,
            scale: 1.0,
            default_delay: Delay::default(),
            max_pixels: 1 << 28,
        }
    }
}

impl DecodeOptions {
    pub fn new() -> DecodeOptions {
        DecodeOptions::default()
    }

    pub fn with_verify_crc(mut self, verify_crc: bool) -> DecodeOptions {
        self.verify_crc = verify_crc;
        self
    }

    pub fn with_scale(mut self, scale: f64) -> DecodeOptions {
        if scale.is_finite() && scale > 0.0 {
            self.scale = scale;
        } else {
            warn!("Ignoring invalid display scale {}, keeping {}", scale, self.scale);
        }

        self
    }

    pub fn with_default_delay(mut self, delay: Delay) -> DecodeOptions {
        self.default_delay = delay;
        self
    }

    pub fn with_max_pixels(mut self, max_pixels: u64) -> DecodeOptions {
        self.max_pixels = max_pixels;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let options = DecodeOptions::new()
            .with_verify_crc(false)
            .with_scale(2.0)
            .with_default_delay(Delay::new(1, 0))
            .with_max_pixels(64);

        assert!(!options.verify_crc);
        assert_eq!(options.scale, 2.0);
        assert_eq!(options.default_delay, Delay::new(1, 100));
        assert_eq!(options.max_pixels, 64);
    }

    #[test]
    fn rejects_nonsense_scale() {
        assert_eq!(DecodeOptions::new().with_scale(0.0).scale, 1.0);
        assert_eq!(DecodeOptions::new().with_scale(f64::NAN).scale, 1.0);
    }
}
