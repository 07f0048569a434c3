use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::{
    error::Result,
    filters::{Filter, FilterParams},
    video::types::Frame,
};

use super::VhsSettings;

/// Analog tape look: scan lines, colour bleeding, chroma shift, tracking
/// errors and noise.
///
/// Random elements are seeded from the frame index so a re-render of the
/// same timeline produces the same frames.
pub struct VhsFilter {
    settings: VhsSettings,
}

impl VhsFilter {
    pub fn new() -> Self {
        Self::with_settings(VhsSettings::default())
    }

    pub fn with_settings(settings: VhsSettings) -> Self {
        Self { settings }
    }

    /// Darken alternate lines, with a thicker line every eighth row
    fn apply_scanlines(&self, frame: &mut Frame, intensity: f32) {
        if intensity <= 0.0 {
            return;
        }
        let stride = frame.stride();

        frame
            .as_bytes_mut()
            .par_chunks_mut(stride)
            .enumerate()
            .for_each(|(y, row)| {
                let mut factor = if y % 2 == 0 {
                    1.0 - intensity * 0.4
                } else {
                    1.0 - intensity * 0.2
                };
                if y % 8 == 0 && intensity > 0.5 {
                    factor *= 0.7;
                }
                for c in row.iter_mut() {
                    *c = (*c as f32 * factor) as u8;
                }
            });
    }

    /// Red smears right, blue smears left
    fn apply_color_bleeding(&self, frame: &mut Frame, intensity: f32) {
        let width = frame.width() as usize;
        if intensity <= 0.0 || width < 5 {
            return;
        }
        let stride = frame.stride();
        let original = frame.as_bytes().to_vec();
        let blend = intensity * 0.4;

        frame
            .as_bytes_mut()
            .par_chunks_mut(stride)
            .zip(original.par_chunks(stride))
            .for_each(|(row, src)| {
                let px = |x: usize, c: usize| src[x * 3 + c] as f32;
                for x in 2..width - 2 {
                    let red_bleed = (px(x + 1, 0) * 0.7 + px(x + 2, 0) * 0.3) * blend;
                    row[x * 3] = (px(x, 0) * (1.0 - blend) + red_bleed) as u8;

                    let green_shift = (px(x - 1, 1) + px(x + 1, 1)) * 0.5 * (blend * 0.3);
                    row[x * 3 + 1] = (px(x, 1) * (1.0 - blend * 0.3) + green_shift) as u8;

                    let blue_bleed = (px(x - 1, 2) * 0.7 + px(x - 2, 2) * 0.3) * blend;
                    row[x * 3 + 2] = (px(x, 2) * (1.0 - blend) + blue_bleed) as u8;
                }
            });
    }

    /// Offset the red and blue channels horizontally in opposite directions
    fn apply_chroma_shift(&self, frame: &mut Frame, intensity: f32) {
        let shift = (intensity * 4.0) as i64;
        if shift == 0 {
            return;
        }
        let width = frame.width() as i64;
        let stride = frame.stride();
        let original = frame.as_bytes().to_vec();

        frame
            .as_bytes_mut()
            .par_chunks_mut(stride)
            .zip(original.par_chunks(stride))
            .for_each(|(row, src)| {
                for x in 0..width {
                    let red_x = (x + shift).clamp(0, width - 1) as usize;
                    let blue_x = (x - shift).clamp(0, width - 1) as usize;
                    row[x as usize * 3] = src[red_x * 3];
                    row[x as usize * 3 + 2] = src[blue_x * 3 + 2];
                }
            });
    }

    /// Randomly displace whole lines sideways, filling the gap with snow
    fn apply_tracking_error(&self, frame: &mut Frame, intensity: f32, rng: &mut SmallRng) {
        let height = frame.height();
        let probability = intensity * 0.15;

        for y in 0..height {
            if rng.gen::<f32>() >= probability {
                continue;
            }
            let displacement = if rng.gen::<f32>() < 0.7 {
                rng.gen_range(-2..=2)
            } else {
                rng.gen_range(-8..=8)
            };
            self.displace_scanline(frame, y, displacement, rng);

            if rng.gen::<f32>() < 0.3 && y + 1 < height {
                self.displace_scanline(frame, y + 1, displacement / 2, rng);
            }
        }
    }

    fn displace_scanline(&self, frame: &mut Frame, y: u32, displacement: i32, rng: &mut SmallRng) {
        if displacement == 0 {
            return;
        }
        let width = frame.width() as i32;
        let stride = frame.stride();
        let start = y as usize * stride;
        let row = &mut frame.as_bytes_mut()[start..start + stride];
        let line = row.to_vec();

        for x in 0..width {
            let source_x = x - displacement;
            let dst = x as usize * 3;
            if (0..width).contains(&source_x) {
                let src = source_x as usize * 3;
                row[dst..dst + 3].copy_from_slice(&line[src..src + 3]);
            } else {
                let snow = rng.gen_range(0..=64u8);
                row[dst..dst + 3].fill(snow);
            }
        }
    }

    /// Grain, bright snow and dark dropouts
    fn apply_noise(&self, frame: &mut Frame, intensity: f32, rng: &mut SmallRng) {
        let probability = intensity * 0.08;
        if probability <= 0.0 {
            return;
        }

        for px in frame.as_bytes_mut().chunks_exact_mut(3) {
            if rng.gen::<f32>() >= probability {
                continue;
            }
            let kind = rng.gen::<f32>();
            if kind < 0.6 {
                let grain = rng.gen_range(-30i16..=30);
                for c in px.iter_mut() {
                    *c = (*c as i16 + grain).clamp(0, 255) as u8;
                }
            } else if kind < 0.8 {
                px.fill(rng.gen_range(200..=255u8));
            } else {
                px.fill(rng.gen_range(0..=40u8));
            }
        }
    }

    /// Boost saturation and warm the image toward the tape's colour cast
    fn apply_color_cast(&self, frame: &mut Frame, saturation: f32, warmth: f32) {
        let factor = 1.0 + saturation * 0.6;
        let warmth = warmth * 0.3;

        frame.as_bytes_mut().par_chunks_mut(3).for_each(|px| {
            let (r, g, b) = (px[0] as f32, px[1] as f32, px[2] as f32);
            let avg = (r + g + b) / 3.0;
            let r = (avg + (r - avg) * factor) * (1.0 + warmth * 0.2);
            let g = (avg + (g - avg) * factor) * (1.0 + warmth * 0.1);
            let b = (avg + (b - avg) * factor) * (1.0 - warmth * 0.15);
            px[0] = r.clamp(0.0, 255.0) as u8;
            px[1] = g.clamp(0.0, 255.0) as u8;
            px[2] = b.clamp(0.0, 255.0) as u8;
        });
    }
}

impl Default for VhsFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for VhsFilter {
    fn name(&self) -> &str {
        "vhs"
    }

    fn description(&self) -> &str {
        "VHS tape aesthetic with scan lines, colour bleeding, tracking errors and noise"
    }

    fn default_amount(&self) -> f32 {
        0.8
    }

    fn apply(&self, frame: &mut Frame, params: &FilterParams) -> Result<()> {
        let intensity = params.amount.clamp(0.0, 1.0);
        if intensity == 0.0 || frame.width() == 0 {
            return Ok(());
        }
        let s = &self.settings;
        let mut rng = SmallRng::seed_from_u64(s.seed ^ params.frame_index);

        self.apply_scanlines(frame, s.scanline_intensity * intensity);
        self.apply_color_bleeding(frame, s.color_bleeding * intensity);
        self.apply_chroma_shift(frame, s.chroma_shift * intensity);
        self.apply_tracking_error(frame, s.tracking_error * intensity, &mut rng);
        self.apply_noise(frame, s.noise_level * intensity, &mut rng);
        self.apply_color_cast(frame, s.saturation_boost * intensity, intensity);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> Frame {
        let mut frame = Frame::new_black(width, height);
        for y in 0..height {
            for x in 0..width {
                frame.set_pixel(x, y, [(x * 7) as u8, (y * 5) as u8, ((x + y) * 3) as u8]);
            }
        }
        frame
    }

    #[test]
    fn test_vhs_changes_the_frame() {
        let original = gradient(32, 24);
        let mut frame = original.clone();
        VhsFilter::new().apply(&mut frame, &FilterParams::new(0.8, 3)).unwrap();
        assert_ne!(frame.as_bytes(), original.as_bytes());
        assert_eq!(frame.width(), 32);
    }

    #[test]
    fn test_vhs_is_deterministic_per_frame() {
        let filter = VhsFilter::new();
        let mut a = gradient(32, 24);
        let mut b = gradient(32, 24);
        filter.apply(&mut a, &FilterParams::new(1.0, 42)).unwrap();
        filter.apply(&mut b, &FilterParams::new(1.0, 42)).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_zero_intensity_is_identity() {
        let original = gradient(16, 16);
        let mut frame = original.clone();
        VhsFilter::new().apply(&mut frame, &FilterParams::new(0.0, 0)).unwrap();
        assert_eq!(frame.as_bytes(), original.as_bytes());
    }

    #[test]
    fn test_scanlines_darken_even_rows_more() {
        let mut frame = Frame::new_filled(4, 4, [200, 200, 200]);
        VhsFilter::new().apply_scanlines(&mut frame, 0.4);
        assert!(frame.get_pixel(0, 0)[0] < frame.get_pixel(0, 1)[0]);
    }
}
