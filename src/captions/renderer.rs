use std::path::{Path, PathBuf};

use fontdue::{Font, FontSettings};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::{
    captions::animation::{animate, CaptionStyle},
    config::CaptionConfig,
    error::{Result, VideoError},
    timeline::CaptionCue,
    video::types::Frame,
};

/// Half-width of the fill gradient at scale 1, in pixels
const GRADIENT_HALF_WIDTH: f32 = 100.0;

/// Bold sans fonts commonly present on Linux, macOS and Windows
const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/noto/NotoSans-Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "/Library/Fonts/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

/// Look for a usable bold sans font in the usual system locations
pub fn find_system_font() -> Option<PathBuf> {
    SYSTEM_FONT_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|path| path.is_file())
}

/// Coverage mask for one line of text
#[derive(Debug, Clone)]
struct TextMask {
    coverage: Vec<u8>,
    width: usize,
    height: usize,
    /// Padding reserved around the glyphs for the outline
    pad: usize,
    /// Advance width of the laid out text
    advance: f32,
    ascent: f32,
    descent: f32,
}

/// Rasterizes caption cues onto frames: outlined text with a horizontal
/// gradient fill, centred in the lower third.
pub struct CaptionRenderer {
    font: Font,
    config: CaptionConfig,
}

impl CaptionRenderer {
    pub fn from_font_bytes(bytes: &[u8], config: CaptionConfig) -> Result<Self> {
        let font = Font::from_bytes(bytes, FontSettings::default()).map_err(|e| VideoError::AssetMissing {
            asset: format!("caption font ({})", e),
        })?;
        Ok(Self { font, config })
    }

    /// Load the configured font, or the first system font found
    pub fn from_config(config: &CaptionConfig) -> Result<Self> {
        let path = match &config.font_path {
            Some(path) => path.clone(),
            None => find_system_font().ok_or_else(|| VideoError::AssetMissing {
                asset: "caption font (set captions.font_path)".to_string(),
            })?,
        };
        Self::from_font_file(&path, config)
    }

    pub fn from_font_file(path: &Path, config: &CaptionConfig) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|_| VideoError::AssetMissing {
            asset: format!("caption font {}", path.display()),
        })?;
        let renderer = Self::from_font_bytes(&bytes, config.clone())?;
        info!("Loaded caption font {:?}", path);
        Ok(renderer)
    }

    /// Composite one cue at timeline time `t`
    pub fn render(&self, frame: &mut Frame, cue: &CaptionCue, t: f64) {
        let style = animate(cue.effect, cue.progress(t));
        self.render_styled(frame, &cue.text, style);
    }

    pub fn render_styled(&self, frame: &mut Frame, text: &str, style: CaptionStyle) {
        if !style.is_visible() || text.trim().is_empty() {
            return;
        }

        let frame_height = frame.height() as f32;
        let scale = style.scale as f32;
        let font_px = (frame_height * self.config.font_scale).round() * scale;
        if font_px < 1.0 {
            return;
        }
        let outline = stroke_radius(self.config.outline_width, scale);

        let Some(mask) = self.rasterize(text, font_px, outline.ceil() as usize) else {
            return;
        };
        let outline_mask = dilate(&mask.coverage, mask.width, mask.height, outline);

        let centre_x = frame.width() as f32 / 2.0;
        let centre_y = frame_height * (self.config.baseline + style.offset_y as f32);
        // Vertically centre the em box on the baseline anchor
        let baseline_y = centre_y + (mask.ascent + mask.descent) / 2.0;

        let left = (centre_x - mask.advance / 2.0).round() as i64 - mask.pad as i64;
        let top = (baseline_y - mask.ascent).round() as i64 - mask.pad as i64;

        let opacity = style.opacity.clamp(0.0, 1.0) as f32;
        let half_gradient = GRADIENT_HALF_WIDTH * scale;

        self.composite(frame, &mask, &outline_mask, left, top, opacity, centre_x, half_gradient);
        debug!("Caption '{}' at {:.0}px, opacity {:.2}", text, font_px, opacity);
    }

    fn rasterize(&self, text: &str, font_px: f32, pad: usize) -> Option<TextMask> {
        let (ascent, descent) = match self.font.horizontal_line_metrics(font_px) {
            Some(line) => (line.ascent, line.descent),
            None => (font_px * 0.8, -font_px * 0.2),
        };

        let mut pen = 0.0f32;
        let mut placements = Vec::new();
        let mut previous: Option<char> = None;
        for ch in text.chars() {
            if let Some(prev) = previous {
                pen += self.font.horizontal_kern(prev, ch, font_px).unwrap_or(0.0);
            }
            let (metrics, bitmap) = self.font.rasterize(ch, font_px);
            placements.push((pen, metrics, bitmap));
            pen += metrics.advance_width;
            previous = Some(ch);
        }

        let width = pen.ceil() as usize + pad * 2;
        let height = (ascent - descent).ceil() as usize + pad * 2;
        if width == 0 || height == 0 || pen <= 0.0 {
            return None;
        }

        let mut coverage = vec![0u8; width * height];
        let baseline = pad as i64 + ascent.round() as i64;
        for (x, metrics, bitmap) in placements {
            let gx0 = pad as i64 + (x + metrics.xmin as f32).round() as i64;
            let gy0 = baseline - (metrics.height as i64 + metrics.ymin as i64);
            for gy in 0..metrics.height {
                let cy = gy0 + gy as i64;
                if cy < 0 || cy >= height as i64 {
                    continue;
                }
                for gx in 0..metrics.width {
                    let cx = gx0 + gx as i64;
                    if cx < 0 || cx >= width as i64 {
                        continue;
                    }
                    let cell = &mut coverage[cy as usize * width + cx as usize];
                    *cell = (*cell).max(bitmap[gy * metrics.width + gx]);
                }
            }
        }

        Some(TextMask {
            coverage,
            width,
            height,
            pad,
            advance: pen,
            ascent,
            descent,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn composite(
        &self,
        frame: &mut Frame,
        mask: &TextMask,
        outline_mask: &[u8],
        left: i64,
        top: i64,
        opacity: f32,
        centre_x: f32,
        half_gradient: f32,
    ) {
        let frame_width = frame.width() as i64;
        let stride = frame.stride();
        let outline_color = self.config.outline_color;
        let start = self.config.gradient_start;
        let end = self.config.gradient_end;

        frame
            .as_bytes_mut()
            .par_chunks_mut(stride)
            .enumerate()
            .for_each(|(y, row)| {
                let my = y as i64 - top;
                if my < 0 || my >= mask.height as i64 {
                    return;
                }
                let my = my as usize;
                for mx in 0..mask.width {
                    let x = left + mx as i64;
                    if x < 0 || x >= frame_width {
                        continue;
                    }
                    let index = my * mask.width + mx;
                    let px = &mut row[x as usize * 3..x as usize * 3 + 3];

                    let stroke = outline_mask[index] as f32 / 255.0 * opacity;
                    if stroke > 0.0 {
                        blend(px, outline_color, stroke);
                    }

                    let fill = mask.coverage[index] as f32 / 255.0 * opacity;
                    if fill > 0.0 {
                        let g = ((x as f32 - centre_x + half_gradient) / (2.0 * half_gradient)).clamp(0.0, 1.0);
                        blend(px, lerp_color(start, end, g), fill);
                    }
                }
            });
    }
}

fn blend(px: &mut [u8], color: [u8; 3], alpha: f32) {
    for (c, target) in px.iter_mut().zip(color) {
        *c = (*c as f32 + (target as f32 - *c as f32) * alpha).round().clamp(0.0, 255.0) as u8;
    }
}

fn lerp_color(a: [u8; 3], b: [u8; 3], t: f32) -> [u8; 3] {
    let mut out = [0u8; 3];
    for i in 0..3 {
        out[i] = (a[i] as f32 + (b[i] as f32 - a[i] as f32) * t).round() as u8;
    }
    out
}

/// How far a stroke of `width` pixels reaches outside the glyph edge.
///
/// The stroke is centred on the edge, so only half of it lies outside.
fn stroke_radius(width: f32, scale: f32) -> f32 {
    width * scale / 2.0
}

/// Grow a coverage mask by a disc of `radius` pixels (max filter)
fn dilate(coverage: &[u8], width: usize, height: usize, radius: f32) -> Vec<u8> {
    if radius <= 0.0 {
        return coverage.to_vec();
    }
    let r = radius.ceil() as i64;
    let offsets: Vec<(i64, i64)> = (-r..=r)
        .flat_map(|dy| (-r..=r).map(move |dx| (dx, dy)))
        .filter(|&(dx, dy)| ((dx * dx + dy * dy) as f32) <= radius * radius)
        .collect();

    let mut out = vec![0u8; coverage.len()];
    out.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
        for (x, cell) in row.iter_mut().enumerate() {
            let mut best = 0u8;
            for &(dx, dy) in &offsets {
                let sx = x as i64 + dx;
                let sy = y as i64 + dy;
                if sx < 0 || sy < 0 || sx >= width as i64 || sy >= height as i64 {
                    continue;
                }
                best = best.max(coverage[sy as usize * width + sx as usize]);
                if best == 255 {
                    break;
                }
            }
            *cell = best;
        }
    });
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::timeline::CaptionEffect;

    const NEEDS_FONT: &str = "needs a system TrueType font such as DejaVu Sans Bold";

    pub(crate) fn system_renderer() -> CaptionRenderer {
        let path = find_system_font().expect(NEEDS_FONT);
        CaptionRenderer::from_font_file(&path, &CaptionConfig::default()).expect(NEEDS_FONT)
    }

    #[test]
    fn test_dilate_grows_by_radius() {
        let mut mask = vec![0u8; 11 * 11];
        mask[5 * 11 + 5] = 255;
        let grown = dilate(&mask, 11, 11, 2.0);

        assert_eq!(grown[5 * 11 + 7], 255);
        assert_eq!(grown[3 * 11 + 5], 255);
        assert_eq!(grown[5 * 11 + 8], 0);
        // Disc, not square
        assert_eq!(grown[3 * 11 + 3], 0);
    }

    #[test]
    fn test_stroke_radius_is_half_the_width() {
        assert_eq!(stroke_radius(8.0, 1.0), 4.0);
        assert!((stroke_radius(8.0, 1.2) - 4.8).abs() < 1e-5);
        assert_eq!(stroke_radius(0.0, 1.0), 0.0);
    }

    #[test]
    fn test_dilate_zero_radius_is_identity() {
        let mask = vec![0, 10, 200, 0];
        assert_eq!(dilate(&mask, 2, 2, 0.0), mask);
    }

    #[test]
    fn test_gradient_endpoints() {
        let start = [0xf4, 0x72, 0xb6];
        let end = [0x63, 0x66, 0xf1];
        assert_eq!(lerp_color(start, end, 0.0), start);
        assert_eq!(lerp_color(start, end, 1.0), end);
    }

    #[test]
    fn test_blend() {
        let mut px = [0u8, 100, 200];
        blend(&mut px, [255, 255, 255], 0.5);
        assert_eq!(px, [128, 178, 228]);
    }

    #[test]
    fn test_missing_font_file_is_asset_missing() {
        let config = CaptionConfig {
            font_path: Some(PathBuf::from("/no/such/font.ttf")),
            ..CaptionConfig::default()
        };
        let err = CaptionRenderer::from_config(&config).err().unwrap();
        assert!(matches!(
            err,
            crate::error::CompositorError::Video(VideoError::AssetMissing { .. })
        ));
    }

    #[test]
    fn test_invalid_font_bytes() {
        assert!(CaptionRenderer::from_font_bytes(b"not a font", CaptionConfig::default()).is_err());
    }

    #[test]
    #[ignore = "needs a system TrueType font such as DejaVu Sans Bold"]
    fn test_caption_drawn_in_lower_third() {
        let renderer = system_renderer();
        let mut frame = Frame::new_black(640, 360);
        let cue = CaptionCue::new("Hello", 1.0, 3.0, CaptionEffect::Pop);
        renderer.render(&mut frame, &cue, 2.0);

        let lit_rows: Vec<u32> = (0..frame.height())
            .filter(|&y| (0..frame.width()).any(|x| frame.get_pixel(x, y) != [0, 0, 0]))
            .collect();
        assert!(!lit_rows.is_empty());
        assert!(lit_rows.iter().all(|&y| y > 360 / 2));
    }

    #[test]
    #[ignore = "needs a system TrueType font such as DejaVu Sans Bold"]
    fn test_invisible_cue_leaves_frame_untouched() {
        let renderer = system_renderer();
        let mut frame = Frame::new_filled(320, 180, [10, 10, 10]);
        let cue = CaptionCue::new("Gone", 0.0, 1.0, CaptionEffect::Fade);
        renderer.render(&mut frame, &cue, 1.0);
        assert!(frame.as_bytes().iter().all(|&b| b == 10));
    }
}
