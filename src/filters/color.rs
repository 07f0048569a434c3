//! Colour transforms with CSS filter-function semantics.

use rayon::prelude::*;

use crate::{
    error::Result,
    filters::{Filter, FilterParams},
    video::types::Frame,
};

type Matrix = [[f32; 3]; 3];

/// Run `op` over every pixel, one row per rayon task
fn for_each_pixel<F>(frame: &mut Frame, op: F)
where
    F: Fn(&mut [u8]) + Sync,
{
    let stride = frame.stride();
    if stride == 0 {
        return;
    }
    frame.as_bytes_mut().par_chunks_mut(stride).for_each(|row| {
        for pixel in row.chunks_exact_mut(3) {
            op(pixel);
        }
    });
}

fn apply_matrix(frame: &mut Frame, m: Matrix) {
    for_each_pixel(frame, |px| {
        let (r, g, b) = (px[0] as f32, px[1] as f32, px[2] as f32);
        for (channel, row) in m.iter().enumerate() {
            px[channel] = (row[0] * r + row[1] * g + row[2] * b).round().clamp(0.0, 255.0) as u8;
        }
    });
}

fn apply_linear(frame: &mut Frame, slope: f32, intercept: f32) {
    for_each_pixel(frame, |px| {
        for c in px.iter_mut() {
            *c = (*c as f32 * slope + intercept).round().clamp(0.0, 255.0) as u8;
        }
    });
}

/// Rec. 709 luma toward grey
pub struct Grayscale;

impl Filter for Grayscale {
    fn name(&self) -> &str {
        "grayscale"
    }

    fn description(&self) -> &str {
        "Desaturate toward luma"
    }

    fn apply(&self, frame: &mut Frame, params: &FilterParams) -> Result<()> {
        let k = 1.0 - params.amount.clamp(0.0, 1.0);
        apply_matrix(
            frame,
            [
                [0.2126 + 0.7874 * k, 0.7152 - 0.7152 * k, 0.0722 - 0.0722 * k],
                [0.2126 - 0.2126 * k, 0.7152 + 0.2848 * k, 0.0722 - 0.0722 * k],
                [0.2126 - 0.2126 * k, 0.7152 - 0.7152 * k, 0.0722 + 0.9278 * k],
            ],
        );
        Ok(())
    }
}

pub struct Sepia;

impl Filter for Sepia {
    fn name(&self) -> &str {
        "sepia"
    }

    fn description(&self) -> &str {
        "Warm brown vintage toning"
    }

    fn apply(&self, frame: &mut Frame, params: &FilterParams) -> Result<()> {
        let k = 1.0 - params.amount.clamp(0.0, 1.0);
        apply_matrix(
            frame,
            [
                [0.393 + 0.607 * k, 0.769 - 0.769 * k, 0.189 - 0.189 * k],
                [0.349 - 0.349 * k, 0.686 + 0.314 * k, 0.168 - 0.168 * k],
                [0.272 - 0.272 * k, 0.534 - 0.534 * k, 0.131 + 0.869 * k],
            ],
        );
        Ok(())
    }
}

pub struct Invert;

impl Filter for Invert {
    fn name(&self) -> &str {
        "invert"
    }

    fn description(&self) -> &str {
        "Invert colours"
    }

    fn apply(&self, frame: &mut Frame, params: &FilterParams) -> Result<()> {
        let a = params.amount.clamp(0.0, 1.0);
        apply_linear(frame, 1.0 - 2.0 * a, 255.0 * a);
        Ok(())
    }
}

pub struct Brightness;

impl Filter for Brightness {
    fn name(&self) -> &str {
        "brightness"
    }

    fn description(&self) -> &str {
        "Scale every channel linearly"
    }

    fn apply(&self, frame: &mut Frame, params: &FilterParams) -> Result<()> {
        apply_linear(frame, params.amount, 0.0);
        Ok(())
    }
}

pub struct Contrast;

impl Filter for Contrast {
    fn name(&self) -> &str {
        "contrast"
    }

    fn description(&self) -> &str {
        "Stretch channels around mid grey"
    }

    fn apply(&self, frame: &mut Frame, params: &FilterParams) -> Result<()> {
        let a = params.amount;
        apply_linear(frame, a, 127.5 * (1.0 - a));
        Ok(())
    }
}

pub struct Saturate;

impl Filter for Saturate {
    fn name(&self) -> &str {
        "saturate"
    }

    fn description(&self) -> &str {
        "Scale colour saturation"
    }

    fn apply(&self, frame: &mut Frame, params: &FilterParams) -> Result<()> {
        let s = params.amount;
        apply_matrix(
            frame,
            [
                [0.213 + 0.787 * s, 0.715 - 0.715 * s, 0.072 - 0.072 * s],
                [0.213 - 0.213 * s, 0.715 + 0.285 * s, 0.072 - 0.072 * s],
                [0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.072 + 0.928 * s],
            ],
        );
        Ok(())
    }
}
