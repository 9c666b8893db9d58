use rand::Rng;
use rayon::prelude::*;

use crate::{
    color::{BAYER_8X8, hsv_to_rgb, rgb_to_hsv},
    error::{MoshError, MoshResult},
    params::EffectParams,
};

/// Rows processed per chunk; cancellation is checked between chunks.
pub const CHUNK_ROWS: usize = 64;

/// Images wider than this fan rows out across the rayon pool.
pub const PARALLEL_MIN_WIDTH: usize = 512;

/// Per-row working pixel: remapped source coordinates plus float channels.
#[derive(Clone, Copy, Debug, Default)]
pub struct PixelInfo {
    pub source_x: usize,
    pub source_y: usize,
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

fn sum_rgb(px: &PixelInfo) -> f32 {
    px.r + px.g + px.b
}

/// Stage 1: geometric remap + source sampling.
///
/// Full mirror/flip take precedence over the half variants on their axis;
/// half variants only remap coordinates past the midpoint.
fn build_row(
    src: &[u8],
    width: usize,
    height: usize,
    y: usize,
    params: &EffectParams,
) -> Vec<PixelInfo> {
    let mut row = Vec::with_capacity(width);
    for x in 0..width {
        let mut source_x = x;
        if params.mirror {
            source_x = width - 1 - x;
        } else if params.half_mirror && x >= width / 2 {
            source_x = width - 1 - x;
        }

        let mut source_y = y;
        if params.flip {
            source_y = height - 1 - y;
        } else if params.half_mirror_vertical && y >= height / 2 {
            source_y = height - 1 - y;
        }

        let idx = (source_y * width + source_x) * 4;
        row.push(PixelInfo {
            source_x,
            source_y,
            r: src[idx] as f32 / 255.0,
            g: src[idx + 1] as f32 / 255.0,
            b: src[idx + 2] as f32 / 255.0,
            a: src[idx + 3] as f32 / 255.0,
        });
    }
    row
}

/// Stage 2: horizontal block averaging. Partial edge blocks average only
/// the pixels present.
fn apply_pixelation(row: &mut [PixelInfo], params: &EffectParams) {
    if params.pixelation <= 0.0 {
        return;
    }

    let block = ((params.pixelation * 40.0) as usize).max(1);
    for chunk in row.chunks_mut(block) {
        let count = chunk.len() as f32;
        let avg_r = chunk.iter().map(|p| p.r).sum::<f32>() / count;
        let avg_g = chunk.iter().map(|p| p.g).sum::<f32>() / count;
        let avg_b = chunk.iter().map(|p| p.b).sum::<f32>() / count;
        for px in chunk {
            px.r = avg_r;
            px.g = avg_g;
            px.b = avg_b;
        }
    }
}

/// Stage 3: shift the red channel's sample position and blend it back in.
/// Out-of-bounds shifted samples are skipped, not wrapped.
fn apply_aberration(row: &mut [PixelInfo], src: &[u8], width: usize, params: &EffectParams) {
    if params.rgb_aberration <= 0.0 {
        return;
    }

    let shift = (params.rgb_aberration * 20.0) as isize;
    for px in row.iter_mut() {
        let shifted_x = if params.mirror {
            px.source_x as isize - shift
        } else {
            px.source_x as isize + shift
        };
        if shifted_x >= 0 && (shifted_x as usize) < width {
            let idx = (px.source_y * width + shifted_x as usize) * 4;
            let shifted_r = src[idx] as f32 / 255.0;
            px.r = px.r * (1.0 - params.rgb_aberration) + shifted_r * params.rgb_aberration;
        }
    }
}

/// Stage 4: brightness/contrast in RGB, then saturation/hue in HSV.
fn apply_color_adjustments(row: &mut [PixelInfo], params: &EffectParams) {
    if params.brightness == 1.0
        && params.contrast == 1.0
        && params.saturation == 1.0
        && params.hue_shift == 0.0
    {
        return;
    }

    let offset = params.brightness - 1.0;
    for px in row.iter_mut() {
        px.r = (px.r - 0.5) * params.contrast + 0.5 + offset;
        px.g = (px.g - 0.5) * params.contrast + 0.5 + offset;
        px.b = (px.b - 0.5) * params.contrast + 0.5 + offset;

        let (h, s, v) = rgb_to_hsv(px.r, px.g, px.b);
        let (r, g, b) = hsv_to_rgb(h + params.hue_shift * 360.0, s * params.saturation, v);
        px.r = r;
        px.g = g;
        px.b = b;
    }
}

/// Stage 5: ordered dither perturbation, then quantization.
///
/// With posterize active the perturbation is scaled to one quantization
/// step; dither alone applies a fixed-magnitude pattern with no
/// quantization.
fn apply_posterize_dither(row: &mut [PixelInfo], y: usize, params: &EffectParams) {
    if params.posterize <= 0.0 && !params.dither {
        return;
    }

    let levels = if params.posterize > 0.0 {
        2.0 + params.posterize * 14.0
    } else {
        0.0
    };

    for (x, px) in row.iter_mut().enumerate() {
        if params.dither {
            let bayer = BAYER_8X8[y % 8][x % 8] as f32 / 64.0;
            let adjust = if levels > 0.0 {
                (bayer - 0.5) * (1.0 / levels) * params.dither_intensity
            } else {
                (bayer - 0.5) * params.dither_intensity * 0.2
            };
            px.r += adjust;
            px.g += adjust;
            px.b += adjust;
        }

        if levels > 0.0 {
            px.r = (px.r * levels).floor() / levels;
            px.g = (px.g * levels).floor() / levels;
            px.b = (px.b * levels).floor() / levels;
        }
    }
}

/// Stage 6: edge detection and unsharp masking over the pre-stage row.
///
/// Taps are row-local (vertical neighbors sample the same row, so the
/// gradient responds horizontally); both effects read `row` and write a
/// separate buffer, and the first/last columns pass through untouched.
fn apply_kernel_effects(row: &mut Vec<PixelInfo>, params: &EffectParams) {
    if params.edge_detect <= 0.0 && params.sharpness <= 0.0 {
        return;
    }
    let width = row.len();
    if width < 3 {
        return;
    }

    let mut out = row.clone();
    for x in 1..width - 1 {
        if params.edge_detect > 0.0 {
            let mut gx = 0.0f32;
            let mut gy = 0.0f32;
            for i in -1i32..=1 {
                for j in -1i32..=1 {
                    let sample = &row[(x as i32 + j) as usize];
                    let lum = (sample.r + sample.g + sample.b) / 3.0;
                    gx += lum * j as f32;
                    gy += lum * i as f32;
                }
            }
            let edge = (gx * gx + gy * gy).sqrt() * params.edge_detect;
            out[x].r = edge;
            out[x].g = edge;
            out[x].b = edge;
        }

        if params.sharpness > 0.0 {
            let mut blur_r = 0.0f32;
            let mut blur_g = 0.0f32;
            let mut blur_b = 0.0f32;
            for j in -1i32..=1 {
                let sample = &row[(x as i32 + j) as usize];
                blur_r += sample.r;
                blur_g += sample.g;
                blur_b += sample.b;
            }
            blur_r /= 3.0;
            blur_g /= 3.0;
            blur_b /= 3.0;

            let center = row[x];
            out[x].r = (center.r + (center.r - blur_r) * params.sharpness).clamp(0.0, 1.0);
            out[x].g = (center.g + (center.g - blur_g) * params.sharpness).clamp(0.0, 1.0);
            out[x].b = (center.b + (center.b - blur_b) * params.sharpness).clamp(0.0, 1.0);
        }
    }
    *row = out;
}

/// Stage 7a: time-driven band slicing with circular row rotation.
fn apply_glitch_slice<R: Rng + ?Sized>(
    row: &mut [PixelInfo],
    y: usize,
    time_s: f32,
    params: &EffectParams,
    rng: &mut R,
) {
    if params.glitch_slice <= 0.0 {
        return;
    }

    let width = row.len();
    let band = (10.0 + params.glitch_slice * 40.0) as usize;
    let max_offset = (params.glitch_slice * width as f32 * 0.3) as usize;
    let time_slice = (time_s * 10.0) as usize % band;

    if (y + time_slice) / band % 2 != 0 {
        return;
    }

    let offset = (rng.r#gen::<f32>() * max_offset as f32) as usize;
    let shifted = row.to_vec();
    for (x, px) in row.iter_mut().enumerate() {
        *px = shifted[(x + offset) % width];
        px.r *= 1.0 + 0.2 * params.glitch_slice;
        px.b *= 1.0 - 0.1 * params.glitch_slice;
    }
}

/// Stage 7b: per-block artifacts. Each block independently triggers and
/// then applies exactly one of smear, displace, or color-shift.
fn apply_glitch_artifacts<R: Rng + ?Sized>(
    row: &mut [PixelInfo],
    params: &EffectParams,
    rng: &mut R,
) {
    if params.glitch_artifacts <= 0.0 {
        return;
    }

    let width = row.len();
    let original = row.to_vec();
    let probability = 0.05 * params.glitch_artifacts;
    let block = 1 + (params.glitch_block_size * 31.0) as usize;

    let mut x = 0;
    while x < width {
        if rng.r#gen::<f32>() < probability {
            let span = block.min(width - x);
            if params.glitch_displacement > 0.0 && rng.r#gen::<f32>() < 0.5 {
                if params.glitch_displacement > 0.5 {
                    let smear = original[x];
                    for px in &mut row[x..x + span] {
                        *px = smear;
                    }
                } else {
                    let amount = params.glitch_displacement * 2.0;
                    let max_displacement = width as f32 * 0.3 * amount;
                    let offset = ((rng.r#gen::<f32>() * 2.0 - 1.0) * max_displacement) as isize;
                    for bx in 0..span {
                        let source_x =
                            ((x + bx) as isize + offset).rem_euclid(width as isize) as usize;
                        row[x + bx] = original[source_x];
                    }
                }
            } else {
                let shift_amount = params.glitch_artifacts * 0.5;
                let r_shift = (rng.r#gen::<f32>() * 2.0 - 1.0) * shift_amount;
                let g_shift = (rng.r#gen::<f32>() * 2.0 - 1.0) * shift_amount;
                let b_shift = (rng.r#gen::<f32>() * 2.0 - 1.0) * shift_amount;
                for bx in 0..span {
                    row[x + bx].r = (original[x + bx].r + r_shift).clamp(0.0, 1.0);
                    row[x + bx].g = (original[x + bx].g + g_shift).clamp(0.0, 1.0);
                    row[x + bx].b = (original[x + bx].b + b_shift).clamp(0.0, 1.0);
                }
            }
        }
        x += block;
    }
}

/// Stage 8: byte-level corruption: bit crush, packed-word shifting, and
/// brightness-run sorting.
fn apply_data_mosh<R: Rng + ?Sized>(row: &mut [PixelInfo], params: &EffectParams, rng: &mut R) {
    let width = row.len();

    if params.bit_crush > 0.0 {
        let bits = 8 - (params.bit_crush * 7.0) as u32;
        if bits < 8 {
            let mask = 0xFFu32 << (8 - bits);
            for px in row.iter_mut() {
                px.r = (((px.r * 255.0).max(0.0) as u32) & mask) as f32 / 255.0;
                px.g = (((px.g * 255.0).max(0.0) as u32) & mask) as f32 / 255.0;
                px.b = (((px.b * 255.0).max(0.0) as u32) & mask) as f32 / 255.0;
            }
        }
    }

    if params.data_shift > 0.0 {
        const BLOCK: usize = 32;
        let shift = (params.data_shift * 7.0) as u32;
        let mut x = 0;
        while x < width {
            if rng.r#gen::<f32>() < params.data_shift * 0.1 {
                for px in &mut row[x..(x + BLOCK).min(width)] {
                    let r = (px.r * 255.0).max(0.0) as u32;
                    let g = (px.g * 255.0).max(0.0) as u32;
                    let b = (px.b * 255.0).max(0.0) as u32;
                    // Bits shifted past the packed word are dropped, not
                    // wrapped; channels bleed into their neighbors.
                    let packed = ((r << 16) | (g << 8) | b) << shift;
                    px.r = ((packed >> 16) & 0xFF) as f32 / 255.0;
                    px.g = ((packed >> 8) & 0xFF) as f32 / 255.0;
                    px.b = (packed & 0xFF) as f32 / 255.0;
                }
            }
            x += BLOCK;
        }
    }

    if params.pixel_sort > 0.0 {
        let threshold = params.pixel_sort;
        let mut start: Option<usize> = None;
        for x in 0..width {
            let brightness = sum_rgb(&row[x]) / 3.0;
            if start.is_none() && brightness > threshold {
                start = Some(x);
            }
            if let Some(s) = start
                && (brightness < threshold || x == width - 1)
            {
                row[s..x].sort_by(|a, b| sum_rgb(a).total_cmp(&sum_rgb(b)));
                start = None;
            }
        }
    }
}

/// Stage 9: interlace dimming, uniform noise, and color inversion.
fn apply_post_processing<R: Rng + ?Sized>(
    row: &mut [PixelInfo],
    y: usize,
    time_s: f32,
    params: &EffectParams,
    rng: &mut R,
) {
    if params.interlace {
        let line_offset = (time_s * 60.0) as usize % 2;
        if (y + line_offset) % 2 == 0 {
            let intensity = 1.0 - params.interlace_intensity;
            for px in row.iter_mut() {
                px.r *= intensity;
                px.g *= intensity;
                px.b *= intensity;
            }
        }
    }

    if params.noise > 0.0 {
        for px in row.iter_mut() {
            let noise_r = rng.r#gen::<f32>() * 2.0 - 1.0;
            let noise_g = rng.r#gen::<f32>() * 2.0 - 1.0;
            let noise_b = rng.r#gen::<f32>() * 2.0 - 1.0;
            px.r = (px.r + noise_r * params.noise * 0.5).clamp(0.0, 1.0);
            px.g = (px.g + noise_g * params.noise * 0.5).clamp(0.0, 1.0);
            px.b = (px.b + noise_b * params.noise * 0.5).clamp(0.0, 1.0);
        }
    }

    if params.invert {
        for px in row.iter_mut() {
            px.r = 1.0 - px.r;
            px.g = 1.0 - px.g;
            px.b = 1.0 - px.b;
        }
    }
}

fn write_row(row: &[PixelInfo], out_row: &mut [u8]) {
    for (px, chunk) in row.iter().zip(out_row.chunks_exact_mut(4)) {
        chunk[0] = (px.r * 255.0).round().clamp(0.0, 255.0) as u8;
        chunk[1] = (px.g * 255.0).round().clamp(0.0, 255.0) as u8;
        chunk[2] = (px.b * 255.0).round().clamp(0.0, 255.0) as u8;
        chunk[3] = (px.a * 255.0).round().clamp(0.0, 255.0) as u8;
    }
}

/// Run the full stage chain for one output row.
///
/// `src` is the whole source image; `out_row` receives `width * 4` bytes.
/// Stage order is fixed: geometry, pixelation, aberration, color,
/// posterize/dither, kernel, glitch, data-mosh, post-processing.
pub fn render_row<R: Rng + ?Sized>(
    src: &[u8],
    width: usize,
    height: usize,
    y: usize,
    params: &EffectParams,
    time_s: f32,
    rng: &mut R,
    out_row: &mut [u8],
) {
    let mut row = build_row(src, width, height, y, params);
    apply_pixelation(&mut row, params);
    apply_aberration(&mut row, src, width, params);
    apply_color_adjustments(&mut row, params);
    apply_posterize_dither(&mut row, y, params);
    apply_kernel_effects(&mut row, params);
    apply_glitch_slice(&mut row, y, time_s, params, rng);
    apply_glitch_artifacts(&mut row, params, rng);
    apply_data_mosh(&mut row, params, rng);
    apply_post_processing(&mut row, y, time_s, params, rng);
    write_row(&row, out_row);
}

/// Run one full pass over the image into `out`.
///
/// The image is processed in [`CHUNK_ROWS`]-row chunks; `should_cancel` is
/// polled between chunks and an interrupted pass returns `Ok(false)`
/// without touching the remaining rows. Rows inside a chunk are
/// independent and fan out across the rayon pool for images wider than
/// [`PARALLEL_MIN_WIDTH`].
pub fn run_pass(
    src: &[u8],
    width: u32,
    height: u32,
    params: &EffectParams,
    time_s: f32,
    out: &mut [u8],
    should_cancel: &dyn Fn() -> bool,
) -> MoshResult<bool> {
    let w = width as usize;
    let h = height as usize;
    let expected = w
        .checked_mul(h)
        .and_then(|v| v.checked_mul(4))
        .ok_or_else(|| MoshError::validation("pass buffer size overflow"))?;
    if src.len() != expected || out.len() != expected {
        return Err(MoshError::validation(
            "run_pass expects rgba8 buffers matching width*height*4",
        ));
    }
    if w == 0 || h == 0 {
        return Ok(true);
    }

    let stride = w * 4;
    let mut chunk_start = 0usize;
    while chunk_start < h {
        if should_cancel() {
            return Ok(false);
        }
        let chunk_end = (chunk_start + CHUNK_ROWS).min(h);
        let chunk = &mut out[chunk_start * stride..chunk_end * stride];

        if w > PARALLEL_MIN_WIDTH {
            chunk
                .par_chunks_exact_mut(stride)
                .enumerate()
                .for_each(|(i, out_row)| {
                    render_row(
                        src,
                        w,
                        h,
                        chunk_start + i,
                        params,
                        time_s,
                        &mut rand::thread_rng(),
                        out_row,
                    );
                });
        } else {
            for (i, out_row) in chunk.chunks_exact_mut(stride).enumerate() {
                render_row(
                    src,
                    w,
                    h,
                    chunk_start + i,
                    params,
                    time_s,
                    &mut rand::thread_rng(),
                    out_row,
                );
            }
        }
        chunk_start = chunk_end;
    }

    Ok(true)
}
