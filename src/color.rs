/// 8x8 Bayer threshold matrix for ordered dithering, values in `0..64`.
///
/// Index with `(row % 8, col % 8)` and normalize by 64 to get a threshold
/// in `[0, 1)`.
pub const BAYER_8X8: [[u8; 8]; 8] = [
    [0, 32, 8, 40, 2, 34, 10, 42],
    [48, 16, 56, 24, 50, 18, 58, 26],
    [12, 44, 4, 36, 14, 46, 6, 38],
    [60, 28, 52, 20, 62, 30, 54, 22],
    [3, 35, 11, 43, 1, 33, 9, 41],
    [51, 19, 59, 27, 49, 17, 57, 25],
    [15, 47, 7, 39, 13, 45, 5, 37],
    [63, 31, 55, 23, 61, 29, 53, 21],
];

/// Convert linear RGB to hue/saturation/value.
///
/// Hue is in degrees `[0, 360)`. Achromatic inputs (max component zero, or
/// channel delta below 1e-6) report hue 0.
pub fn rgb_to_hsv(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let v = max;

    if max == 0.0 {
        return (0.0, 0.0, v);
    }

    let s = delta / max;
    if delta < 1e-6 {
        return (0.0, s, v);
    }

    let mut h = if max == r {
        60.0 * (((g - b) / delta) % 6.0)
    } else if max == g {
        60.0 * (((b - r) / delta) + 2.0)
    } else {
        60.0 * (((r - g) / delta) + 4.0)
    };
    if h < 0.0 {
        h += 360.0;
    }

    (h, s, v)
}

/// Convert hue/saturation/value back to linear RGB.
///
/// Hue outside `[0, 360)` is wrapped. Saturation below 1e-6 collapses to
/// gray at `v`.
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (f32, f32, f32) {
    if s < 1e-6 {
        return (v, v, v);
    }

    let mut h = h % 360.0;
    if h < 0.0 {
        h += 360.0;
    }
    h /= 60.0;

    let i = h.floor();
    let f = h - i;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));

    match i as i32 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    }
}
