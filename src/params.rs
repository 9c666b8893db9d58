use rand::Rng;

/// Immutable snapshot of every effect control, taken once per control tick.
///
/// Numeric fields are clamped to their documented range by [`clamped`]
/// before the snapshot is handed to the worker; the worker only re-renders
/// when a snapshot differs structurally from the previous one, so
/// [`PartialEq`] equality is the "no work to do" test.
///
/// [`clamped`]: EffectParams::clamped
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EffectParams {
    /// Additive brightness, `0..=2`, neutral at 1.
    pub brightness: f32,
    /// Contrast scale around the midpoint, `0..=2`, neutral at 1.
    pub contrast: f32,
    /// Saturation multiplier, `0..=2`, neutral at 1.
    pub saturation: f32,
    /// Hue rotation as a fraction of a full turn, `0..=1`.
    pub hue_shift: f32,
    /// Unsharp-mask strength, `0..=5`.
    pub sharpness: f32,
    /// Block-averaging strength, `0..=1`; block size is `pixelation * 40`.
    pub pixelation: f32,
    /// Edge-detection magnitude scale, `0..=1`.
    pub edge_detect: f32,
    /// Red-channel shift/blend factor, `0..=1`.
    pub rgb_aberration: f32,
    /// Uniform per-channel noise amount, `0..=1`.
    pub noise: f32,
    /// Sliced-band corruption amount, `0..=1`.
    pub glitch_slice: f32,
    /// Color quantization amount, `0..=1`; levels are `2 + posterize * 14`.
    pub posterize: f32,
    /// Ordered-dither strength, `0..=1`.
    pub dither_intensity: f32,
    /// Scanline dimming strength, `0..=1`.
    pub interlace_intensity: f32,
    /// Block-artifact trigger intensity, `0..=2`.
    pub glitch_artifacts: f32,
    /// Artifact block size control, `0..=5`; block width is `1 + size * 31`.
    pub glitch_block_size: f32,
    /// Artifact displacement control, `0..=1`; above 0.5 smears instead.
    pub glitch_displacement: f32,
    /// Bit-depth reduction, `0..=1`; keeps `8 - bit_crush * 7` bits.
    pub bit_crush: f32,
    /// Packed-word shift corruption, `0..=1`.
    pub data_shift: f32,
    /// Brightness threshold for run sorting, `0..=1`.
    pub pixel_sort: f32,

    pub mirror: bool,
    pub flip: bool,
    pub half_mirror: bool,
    pub half_mirror_vertical: bool,
    pub invert: bool,
    pub dither: bool,
    pub interlace: bool,
}

impl Default for EffectParams {
    fn default() -> Self {
        Self {
            brightness: 1.0,
            contrast: 1.0,
            saturation: 1.0,
            hue_shift: 0.0,
            sharpness: 0.0,
            pixelation: 0.0,
            edge_detect: 0.0,
            rgb_aberration: 0.0,
            noise: 0.0,
            glitch_slice: 0.0,
            posterize: 0.0,
            dither_intensity: 0.2,
            interlace_intensity: 0.5,
            glitch_artifacts: 0.0,
            glitch_block_size: 0.0,
            glitch_displacement: 0.0,
            bit_crush: 0.0,
            data_shift: 0.0,
            pixel_sort: 0.0,
            mirror: false,
            flip: false,
            half_mirror: false,
            half_mirror_vertical: false,
            invert: false,
            dither: false,
            interlace: false,
        }
    }
}

impl EffectParams {
    /// Clamp every numeric field into its documented range.
    pub fn clamped(mut self) -> Self {
        self.brightness = self.brightness.clamp(0.0, 2.0);
        self.contrast = self.contrast.clamp(0.0, 2.0);
        self.saturation = self.saturation.clamp(0.0, 2.0);
        self.hue_shift = self.hue_shift.clamp(0.0, 1.0);
        self.sharpness = self.sharpness.clamp(0.0, 5.0);
        self.pixelation = self.pixelation.clamp(0.0, 1.0);
        self.edge_detect = self.edge_detect.clamp(0.0, 1.0);
        self.rgb_aberration = self.rgb_aberration.clamp(0.0, 1.0);
        self.noise = self.noise.clamp(0.0, 1.0);
        self.glitch_slice = self.glitch_slice.clamp(0.0, 1.0);
        self.posterize = self.posterize.clamp(0.0, 1.0);
        self.dither_intensity = self.dither_intensity.clamp(0.0, 1.0);
        self.interlace_intensity = self.interlace_intensity.clamp(0.0, 1.0);
        self.glitch_artifacts = self.glitch_artifacts.clamp(0.0, 2.0);
        self.glitch_block_size = self.glitch_block_size.clamp(0.0, 5.0);
        self.glitch_displacement = self.glitch_displacement.clamp(0.0, 1.0);
        self.bit_crush = self.bit_crush.clamp(0.0, 1.0);
        self.data_shift = self.data_shift.clamp(0.0, 1.0);
        self.pixel_sort = self.pixel_sort.clamp(0.0, 1.0);
        self
    }

    /// Draw every numeric field uniformly over its full range.
    ///
    /// Boolean toggles are left untouched; they are discrete host inputs,
    /// not continuous controls.
    pub fn randomized<R: Rng + ?Sized>(self, rng: &mut R) -> Self {
        Self {
            brightness: rng.r#gen::<f32>() * 2.0,
            contrast: rng.r#gen::<f32>() * 2.0,
            saturation: rng.r#gen::<f32>() * 2.0,
            hue_shift: rng.r#gen::<f32>(),
            sharpness: rng.r#gen::<f32>() * 5.0,
            pixelation: rng.r#gen::<f32>(),
            edge_detect: rng.r#gen::<f32>(),
            rgb_aberration: rng.r#gen::<f32>(),
            noise: rng.r#gen::<f32>(),
            glitch_slice: rng.r#gen::<f32>(),
            posterize: rng.r#gen::<f32>(),
            dither_intensity: rng.r#gen::<f32>(),
            interlace_intensity: rng.r#gen::<f32>(),
            glitch_artifacts: rng.r#gen::<f32>() * 2.0,
            glitch_block_size: rng.r#gen::<f32>() * 5.0,
            glitch_displacement: rng.r#gen::<f32>(),
            bit_crush: rng.r#gen::<f32>(),
            data_shift: rng.r#gen::<f32>(),
            pixel_sort: rng.r#gen::<f32>(),
            ..self
        }
    }
}
