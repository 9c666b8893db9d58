use rand::Rng;

use crate::frame::FrameStore;

/// How the animation driver walks the frame sequence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PlaybackMode {
    /// Advance and wrap back to frame 0 past the end.
    #[default]
    Forward,
    /// Bounce between the first and last frame.
    PingPong,
    /// Jump to a uniformly random frame on every advance.
    Random,
}

/// Discrete playback speed multipliers offered by the control surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PlaybackSpeed {
    Quarter,
    Half,
    #[default]
    Normal,
    OneAndHalf,
    Double,
    Quadruple,
}

impl PlaybackSpeed {
    pub const ALL: [PlaybackSpeed; 6] = [
        PlaybackSpeed::Quarter,
        PlaybackSpeed::Half,
        PlaybackSpeed::Normal,
        PlaybackSpeed::OneAndHalf,
        PlaybackSpeed::Double,
        PlaybackSpeed::Quadruple,
    ];

    pub fn factor(self) -> f32 {
        match self {
            PlaybackSpeed::Quarter => 0.25,
            PlaybackSpeed::Half => 0.5,
            PlaybackSpeed::Normal => 1.0,
            PlaybackSpeed::OneAndHalf => 1.5,
            PlaybackSpeed::Double => 2.0,
            PlaybackSpeed::Quadruple => 4.0,
        }
    }
}

/// Advances the selected frame of a [`FrameStore`] over time.
///
/// The accumulator carries sub-frame remainders across advances: when the
/// current frame's delay is exceeded, the delay is subtracted rather than
/// the accumulator being zeroed.
#[derive(Clone, Debug, Default)]
pub struct AnimationDriver {
    accumulator_ms: f32,
    reverse: bool,
}

impl AnimationDriver {
    pub fn reset(&mut self) {
        self.accumulator_ms = 0.0;
        self.reverse = false;
    }

    /// Accumulate `elapsed_ms * speed` and advance at most one frame.
    ///
    /// Returns `true` when the selected frame changed.
    pub fn tick<R: Rng + ?Sized>(
        &mut self,
        store: &mut FrameStore,
        elapsed_ms: f32,
        speed: PlaybackSpeed,
        mode: PlaybackMode,
        rng: &mut R,
    ) -> bool {
        if !store.is_animated() {
            return false;
        }

        self.accumulator_ms += elapsed_ms * speed.factor();
        let frame_ms = store
            .current_frame()
            .map(|f| f.delay_ms as f32)
            .unwrap_or_default();
        if self.accumulator_ms < frame_ms {
            return false;
        }
        self.accumulator_ms -= frame_ms;

        let len = store.frame_count();
        let current = store.current_index();
        let next = match mode {
            PlaybackMode::Forward => (current + 1) % len,
            PlaybackMode::PingPong => {
                if !self.reverse {
                    let next = current + 1;
                    if next >= len - 1 {
                        self.reverse = true;
                        len - 1
                    } else {
                        next
                    }
                } else if current <= 1 {
                    self.reverse = false;
                    0
                } else {
                    current - 1
                }
            }
            PlaybackMode::Random => rng.gen_range(0..len),
        };

        store.select(next);
        next != current
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use crate::frame::SourceFrame;

    use super::*;

    fn store(delays: &[u32]) -> FrameStore {
        let frames = delays
            .iter()
            .map(|&delay_ms| SourceFrame {
                pixels: vec![0u8; 4],
                delay_ms,
            })
            .collect();
        FrameStore::from_frames(1, 1, frames)
    }

    #[test]
    fn forward_advances_once_after_150ms_and_keeps_remainder() {
        let mut store = store(&[100, 200]);
        let mut driver = AnimationDriver::default();
        let mut rng = StdRng::seed_from_u64(0);

        let changed = driver.tick(
            &mut store,
            150.0,
            PlaybackSpeed::Normal,
            PlaybackMode::Forward,
            &mut rng,
        );
        assert!(changed);
        assert_eq!(store.current_index(), 1);
        assert_eq!(driver.accumulator_ms, 50.0);

        // 50ms carried over; frame 1 holds for 200ms, so 100ms more is not enough.
        let changed = driver.tick(
            &mut store,
            100.0,
            PlaybackSpeed::Normal,
            PlaybackMode::Forward,
            &mut rng,
        );
        assert!(!changed);
        assert_eq!(store.current_index(), 1);
    }

    #[test]
    fn forward_wraps_past_last_frame() {
        let mut store = store(&[100, 100, 100]);
        let mut driver = AnimationDriver::default();
        let mut rng = StdRng::seed_from_u64(0);

        for expected in [1, 2, 0, 1] {
            driver.tick(
                &mut store,
                100.0,
                PlaybackSpeed::Normal,
                PlaybackMode::Forward,
                &mut rng,
            );
            assert_eq!(store.current_index(), expected);
        }
    }

    #[test]
    fn ping_pong_reverses_at_both_ends_without_skipping() {
        let mut store = store(&[100, 100, 100]);
        let mut driver = AnimationDriver::default();
        let mut rng = StdRng::seed_from_u64(0);

        let mut visited = Vec::new();
        for _ in 0..6 {
            driver.tick(
                &mut store,
                100.0,
                PlaybackSpeed::Normal,
                PlaybackMode::PingPong,
                &mut rng,
            );
            visited.push(store.current_index());
        }
        assert_eq!(visited, vec![1, 2, 1, 0, 1, 2]);
    }

    #[test]
    fn ping_pong_two_frames_alternates() {
        let mut store = store(&[100, 100]);
        let mut driver = AnimationDriver::default();
        let mut rng = StdRng::seed_from_u64(0);

        let mut visited = Vec::new();
        for _ in 0..4 {
            driver.tick(
                &mut store,
                100.0,
                PlaybackSpeed::Normal,
                PlaybackMode::PingPong,
                &mut rng,
            );
            visited.push(store.current_index());
        }
        assert_eq!(visited, vec![1, 0, 1, 0]);
    }

    #[test]
    fn random_mode_selects_in_range() {
        let mut store = store(&[100, 100, 100, 100]);
        let mut driver = AnimationDriver::default();
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..50 {
            driver.tick(
                &mut store,
                100.0,
                PlaybackSpeed::Normal,
                PlaybackMode::Random,
                &mut rng,
            );
            assert!(store.current_index() < 4);
        }
    }

    #[test]
    fn speed_scales_accumulation() {
        let mut store = store(&[100, 100]);
        let mut driver = AnimationDriver::default();
        let mut rng = StdRng::seed_from_u64(0);

        // 50ms at 4x counts as 200ms: one advance (at most one per tick).
        let changed = driver.tick(
            &mut store,
            50.0,
            PlaybackSpeed::Quadruple,
            PlaybackMode::Forward,
            &mut rng,
        );
        assert!(changed);
        assert_eq!(store.current_index(), 1);

        // At 0.25x the same elapsed time never reaches the frame delay.
        driver.reset();
        let changed = driver.tick(
            &mut store,
            50.0,
            PlaybackSpeed::Quarter,
            PlaybackMode::Forward,
            &mut rng,
        );
        assert!(!changed);
    }

    #[test]
    fn still_store_never_advances() {
        let mut store = store(&[100]);
        let mut driver = AnimationDriver::default();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(!driver.tick(
            &mut store,
            10_000.0,
            PlaybackSpeed::Normal,
            PlaybackMode::Forward,
            &mut rng,
        ));
        assert_eq!(store.current_index(), 0);
    }
}
