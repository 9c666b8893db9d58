use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::{
    anim::{AnimationDriver, PlaybackMode, PlaybackSpeed},
    assets,
    error::MoshResult,
    frame::FrameStore,
    params::EffectParams,
    worker::{OutputView, Processor},
};

/// Persisted control-surface state: playback configuration plus the last
/// loaded source path.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Settings {
    pub playback_speed: PlaybackSpeed,
    pub playback_mode: PlaybackMode,
    pub source_path: Option<PathBuf>,
}

impl Settings {
    pub fn to_json(&self) -> MoshResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| crate::MoshError::validation(format!("serialize settings: {e}")))
    }

    pub fn from_json(json: &str) -> MoshResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| crate::MoshError::validation(format!("parse settings: {e}")))
    }
}

/// Composition root: owns the frame store, the animation driver, and the
/// processing worker, and exposes the control surface the host binds to.
///
/// The control methods never block on the worker; they store state and
/// signal. Lifecycle is explicit: [`start`], [`stop`], [`reset`].
///
/// [`start`]: GlitchSession::start
/// [`stop`]: GlitchSession::stop
/// [`reset`]: GlitchSession::reset
pub struct GlitchSession {
    processor: Processor,
    store: FrameStore,
    driver: AnimationDriver,
    params: EffectParams,
    clock_s: f32,
    playback_speed: PlaybackSpeed,
    playback_mode: PlaybackMode,
    source_path: Option<PathBuf>,
    pending_path: Option<PathBuf>,
    render_target_attached: bool,
}

impl GlitchSession {
    pub fn new() -> Self {
        Self {
            processor: Processor::new(),
            store: FrameStore::default(),
            driver: AnimationDriver::default(),
            params: EffectParams::default(),
            clock_s: 0.0,
            playback_speed: PlaybackSpeed::default(),
            playback_mode: PlaybackMode::default(),
            source_path: None,
            pending_path: None,
            render_target_attached: false,
        }
    }

    /// Start the processing worker. Idempotent.
    pub fn start(&mut self) {
        self.processor.start();
    }

    /// Stop the processing worker; an in-flight pass is abandoned at the
    /// next chunk boundary.
    pub fn stop(&mut self) {
        self.processor.stop();
    }

    /// Clear all source state and restore default parameters. The worker
    /// is restarted if it was running.
    pub fn reset(&mut self) {
        let was_running = self.processor.is_running();
        self.processor.stop();
        self.processor.clear_source();
        self.store.clear();
        self.driver.reset();
        self.params = EffectParams::default();
        self.clock_s = 0.0;
        self.source_path = None;
        self.pending_path = None;
        if was_running {
            self.processor.start();
        }
    }

    /// Submit a new parameter snapshot. Values are clamped to their
    /// documented ranges; a pass is requested only when the clamped
    /// snapshot differs from the previous one.
    pub fn set_params(&mut self, raw: EffectParams) {
        let next = raw.clamped();
        if next != self.params {
            self.params = next;
            self.processor.submit(next, self.clock_s);
        }
    }

    pub fn params(&self) -> EffectParams {
        self.params
    }

    /// Restore every control to its default value.
    pub fn reset_params(&mut self) {
        self.set_params(EffectParams::default());
    }

    /// Randomize every numeric control over its full range.
    pub fn randomize_params(&mut self) {
        let randomized = self.params.randomized(&mut rand::thread_rng());
        self.set_params(randomized);
    }

    pub fn set_playback_speed(&mut self, speed: PlaybackSpeed) {
        self.playback_speed = speed;
    }

    pub fn playback_speed(&self) -> PlaybackSpeed {
        self.playback_speed
    }

    pub fn set_playback_mode(&mut self, mode: PlaybackMode) {
        self.playback_mode = mode;
    }

    pub fn playback_mode(&self) -> PlaybackMode {
        self.playback_mode
    }

    /// Advance the session clock and the animation by `dt_s` seconds.
    ///
    /// A frame advance feeds the newly selected frame to the worker and
    /// requests a pass with the current snapshot.
    pub fn tick(&mut self, dt_s: f32) {
        self.clock_s += dt_s;
        if self.clock_s > 1000.0 {
            self.clock_s = 0.0;
        }

        if !self.store.is_animated() {
            return;
        }

        let advanced = self.driver.tick(
            &mut self.store,
            dt_s * 1000.0,
            self.playback_speed,
            self.playback_mode,
            &mut rand::thread_rng(),
        );
        if advanced && let Some(frame) = self.store.current_frame() {
            self.processor.update_source_pixels(&frame.pixels);
            self.processor.submit(self.params, self.clock_s);
        }
    }

    /// Mark the render target as available and replay a pending deferred
    /// load, if any, exactly once. A failed replay is logged and dropped.
    pub fn attach_render_target(&mut self) {
        self.render_target_attached = true;
        if let Some(path) = self.pending_path.take()
            && let Err(err) = self.load_path(&path)
        {
            warn!(error = %err, path = %path.display(), "deferred load failed");
        }
    }

    pub fn has_pending_load(&self) -> bool {
        self.pending_path.is_some()
    }

    /// Load a source file, deferring until a render target attaches.
    ///
    /// Returns `Ok(true)` when the file was loaded now, `Ok(false)` when
    /// the request was recorded for later. Decode failures leave the prior
    /// source intact.
    #[tracing::instrument(skip(self))]
    pub fn request_load(&mut self, path: &Path) -> MoshResult<bool> {
        if !self.render_target_attached {
            info!(path = %path.display(), "no render target yet, deferring load");
            self.pending_path = Some(path.to_path_buf());
            return Ok(false);
        }
        self.load_path(path)?;
        Ok(true)
    }

    fn load_path(&mut self, path: &Path) -> MoshResult<()> {
        let is_gif = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("gif"));
        if is_gif {
            self.load_gif(path)
        } else {
            self.load_image(path)
        }
    }

    /// Load a still image, replacing the frame store with a single frame.
    pub fn load_image(&mut self, path: &Path) -> MoshResult<()> {
        let decoded = assets::load_image(path).inspect_err(
            |err| warn!(error = %err, path = %path.display(), "image load failed"),
        )?;

        self.store = FrameStore::from_still(decoded.width, decoded.height, decoded.pixels.clone());
        self.driver.reset();
        self.processor
            .set_source(decoded.width, decoded.height, decoded.pixels);
        self.processor.submit(self.params, self.clock_s);
        self.source_path = Some(path.to_path_buf());
        Ok(())
    }

    /// Load a GIF animation, replacing the frame store wholesale.
    pub fn load_gif(&mut self, path: &Path) -> MoshResult<()> {
        let decoded = assets::gif::load_gif(path).inspect_err(
            |err| warn!(error = %err, path = %path.display(), "gif load failed"),
        )?;

        let first = decoded.frames[0].pixels.clone();
        self.store = FrameStore::from_frames(decoded.width, decoded.height, decoded.frames);
        self.driver.reset();
        self.processor
            .set_source(decoded.width, decoded.height, first);
        self.processor.submit(self.params, self.clock_s);
        self.source_path = Some(path.to_path_buf());
        Ok(())
    }

    pub fn is_animated(&self) -> bool {
        self.store.is_animated()
    }

    pub fn frame_count(&self) -> usize {
        self.store.frame_count()
    }

    pub fn current_frame_index(&self) -> usize {
        self.store.current_index()
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// Borrow the latest published frame under a short-lived lock.
    pub fn with_output<T>(&self, f: impl FnOnce(OutputView<'_>) -> T) -> T {
        self.processor.with_output(f)
    }

    /// Copy out the latest frame if one was published since the last take.
    pub fn take_dirty_frame(&self) -> Option<(u32, u32, Vec<u8>)> {
        self.processor.take_dirty_frame()
    }

    /// Snapshot the persisted state.
    pub fn settings(&self) -> Settings {
        Settings {
            playback_speed: self.playback_speed,
            playback_mode: self.playback_mode,
            source_path: self
                .source_path
                .clone()
                .or_else(|| self.pending_path.clone()),
        }
    }

    /// Restore persisted state. The source path is loaded immediately when
    /// a render target is attached and deferred otherwise.
    pub fn apply_settings(&mut self, settings: Settings) -> MoshResult<()> {
        self.playback_speed = settings.playback_speed;
        self.playback_mode = settings.playback_mode;
        if let Some(path) = settings.source_path {
            self.request_load(&path)?;
        }
        Ok(())
    }
}

impl Default for GlitchSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    use super::*;

    static TEMP_SEQ: AtomicUsize = AtomicUsize::new(0);

    fn temp_path(name: &str) -> PathBuf {
        let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("moshkit_{}_{}_{}", std::process::id(), seq, name))
    }

    struct TempFile(PathBuf);

    impl Drop for TempFile {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    /// 2x2 two-frame GIF: solid red then solid green, 100ms/200ms.
    fn write_test_gif(name: &str) -> TempFile {
        let palette = [0u8, 0, 0, 255, 0, 0, 0, 255, 0];
        let mut bytes = Vec::new();
        {
            let mut encoder = gif::Encoder::new(&mut bytes, 2, 2, &palette).unwrap();
            for (color, delay) in [(1u8, 10u16), (2, 20)] {
                encoder
                    .write_frame(&gif::Frame {
                        width: 2,
                        height: 2,
                        buffer: Cow::Owned(vec![color; 4]),
                        delay,
                        ..gif::Frame::default()
                    })
                    .unwrap();
            }
        }
        let path = temp_path(name);
        std::fs::write(&path, bytes).unwrap();
        TempFile(path)
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn load_is_deferred_until_render_target_attaches() {
        let gif = write_test_gif("deferred.gif");
        let mut session = GlitchSession::new();

        let loaded = session.request_load(&gif.0).unwrap();
        assert!(!loaded);
        assert!(session.has_pending_load());
        assert_eq!(session.frame_count(), 0);

        session.attach_render_target();
        assert!(!session.has_pending_load());
        assert_eq!(session.frame_count(), 2);
        assert!(session.is_animated());
    }

    #[test]
    fn deferred_load_is_attempted_exactly_once() {
        let gif = write_test_gif("once.gif");
        let mut session = GlitchSession::new();
        session.request_load(&gif.0).unwrap();
        session.attach_render_target();
        assert_eq!(session.frame_count(), 2);

        // The pending slot is drained; removing the file and re-attaching
        // must not trigger another load (or any error).
        std::fs::remove_file(&gif.0).unwrap();
        session.attach_render_target();
        assert_eq!(session.frame_count(), 2);
    }

    #[test]
    fn failed_load_keeps_prior_state() {
        let gif = write_test_gif("prior.gif");
        let mut session = GlitchSession::new();
        session.attach_render_target();
        session.request_load(&gif.0).unwrap();
        assert_eq!(session.frame_count(), 2);

        let missing = temp_path("missing.gif");
        assert!(session.request_load(&missing).is_err());
        assert_eq!(session.frame_count(), 2);
        assert_eq!(session.source_path(), Some(gif.0.as_path()));
    }

    #[test]
    fn set_params_clamps_and_stores() {
        let mut session = GlitchSession::new();
        session.set_params(EffectParams {
            brightness: 9.0,
            ..EffectParams::default()
        });
        assert_eq!(session.params().brightness, 2.0);
    }

    #[test]
    fn tick_advances_animation_and_republishes() {
        let gif = write_test_gif("tick.gif");
        let mut session = GlitchSession::new();
        session.start();
        session.attach_render_target();
        session.request_load(&gif.0).unwrap();
        assert_eq!(session.current_frame_index(), 0);

        // 150ms at 1x crosses the first frame's 100ms delay exactly once.
        session.tick(0.15);
        assert_eq!(session.current_frame_index(), 1);

        // The processed output catches up to the green frame.
        assert!(wait_until(|| session.with_output(|view| {
            view.dirty && view.pixels.chunks_exact(4).all(|px| px[1] == 255)
        })));
        session.stop();
    }

    #[test]
    fn reset_clears_source_and_parameters() {
        let gif = write_test_gif("reset.gif");
        let mut session = GlitchSession::new();
        session.start();
        session.attach_render_target();
        session.request_load(&gif.0).unwrap();
        session.set_params(EffectParams {
            noise: 0.5,
            ..EffectParams::default()
        });

        session.reset();
        assert_eq!(session.frame_count(), 0);
        assert_eq!(session.source_path(), None);
        assert_eq!(session.params(), EffectParams::default());
        session.stop();
    }

    #[test]
    fn settings_roundtrip_through_json() {
        let settings = Settings {
            playback_speed: PlaybackSpeed::Double,
            playback_mode: PlaybackMode::PingPong,
            source_path: Some(PathBuf::from("/tmp/example.gif")),
        };
        let json = settings.to_json().unwrap();
        assert_eq!(Settings::from_json(&json).unwrap(), settings);
    }

    #[test]
    fn apply_settings_defers_source_until_attach() {
        let gif = write_test_gif("restore.gif");
        let mut session = GlitchSession::new();
        session
            .apply_settings(Settings {
                playback_speed: PlaybackSpeed::Half,
                playback_mode: PlaybackMode::Random,
                source_path: Some(gif.0.clone()),
            })
            .unwrap();

        assert_eq!(session.playback_speed(), PlaybackSpeed::Half);
        assert_eq!(session.playback_mode(), PlaybackMode::Random);
        assert!(session.has_pending_load());

        session.attach_render_target();
        assert_eq!(session.frame_count(), 2);
        // Settings now report the resolved source path.
        assert_eq!(session.settings().source_path, Some(gif.0.clone()));
    }
}
