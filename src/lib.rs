//! moshkit is a CPU glitch-processing pipeline for still images and GIF
//! animations.
//!
//! A fixed, ordered chain of per-row pixel effects (geometry, color,
//! convolution, glitch, data corruption) is recomputed by a background
//! worker whenever the parameter snapshot or the active animation frame
//! changes, and published through a double-buffered output frame that a
//! render consumer polls without ever blocking on processing.
//!
//! The typical entry point is [`GlitchSession`]:
//!
//! - construct and [`GlitchSession::start`] the session
//! - load a source with [`GlitchSession::request_load`]
//! - push [`EffectParams`] snapshots and call [`GlitchSession::tick`]
//! - pull frames with [`GlitchSession::take_dirty_frame`]
#![forbid(unsafe_code)]

pub mod anim;
pub mod assets;
pub mod color;
pub mod error;
pub mod frame;
pub mod params;
pub mod pipeline;
pub mod session;
pub mod worker;

pub use anim::{AnimationDriver, PlaybackMode, PlaybackSpeed};
pub use assets::gif::{DecodedAnimation, decode_gif, load_gif};
pub use assets::{DecodedImage, MAX_DIMENSION, decode_image, load_image};
pub use error::{MoshError, MoshResult};
pub use frame::{DEFAULT_FRAME_DELAY_MS, FrameStore, SourceFrame};
pub use params::EffectParams;
pub use pipeline::{render_row, run_pass};
pub use session::{GlitchSession, Settings};
pub use worker::{OutputView, Processor};
