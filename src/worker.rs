use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use tracing::{debug, error};

use crate::{params::EffectParams, pipeline};

/// Latest-wins processing request. Superseded snapshots simply overwrite
/// the pending one; the worker always wakes to the most recent state.
#[derive(Clone, Debug, Default)]
struct Request {
    params: EffectParams,
    time_s: f32,
    requested: bool,
}

/// Pixel state shared with the render consumer. `output` is only replaced
/// wholesale under the lock, so readers never observe a partial frame.
#[derive(Debug, Default)]
struct Buffers {
    width: u32,
    height: u32,
    source: Vec<u8>,
    output: Vec<u8>,
    dirty: bool,
}

#[derive(Default)]
struct Shared {
    request: Mutex<Request>,
    wake: Condvar,
    buffers: Mutex<Buffers>,
    shutdown: AtomicBool,
}

/// Read-only view of the published output frame, valid for the duration of
/// a [`Processor::with_output`] call.
#[derive(Clone, Copy, Debug)]
pub struct OutputView<'a> {
    pub width: u32,
    pub height: u32,
    pub pixels: &'a [u8],
    pub dirty: bool,
}

/// Background processing worker.
///
/// Owns exactly one in-flight pass at a time: it sleeps on a condvar until
/// a pass is requested, captures the latest snapshot and a copy of the
/// source frame, runs the pipeline chunk by chunk, and publishes the
/// result under the buffer lock. The control side never blocks on a pass;
/// it only stores state and signals.
pub struct Processor {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl Processor {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Spawn the worker thread. Idempotent.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }
        self.shared.shutdown.store(false, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        match std::thread::Builder::new()
            .name("moshkit-worker".to_string())
            .spawn(move || worker_loop(&shared))
        {
            Ok(handle) => self.handle = Some(handle),
            Err(err) => error!(error = %err, "failed to spawn worker thread"),
        }
    }

    /// Signal shutdown and join the worker. An in-flight pass is abandoned
    /// at the next chunk boundary.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.shared.shutdown.store(true, Ordering::SeqCst);
        {
            // Lock pairs the store with the condvar so the wakeup is not lost.
            let _guard = lock_ignore_poison(&self.shared.request);
            self.shared.wake.notify_one();
        }
        if handle.join().is_err() {
            error!("worker thread terminated by panic");
        }
    }

    /// Replace the source image wholesale and prime the output with it.
    pub fn set_source(&self, width: u32, height: u32, pixels: Vec<u8>) {
        let mut buffers = lock_ignore_poison(&self.shared.buffers);
        buffers.width = width;
        buffers.height = height;
        buffers.output = pixels.clone();
        buffers.source = pixels;
        buffers.dirty = true;
    }

    /// Swap in new pixels for the current dimensions (animation frame
    /// advance). Ignored when the length does not match.
    pub fn update_source_pixels(&self, pixels: &[u8]) {
        let mut buffers = lock_ignore_poison(&self.shared.buffers);
        if buffers.source.len() == pixels.len() {
            buffers.source.copy_from_slice(pixels);
        }
    }

    /// Drop all pixel state.
    pub fn clear_source(&self) {
        let mut buffers = lock_ignore_poison(&self.shared.buffers);
        *buffers = Buffers::default();
    }

    /// Store the latest snapshot and wake the worker.
    pub fn submit(&self, params: EffectParams, time_s: f32) {
        {
            let mut request = lock_ignore_poison(&self.shared.request);
            request.params = params;
            request.time_s = time_s;
            request.requested = true;
        }
        self.shared.wake.notify_one();
    }

    /// Borrow the published frame under the buffer lock.
    ///
    /// The closure must copy anything it wants to keep; holding the view
    /// blocks the worker's publish step, nothing else.
    pub fn with_output<T>(&self, f: impl FnOnce(OutputView<'_>) -> T) -> T {
        let buffers = lock_ignore_poison(&self.shared.buffers);
        f(OutputView {
            width: buffers.width,
            height: buffers.height,
            pixels: &buffers.output,
            dirty: buffers.dirty,
        })
    }

    /// Copy out the published frame and clear the dirty flag, or `None`
    /// when nothing new was published since the last take.
    pub fn take_dirty_frame(&self) -> Option<(u32, u32, Vec<u8>)> {
        let mut buffers = lock_ignore_poison(&self.shared.buffers);
        if !buffers.dirty || buffers.output.is_empty() {
            return None;
        }
        buffers.dirty = false;
        Some((buffers.width, buffers.height, buffers.output.clone()))
    }
}

impl Default for Processor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Processor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let (params, time_s) = {
            let mut request = lock_ignore_poison(&shared.request);
            loop {
                if shared.shutdown.load(Ordering::SeqCst) {
                    return;
                }
                if request.requested {
                    break;
                }
                request = match shared.wake.wait(request) {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
            }
            request.requested = false;
            (request.params, request.time_s)
        };

        // Copy the source under a short lock so parameter updates and reads
        // are not blocked for the duration of the pass.
        let snapshot = {
            let buffers = lock_ignore_poison(&shared.buffers);
            if buffers.source.is_empty() {
                None
            } else {
                Some((buffers.width, buffers.height, buffers.source.clone()))
            }
        };
        let Some((width, height, source)) = snapshot else {
            continue;
        };

        let mut output = vec![0u8; source.len()];
        let should_cancel = || shared.shutdown.load(Ordering::SeqCst);
        let result = catch_unwind(AssertUnwindSafe(|| {
            pipeline::run_pass(
                &source,
                width,
                height,
                &params,
                time_s,
                &mut output,
                &should_cancel,
            )
        }));

        match result {
            Ok(Ok(true)) => {
                let mut buffers = lock_ignore_poison(&shared.buffers);
                // A reload may have swapped the source mid-pass; stale
                // output for the old dimensions is dropped, not published.
                if buffers.width == width
                    && buffers.height == height
                    && buffers.output.len() == output.len()
                {
                    buffers.output = output;
                    buffers.dirty = true;
                }
            }
            Ok(Ok(false)) => {
                debug!("pass interrupted by shutdown");
            }
            Ok(Err(err)) => {
                error!(error = %err, "pass failed; worker keeps serving");
            }
            Err(_) => {
                error!("pass panicked; worker keeps serving");
            }
        }
    }
}

fn lock_ignore_poison<'a, T>(mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
