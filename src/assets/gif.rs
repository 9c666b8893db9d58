use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use tracing::info;

use crate::{
    error::{MoshError, MoshResult},
    frame::{DEFAULT_FRAME_DELAY_MS, SourceFrame},
};

use super::validate_dimensions;

/// A decoded GIF: one fully composited RGBA canvas snapshot per cell.
#[derive(Clone, Debug)]
pub struct DecodedAnimation {
    pub width: u32,
    pub height: u32,
    pub frames: Vec<SourceFrame>,
}

/// Decode a GIF stream and composite its cells onto a running canvas.
///
/// Cells are drawn at their sub-rectangle with transparent indices skipped
/// (the canvas beneath stays visible). After a cell is snapshotted its
/// disposal method is applied: `Background` clears the cell's rectangle to
/// transparent, `Previous` reverts the canvas to its pre-cell state, and
/// `Keep`/`Any` leave the canvas as drawn.
pub fn decode_gif(reader: impl Read) -> MoshResult<DecodedAnimation> {
    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::Indexed);
    let mut decoder = options
        .read_info(reader)
        .map_err(|e| MoshError::decode(format!("read gif header: {e}")))?;

    let width = u32::from(decoder.width());
    let height = u32::from(decoder.height());
    validate_dimensions(width, height)?;

    let global_palette = decoder.global_palette().map(<[u8]>::to_vec);
    let w = width as usize;
    let h = height as usize;

    let mut canvas = vec![0u8; w * h * 4];
    let mut frames: Vec<SourceFrame> = Vec::new();

    while let Some(frame) = decoder
        .read_next_frame()
        .map_err(|e| MoshError::decode(format!("decode gif frame: {e}")))?
    {
        let left = frame.left as usize;
        let top = frame.top as usize;
        let frame_w = frame.width as usize;
        let frame_h = frame.height as usize;

        let palette = frame
            .palette
            .as_deref()
            .or(global_palette.as_deref())
            .ok_or_else(|| MoshError::decode("gif frame has no palette"))?;

        let saved = if frame.dispose == gif::DisposalMethod::Previous {
            Some(canvas.clone())
        } else {
            None
        };

        for fy in 0..frame_h {
            for fx in 0..frame_w {
                let cx = left + fx;
                let cy = top + fy;
                if cx >= w || cy >= h {
                    continue;
                }
                let color_index = frame.buffer[fy * frame_w + fx];
                if Some(color_index) == frame.transparent {
                    continue;
                }
                let p = color_index as usize * 3;
                if p + 2 >= palette.len() {
                    continue;
                }
                let dst = (cy * w + cx) * 4;
                canvas[dst] = palette[p];
                canvas[dst + 1] = palette[p + 1];
                canvas[dst + 2] = palette[p + 2];
                canvas[dst + 3] = 255;
            }
        }

        // GIF delays are centiseconds; zero means "unspecified".
        let delay_ms = u32::from(frame.delay) * 10;
        frames.push(SourceFrame {
            pixels: canvas.clone(),
            delay_ms: if delay_ms == 0 {
                DEFAULT_FRAME_DELAY_MS
            } else {
                delay_ms
            },
        });

        match frame.dispose {
            gif::DisposalMethod::Background => {
                for fy in 0..frame_h {
                    for fx in 0..frame_w {
                        let cx = left + fx;
                        let cy = top + fy;
                        if cx >= w || cy >= h {
                            continue;
                        }
                        let dst = (cy * w + cx) * 4;
                        canvas[dst..dst + 4].fill(0);
                    }
                }
            }
            gif::DisposalMethod::Previous => {
                if let Some(prev) = saved {
                    canvas = prev;
                }
            }
            gif::DisposalMethod::Keep | gif::DisposalMethod::Any => {}
        }
    }

    if frames.is_empty() {
        return Err(MoshError::decode("gif contains no frames"));
    }

    Ok(DecodedAnimation {
        width,
        height,
        frames,
    })
}

/// Decode a GIF from a filesystem path.
pub fn load_gif(path: &Path) -> MoshResult<DecodedAnimation> {
    let file = File::open(path)
        .map_err(|e| MoshError::decode(format!("open gif '{}': {e}", path.display())))?;
    let decoded = decode_gif(BufReader::new(file))?;
    info!(
        path = %path.display(),
        width = decoded.width,
        height = decoded.height,
        frames = decoded.frames.len(),
        "gif loaded"
    );
    Ok(decoded)
}
