use std::time::{Duration, Instant};

use crate::error::Result;
use crate::frame::{DrawTransform, PixelBuffer};
use crate::sequence::{PlaybackSequence, PlaybackState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// Where a `size`-pixel frame lands once `transform` is applied,
    /// centred in the viewport.
    pub fn place(&self, size: (u32, u32), transform: DrawTransform) -> Placement {
        let width = size.0 as f32 * transform.scale_x;
        let height = size.1 as f32 * transform.scale_y;
        Placement {
            x: (self.width as f32 - width) / 2.0,
            y: (self.height as f32 - height) / 2.0,
            width,
            height,
        }
    }
}

/// Destination rectangle in viewport pixels, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Everything a render loop needs to drive one sequence. Owned by the host;
/// nothing here is process-wide.
pub struct PlayerContext {
    pub viewport: Viewport,
    pub tick_rate: u32,
    pub sequence: PlaybackSequence,
}

/// One paint's worth of state: pixels plus how to place them.
pub struct Paint<'a> {
    pub buffer: &'a PixelBuffer,
    pub transform: DrawTransform,
    pub placement: Placement,
    pub frame_number: usize,
}

impl PlayerContext {
    pub fn new(viewport: Viewport, tick_rate: u32, sequence: PlaybackSequence) -> Self {
        Self {
            viewport,
            tick_rate,
            sequence,
        }
    }

    /// Per-tick update; call once per host loop iteration.
    pub fn tick(&mut self) -> Result<u32> {
        self.sequence.tick(self.tick_rate)
    }

    /// What to draw right now. The last frame stays up after playback ends.
    pub fn paint(&self) -> Option<Paint<'_>> {
        self.sequence.current_frame().map(|frame| Paint {
            buffer: &frame.buffer,
            transform: frame.transform,
            placement: self.viewport.place(frame.buffer.dimensions(), frame.transform),
            frame_number: self.sequence.current_frame_number(),
        })
    }

    /// The host window changed size. Frames keep their scale and are
    /// re-centred; the scaler's target is fixed for the sequence.
    pub fn resize(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn is_done(&self) -> bool {
        matches!(
            self.sequence.state(),
            PlaybackState::Finished | PlaybackState::Aborted
        )
    }
}

/// Summary of a headless run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub ticks: u64,
    pub frames_shown: usize,
    pub stalls: usize,
    pub state: PlaybackState,
    pub elapsed: Duration,
}

/// Drive `ctx` at its tick rate without a window until playback ends or
/// `max_ticks` is reached. Each paint is handed to `on_paint`.
pub fn run_headless<F>(ctx: &mut PlayerContext, max_ticks: Option<u64>, mut on_paint: F) -> Result<RunReport>
where
    F: FnMut(&Paint<'_>),
{
    let period = Duration::from_secs_f64(1.0 / ctx.tick_rate.max(1) as f64);
    let start = Instant::now();
    let mut next_tick = start;
    let mut ticks = 0u64;

    while !ctx.is_done() && max_ticks.is_none_or(|max| ticks < max) {
        ctx.tick()?;
        ticks += 1;
        if let Some(paint) = ctx.paint() {
            on_paint(&paint);
        }

        next_tick += period;
        let now = Instant::now();
        if next_tick > now {
            std::thread::sleep(next_tick - now);
        } else {
            // Fell behind; don't try to catch up with a burst of ticks.
            next_tick = now;
        }
    }

    Ok(RunReport {
        ticks,
        frames_shown: ctx.sequence.current_frame_number(),
        stalls: ctx.sequence.stalls(),
        state: ctx.sequence.state(),
        elapsed: start.elapsed(),
    })
}
