/// Converts host ticks into whole-frame advances.
///
/// Each tick adds `source_rate / tick_rate` to a fractional accumulator and
/// reports how many whole frames it crossed, keeping the remainder. Over `N`
/// ticks the total advance stays within one frame of `N * source / tick`.
#[derive(Debug, Clone, Default)]
pub struct PlaybackClock {
    partial_frame: f64,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate one tick. Returns the number of frames to advance.
    /// Both rates must be non-zero; callers validate.
    pub fn tick(&mut self, source_rate: u32, tick_rate: u32) -> u32 {
        debug_assert!(source_rate > 0 && tick_rate > 0);
        self.partial_frame += source_rate as f64 / tick_rate as f64;
        let whole = self.partial_frame.floor();
        self.partial_frame -= whole;
        whole as u32
    }

    /// Remainder in [0, 1).
    pub fn partial_frame(&self) -> f64 {
        self.partial_frame
    }

    pub fn reset(&mut self) {
        self.partial_frame = 0.0;
    }
}
