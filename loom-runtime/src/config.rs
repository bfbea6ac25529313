/// Coordinator-wide settings (§1 "Configuration"), analogous to the teacher's
/// `ExecutionOptions`: a small, explicit struct rather than a pile of loose
/// arguments threaded through every pipeline call.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Defensive cap on swatches stepped in one frame. The partitioner's
    /// "no cycle at swatch granularity" invariant means a frame should never
    /// need more steps than there are swatches; this bounds a frame's cost if
    /// that invariant is ever violated upstream rather than hanging.
    pub max_frame_cycles: u32,
    /// If true, a recoverable runtime error — a cache tick/read miss (wired
    /// through to [`loom_cache::CacheManager::with_panic_on_recoverable_error`])
    /// or a swatch with no matching backend instance in `run_frame` — panics
    /// instead of being logged and papered over with a best-effort output (§7
    /// "the render thread logs and continues").
    pub panic_on_recoverable_error: bool,
    pub initial_width: usize,
    pub initial_height: usize,
}

impl RuntimeConfig {
    pub fn new(initial_width: usize, initial_height: usize) -> Self {
        Self { max_frame_cycles: 1024, panic_on_recoverable_error: false, initial_width, initial_height }
    }

    pub fn with_max_frame_cycles(mut self, max_frame_cycles: u32) -> Self {
        self.max_frame_cycles = max_frame_cycles;
        self
    }

    pub fn with_panic_on_recoverable_error(mut self, panic: bool) -> Self {
        self.panic_on_recoverable_error = panic;
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new(1, 1)
    }
}
