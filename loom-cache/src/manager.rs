use loom_ir::{CacheDescriptor, CacheDomain};

/// Logs (or, if `panic_on_recoverable_error` is set, panics on) a recoverable
/// tick/read miss. A free function, not a method, so call sites can read the
/// flag once up front and keep using it after mutably borrowing a buffer field.
fn emit_miss(panic_on_recoverable_error: bool, message: std::fmt::Arguments) {
    if panic_on_recoverable_error {
        panic!("{message}");
    }
    log::warn!(target: "loom::cache", "{message}");
}

/// Owns every cache's descriptor and buffer storage, and drives its per-tick
/// update (§4.E "Buffer allocation" and "Per-tick update"). `history_buffers` and
/// `signal_buffers` are indexed by `descriptor.history_buffer` / `.signal_buffer` —
/// opaque handles from the descriptor's point of view, real `Vec` storage here.
///
/// Failure modes never crash the caller by default: a missing descriptor or buffer
/// on tick simply returns the input value unchanged, with the miss logged. Set
/// [`Self::with_panic_on_recoverable_error`] to panic on these misses instead,
/// mirroring `RuntimeConfig::panic_on_recoverable_error` in `loom-runtime`.
#[derive(Debug, Default)]
pub struct CacheManager {
    descriptors: Vec<CacheDescriptor>,
    history_buffers: Vec<Vec<f64>>,
    signal_buffers: Vec<Vec<f64>>,
    /// Per-coordinate write cursor, one entry per visual descriptor (`vec![]` for
    /// audio descriptors, which thread their cursor through the history buffer's
    /// own extra slot instead — see [`Self::tick_audio`]). Not part of the public
    /// buffer contract named in §4.E; bookkeeping private to this manager.
    write_indices: Vec<Vec<usize>>,
    panic_on_recoverable_error: bool,
}

impl CacheManager {
    pub fn new(descriptors: Vec<CacheDescriptor>) -> Self {
        Self {
            descriptors,
            history_buffers: Vec::new(),
            signal_buffers: Vec::new(),
            write_indices: Vec::new(),
            panic_on_recoverable_error: false,
        }
    }

    /// When `panic` is true, a tick/read miss that would otherwise log a warning
    /// and pass the value through instead panics. The coordinator sets this from
    /// `RuntimeConfig::panic_on_recoverable_error` when building the manager.
    pub fn with_panic_on_recoverable_error(mut self, panic: bool) -> Self {
        self.panic_on_recoverable_error = panic;
        self
    }

    pub fn descriptors(&self) -> &[CacheDescriptor] {
        &self.descriptors
    }

    /// Allocates history and signal buffers for every descriptor. History buffers
    /// are zero-filled; signal buffers are NaN-initialized so the first tick always
    /// sees a signal change. Visual buffers are sized `width * height * historySize`
    /// (history) and `width * height` (signal); audio buffers are `historySize + 1`
    /// (history, with the extra slot storing the ring's write index) and `1`
    /// (signal). `width`/`height` are ignored for audio descriptors.
    pub fn allocate(&mut self, width: usize, height: usize) {
        self.history_buffers.clear();
        self.signal_buffers.clear();
        self.write_indices.clear();
        for descriptor in &mut self.descriptors {
            let (history_len, signal_len, cursors) = match descriptor.domain {
                CacheDomain::Visual => {
                    (width * height * descriptor.history_size, width * height, vec![0usize; width * height])
                },
                CacheDomain::Audio => (descriptor.history_size + 1, 1, Vec::new()),
            };
            descriptor.history_buffer = self.history_buffers.len();
            descriptor.signal_buffer = self.signal_buffers.len();
            self.history_buffers.push(vec![0.0; history_len]);
            self.signal_buffers.push(vec![f64::NAN; signal_len]);
            self.write_indices.push(cursors);
            log::debug!(
                target: "loom::cache",
                "allocated cache {} ({:?}, {history_len} history floats, {signal_len} signal floats)",
                descriptor.id,
                descriptor.domain,
            );
        }
    }

    fn find(&self, cache_id: u32) -> Option<usize> {
        self.descriptors.iter().position(|d| d.id == cache_id)
    }

    /// Advances (or reads) an audio-domain cache by one sample and returns the value
    /// at `tap_index` behind the current write position. `readIdx = (writeIdx - 1 -
    /// tapIndex + 2*historySize) mod historySize` (§4.E).
    pub fn tick_audio(&mut self, cache_id: u32, value: f64, signal: f64) -> f64 {
        let panic_on_recoverable_error = self.panic_on_recoverable_error;
        let Some(pos) = self.find(cache_id) else {
            emit_miss(panic_on_recoverable_error, format_args!("tick_audio: no descriptor for cache {cache_id}, passing value through"));
            return value;
        };
        let (history_size, tap_index, history_idx, signal_idx) = {
            let d = &self.descriptors[pos];
            (d.history_size, d.tap_index, d.history_buffer, d.signal_buffer)
        };
        let (Some(history), Some(signal_buf)) =
            (self.history_buffers.get_mut(history_idx), self.signal_buffers.get_mut(signal_idx))
        else {
            emit_miss(panic_on_recoverable_error, format_args!("tick_audio: no buffer allocated for cache {cache_id}, passing value through"));
            return value;
        };
        if history.len() != history_size + 1 || signal_buf.is_empty() {
            emit_miss(panic_on_recoverable_error, format_args!("tick_audio: buffer size mismatch for cache {cache_id}, passing value through"));
            return value;
        }

        let prev_signal = signal_buf[0];
        let mut write_idx = history[history_size] as usize;
        if prev_signal.is_nan() || prev_signal != signal {
            signal_buf[0] = signal;
            history[write_idx] = value;
            write_idx = (write_idx + 1) % history_size;
            history[history_size] = write_idx as f64;
        }
        let read_idx = ((write_idx as i64 - 1 - tap_index as i64 + 2 * history_size as i64) % history_size as i64) as usize;
        history[read_idx]
    }

    /// As [`Self::tick_audio`], for a visual-domain cache at output coordinate
    /// `(x, y)` of a `width`-wide frame. Each coordinate keeps an independent ring.
    pub fn tick_visual(&mut self, cache_id: u32, x: usize, y: usize, width: usize, value: f64, signal: f64) -> f64 {
        let panic_on_recoverable_error = self.panic_on_recoverable_error;
        let Some(pos) = self.find(cache_id) else {
            emit_miss(panic_on_recoverable_error, format_args!("tick_visual: no descriptor for cache {cache_id}, passing value through"));
            return value;
        };
        let (history_size, tap_index, history_idx, signal_idx) = {
            let d = &self.descriptors[pos];
            (d.history_size, d.tap_index, d.history_buffer, d.signal_buffer)
        };
        let coord = y * width + x;
        let (Some(history), Some(signal_buf)) =
            (self.history_buffers.get_mut(history_idx), self.signal_buffers.get_mut(signal_idx))
        else {
            emit_miss(panic_on_recoverable_error, format_args!("tick_visual: no buffer allocated for cache {cache_id}, passing value through"));
            return value;
        };
        let Some(cursors) = self.write_indices.get_mut(pos) else {
            emit_miss(panic_on_recoverable_error, format_args!("tick_visual: no write-cursor table for cache {cache_id}, passing value through"));
            return value;
        };
        if signal_buf.len() <= coord || cursors.len() <= coord {
            emit_miss(panic_on_recoverable_error, format_args!("tick_visual: coordinate {coord} out of range for cache {cache_id}, passing value through"));
            return value;
        }

        let prev_signal = signal_buf[coord];
        let mut write_idx = cursors[coord];
        if prev_signal.is_nan() || prev_signal != signal {
            signal_buf[coord] = signal;
            history[coord * history_size + write_idx] = value;
            write_idx = (write_idx + 1) % history_size;
            cursors[coord] = write_idx;
        }
        let read_idx = ((write_idx as i64 - 1 - tap_index as i64 + 2 * history_size as i64) % history_size as i64) as usize;
        history[coord * history_size + read_idx]
    }

    /// Read-only dereference of a cache's current tap value, used for `CacheRead`
    /// nodes produced by [`crate::rewrite::break_cycles`]. Does not advance the ring.
    pub fn read_audio(&self, cache_id: u32) -> f64 {
        let Some(pos) = self.find(cache_id) else { return f64::NAN };
        let d = &self.descriptors[pos];
        let Some(history) = self.history_buffers.get(d.history_buffer) else { return f64::NAN };
        if history.len() != d.history_size + 1 {
            return f64::NAN;
        }
        let write_idx = history[d.history_size] as usize;
        let read_idx =
            ((write_idx as i64 - 1 - d.tap_index as i64 + 2 * d.history_size as i64) % d.history_size as i64) as usize;
        history[read_idx]
    }

    pub fn read_visual(&self, cache_id: u32, x: usize, y: usize, width: usize) -> f64 {
        let Some(pos) = self.find(cache_id) else { return f64::NAN };
        let d = &self.descriptors[pos];
        let coord = y * width + x;
        let (Some(history), Some(cursors)) = (self.history_buffers.get(d.history_buffer), self.write_indices.get(pos))
        else {
            return f64::NAN;
        };
        let Some(&write_idx) = cursors.get(coord) else { return f64::NAN };
        let read_idx =
            ((write_idx as i64 - 1 - d.tap_index as i64 + 2 * d.history_size as i64) % d.history_size as i64) as usize;
        history.get(coord * d.history_size + read_idx).copied().unwrap_or(f64::NAN)
    }
}
