use std::any::Any;

use loom_ir::{CacheDescriptor, Program};
use loom_partition::Swatch;

/// Opaque handle to whatever a backend's `compile` produced — a GPU pipeline
/// object, a generated audio callback closure, anything. The coordinator never
/// looks inside it; it only hands it back to the same backend's `execute`.
pub struct CompiledUnit(Box<dyn Any + Send>);

impl CompiledUnit {
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self(Box::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }

    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.0.downcast_mut()
    }
}

/// The seam an embedding application implements to supply real codegen (§4.H
/// "ADDED Backend trait & compiled-unit seam"), mirroring how the teacher's top
/// crate is generic over host-supplied `Host`/`AdviceProvider` implementations.
/// The coordinator only ever holds instances behind `Box<dyn Backend>`.
pub trait Backend: Send + Sync {
    /// Must match the identifier this backend registered in `loom-backend`'s
    /// registry.
    fn identifier(&self) -> &str;

    /// Compiles one swatch into an executable unit. `cache_descriptors` is the
    /// full descriptor table (not just those owned by this swatch) so a backend
    /// can allocate history buffers for any cache it reads via `CacheRead`. The
    /// `Err` case is a plain message — the coordinator (the "consumer" of §7's
    /// `CompileError`) attaches the swatch index and backend identifier itself.
    fn compile(
        &self,
        swatch: &Swatch,
        program: &Program,
        cache_descriptors: &[CacheDescriptor],
    ) -> Result<CompiledUnit, String>;

    /// Runs one evaluation of `unit` at `time`. `inputs` is the cross-domain
    /// snapshot for this swatch's declared input slots, in slot-index order;
    /// `outputs` receives this swatch's own cross-domain-exported values, sized
    /// and ordered the same way.
    fn execute(&self, unit: &mut CompiledUnit, inputs: &[f64], outputs: &mut [f64], time: f64);

    /// Starts a long-running backend (an audio callback, a capture device). Most
    /// visual-style backends are driven entirely through `execute` and leave this
    /// as a no-op.
    fn start(&self, _unit: &mut CompiledUnit, _time: f64) {}

    /// Stops whatever `start` began. The coordinator's `stop` is the program's
    /// only exit path (§5 "Cancellation / timeouts").
    fn stop(&self) {}
}
