use std::sync::Mutex;

use loom_ir::HardwareToken;
use once_cell::sync::OnceCell;

use crate::error::BackendError;
use crate::reference::{audio_backend_spec, visual_backend_spec};
use crate::spec::BackendSpec;

/// Read-only directory of registered backends, built once per process (§4.G).
/// Lookups are by hardware token, sink bundle name, or built-in name — the only
/// three ways the partitioner and coordinator need to resolve ownership.
#[derive(Debug)]
pub struct BackendRegistry {
    specs: Vec<BackendSpec>,
}

impl BackendRegistry {
    /// Builds a registry directly from a set of specs, bypassing the process-wide
    /// singleton. Intended for tests in this crate and downstream crates (the
    /// partitioner and coordinator) that need an isolated registry rather than the
    /// shared global one.
    pub fn new(specs: Vec<BackendSpec>) -> Self {
        Self { specs }
    }

    pub fn by_identifier(&self, identifier: &str) -> Option<&BackendSpec> {
        self.specs.iter().find(|s| s.identifier == identifier)
    }

    pub fn by_hardware(&self, token: &HardwareToken) -> Option<&BackendSpec> {
        self.specs.iter().find(|s| s.owned_hardware.contains(token))
    }

    pub fn by_sink(&self, bundle_name: &str) -> Option<&BackendSpec> {
        self.specs.iter().find(|s| s.bindings.sinks.contains(bundle_name))
    }

    pub fn by_builtin(&self, name: &str) -> Option<&BackendSpec> {
        self.specs.iter().find(|s| s.owned_builtins.contains(name))
    }

    pub fn backends(&self) -> &[BackendSpec] {
        &self.specs
    }
}

static REGISTRY: OnceCell<BackendRegistry> = OnceCell::new();
static PENDING: Mutex<Vec<BackendSpec>> = Mutex::new(Vec::new());

/// Stages an additional backend for registration (§4.G "the registry accepts
/// additional backend descriptors registered by embedding applications before the
/// first coordinator load"). Returns an error once [`registry`] has already been
/// called and the process-wide directory is frozen.
pub fn register(spec: BackendSpec) -> Result<(), BackendError> {
    if REGISTRY.get().is_some() {
        return Err(BackendError::AlreadyInitialized(spec.identifier));
    }
    let mut pending = PENDING.lock().expect("backend registration mutex poisoned");
    if pending.iter().any(|s| s.identifier == spec.identifier)
        || spec.identifier == "visual"
        || spec.identifier == "audio"
    {
        return Err(BackendError::DuplicateIdentifier(spec.identifier));
    }
    log::debug!(target: "loom::backend", "staged backend {:?} for registration", spec.identifier);
    pending.push(spec);
    Ok(())
}

/// Returns the process-wide registry, building it on first access from the two
/// reference backends plus anything staged via [`register`] beforehand.
pub fn registry() -> &'static BackendRegistry {
    REGISTRY.get_or_init(|| {
        let mut specs = vec![visual_backend_spec(), audio_backend_spec()];
        specs.extend(PENDING.lock().expect("backend registration mutex poisoned").drain(..));
        log::debug!(target: "loom::backend", "backend registry initialized with {} backend(s)", specs.len());
        BackendRegistry::new(specs)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_backends_resolve_by_hardware() {
        let reg = BackendRegistry::new(vec![visual_backend_spec(), audio_backend_spec()]);
        assert_eq!(reg.by_hardware(&HardwareToken::Camera).unwrap().identifier, "visual");
        assert_eq!(reg.by_hardware(&HardwareToken::Microphone).unwrap().identifier, "audio");
    }

    #[test]
    fn reference_backends_resolve_by_sink() {
        let reg = BackendRegistry::new(vec![visual_backend_spec(), audio_backend_spec()]);
        assert_eq!(reg.by_sink("display").unwrap().identifier, "visual");
        assert_eq!(reg.by_sink("play").unwrap().identifier, "audio");
        assert!(reg.by_sink("nonexistent").is_none());
    }

    #[test]
    fn reference_backends_resolve_by_builtin() {
        let reg = BackendRegistry::new(vec![visual_backend_spec(), audio_backend_spec()]);
        assert_eq!(reg.by_builtin("texture").unwrap().identifier, "visual");
        assert_eq!(reg.by_builtin("microphone").unwrap().identifier, "audio");
    }

    #[test]
    fn global_registry_contains_both_reference_backends() {
        let reg = registry();
        assert!(reg.by_identifier("visual").is_some());
        assert!(reg.by_identifier("audio").is_some());
    }
}
