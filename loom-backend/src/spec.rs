use std::collections::{BTreeMap, BTreeSet};

use loom_ir::{AccessMode, CoordAxis, HardwareToken};

/// Which bundle names a backend presents as an output sink, and which built-in
/// names it treats as an input source, for the partitioner's sink-driven walk
/// (§4.F) and the coordinator's per-frame input/output wiring (§4.H).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    pub sinks: BTreeSet<String>,
    pub sources: BTreeSet<String>,
}

/// One backend type's static declaration (§4.G, §6 "Backend interface"). Built once
/// per backend implementation and handed to [`crate::register`]; the registry never
/// mutates a spec after registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSpec {
    pub identifier: String,
    pub owned_hardware: BTreeSet<HardwareToken>,
    pub owned_builtins: BTreeSet<String>,
    pub external_builtins: BTreeSet<String>,
    pub coordinate_spec: BTreeMap<CoordAxis, AccessMode>,
    pub bindings: Bindings,
}

impl BackendSpec {
    /// The access mode this backend binds `axis` to, defaulting to `Free` for any
    /// axis the spec leaves unmentioned (§3 "each backend publishes a coordinate
    /// spec: mapping coordinate name to default access mode").
    pub fn axis_mode(&self, axis: CoordAxis) -> AccessMode {
        self.coordinate_spec.get(&axis).copied().unwrap_or(AccessMode::Free)
    }
}
