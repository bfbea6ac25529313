use std::collections::BTreeSet;

use loom_ir::StrandLocation;

/// One `(bundle, strand)` edge crossing from another backend's swatch into this
/// one, assigned a dense, deterministic `index` (§4.F "cross-domain slot map").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CrossDomainSlot {
    pub location: StrandLocation,
    pub index: usize,
}

/// A group of strands assigned to one backend (§4.F). `backend` names a registered
/// backend identifier; the spec reserves `None` for a "none"-tagged swatch of
/// strands that need no backend at all, which this partitioner's assignment rule
/// never produces (see `partition`'s doc comment) but which the type still models
/// for a future duplication strategy.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Swatch {
    pub backend: Option<String>,
    pub bundles: BTreeSet<String>,
    pub strands: BTreeSet<StrandLocation>,
    pub is_sink: bool,
    pub inputs: Vec<CrossDomainSlot>,
    /// Strands of THIS swatch that some other swatch reads cross-domain, in the
    /// same slot-index order the consuming swatch's `inputs` uses. A backend's
    /// `execute` must produce its output values in this order so the coordinator
    /// can route each one to the right buffer cell without either side needing to
    /// recompute the mapping independently.
    pub exports: Vec<CrossDomainSlot>,
}
