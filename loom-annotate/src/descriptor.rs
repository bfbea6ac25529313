use std::collections::{BTreeMap, BTreeSet};

use loom_ir::{AccessMode, CoordAxis, HardwareToken};

/// Per-strand analysis result (§4.C): which hardware the strand requires, how it
/// constrains each coordinate axis, and whether it is pure / stateful.
///
/// [`Self::pure_leaf`] is the lattice bottom: no hardware, every axis unconstrained,
/// pure, stateless. Merging only ever grows hardware, hardens access modes, and
/// turns `stateful` on / `is_pure` off — never the reverse — which is what
/// guarantees the fixed point in [`crate::annotate`] terminates.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignalDescriptor {
    pub hardware: BTreeSet<HardwareToken>,
    pub coord_modes: BTreeMap<CoordAxis, AccessMode>,
    pub is_pure: bool,
    pub stateful: bool,
}

impl SignalDescriptor {
    /// The bottom element: pure and stateless until a builtin or a reference says
    /// otherwise.
    pub fn pure_leaf() -> Self {
        Self { is_pure: true, ..Default::default() }
    }

    /// Unions `other` into `self` in place (the lattice join).
    pub fn merge_from(&mut self, other: &SignalDescriptor) {
        self.hardware.extend(other.hardware.iter().cloned());
        self.stateful |= other.stateful;
        self.is_pure &= other.is_pure;
        for (axis, mode) in &other.coord_modes {
            self.force_mode(*axis, *mode);
        }
    }

    pub fn force_mode(&mut self, axis: CoordAxis, mode: AccessMode) {
        let entry = self.coord_modes.entry(axis).or_insert(AccessMode::Free);
        *entry = entry.merge(mode);
    }
}
