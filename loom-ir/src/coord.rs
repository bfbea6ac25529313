use serde::{Deserialize, Serialize};

// COORDINATE AXIS
// ================================================================================================

/// A named implicit axis available on the `me` bundle. Backends bind a subset of
/// these; see each backend's coordinate spec (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CoordAxis {
    X,
    Y,
    U,
    V,
    W,
    H,
    T,
    Rate,
    Duration,
    I,
    SampleRate,
}

impl CoordAxis {
    pub const ALL: [CoordAxis; 11] = [
        CoordAxis::X,
        CoordAxis::Y,
        CoordAxis::U,
        CoordAxis::V,
        CoordAxis::W,
        CoordAxis::H,
        CoordAxis::T,
        CoordAxis::Rate,
        CoordAxis::Duration,
        CoordAxis::I,
        CoordAxis::SampleRate,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CoordAxis::X => "x",
            CoordAxis::Y => "y",
            CoordAxis::U => "u",
            CoordAxis::V => "v",
            CoordAxis::W => "w",
            CoordAxis::H => "h",
            CoordAxis::T => "t",
            CoordAxis::Rate => "rate",
            CoordAxis::Duration => "duration",
            CoordAxis::I => "i",
            CoordAxis::SampleRate => "sampleRate",
        }
    }

    pub fn parse(name: &str) -> Option<CoordAxis> {
        Self::ALL.into_iter().find(|axis| axis.name() == name)
    }
}

impl std::fmt::Display for CoordAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ACCESS MODE
// ================================================================================================

/// Whether an axis parameterises each output sample independently (`Free`) or is
/// fixed for the whole evaluation (`Bound`). Merging two access modes favours
/// `Bound` (see §4.C: "bound ≻ free").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessMode {
    Free,
    Bound,
}

impl AccessMode {
    /// Lattice join: `Bound` wins.
    pub fn merge(self, other: AccessMode) -> AccessMode {
        match (self, other) {
            (AccessMode::Bound, _) | (_, AccessMode::Bound) => AccessMode::Bound,
            (AccessMode::Free, AccessMode::Free) => AccessMode::Free,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_dominates_free() {
        assert_eq!(AccessMode::Free.merge(AccessMode::Bound), AccessMode::Bound);
        assert_eq!(AccessMode::Bound.merge(AccessMode::Free), AccessMode::Bound);
        assert_eq!(AccessMode::Free.merge(AccessMode::Free), AccessMode::Free);
    }

    #[test]
    fn axis_name_roundtrip() {
        for axis in CoordAxis::ALL {
            assert_eq!(CoordAxis::parse(axis.name()), Some(axis));
        }
    }
}
