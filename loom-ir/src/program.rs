use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::expr::ExprId;
use crate::expr::ExprPool;

// STRAND / BUNDLE
// ================================================================================================

/// A single scalar expression within a bundle, addressable by index or name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strand {
    pub name: String,
    pub index: usize,
    pub expr: ExprId,
}

/// A named ordered sequence of strands. Invariant: `strands[i].index == i` for every
/// `i` (indices are a dense, zero-based prefix); strand names are unique within the
/// bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub name: String,
    pub strands: Vec<Strand>,
}

impl Bundle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), strands: Vec::new() }
    }

    pub fn width(&self) -> usize {
        self.strands.len()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.strands.iter().position(|s| s.name == name)
    }

    pub fn strand(&self, index: usize) -> Option<&Strand> {
        self.strands.get(index)
    }

    /// Checks the "indices are a prefix of the non-negative integers; names are
    /// unique" invariant from §3.
    pub fn is_well_formed(&self) -> bool {
        let mut seen_names = std::collections::BTreeSet::new();
        for (i, strand) in self.strands.iter().enumerate() {
            if strand.index != i {
                return false;
            }
            if !seen_names.insert(strand.name.as_str()) {
                return false;
            }
        }
        true
    }
}

// SPINDLE
// ================================================================================================

/// A user-defined function: ordered parameters, ordered local bundles (each shaped
/// like a top-level bundle), ordered return expressions (arity ≥ 1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spindle {
    pub name: String,
    pub params: Vec<String>,
    pub locals: Vec<Bundle>,
    pub returns: Vec<ExprId>,
}

impl Spindle {
    pub fn arity(&self) -> usize {
        self.returns.len()
    }

    pub fn local(&self, name: &str) -> Option<&Bundle> {
        self.locals.iter().find(|b| b.name == name)
    }
}

// ORDER
// ================================================================================================

/// One entry of the program's topological declaration order (§6: `order: [{bundle,
/// strands?}]`). `strands` is the per-bundle evaluation order when it differs from
/// declaration order (e.g. after chain/range expansion); `None` means "declaration
/// order".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEntry {
    pub bundle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strands: Option<Vec<usize>>,
}

// PROGRAM
// ================================================================================================

/// The fully-lowered program: bundles, spindles, topological order, and interned
/// resource tables. Resource lists are append-only during lowering (§4.B).
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub pool: ExprPool,
    pub bundles: BTreeMap<String, Bundle>,
    pub spindles: BTreeMap<String, Spindle>,
    pub order: Vec<OrderEntry>,
    pub resources: Vec<String>,
    pub text_resources: Vec<String>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bundle(&self, name: &str) -> Option<&Bundle> {
        self.bundles.get(name)
    }

    pub fn spindle(&self, name: &str) -> Option<&Spindle> {
        self.spindles.get(name)
    }

    /// Interns a resource path, returning its stable 0-based id. Deduplicated by
    /// exact string equality (§9 "Resource interning").
    pub fn intern_resource(&mut self, path: impl Into<String>) -> usize {
        let path = path.into();
        if let Some(pos) = self.resources.iter().position(|p| *p == path) {
            return pos;
        }
        self.resources.push(path);
        self.resources.len() - 1
    }

    /// Interns a text resource, returning its stable 0-based id.
    pub fn intern_text(&mut self, text: impl Into<String>) -> usize {
        let text = text.into();
        if let Some(pos) = self.text_resources.iter().position(|t| *t == text) {
            return pos;
        }
        self.text_resources.push(text);
        self.text_resources.len() - 1
    }
}

// CACHE DESCRIPTOR
// ================================================================================================

/// The owning location of a cache (§3): a bundle name plus a strand index within it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StrandLocation {
    pub bundle: String,
    pub strand_index: usize,
}

impl std::fmt::Display for StrandLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.bundle, self.strand_index)
    }
}

/// Which execution domain a cache belongs to, derived from the owning bundle's
/// hardware requirements (§4.E "Domain classification").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheDomain {
    Visual,
    Audio,
}

/// Metadata record for one feedback-history ring, produced by the cache manager
/// (§4.E). The descriptor table itself (an ordered, append-only array keyed by
/// `id`) is owned by `loom-cache`'s `CacheManager`, not by `Program`: cache
/// descriptors are a downstream analysis artifact, not part of the lowered tree.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheDescriptor {
    pub id: u32,
    pub location: StrandLocation,
    pub history_size: usize,
    pub tap_index: usize,
    pub value_expr: ExprId,
    pub signal_expr: ExprId,
    pub domain: CacheDomain,
    pub history_buffer: usize,
    pub signal_buffer: usize,
    pub has_self_reference: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_well_formed_rejects_gaps() {
        let bundle = Bundle {
            name: "display".into(),
            strands: vec![
                Strand { name: "r".into(), index: 0, expr: ExprId(0) },
                Strand { name: "g".into(), index: 2, expr: ExprId(1) },
            ],
        };
        assert!(!bundle.is_well_formed());
    }

    #[test]
    fn bundle_well_formed_rejects_duplicate_names() {
        let bundle = Bundle {
            name: "display".into(),
            strands: vec![
                Strand { name: "r".into(), index: 0, expr: ExprId(0) },
                Strand { name: "r".into(), index: 1, expr: ExprId(1) },
            ],
        };
        assert!(!bundle.is_well_formed());
    }

    #[test]
    fn resource_interning_dedups() {
        let mut program = Program::new();
        let a = program.intern_resource("tex/a.png");
        let b = program.intern_resource("tex/b.png");
        let a2 = program.intern_resource("tex/a.png");
        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert_eq!(program.resources.len(), 2);
    }
}
