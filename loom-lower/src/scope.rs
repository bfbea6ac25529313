use std::collections::BTreeMap;

use crate::ast;
use crate::errors::LoweringError;

/// Structural arity of a spindle, known without lowering its body (§4.B "Spindle
/// registration").
#[derive(Debug, Clone, Copy)]
pub struct SpindleSig {
    pub params: usize,
    pub returns: usize,
}

/// Bundle/spindle name and width tables built by the first, purely structural pass
/// over the AST (§4.B "Bundle declaration registration" / "Spindle registration").
/// None of this requires lowering a single expression: widths of `Strands` bodies
/// are just entry counts, and `Chain` bodies declare their width via the name list.
#[derive(Debug, Clone, Default)]
pub struct GlobalScope {
    pub bundle_widths: BTreeMap<String, usize>,
    pub bundle_strand_names: BTreeMap<String, Vec<String>>,
    pub tag_to_bundle: BTreeMap<String, String>,
    pub spindle_sigs: BTreeMap<String, SpindleSig>,
}

impl GlobalScope {
    pub fn collect(program: &ast::Program) -> Result<Self, LoweringError> {
        let mut scope = GlobalScope::default();

        for bundle in &program.bundles {
            let names = match &bundle.body {
                ast::BundleBody::Strands(entries) => entries
                    .iter()
                    .enumerate()
                    .map(|(i, s)| s.name.clone().unwrap_or_else(|| i.to_string()))
                    .collect::<Vec<_>>(),
                ast::BundleBody::Chain { names, .. } => names.clone(),
            };
            scope.bundle_widths.insert(bundle.name.clone(), names.len());
            scope.bundle_strand_names.insert(bundle.name.clone(), names);
            if let Some(tag) = &bundle.tag {
                scope.tag_to_bundle.insert(tag.clone(), bundle.name.clone());
            }
        }

        for spindle in &program.spindles {
            if scope.spindle_sigs.contains_key(&spindle.name) {
                return Err(LoweringError::DuplicateSpindle(spindle.name.clone()));
            }
            scope.spindle_sigs.insert(
                spindle.name.clone(),
                SpindleSig { params: spindle.params.len(), returns: spindle.returns.len() },
            );
        }

        Ok(scope)
    }

    pub fn resolve_bundle_name<'a>(&self, name: &'a str) -> Option<&'a str> {
        if self.bundle_widths.contains_key(name) {
            Some(name)
        } else {
            None
        }
    }
}

/// Identifier resolution scope while lowering a single expression: the current
/// spindle's parameters and local bundles (already lowered, so their widths are
/// known), plus the "implicit previous" width for bare accessors inside a chain
/// pattern step.
#[derive(Debug, Clone, Default)]
pub struct LocalCtx {
    pub params: Vec<String>,
    pub local_widths: BTreeMap<String, usize>,
    pub local_strand_names: BTreeMap<String, Vec<String>>,
    pub prev_width: Option<usize>,
}

impl LocalCtx {
    pub fn is_param(&self, name: &str) -> bool {
        self.params.iter().any(|p| p == name)
    }

    pub fn local_width(&self, name: &str) -> Option<usize> {
        self.local_widths.get(name).copied()
    }
}
