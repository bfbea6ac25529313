//! Range expansion for chain pattern blocks (§4.B "Chain patterns" / "Range
//! expansion"). Resolves `a..b` against either the previous step's width (a bare
//! range) or an explicit bundle's width (`bundle.(a..b)`), replicates the owning
//! pattern output once per resolved index, and replaces each occurrence with a
//! concrete bare accessor or numeric index. Actual resolution of bare accessors
//! against the previous step's live `ExprId`s happens later, in [`crate::lower`].

use crate::ast::{BareAccessor, Expr, PatternBlock, RangeEnd};
use crate::errors::LoweringError;
use crate::scope::GlobalScope;

/// Resolves a range's endpoints (open ends default to the full width; negative
/// endpoints count from the end) against a concrete `width`, returning the
/// resolved, half-open index list.
pub fn resolve_range(lo: RangeEnd, hi: RangeEnd, width: usize) -> Result<Vec<i64>, LoweringError> {
    let resolve = |v: i64| if v < 0 { v + width as i64 } else { v };
    let lo = lo.map(resolve).unwrap_or(0);
    let hi = hi.map(resolve).unwrap_or(width as i64);
    if lo < 0 || hi > width as i64 || lo > hi {
        let bad = if lo < 0 || lo > width as i64 { lo } else { hi };
        return Err(LoweringError::RangeOutOfBounds { index: bad, width });
    }
    Ok((lo..hi).collect())
}

/// Resolves a (possibly negative) concrete strand index against `width`.
pub fn resolve_index(index: i64, width: usize) -> Result<usize, LoweringError> {
    let resolved = if index < 0 { index + width as i64 } else { index };
    if resolved < 0 || resolved >= width as i64 {
        return Err(LoweringError::RangeOutOfBounds { index, width });
    }
    Ok(resolved as usize)
}

fn bundle_width_of_base(base: &Expr, globals: &GlobalScope) -> Result<usize, LoweringError> {
    match base {
        Expr::Ident(name) => globals
            .bundle_widths
            .get(name)
            .copied()
            .ok_or_else(|| LoweringError::UnknownBundle(name.clone())),
        Expr::TagRef(tag) => {
            let bundle = globals
                .tag_to_bundle
                .get(tag)
                .ok_or_else(|| LoweringError::UnknownBundle(format!("#{tag}")))?;
            Ok(globals.bundle_widths[bundle])
        },
        other => Err(LoweringError::InvalidExpression(format!(
            "range base {other:?} must be a bundle or tag reference"
        ))),
    }
}

/// Walks `expr` collecting the resolved index list of every `Range` occurrence, in
/// a fixed traversal order that [`substitute_ranges`] mirrors exactly.
fn collect_ranges(
    expr: &Expr,
    globals: &GlobalScope,
    prev_width: Option<usize>,
    out: &mut Vec<Vec<i64>>,
) -> Result<(), LoweringError> {
    match expr {
        Expr::Range(lo, hi) => {
            let width = prev_width.ok_or(LoweringError::BareStrandOutsidePattern)?;
            out.push(resolve_range(*lo, *hi, width)?);
        },
        Expr::Index(base, idx) => {
            if let Expr::Range(lo, hi) = idx.as_ref() {
                let width = bundle_width_of_base(base, globals)?;
                out.push(resolve_range(*lo, *hi, width)?);
            } else {
                collect_ranges(idx, globals, prev_width, out)?;
            }
            collect_ranges(base, globals, prev_width, out)?;
        },
        Expr::Field(base, _) => collect_ranges(base, globals, prev_width, out)?,
        Expr::BareAccessor(BareAccessor::Dynamic(inner)) => {
            collect_ranges(inner, globals, prev_width, out)?
        },
        Expr::Binary(_, l, r) => {
            collect_ranges(l, globals, prev_width, out)?;
            collect_ranges(r, globals, prev_width, out)?;
        },
        Expr::Unary(_, operand) => collect_ranges(operand, globals, prev_width, out)?,
        Expr::Call(_, args) => {
            for a in args {
                collect_ranges(a, globals, prev_width, out)?;
            }
        },
        Expr::BundleLiteral(elems) => {
            for e in elems {
                collect_ranges(e, globals, prev_width, out)?;
            }
        },
        Expr::TemporalRemap { base, shifted_t } => {
            collect_ranges(base, globals, prev_width, out)?;
            collect_ranges(shifted_t, globals, prev_width, out)?;
        },
        Expr::Load { u, v, .. } => {
            if let Some(u) = u {
                collect_ranges(u, globals, prev_width, out)?;
            }
            if let Some(v) = v {
                collect_ranges(v, globals, prev_width, out)?;
            }
        },
        Expr::Text { u, v, .. } => {
            collect_ranges(u, globals, prev_width, out)?;
            collect_ranges(v, globals, prev_width, out)?;
        },
        Expr::Num(_)
        | Expr::Ident(_)
        | Expr::TagRef(_)
        | Expr::Sample { .. }
        | Expr::BareAccessor(BareAccessor::Index(_))
        | Expr::BareAccessor(BareAccessor::Name(_)) => {},
        Expr::Chain(..) => {
            return Err(LoweringError::InvalidExpression("chains do not nest".into()));
        },
    }
    Ok(())
}

/// Rebuilds `expr` with the `k`-th `Range` occurrence (in the same traversal order
/// as [`collect_ranges`]) replaced by its `concretes[k]` value: a bare accessor
/// index when the range stood alone, or a literal numeric index when it was the
/// index argument of an explicit `bundle.(range)`.
fn substitute_ranges(
    expr: &Expr,
    globals: &GlobalScope,
    prev_width: Option<usize>,
    concretes: &[i64],
    counter: &mut usize,
) -> Expr {
    match expr {
        Expr::Range(..) => {
            let v = concretes[*counter];
            *counter += 1;
            Expr::BareAccessor(BareAccessor::Index(v))
        },
        Expr::Index(base, idx) => {
            if matches!(idx.as_ref(), Expr::Range(..)) {
                let v = concretes[*counter];
                *counter += 1;
                Expr::Index(base.clone(), Box::new(Expr::Num(v as f64)))
            } else {
                let new_idx = substitute_ranges(idx, globals, prev_width, concretes, counter);
                Expr::Index(base.clone(), Box::new(new_idx))
            }
        },
        Expr::Field(base, field) => Expr::Field(base.clone(), field.clone()),
        Expr::BareAccessor(BareAccessor::Dynamic(inner)) => Expr::BareAccessor(BareAccessor::Dynamic(
            Box::new(substitute_ranges(inner, globals, prev_width, concretes, counter)),
        )),
        Expr::Binary(op, l, r) => Expr::Binary(
            *op,
            Box::new(substitute_ranges(l, globals, prev_width, concretes, counter)),
            Box::new(substitute_ranges(r, globals, prev_width, concretes, counter)),
        ),
        Expr::Unary(op, operand) => {
            Expr::Unary(*op, Box::new(substitute_ranges(operand, globals, prev_width, concretes, counter)))
        },
        Expr::Call(name, args) => Expr::Call(
            name.clone(),
            args.iter()
                .map(|a| substitute_ranges(a, globals, prev_width, concretes, counter))
                .collect(),
        ),
        Expr::BundleLiteral(elems) => Expr::BundleLiteral(
            elems.iter().map(|e| substitute_ranges(e, globals, prev_width, concretes, counter)).collect(),
        ),
        Expr::TemporalRemap { base, shifted_t } => Expr::TemporalRemap {
            base: Box::new(substitute_ranges(base, globals, prev_width, concretes, counter)),
            shifted_t: Box::new(substitute_ranges(shifted_t, globals, prev_width, concretes, counter)),
        },
        Expr::Load { path, u, v } => Expr::Load {
            path: path.clone(),
            u: u.as_ref().map(|e| Box::new(substitute_ranges(e, globals, prev_width, concretes, counter))),
            v: v.as_ref().map(|e| Box::new(substitute_ranges(e, globals, prev_width, concretes, counter))),
        },
        Expr::Text { text, u, v } => Expr::Text {
            text: text.clone(),
            u: Box::new(substitute_ranges(u, globals, prev_width, concretes, counter)),
            v: Box::new(substitute_ranges(v, globals, prev_width, concretes, counter)),
        },
        other => other.clone(),
    }
}

/// Expands one pattern block's outputs against `prev_width`, replicating any output
/// containing ranges once per resolved index (§4.B "Range expansion").
pub fn expand_pattern_block(
    globals: &GlobalScope,
    prev_width: usize,
    block: &PatternBlock,
) -> Result<Vec<Expr>, LoweringError> {
    let mut expanded = Vec::new();
    for output in block {
        let mut ranges = Vec::new();
        collect_ranges(output, globals, Some(prev_width), &mut ranges)?;
        if ranges.is_empty() {
            expanded.push(output.clone());
            continue;
        }
        let s = ranges[0].len();
        for r in &ranges[1..] {
            if r.len() != s {
                return Err(LoweringError::RangeSizeMismatch { first: s, other: r.len() });
            }
        }
        for j in 0..s {
            let concretes: Vec<i64> = ranges.iter().map(|r| r[j]).collect();
            let mut counter = 0;
            expanded.push(substitute_ranges(output, globals, Some(prev_width), &concretes, &mut counter));
        }
    }
    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_range_resolves_against_prev_width() {
        let globals = GlobalScope::default();
        let block: PatternBlock = vec![Expr::Binary(
            crate::ast::BinaryOp::Mul,
            Box::new(Expr::Range(Some(0), Some(3))),
            Box::new(Expr::Num(2.0)),
        )];
        let expanded = expand_pattern_block(&globals, 3, &block).unwrap();
        assert_eq!(expanded.len(), 3);
        assert_eq!(
            expanded[0],
            Expr::Binary(
                crate::ast::BinaryOp::Mul,
                Box::new(Expr::BareAccessor(BareAccessor::Index(0))),
                Box::new(Expr::Num(2.0))
            )
        );
    }

    #[test]
    fn mismatched_range_sizes_error() {
        let globals = GlobalScope::default();
        let block: PatternBlock = vec![Expr::Binary(
            crate::ast::BinaryOp::Add,
            Box::new(Expr::Range(Some(0), Some(2))),
            Box::new(Expr::Range(Some(0), Some(3))),
        )];
        assert!(matches!(
            expand_pattern_block(&globals, 3, &block),
            Err(LoweringError::RangeSizeMismatch { .. })
        ));
    }

    #[test]
    fn negative_index_resolves_modulo_width() {
        assert_eq!(resolve_index(-1, 3).unwrap(), 2);
        assert!(resolve_index(-4, 3).is_err());
    }
}
