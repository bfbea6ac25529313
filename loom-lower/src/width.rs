use crate::ast::Expr;
use crate::errors::LoweringError;
use crate::scope::{GlobalScope, LocalCtx};

/// Fixed output widths of the resource/hardware built-ins (§4.B width table).
pub fn builtin_width(name: &str) -> usize {
    match name {
        "texture" | "camera" | "mouse" => 3,
        "sample" | "microphone" => 2,
        _ => 1,
    }
}

/// Computes how many scalar strands an (unlowered) expression yields, per §4.B
/// "Width inference". Used to validate bundle-literal sums, spindle call arity, and
/// the match between a chain's final pattern output count and its declared name
/// list.
pub fn infer_width(
    globals: &GlobalScope,
    locals: &LocalCtx,
    expr: &Expr,
) -> Result<usize, LoweringError> {
    match expr {
        Expr::Num(_) => Ok(1),

        Expr::Ident(name) => {
            if locals.is_param(name) {
                Ok(1)
            } else if let Some(w) = locals.local_width(name) {
                Err(LoweringError::WidthMismatch { expected: 1, actual: w })
            } else if globals.resolve_bundle_name(name).is_some() {
                Err(LoweringError::InvalidExpression(format!(
                    "bundle '{name}' used as a value; index into it with '.'"
                )))
            } else {
                Err(LoweringError::UnknownBundle(name.clone()))
            }
        },

        Expr::Field(..) | Expr::Index(..) | Expr::BareAccessor(..) | Expr::TemporalRemap { .. } => {
            Ok(1)
        },

        Expr::Binary(_, l, r) => {
            require_width(globals, locals, l, 1)?;
            require_width(globals, locals, r, 1)?;
            Ok(1)
        },

        Expr::Unary(_, operand) => {
            require_width(globals, locals, operand, 1)?;
            Ok(1)
        },

        Expr::Call(name, args) => {
            if let Some(sig) = globals.spindle_sigs.get(name) {
                if args.len() != sig.params {
                    return Err(LoweringError::ArityMismatch {
                        spindle: name.clone(),
                        expected: sig.params,
                        actual: args.len(),
                    });
                }
                for arg in args {
                    require_width(globals, locals, arg, 1)?;
                }
                Ok(sig.returns)
            } else {
                // A built-in call: every argument is itself scalar.
                for arg in args {
                    require_width(globals, locals, arg, 1)?;
                }
                Ok(builtin_width(name))
            }
        },

        Expr::BundleLiteral(elems) => {
            let mut total = 0;
            for e in elems {
                total += infer_width(globals, locals, e)?;
            }
            Ok(total)
        },

        Expr::Chain(..) => Err(LoweringError::InvalidExpression(
            "a chain expression is only valid as a whole bundle body".into(),
        )),

        Expr::Range(..) => Err(LoweringError::BareStrandOutsidePattern),

        Expr::TagRef(tag) => Err(LoweringError::InvalidExpression(format!(
            "tag '#{tag}' used as a value; index into it with '.'"
        ))),

        Expr::Load { .. } => Ok(builtin_width("texture")),
        Expr::Sample { .. } => Ok(builtin_width("sample")),
        Expr::Text { .. } => Ok(1),
    }
}

fn require_width(
    globals: &GlobalScope,
    locals: &LocalCtx,
    expr: &Expr,
    expected: usize,
) -> Result<(), LoweringError> {
    let actual = infer_width(globals, locals, expr)?;
    if actual != expected {
        return Err(LoweringError::WidthMismatch { expected, actual });
    }
    Ok(())
}
