use std::collections::BTreeMap;

use loom_ir::{primitive_spec, BinaryOp as IrBinaryOp, Expr, ExprId, Program, UnaryOp as IrUnaryOp};

use crate::ast;
use crate::chain::expand_pattern_block;
use crate::errors::LoweringError;
use crate::scope::{GlobalScope, LocalCtx};
use crate::topo::topological_order;
use crate::width::{builtin_width, infer_width};

/// The "previous step" context a chain pattern block lowers its outputs against:
/// the previous step's live expression ids, and (when known) their names.
type PrevCtx<'a> = Option<(&'a [ExprId], &'a [Option<String>])>;

const HARDWARE_MULTI_BUILTINS: &[&str] = &["camera", "microphone", "mouse"];

/// Lowers a parsed surface program into an IR [`Program`] (§4.B).
pub fn lower(ast: &ast::Program) -> Result<Program, LoweringError> {
    let globals = GlobalScope::collect(ast)?;
    let mut program = Program::new();

    for spindle in &ast.spindles {
        let lowered = lower_spindle(&mut program, &globals, spindle)?;
        program.spindles.insert(spindle.name.clone(), lowered);
    }

    for bundle in &ast.bundles {
        let lowered = lower_bundle(&mut program, &globals, bundle)?;
        program.bundles.insert(bundle.name.clone(), lowered);
    }

    let order = topological_order(&program)?;
    log::debug!(target: "loom::lower", "topological order: {order:?}");
    program.order =
        order.into_iter().map(|bundle| loom_ir::OrderEntry { bundle, strands: None }).collect();

    Ok(program)
}

fn lower_bundle(
    program: &mut Program,
    globals: &GlobalScope,
    bundle: &ast::BundleDecl,
) -> Result<loom_ir::Bundle, LoweringError> {
    let locals = LocalCtx::default();
    let strands = match &bundle.body {
        ast::BundleBody::Strands(entries) => {
            let mut strands = Vec::with_capacity(entries.len());
            for (i, entry) in entries.iter().enumerate() {
                let expr_id = lower_scalar(program, globals, &locals, None, &entry.expr)?;
                let name = entry.name.clone().unwrap_or_else(|| i.to_string());
                strands.push(loom_ir::Strand { name, index: i, expr: expr_id });
            }
            strands
        },
        ast::BundleBody::Chain { names, expr } => {
            let ids = lower_chain(program, globals, &locals, expr)?;
            if ids.len() != names.len() {
                return Err(LoweringError::WidthMismatch { expected: names.len(), actual: ids.len() });
            }
            ids.into_iter()
                .zip(names.iter())
                .enumerate()
                .map(|(i, (expr, name))| loom_ir::Strand { name: name.clone(), index: i, expr })
                .collect()
        },
    };

    let bundle = loom_ir::Bundle { name: bundle.name.clone(), strands };
    debug_assert!(bundle.is_well_formed());
    Ok(bundle)
}

fn lower_spindle(
    program: &mut Program,
    globals: &GlobalScope,
    spindle: &ast::SpindleDecl,
) -> Result<loom_ir::Spindle, LoweringError> {
    let mut locals = LocalCtx { params: spindle.params.clone(), ..Default::default() };

    let mut local_bundles = Vec::with_capacity(spindle.locals.len());
    for local in &spindle.locals {
        let lowered = lower_bundle_in_scope(program, globals, &locals, local)?;
        locals.local_widths.insert(lowered.name.clone(), lowered.width());
        locals
            .local_strand_names
            .insert(lowered.name.clone(), lowered.strands.iter().map(|s| s.name.clone()).collect());
        local_bundles.push(lowered);
    }

    let mut returns = Vec::with_capacity(spindle.returns.len());
    for ret in &spindle.returns {
        returns.push(lower_scalar(program, globals, &locals, None, ret)?);
    }

    Ok(loom_ir::Spindle {
        name: spindle.name.clone(),
        params: spindle.params.clone(),
        locals: local_bundles,
        returns,
    })
}

/// Like [`lower_bundle`] but resolving identifiers against an in-progress spindle's
/// scope (earlier locals and params already visible).
fn lower_bundle_in_scope(
    program: &mut Program,
    globals: &GlobalScope,
    locals: &LocalCtx,
    bundle: &ast::BundleDecl,
) -> Result<loom_ir::Bundle, LoweringError> {
    let strands = match &bundle.body {
        ast::BundleBody::Strands(entries) => {
            let mut strands = Vec::with_capacity(entries.len());
            for (i, entry) in entries.iter().enumerate() {
                let expr_id = lower_scalar(program, globals, locals, None, &entry.expr)?;
                let name = entry.name.clone().unwrap_or_else(|| i.to_string());
                strands.push(loom_ir::Strand { name, index: i, expr: expr_id });
            }
            strands
        },
        ast::BundleBody::Chain { names, expr } => {
            let ids = lower_chain(program, globals, locals, expr)?;
            if ids.len() != names.len() {
                return Err(LoweringError::WidthMismatch { expected: names.len(), actual: ids.len() });
            }
            ids.into_iter()
                .zip(names.iter())
                .enumerate()
                .map(|(i, (expr, name))| loom_ir::Strand { name: name.clone(), index: i, expr })
                .collect()
        },
    };
    Ok(loom_ir::Bundle { name: bundle.name.clone(), strands })
}

fn lower_chain(
    program: &mut Program,
    globals: &GlobalScope,
    locals: &LocalCtx,
    chain_expr: &ast::Expr,
) -> Result<Vec<ExprId>, LoweringError> {
    let ast::Expr::Chain(base, blocks) = chain_expr else {
        // A bundle whose body is `Chain { .. }` but whose expr isn't literally a
        // chain is still valid (e.g. a bundle literal reshaped by width alone);
        // lower it directly with no pattern steps.
        return lower_multi(program, globals, locals, None, chain_expr);
    };

    let base_ids = lower_multi(program, globals, locals, None, base)?;
    let base_names = names_of_base(globals, base);
    let mut current_ids = base_ids;
    let mut current_names = base_names;

    for block in blocks {
        let expanded = expand_pattern_block(globals, current_ids.len(), block)?;
        let mut next_ids = Vec::with_capacity(expanded.len());
        for out_expr in &expanded {
            let id = lower_scalar(
                program,
                globals,
                locals,
                Some((&current_ids, &current_names)),
                out_expr,
            )?;
            next_ids.push(id);
        }
        current_names = vec![None; next_ids.len()];
        current_ids = next_ids;
    }

    Ok(current_ids)
}

fn names_of_base(globals: &GlobalScope, base: &ast::Expr) -> Vec<Option<String>> {
    let bundle_name = match base {
        ast::Expr::Ident(name) => Some(name.as_str()),
        ast::Expr::TagRef(tag) => globals.tag_to_bundle.get(tag).map(|s| s.as_str()),
        _ => None,
    };
    match bundle_name.and_then(|n| globals.bundle_strand_names.get(n)) {
        Some(names) => names.iter().cloned().map(Some).collect(),
        None => Vec::new(),
    }
}

fn lower_scalar(
    program: &mut Program,
    globals: &GlobalScope,
    locals: &LocalCtx,
    prev: PrevCtx,
    expr: &ast::Expr,
) -> Result<ExprId, LoweringError> {
    let ids = lower_multi(program, globals, locals, prev, expr)?;
    if ids.len() != 1 {
        return Err(LoweringError::WidthMismatch { expected: 1, actual: ids.len() });
    }
    Ok(ids[0])
}

fn me_coord(program: &mut Program, axis: &str) -> ExprId {
    let zero = program.pool.alloc(Expr::Num(0.0.into()));
    program.pool.alloc(Expr::Index { bundle: "me".into(), index: zero, field: Some(axis.into()) })
}

fn conv_binop(op: ast::BinaryOp) -> IrBinaryOp {
    match op {
        ast::BinaryOp::Add => IrBinaryOp::Add,
        ast::BinaryOp::Sub => IrBinaryOp::Sub,
        ast::BinaryOp::Mul => IrBinaryOp::Mul,
        ast::BinaryOp::Div => IrBinaryOp::Div,
        ast::BinaryOp::Mod => IrBinaryOp::Mod,
        ast::BinaryOp::Pow => IrBinaryOp::Pow,
        ast::BinaryOp::Lt => IrBinaryOp::Lt,
        ast::BinaryOp::Gt => IrBinaryOp::Gt,
        ast::BinaryOp::Le => IrBinaryOp::Le,
        ast::BinaryOp::Ge => IrBinaryOp::Ge,
        ast::BinaryOp::Eq => IrBinaryOp::Eq,
        ast::BinaryOp::Ne => IrBinaryOp::Ne,
        ast::BinaryOp::And => IrBinaryOp::And,
        ast::BinaryOp::Or => IrBinaryOp::Or,
    }
}

fn conv_unop(op: ast::UnaryOp) -> IrUnaryOp {
    match op {
        ast::UnaryOp::Neg => IrUnaryOp::Neg,
        ast::UnaryOp::Not => IrUnaryOp::Not,
    }
}

/// Resolves `base` (an `Ident`, `TagRef`, or the literal `me`) to a concrete bundle
/// name, or `"me"` itself.
fn resolve_bundle_base<'a>(globals: &'a GlobalScope, base: &'a ast::Expr) -> Result<String, LoweringError> {
    match base {
        ast::Expr::Ident(name) if name == "me" => Ok("me".to_string()),
        ast::Expr::Ident(name) => globals
            .resolve_bundle_name(name)
            .map(|s| s.to_string())
            .ok_or_else(|| LoweringError::UnknownBundle(name.clone())),
        ast::Expr::TagRef(tag) => globals
            .tag_to_bundle
            .get(tag)
            .cloned()
            .ok_or_else(|| LoweringError::UnknownBundle(format!("#{tag}"))),
        other => Err(LoweringError::InvalidExpression(format!("'{other:?}' is not a bundle reference"))),
    }
}

fn lower_multi(
    program: &mut Program,
    globals: &GlobalScope,
    locals: &LocalCtx,
    prev: PrevCtx,
    expr: &ast::Expr,
) -> Result<Vec<ExprId>, LoweringError> {
    match expr {
        ast::Expr::Num(n) => Ok(vec![program.pool.alloc(Expr::Num((*n).into()))]),

        ast::Expr::Ident(name) if locals.is_param(name) => {
            Ok(vec![program.pool.alloc(Expr::Param(name.clone()))])
        },

        ast::Expr::Ident(name) => Err(LoweringError::InvalidExpression(format!(
            "'{name}' is a bundle; index into it with '.' rather than using it bare"
        ))),

        ast::Expr::TagRef(tag) => Err(LoweringError::InvalidExpression(format!(
            "'#{tag}' is a bundle tag; index into it with '.' rather than using it bare"
        ))),

        ast::Expr::Field(base, field) => {
            if let ast::Expr::Ident(name) = base.as_ref() {
                if name == "me" {
                    return Ok(vec![me_coord(program, field)]);
                }
            }
            let bundle_name = resolve_bundle_base(globals, base)?;
            let names = strand_names(globals, locals, &bundle_name);
            let index = names
                .iter()
                .position(|n| n == field)
                .ok_or_else(|| LoweringError::UnknownStrand {
                    bundle: bundle_name.clone(),
                    strand: field.clone(),
                })?;
            let index_expr = program.pool.alloc(Expr::Num(index as f64));
            Ok(vec![program.pool.alloc(Expr::Index {
                bundle: bundle_name,
                index: index_expr,
                field: Some(field.clone()),
            })])
        },

        ast::Expr::Index(base, idx) => {
            if let ast::Expr::Ident(name) = base.as_ref() {
                if name == "me" {
                    // `me.(expr)` is not a meaningful construct (coordinates are
                    // named, not positionally indexed); reject explicitly.
                    return Err(LoweringError::InvalidExpression(
                        "'me' coordinates are accessed by name, not by index".into(),
                    ));
                }
            }
            let bundle_name = resolve_bundle_base(globals, base)?;
            let width = strand_width(globals, locals, &bundle_name)?;
            let index_id = match idx.as_ref() {
                ast::Expr::Num(n) => {
                    let resolved = crate::chain::resolve_index(*n as i64, width)?;
                    program.pool.alloc(Expr::Num(resolved as f64))
                },
                other => lower_scalar(program, globals, locals, prev, other)?,
            };
            Ok(vec![program.pool.alloc(Expr::Index { bundle: bundle_name, index: index_id, field: None })])
        },

        ast::Expr::BareAccessor(accessor) => {
            let (ids, names) = prev.ok_or(LoweringError::BareStrandOutsidePattern)?;
            match accessor {
                ast::BareAccessor::Index(i) => {
                    let resolved = crate::chain::resolve_index(*i, ids.len())?;
                    Ok(vec![ids[resolved]])
                },
                ast::BareAccessor::Name(name) => {
                    let pos = names
                        .iter()
                        .position(|n| n.as_deref() == Some(name.as_str()))
                        .ok_or_else(|| LoweringError::UnknownStrand {
                            bundle: "<previous>".into(),
                            strand: name.clone(),
                        })?;
                    Ok(vec![ids[pos]])
                },
                ast::BareAccessor::Dynamic(inner) => {
                    let sel = lower_scalar(program, globals, locals, prev, inner)?;
                    let mut args = vec![sel];
                    args.extend(ids.iter().copied());
                    Ok(vec![program.pool.alloc(Expr::Builtin { name: "select".into(), args })])
                },
            }
        },

        ast::Expr::Binary(op, l, r) => {
            let left = lower_scalar(program, globals, locals, prev, l)?;
            let right = lower_scalar(program, globals, locals, prev, r)?;
            Ok(vec![program.pool.alloc(Expr::Binary { op: conv_binop(*op), left, right })])
        },

        ast::Expr::Unary(op, operand) => {
            let operand = lower_scalar(program, globals, locals, prev, operand)?;
            Ok(vec![program.pool.alloc(Expr::Unary { op: conv_unop(*op), operand })])
        },

        ast::Expr::Call(name, args) => lower_call(program, globals, locals, prev, name, args),

        ast::Expr::BundleLiteral(elems) => {
            let mut ids = Vec::new();
            for e in elems {
                ids.extend(lower_multi(program, globals, locals, prev, e)?);
            }
            Ok(ids)
        },

        ast::Expr::Chain(..) => lower_chain(program, globals, locals, expr),

        ast::Expr::TemporalRemap { base, shifted_t } => {
            let base_id = lower_scalar(program, globals, locals, prev, base)?;
            let shifted_id = lower_scalar(program, globals, locals, prev, shifted_t)?;
            let mut subs = BTreeMap::new();
            subs.insert("me.t".to_string(), shifted_id);
            Ok(vec![program.pool.alloc(Expr::Remap { base: base_id, substitutions: subs })])
        },

        ast::Expr::Range(..) => Err(LoweringError::BareStrandOutsidePattern),

        ast::Expr::Load { path, u, v } => {
            let id = program.intern_resource(path.clone()) as f64;
            let id_expr = program.pool.alloc(Expr::Num(id.into()));
            let u_id = match u {
                Some(e) => lower_scalar(program, globals, locals, prev, e)?,
                None => me_coord(program, "x"),
            };
            let v_id = match v {
                Some(e) => lower_scalar(program, globals, locals, prev, e)?,
                None => me_coord(program, "y"),
            };
            let mut out = Vec::with_capacity(builtin_width("texture"));
            for ch in 0..builtin_width("texture") {
                let ch_id = program.pool.alloc(Expr::Num((ch as f64).into()));
                out.push(program.pool.alloc(Expr::Builtin {
                    name: "texture".into(),
                    args: vec![id_expr, u_id, v_id, ch_id],
                }));
            }
            Ok(out)
        },

        ast::Expr::Sample { path, offset } => {
            let id = program.intern_resource(path.clone()) as f64;
            let id_expr = program.pool.alloc(Expr::Num(id.into()));
            let offset_id = match offset {
                Some(e) => lower_scalar(program, globals, locals, prev, e)?,
                None => me_coord(program, "i"),
            };
            let mut out = Vec::with_capacity(builtin_width("sample"));
            for ch in 0..builtin_width("sample") {
                let ch_id = program.pool.alloc(Expr::Num((ch as f64).into()));
                out.push(program.pool.alloc(Expr::Builtin {
                    name: "sample".into(),
                    args: vec![id_expr, offset_id, ch_id],
                }));
            }
            Ok(out)
        },

        ast::Expr::Text { text, u, v } => {
            let id = program.intern_text(text.clone()) as f64;
            let id_expr = program.pool.alloc(Expr::Num(id.into()));
            let u_id = lower_scalar(program, globals, locals, prev, u)?;
            let v_id = lower_scalar(program, globals, locals, prev, v)?;
            Ok(vec![program
                .pool
                .alloc(Expr::Builtin { name: "text".into(), args: vec![id_expr, u_id, v_id] })])
        },
    }
}

fn lower_call(
    program: &mut Program,
    globals: &GlobalScope,
    locals: &LocalCtx,
    prev: PrevCtx,
    name: &str,
    args: &[ast::Expr],
) -> Result<Vec<ExprId>, LoweringError> {
    if let Some(sig) = globals.spindle_sigs.get(name) {
        if args.len() != sig.params {
            return Err(LoweringError::ArityMismatch {
                spindle: name.to_string(),
                expected: sig.params,
                actual: args.len(),
            });
        }
        let arg_ids = args
            .iter()
            .map(|a| lower_scalar(program, globals, locals, prev, a))
            .collect::<Result<Vec<_>, _>>()?;
        let call = program.pool.alloc(Expr::Call { spindle: name.to_string(), args: arg_ids });
        return Ok((0..sig.returns).map(|k| program.pool.alloc(Expr::Extract { call, index: k })).collect());
    }

    if let Some(spec) = primitive_spec(name) {
        if !spec.arity.accepts(args.len()) {
            return Err(LoweringError::InvalidExpression(format!(
                "built-in '{name}' does not accept {} argument(s)",
                args.len()
            )));
        }
    }

    let arg_ids = args
        .iter()
        .map(|a| lower_scalar(program, globals, locals, prev, a))
        .collect::<Result<Vec<_>, _>>()?;

    if HARDWARE_MULTI_BUILTINS.contains(&name) {
        let width = builtin_width(name);
        let mut out = Vec::with_capacity(width);
        for ch in 0..width {
            let mut channel_args = arg_ids.clone();
            channel_args.push(program.pool.alloc(Expr::Num((ch as f64).into())));
            out.push(program.pool.alloc(Expr::Builtin { name: name.to_string(), args: channel_args }));
        }
        return Ok(out);
    }

    Ok(vec![program.pool.alloc(Expr::Builtin { name: name.to_string(), args: arg_ids })])
}

fn strand_width(globals: &GlobalScope, locals: &LocalCtx, bundle_name: &str) -> Result<usize, LoweringError> {
    if let Some(w) = locals.local_width(bundle_name) {
        return Ok(w);
    }
    globals
        .bundle_widths
        .get(bundle_name)
        .copied()
        .ok_or_else(|| LoweringError::UnknownBundle(bundle_name.to_string()))
}

fn strand_names(globals: &GlobalScope, locals: &LocalCtx, bundle_name: &str) -> Vec<String> {
    if let Some(names) = locals.local_strand_names.get(bundle_name) {
        return names.clone();
    }
    globals.bundle_strand_names.get(bundle_name).cloned().unwrap_or_default()
}
