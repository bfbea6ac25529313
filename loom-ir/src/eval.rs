//! A small reference interpreter used only by test suites (`testing` feature) to
//! check semantic properties — inliner soundness via grid evaluation, builtin
//! boundary behaviours, select semantics — without depending on a real backend.
//! This is not a backend and is never used outside `#[cfg(test)]` code.

use std::collections::BTreeMap;

use crate::expr::{BinaryOp, Expr, ExprId, UnaryOp};
use crate::program::{Bundle, Program};

/// Evaluation context: the current coordinate bindings (`"me.x"`-style keys),
/// spindle-parameter bindings, and the stack of local-bundle scopes currently in
/// effect (for `Index` lookups against spindle locals).
#[derive(Clone)]
pub struct EvalCtx<'p> {
    pub program: &'p Program,
    pub coords: BTreeMap<String, f64>,
    pub params: BTreeMap<String, f64>,
    pub locals: Vec<&'p Bundle>,
}

impl<'p> EvalCtx<'p> {
    pub fn new(program: &'p Program, coords: BTreeMap<String, f64>) -> Self {
        Self { program, coords, params: BTreeMap::new(), locals: Vec::new() }
    }

    fn find_local(&self, bundle: &str) -> Option<&'p Bundle> {
        self.locals.iter().rev().find(|b| b.name == bundle).copied()
    }
}

/// Evaluates `id` to a scalar under `ctx`. `Call` nodes cannot be evaluated
/// directly (they are not ground values); only `Extract(Call(...), k)` is.
/// `CacheRead` always evaluates to `0.0` here — this evaluator intentionally has
/// no notion of ticks or history, by design (see module docs).
pub fn eval(ctx: &EvalCtx, id: ExprId) -> f64 {
    match ctx.program.pool.get(id) {
        Expr::Num(n) => n.get(),
        Expr::Param(name) => *ctx.params.get(name).unwrap_or(&0.0),
        Expr::Index { bundle, index, field } => {
            let idx = eval(ctx, *index).round().max(0.0) as usize;
            if bundle == "me" {
                let key = field.clone().unwrap_or_else(|| idx.to_string());
                *ctx.coords.get(&key).unwrap_or(&0.0)
            } else if let Some(local) = ctx.find_local(bundle) {
                let strand = local.strand(idx).expect("local strand index in range");
                eval(ctx, strand.expr)
            } else if let Some(top) = ctx.program.bundle(bundle) {
                let strand = top.strand(idx).expect("bundle strand index in range");
                eval(ctx, strand.expr)
            } else {
                0.0
            }
        },
        Expr::Binary { op, left, right } => apply_binary(*op, eval(ctx, *left), eval(ctx, *right)),
        Expr::Unary { op, operand } => apply_unary(*op, eval(ctx, *operand)),
        Expr::Call { .. } => panic!("Call is not a ground value; evaluate via Extract"),
        Expr::Extract { call, index } => eval_extract(ctx, *call, *index),
        Expr::Builtin { name, args } => {
            let values: Vec<f64> = args.iter().map(|a| eval(ctx, *a)).collect();
            apply_builtin(name, &values)
        },
        Expr::Remap { base, substitutions } => {
            let mut coords = ctx.coords.clone();
            for (key, value) in substitutions {
                coords.insert(key.clone(), eval(ctx, *value));
            }
            let remapped =
                EvalCtx { program: ctx.program, coords, params: ctx.params.clone(), locals: ctx.locals.clone() };
            eval(&remapped, *base)
        },
        Expr::CacheRead { .. } => 0.0,
    }
}

fn eval_extract(ctx: &EvalCtx, call: ExprId, return_index: usize) -> f64 {
    let Expr::Call { spindle, args } = ctx.program.pool.get(call) else {
        panic!("Extract's operand must be a Call");
    };
    let spindle_def = ctx
        .program
        .spindle(spindle)
        .unwrap_or_else(|| panic!("unknown spindle '{spindle}'"));
    let arg_values: Vec<f64> = args.iter().map(|a| eval(ctx, *a)).collect();
    let mut params = BTreeMap::new();
    for (name, value) in spindle_def.params.iter().zip(arg_values) {
        params.insert(name.clone(), value);
    }
    let mut locals = ctx.locals.clone();
    locals.extend(spindle_def.locals.iter());

    let inner = EvalCtx { program: ctx.program, coords: ctx.coords.clone(), params, locals };
    let ret = spindle_def
        .returns
        .get(return_index)
        .unwrap_or_else(|| panic!("spindle '{spindle}' has no return #{return_index}"));
    eval(&inner, *ret)
}

fn apply_binary(op: BinaryOp, l: f64, r: f64) -> f64 {
    let truthy = |v: f64| v != 0.0;
    match op {
        BinaryOp::Add => l + r,
        BinaryOp::Sub => l - r,
        BinaryOp::Mul => l * r,
        BinaryOp::Div => l / r,
        BinaryOp::Mod => builtin_mod(l, r),
        BinaryOp::Pow => l.powf(r),
        BinaryOp::Lt => bool_to_f64(l < r),
        BinaryOp::Gt => bool_to_f64(l > r),
        BinaryOp::Le => bool_to_f64(l <= r),
        BinaryOp::Ge => bool_to_f64(l >= r),
        BinaryOp::Eq => bool_to_f64(l == r),
        BinaryOp::Ne => bool_to_f64(l != r),
        BinaryOp::And => bool_to_f64(truthy(l) && truthy(r)),
        BinaryOp::Or => bool_to_f64(truthy(l) || truthy(r)),
    }
}

fn apply_unary(op: UnaryOp, v: f64) -> f64 {
    match op {
        UnaryOp::Neg => -v,
        UnaryOp::Not => bool_to_f64(v == 0.0),
    }
}

fn bool_to_f64(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// `mod(a, b) = a - b * floor(a / b)`; `mod(a, 0)` is NaN (§6, §8).
pub fn builtin_mod(a: f64, b: f64) -> f64 {
    if b == 0.0 {
        f64::NAN
    } else {
        a - b * (a / b).floor()
    }
}

/// `select(i, v0, ..., vN-1)` — floor-and-clamp `i` into `[0, N-1]`, return `v_i`.
/// The 1-argument form returns `i` unchanged (§4.D, §6, §8).
pub fn builtin_select(args: &[f64]) -> f64 {
    if args.len() <= 1 {
        return args.first().copied().unwrap_or(0.0);
    }
    let values = &args[1..];
    let idx = args[0].floor().clamp(0.0, (values.len() - 1) as f64) as usize;
    values[idx]
}

fn apply_builtin(name: &str, args: &[f64]) -> f64 {
    match name {
        "sin" => args[0].sin(),
        "cos" => args[0].cos(),
        "tan" => args[0].tan(),
        "asin" => args[0].asin(),
        "acos" => args[0].acos(),
        "atan" => args[0].atan(),
        "atan2" => args[0].atan2(args[1]),
        "abs" => args[0].abs(),
        "floor" => args[0].floor(),
        "ceil" => args[0].ceil(),
        "round" => args[0].round(),
        "sqrt" => args[0].sqrt(),
        "pow" => args[0].powf(args[1]),
        "exp" => args[0].exp(),
        "log" => args[0].ln(),
        "log2" => args[0].log2(),
        "sign" => {
            if args[0] > 0.0 {
                1.0
            } else if args[0] < 0.0 {
                -1.0
            } else {
                0.0
            }
        },
        "fract" => args[0] - args[0].floor(),
        "min" => args[0].min(args[1]),
        "max" => args[0].max(args[1]),
        "mod" => builtin_mod(args[0], args[1]),
        "clamp" => args[0].max(args[1]).min(args[2]),
        "lerp" | "mix" => args[0] + (args[1] - args[0]) * args[2],
        "step" => bool_to_f64(args[1] >= args[0]),
        "smoothstep" => {
            let t = ((args[2] - args[0]) / (args[1] - args[0])).clamp(0.0, 1.0);
            t * t * (3.0 - 2.0 * t)
        },
        "select" => builtin_select(args),
        "noise" => {
            let (x, y) = (args[0], args.get(1).copied().unwrap_or(0.0));
            let dot = x * 12.9898 + y * 78.233;
            let s = dot.sin() * 43758.5453;
            s - s.floor()
        },
        "cache" => args[0],
        "camera" | "microphone" | "texture" | "sample" | "mouse" => 0.0,
        other => panic!("no reference semantics for builtin '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;
    use crate::program::{Spindle, Strand};

    #[test]
    fn mod_of_negative_numerator() {
        assert!((builtin_mod(-1.3, 1.0) - 0.7).abs() < 1e-9);
    }

    #[test]
    fn mod_by_zero_is_nan() {
        assert!(builtin_mod(1.0, 0.0).is_nan());
    }

    #[test]
    fn sqrt_of_negative_is_nan() {
        assert!(apply_builtin("sqrt", &[-1.0]).is_nan());
    }

    #[test]
    fn divide_by_zero_is_signed_infinity() {
        assert_eq!(apply_binary(BinaryOp::Div, 1.0, 0.0), f64::INFINITY);
    }

    #[test]
    fn select_clamps_and_floors() {
        assert_eq!(builtin_select(&[-3.0, 10.0, 20.0, 30.0]), 10.0);
        assert_eq!(builtin_select(&[1.7, 10.0, 20.0, 30.0]), 20.0);
        assert_eq!(builtin_select(&[99.0, 10.0, 20.0, 30.0]), 30.0);
        assert_eq!(builtin_select(&[42.0]), 42.0);
    }

    #[test]
    fn inliner_soundness_matches_extract_of_call() {
        // decay(rate) = me.x * rate, as a ground pure spindle.
        let mut program = Program::new();
        let rate_param = program.pool.alloc(Expr::Param("rate".into()));
        let x_idx = program.pool.alloc(Expr::Num(0.0.into()));
        let x = program.pool.alloc(Expr::Index { bundle: "me".into(), index: x_idx, field: Some("x".into()) });
        let body = program.pool.alloc(Expr::Binary { op: BinaryOp::Mul, left: x, right: rate_param });
        program.spindles.insert(
            "decay".into(),
            Spindle { name: "decay".into(), params: vec!["rate".into()], locals: vec![], returns: vec![body] },
        );

        let arg = program.pool.alloc(Expr::Num(0.5.into()));
        let call = program.pool.alloc(Expr::Call { spindle: "decay".into(), args: vec![arg] });
        let extract = program.pool.alloc(Expr::Extract { call, index: 0 });

        // substituteParams(body, {rate -> 0.5}) evaluated directly.
        let subs_rate = program.pool.alloc(Expr::Num(0.5.into()));
        let substituted =
            program.pool.alloc(Expr::Binary { op: BinaryOp::Mul, left: x, right: subs_rate });

        for sample_x in [0.0, 0.25, 0.75, 1.0] {
            let mut coords = BTreeMap::new();
            coords.insert("x".to_string(), sample_x);
            let ctx = EvalCtx::new(&program, coords);
            let via_extract = eval(&ctx, extract);
            let via_substitution = eval(&ctx, substituted);
            assert!((via_extract - via_substitution).abs() < 1e-4);
        }
    }

    #[test]
    fn spindle_with_local_bundle_resolves_against_locals() {
        // spindle double(v): local out = { y = v * 2 }; return out.y
        let mut program = Program::new();
        let v_param = program.pool.alloc(Expr::Param("v".into()));
        let two = program.pool.alloc(Expr::Num(2.0.into()));
        let y_expr = program.pool.alloc(Expr::Binary { op: BinaryOp::Mul, left: v_param, right: two });
        let out_local = Bundle { name: "out".into(), strands: vec![Strand { name: "y".into(), index: 0, expr: y_expr }] };
        let out_idx = program.pool.alloc(Expr::Num(0.0.into()));
        let out_ref = program.pool.alloc(Expr::Index { bundle: "out".into(), index: out_idx, field: Some("y".into()) });
        program.spindles.insert(
            "double".into(),
            Spindle { name: "double".into(), params: vec!["v".into()], locals: vec![out_local], returns: vec![out_ref] },
        );

        let arg = program.pool.alloc(Expr::Num(21.0.into()));
        let call = program.pool.alloc(Expr::Call { spindle: "double".into(), args: vec![arg] });
        let extract = program.pool.alloc(Expr::Extract { call, index: 0 });

        let ctx = EvalCtx::new(&program, BTreeMap::new());
        assert_eq!(eval(&ctx, extract), 42.0);
    }
}
