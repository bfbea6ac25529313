//! Hand-rolled (de)serialisation for the external, JSON-like IR format (§6). A
//! derive-based `Serialize`/`Deserialize` on `Expr`/`Program` would leak the arena
//! index scheme as the wire format; instead every expression is walked recursively
//! into (and out of) a self-describing tagged object, and legacy `camera`/
//! `texture`/`microphone` top-level shapes decode into their `Builtin` equivalent.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::errors::ParseError;
use crate::expr::{BinaryOp, Expr, ExprId, ExprPool, UnaryOp};
use crate::program::{Bundle, OrderEntry, Program, Spindle, Strand};

const LEGACY_BUILTIN_TYPES: [&str; 3] = ["camera", "texture", "microphone"];

fn binary_op_str(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
        BinaryOp::Pow => "^",
        BinaryOp::Lt => "<",
        BinaryOp::Gt => ">",
        BinaryOp::Le => "<=",
        BinaryOp::Ge => ">=",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::And => "&&",
        BinaryOp::Or => "||",
    }
}

fn parse_binary_op(s: &str) -> Result<BinaryOp, ParseError> {
    Ok(match s {
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Sub,
        "*" => BinaryOp::Mul,
        "/" => BinaryOp::Div,
        "%" => BinaryOp::Mod,
        "^" => BinaryOp::Pow,
        "<" => BinaryOp::Lt,
        ">" => BinaryOp::Gt,
        "<=" => BinaryOp::Le,
        ">=" => BinaryOp::Ge,
        "==" => BinaryOp::Eq,
        "!=" => BinaryOp::Ne,
        "&&" => BinaryOp::And,
        "||" => BinaryOp::Or,
        other => return Err(ParseError::InvalidStructure(format!("unknown binary op '{other}'"))),
    })
}

fn unary_op_str(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Neg => "-",
        UnaryOp::Not => "!",
    }
}

fn parse_unary_op(s: &str) -> Result<UnaryOp, ParseError> {
    Ok(match s {
        "-" => UnaryOp::Neg,
        "!" => UnaryOp::Not,
        other => return Err(ParseError::InvalidStructure(format!("unknown unary op '{other}'"))),
    })
}

// EXPR <-> JSON
// ================================================================================================

pub fn serialize_expr(pool: &ExprPool, id: ExprId) -> Value {
    match pool.get(id) {
        Expr::Num(n) => json!({"type": "num", "value": n.get()}),
        Expr::Param(name) => json!({"type": "param", "name": name}),
        Expr::Index { bundle, index, field } => {
            json!({
                "type": "index",
                "bundle": bundle,
                "index": serialize_expr(pool, *index),
                "field": field,
            })
        },
        Expr::Binary { op, left, right } => json!({
            "type": "binary",
            "op": binary_op_str(*op),
            "left": serialize_expr(pool, *left),
            "right": serialize_expr(pool, *right),
        }),
        Expr::Unary { op, operand } => json!({
            "type": "unary",
            "op": unary_op_str(*op),
            "operand": serialize_expr(pool, *operand),
        }),
        Expr::Call { spindle, args } => json!({
            "type": "call",
            "spindle": spindle,
            "args": args.iter().map(|a| serialize_expr(pool, *a)).collect::<Vec<_>>(),
        }),
        Expr::Extract { call, index } => json!({
            "type": "extract",
            "call": serialize_expr(pool, *call),
            "index": index,
        }),
        Expr::Builtin { name, args } => json!({
            "type": "builtin",
            "name": name,
            "args": args.iter().map(|a| serialize_expr(pool, *a)).collect::<Vec<_>>(),
        }),
        Expr::Remap { base, substitutions } => {
            let mut subs = Map::new();
            for (k, v) in substitutions {
                subs.insert(k.clone(), serialize_expr(pool, *v));
            }
            json!({
                "type": "remap",
                "base": serialize_expr(pool, *base),
                "substitutions": Value::Object(subs),
            })
        },
        Expr::CacheRead { cache_id, tap_index } => json!({
            "type": "cacheRead",
            "cacheId": cache_id,
            "tapIndex": tap_index,
        }),
    }
}

fn field<'a>(obj: &'a Map<String, Value>, node: &str, name: &str) -> Result<&'a Value, ParseError> {
    obj.get(name).ok_or_else(|| ParseError::MissingRequiredField {
        node: node.to_string(),
        field: name.to_string(),
    })
}

fn as_f64(value: &Value, node: &str, name: &str) -> Result<f64, ParseError> {
    value.as_f64().ok_or_else(|| {
        ParseError::InvalidStructure(format!("'{name}' on '{node}' is not a number"))
    })
}

fn as_str<'a>(value: &'a Value, node: &str, name: &str) -> Result<&'a str, ParseError> {
    value
        .as_str()
        .ok_or_else(|| ParseError::InvalidStructure(format!("'{name}' on '{node}' is not a string")))
}

fn as_usize(value: &Value, node: &str, name: &str) -> Result<usize, ParseError> {
    value
        .as_u64()
        .map(|v| v as usize)
        .ok_or_else(|| ParseError::InvalidStructure(format!("'{name}' on '{node}' is not an index")))
}

pub fn deserialize_expr(pool: &mut ExprPool, value: &Value) -> Result<ExprId, ParseError> {
    let obj = value
        .as_object()
        .ok_or_else(|| ParseError::InvalidStructure("expression is not an object".into()))?;
    let ty = as_str(field(obj, "expr", "type")?, "expr", "type")?;

    if LEGACY_BUILTIN_TYPES.contains(&ty) {
        let args = match obj.get("args").and_then(Value::as_array) {
            Some(args) => args
                .iter()
                .map(|a| deserialize_expr(pool, a))
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };
        return Ok(pool.alloc(Expr::Builtin { name: ty.to_string(), args }));
    }

    let node = pool_alloc_node(pool, ty, obj)?;
    Ok(pool.alloc(node))
}

fn pool_alloc_node(pool: &mut ExprPool, ty: &str, obj: &Map<String, Value>) -> Result<Expr, ParseError> {
    Ok(match ty {
        "num" => Expr::Num(as_f64(field(obj, "num", "value")?, "num", "value")?.into()),
        "param" => Expr::Param(as_str(field(obj, "param", "name")?, "param", "name")?.to_string()),
        "index" => {
            let bundle = as_str(field(obj, "index", "bundle")?, "index", "bundle")?.to_string();
            let index = deserialize_expr(pool, field(obj, "index", "index")?)?;
            let field_name = match obj.get("field") {
                Some(Value::String(s)) => Some(s.clone()),
                _ => None,
            };
            Expr::Index { bundle, index, field: field_name }
        },
        "binary" => {
            let op = parse_binary_op(as_str(field(obj, "binary", "op")?, "binary", "op")?)?;
            let left = deserialize_expr(pool, field(obj, "binary", "left")?)?;
            let right = deserialize_expr(pool, field(obj, "binary", "right")?)?;
            Expr::Binary { op, left, right }
        },
        "unary" => {
            let op = parse_unary_op(as_str(field(obj, "unary", "op")?, "unary", "op")?)?;
            let operand = deserialize_expr(pool, field(obj, "unary", "operand")?)?;
            Expr::Unary { op, operand }
        },
        "call" => {
            let spindle = as_str(field(obj, "call", "spindle")?, "call", "spindle")?.to_string();
            let args = field(obj, "call", "args")?
                .as_array()
                .ok_or_else(|| ParseError::InvalidStructure("'args' on 'call' is not an array".into()))?
                .iter()
                .map(|a| deserialize_expr(pool, a))
                .collect::<Result<Vec<_>, _>>()?;
            Expr::Call { spindle, args }
        },
        "extract" => {
            let call = deserialize_expr(pool, field(obj, "extract", "call")?)?;
            let index = as_usize(field(obj, "extract", "index")?, "extract", "index")?;
            Expr::Extract { call, index }
        },
        "builtin" => {
            let name = as_str(field(obj, "builtin", "name")?, "builtin", "name")?.to_string();
            let args = field(obj, "builtin", "args")?
                .as_array()
                .ok_or_else(|| ParseError::InvalidStructure("'args' on 'builtin' is not an array".into()))?
                .iter()
                .map(|a| deserialize_expr(pool, a))
                .collect::<Result<Vec<_>, _>>()?;
            Expr::Builtin { name, args }
        },
        "remap" => {
            let base = deserialize_expr(pool, field(obj, "remap", "base")?)?;
            let subs_obj = field(obj, "remap", "substitutions")?
                .as_object()
                .ok_or_else(|| ParseError::InvalidStructure("'substitutions' on 'remap' is not an object".into()))?;
            let mut substitutions = BTreeMap::new();
            for (k, v) in subs_obj {
                substitutions.insert(k.clone(), deserialize_expr(pool, v)?);
            }
            Expr::Remap { base, substitutions }
        },
        "cacheRead" => {
            let cache_id = field(obj, "cacheRead", "cacheId")?
                .as_u64()
                .ok_or_else(|| ParseError::InvalidStructure("'cacheId' on 'cacheRead' is not an integer".into()))?
                as u32;
            let tap_index = as_usize(field(obj, "cacheRead", "tapIndex")?, "cacheRead", "tapIndex")?;
            Expr::CacheRead { cache_id, tap_index }
        },
        other => return Err(ParseError::UnknownExprType(other.to_string())),
    })
}

// PROGRAM <-> JSON
// ================================================================================================

fn serialize_bundle(pool: &ExprPool, bundle: &Bundle) -> Value {
    json!({
        "name": bundle.name,
        "strands": bundle.strands.iter().map(|s| json!({
            "name": s.name,
            "index": s.index,
            "expr": serialize_expr(pool, s.expr),
        })).collect::<Vec<_>>(),
    })
}

fn deserialize_bundle(pool: &mut ExprPool, value: &Value) -> Result<Bundle, ParseError> {
    let obj = value
        .as_object()
        .ok_or_else(|| ParseError::InvalidStructure("bundle is not an object".into()))?;
    let name = as_str(field(obj, "bundle", "name")?, "bundle", "name")?.to_string();
    let strands_json = field(obj, "bundle", "strands")?
        .as_array()
        .ok_or_else(|| ParseError::InvalidStructure("'strands' is not an array".into()))?;
    let mut strands = Vec::with_capacity(strands_json.len());
    for s in strands_json {
        let s_obj = s
            .as_object()
            .ok_or_else(|| ParseError::InvalidStructure("strand is not an object".into()))?;
        let s_name = as_str(field(s_obj, "strand", "name")?, "strand", "name")?.to_string();
        let index = as_usize(field(s_obj, "strand", "index")?, "strand", "index")?;
        let expr = deserialize_expr(pool, field(s_obj, "strand", "expr")?)?;
        strands.push(Strand { name: s_name, index, expr });
    }
    Ok(Bundle { name, strands })
}

fn serialize_spindle(pool: &ExprPool, spindle: &Spindle) -> Value {
    json!({
        "name": spindle.name,
        "params": spindle.params,
        "locals": spindle.locals.iter().map(|b| serialize_bundle(pool, b)).collect::<Vec<_>>(),
        "returns": spindle.returns.iter().map(|r| serialize_expr(pool, *r)).collect::<Vec<_>>(),
    })
}

fn deserialize_spindle(pool: &mut ExprPool, value: &Value) -> Result<Spindle, ParseError> {
    let obj = value
        .as_object()
        .ok_or_else(|| ParseError::InvalidStructure("spindle is not an object".into()))?;
    let name = as_str(field(obj, "spindle", "name")?, "spindle", "name")?.to_string();
    let params = field(obj, "spindle", "params")?
        .as_array()
        .ok_or_else(|| ParseError::InvalidStructure("'params' is not an array".into()))?
        .iter()
        .map(|p| p.as_str().map(str::to_string))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| ParseError::InvalidStructure("'params' contains a non-string".into()))?;
    let locals_json = field(obj, "spindle", "locals")?
        .as_array()
        .ok_or_else(|| ParseError::InvalidStructure("'locals' is not an array".into()))?;
    let mut locals = Vec::with_capacity(locals_json.len());
    for l in locals_json {
        locals.push(deserialize_bundle(pool, l)?);
    }
    let returns_json = field(obj, "spindle", "returns")?
        .as_array()
        .ok_or_else(|| ParseError::InvalidStructure("'returns' is not an array".into()))?;
    let mut returns = Vec::with_capacity(returns_json.len());
    for r in returns_json {
        returns.push(deserialize_expr(pool, r)?);
    }
    Ok(Spindle { name, params, locals, returns })
}

pub fn serialize_program(program: &Program) -> Value {
    let mut bundles = Map::new();
    for (name, bundle) in &program.bundles {
        bundles.insert(name.clone(), serialize_bundle(&program.pool, bundle));
    }
    let mut spindles = Map::new();
    for (name, spindle) in &program.spindles {
        spindles.insert(name.clone(), serialize_spindle(&program.pool, spindle));
    }
    let order = program
        .order
        .iter()
        .map(|e| {
            let mut obj = Map::new();
            obj.insert("bundle".to_string(), Value::String(e.bundle.clone()));
            if let Some(strands) = &e.strands {
                obj.insert("strands".to_string(), json!(strands));
            }
            Value::Object(obj)
        })
        .collect::<Vec<_>>();

    json!({
        "bundles": bundles,
        "spindles": spindles,
        "order": order,
        "resources": program.resources,
        "textResources": program.text_resources,
    })
}

pub fn deserialize_program(value: &Value) -> Result<Program, ParseError> {
    let obj = value
        .as_object()
        .ok_or_else(|| ParseError::InvalidStructure("program is not an object".into()))?;
    let mut pool = ExprPool::new();

    let mut bundles = BTreeMap::new();
    if let Some(Value::Object(map)) = obj.get("bundles") {
        for (name, v) in map {
            bundles.insert(name.clone(), deserialize_bundle(&mut pool, v)?);
        }
    }

    let mut spindles = BTreeMap::new();
    if let Some(Value::Object(map)) = obj.get("spindles") {
        for (name, v) in map {
            spindles.insert(name.clone(), deserialize_spindle(&mut pool, v)?);
        }
    }

    let mut order = Vec::new();
    if let Some(Value::Array(entries)) = obj.get("order") {
        for entry in entries {
            let e_obj = entry
                .as_object()
                .ok_or_else(|| ParseError::InvalidStructure("order entry is not an object".into()))?;
            let bundle = as_str(field(e_obj, "order", "bundle")?, "order", "bundle")?.to_string();
            let strands = match e_obj.get("strands") {
                Some(Value::Array(items)) => Some(
                    items
                        .iter()
                        .map(|i| i.as_u64().map(|v| v as usize))
                        .collect::<Option<Vec<_>>>()
                        .ok_or_else(|| {
                            ParseError::InvalidStructure("order.strands contains a non-index".into())
                        })?,
                ),
                _ => None,
            };
            order.push(OrderEntry { bundle, strands });
        }
    }

    let resources = match obj.get("resources") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|i| i.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| ParseError::InvalidStructure("'resources' contains a non-string".into()))?,
        _ => Vec::new(),
    };
    let text_resources = match obj.get("textResources") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|i| i.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| ParseError::InvalidStructure("'textResources' contains a non-string".into()))?,
        _ => Vec::new(),
    };

    Ok(Program { pool, bundles, spindles, order, resources, text_resources })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::Strand;

    fn sample_program() -> Program {
        let mut program = Program::new();
        let x_index = program.pool.alloc(Expr::Num(0.0.into()));
        let x = program.pool.alloc(Expr::Index {
            bundle: "me".into(),
            index: x_index,
            field: Some("x".into()),
        });
        let bundle = Bundle {
            name: "display".into(),
            strands: vec![Strand { name: "r".into(), index: 0, expr: x }],
        };
        program.bundles.insert("display".into(), bundle);
        program.order.push(OrderEntry { bundle: "display".into(), strands: None });
        program.intern_resource("tex/a.png");
        program
    }

    #[test]
    fn round_trip_is_structurally_identical() {
        let program = sample_program();
        let json = serialize_program(&program);
        let decoded = deserialize_program(&json).unwrap();

        assert_eq!(decoded.bundles.keys().collect::<Vec<_>>(), program.bundles.keys().collect::<Vec<_>>());
        assert_eq!(decoded.resources, program.resources);
        assert_eq!(decoded.order, program.order);

        let orig_expr = program.bundle("display").unwrap().strand(0).unwrap().expr;
        let decoded_expr = decoded.bundle("display").unwrap().strand(0).unwrap().expr;
        assert!(program.pool.structurally_eq(orig_expr, decoded_expr, &decoded.pool));
    }

    #[test]
    fn legacy_camera_shape_decodes_to_builtin() {
        let legacy = json!({"type": "camera", "args": [{"type": "num", "value": 0.5}]});
        let mut pool = ExprPool::new();
        let id = deserialize_expr(&mut pool, &legacy).unwrap();
        match pool.get(id) {
            Expr::Builtin { name, args } => {
                assert_eq!(name, "camera");
                assert_eq!(args.len(), 1);
            },
            other => panic!("expected builtin, got {other:?}"),
        }
    }

    #[test]
    fn missing_resources_default_to_empty() {
        let json = json!({"bundles": {}, "spindles": {}, "order": []});
        let program = deserialize_program(&json).unwrap();
        assert!(program.resources.is_empty());
        assert!(program.text_resources.is_empty());
    }
}
