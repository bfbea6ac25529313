use crate::coord::{AccessMode, CoordAxis};
use crate::hardware::HardwareToken;

// ARITY
// ================================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    /// At least this many arguments (used by `select` and resource built-ins whose
    /// shape is expanded per output channel by lowering).
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, n: usize) -> bool {
        match self {
            Arity::Exact(k) => n == k,
            Arity::AtLeast(k) => n >= k,
        }
    }
}

// PRIMITIVE SPEC
// ================================================================================================

/// Static metadata for one built-in function: its arity, whether it is stateful,
/// which hardware tokens invoking it implies, and how it alters the access mode of
/// coordinates on `me` (§3 "Primitive spec").
#[derive(Debug, Clone, Copy)]
pub struct PrimitiveSpec {
    pub name: &'static str,
    pub arity: Arity,
    pub stateful: bool,
    pub hardware: &'static [HardwareToken],
    pub coord_overrides: &'static [(CoordAxis, AccessMode)],
}

macro_rules! spec {
    ($name:literal, $arity:expr) => {
        PrimitiveSpec {
            name: $name,
            arity: $arity,
            stateful: false,
            hardware: &[],
            coord_overrides: &[],
        }
    };
}

const MICROPHONE_COORD_OVERRIDES: &[(CoordAxis, AccessMode)] = &[(CoordAxis::T, AccessMode::Bound)];

/// The canonical table of built-ins (§6). Backends may additionally register their
/// own owned built-ins with `loom-backend`, but these core semantics never change.
pub fn primitive_spec(name: &str) -> Option<PrimitiveSpec> {
    Some(match name {
        // Math (IEEE-754 float semantics).
        "sin" | "cos" | "tan" | "asin" | "acos" | "atan" | "abs" | "floor" | "ceil" | "round"
        | "sqrt" | "exp" | "log" | "log2" | "sign" | "fract" => spec!(name_static(name), Arity::Exact(1)),
        "atan2" | "pow" => spec!(name_static(name), Arity::Exact(2)),

        // Utility.
        "min" | "max" | "mod" | "step" => spec!(name_static(name), Arity::Exact(2)),
        "clamp" | "lerp" | "mix" | "smoothstep" => spec!(name_static(name), Arity::Exact(3)),

        // Control.
        "select" => spec!("select", Arity::AtLeast(1)),

        // Noise.
        "noise" => spec!("noise", Arity::AtLeast(1)),

        // Stateful.
        "cache" => PrimitiveSpec {
            name: "cache",
            arity: Arity::Exact(4),
            stateful: true,
            hardware: &[],
            coord_overrides: &[],
        },

        // Hardware (implementation-owned).
        "camera" => PrimitiveSpec {
            name: "camera",
            arity: Arity::Exact(3),
            stateful: false,
            hardware: &[HardwareToken::Camera],
            coord_overrides: &[],
        },
        "microphone" => PrimitiveSpec {
            name: "microphone",
            arity: Arity::Exact(2),
            stateful: false,
            hardware: &[HardwareToken::Microphone],
            coord_overrides: MICROPHONE_COORD_OVERRIDES,
        },
        "texture" => spec!("texture", Arity::Exact(4)),
        "sample" => spec!("sample", Arity::Exact(3)),
        "mouse" => spec!("mouse", Arity::Exact(1)),

        _ => return None,
    })
}

/// Built-in names are a closed, 'static set; this maps the runtime `&str` match arm
/// back to its canonical static string without an allocation.
fn name_static(name: &str) -> &'static str {
    const NAMES: &[&str] = &[
        "sin", "cos", "tan", "asin", "acos", "atan", "abs", "floor", "ceil", "round", "sqrt",
        "exp", "log", "log2", "sign", "fract", "atan2", "pow", "min", "max", "mod", "step",
        "clamp", "lerp", "mix", "smoothstep",
    ];
    NAMES.iter().find(|n| **n == name).copied().unwrap_or("unknown")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn microphone_forces_t_bound() {
        let spec = primitive_spec("microphone").unwrap();
        assert!(spec.hardware.contains(&HardwareToken::Microphone));
        assert_eq!(spec.coord_overrides, MICROPHONE_COORD_OVERRIDES);
    }

    #[test]
    fn cache_is_stateful_with_fixed_arity() {
        let spec = primitive_spec("cache").unwrap();
        assert!(spec.stateful);
        assert_eq!(spec.arity, Arity::Exact(4));
    }

    #[test]
    fn select_is_variadic() {
        let spec = primitive_spec("select").unwrap();
        assert!(spec.arity.accepts(1));
        assert!(spec.arity.accepts(5));
    }

    #[test]
    fn unknown_builtin_is_none() {
        assert!(primitive_spec("frobnicate").is_none());
    }
}
