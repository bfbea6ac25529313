use serde::{Deserialize, Serialize};

// HARDWARE TOKEN
// ================================================================================================

/// A tagged hardware requirement a strand's expression may carry. Backends publish
/// the set of tokens they own (§4.G); the annotation pass (§4.C) unions the tokens
/// implied by every built-in a strand transitively touches.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HardwareToken {
    Camera,
    Microphone,
    Speaker,
    Gpu,
    Custom(String),
}

impl std::fmt::Display for HardwareToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HardwareToken::Camera => f.write_str("camera"),
            HardwareToken::Microphone => f.write_str("microphone"),
            HardwareToken::Speaker => f.write_str("speaker"),
            HardwareToken::Gpu => f.write_str("gpu"),
            HardwareToken::Custom(name) => write!(f, "custom({name})"),
        }
    }
}
