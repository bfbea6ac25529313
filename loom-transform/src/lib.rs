//! IR transformation library used by the cache manager and the pre-backend
//! pipeline (§4.D): param and coordinate substitution, spindle-call inlining with
//! cache retargeting, cycle detection within spindle bodies, purity predicates, and
//! temporal-remap-to-cache conversion.

mod cycle;
mod inline;
mod purity;
mod remap_to_cache;
mod select;
mod substitute;

pub use cycle::{find_cyclic_caches, LocalRef};
pub use inline::{build_spindle_substitution, inline_call};
pub use purity::{references_stateful_signal, spindle_can_be_function};
pub use remap_to_cache::{convert_remaps_in_spindle, convert_remaps_to_caches, FIXED_HISTORY_SIZE};
pub use select::clamp_select_index;
pub use substitute::{apply_remap, substitute, ParamSubst, Substitution};
