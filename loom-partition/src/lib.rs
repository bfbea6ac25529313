//! Groups a program's strands into per-backend swatches (§4.F): a breadth-first
//! walk from every sink bundle assigns each reachable strand to the backend that
//! directly requires its hardware, or else to whichever consumer reaches it first,
//! recording a cross-domain slot for every other consumer instead of duplicating
//! the computation.

mod error;
mod partition;
mod swatch;

pub use error::PartitionError;
pub use partition::partition;
pub use swatch::{CrossDomainSlot, Swatch};
