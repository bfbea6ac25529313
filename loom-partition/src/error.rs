use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PartitionError {
    #[error("program declares no bundle matching a registered backend sink")]
    NoSinkBundles,
}
