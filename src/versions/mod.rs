pub(crate) mod iterator;
pub(crate) mod model;

pub use iterator::VersionListIterator;
pub use model::{ObjectVersion, VersionHistory};
