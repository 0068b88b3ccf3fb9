//! Release and migration archives

pub mod archive;
pub mod excludes;
pub mod packager;

pub use archive::{Archive, ArchiveBuilder};
pub use excludes::ExcludeSet;
pub use packager::Packager;
