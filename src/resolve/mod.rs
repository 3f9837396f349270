//! C3 and C4: the two provenance resolvers.

pub mod nested;
pub mod package;

pub use nested::NestedProvenanceResolver;
pub use package::PackageProvenanceResolver;
