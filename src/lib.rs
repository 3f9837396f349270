#![doc = include_str!("../README.md")]
#![warn(rustdoc::all)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
extern crate tracing;

pub mod error;

pub mod model;
pub use model::{
    ArtifactProvenance, Finding, Identifier, Issue, KnownProvenance, Location, NestedProvenance,
    NestedProvenanceError, NestedProvenanceScanResult, Origin, Package, Provenance, RepositoryProvenance,
    ScanResult, ScanSummary, ScannerDetails, ScannerMatcher, ScannerOptions, Severity, SourceArtifact,
    VcsInfo,
};

pub mod env;
pub use env::Environment;

pub mod config;
pub use config::{ContextKind, ScanConfig, ScanContext};

pub mod report;

pub mod utils;

pub mod worktree;
pub use worktree::{WorkingTreeCache, WorkingTreeKey};

pub mod vcs;
pub use vcs::{VcsBackend, VcsBackendError, VcsRegistry};

pub mod download;
pub use download::{ArtifactFetcher, DefaultDownloader, Downloader, ReqwestArtifactFetcher};

pub mod store;

pub mod resolve;
pub use resolve::{NestedProvenanceResolver, PackageProvenanceResolver};

pub mod scanner;
pub use scanner::{PackageScanner, PathScanner, ProvenanceScanner, ScannerIdentity};

pub mod assemble;

pub mod controller;
pub use controller::ScanController;

pub use error::{DownloadError, FatalError, ScanError, WorkingTreeError};
