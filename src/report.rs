//! Thin wrappers around `tracing` call sites, mirroring the teacher's
//! `report` module: one function per notable event so the log message text
//! lives in one place instead of being duplicated at every call site.

use crate::model::{Identifier, KnownProvenance};

pub fn resolving_provenance(id: &Identifier) {
    debug!("resolving provenance for {id}");
}

pub fn provenance_resolved(id: &Identifier, provenance: &KnownProvenance) {
    debug!("resolved provenance for {id}: {provenance}");
}

pub fn provenance_unresolvable(id: &Identifier, message: &str) {
    warn!("provenance unresolvable for {id}: {message}");
}

pub fn cache_hit(scanner: &str, provenance: &KnownProvenance) {
    trace!("cache hit for scanner \"{scanner}\" on {provenance}");
}

pub fn cache_miss(scanner: &str, provenance: &KnownProvenance) {
    trace!("cache miss for scanner \"{scanner}\" on {provenance}");
}

pub fn dispatching_scanner(scanner: &str, provenance: &KnownProvenance) {
    debug!("dispatching scanner \"{scanner}\" for {provenance}");
}

pub fn download_failed(provenance: &KnownProvenance, message: &str) {
    error!("could not download provenance {provenance}: {message}");
}

pub fn scan_storage_write_failed(message: &str) {
    warn!("scan storage write failed, dropping: {message}");
}
