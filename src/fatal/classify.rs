/*!
 * Fatal Error Classification
 * Separates storage faults outside the library's control from internal defects
 */

use serde::{Deserialize, Serialize};

const DATABASE_BROKEN_MARKERS: [&str; 5] = [
    "Wrong key or database is corrupted",
    "SQL logic error or missing database",
    "database disk image is malformed",
    "file is encrypted or is not a database",
    "unsupported file format",
];

const DISK_FULL_MARKERS: [&str; 2] = [
    "PosixError : No space left on device",
    "database or disk is full",
];

const IO_MARKER: &str = "I/O error";

/// Class of an unrecoverable engine error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FatalErrorKind {
    /// Local database is corrupted or unreadable
    DatabaseBroken,
    /// Storage ran out of space
    DiskFull,
    /// Other storage I/O failure
    Io,
    /// Defect inside the engine or the dispatch layer
    Internal,
}

impl FatalErrorKind {
    /// Classify an engine error message
    pub fn classify(message: &str) -> Self {
        if is_database_broken_error(message) {
            FatalErrorKind::DatabaseBroken
        } else if is_disk_full_error(message) {
            FatalErrorKind::DiskFull
        } else if message.contains(IO_MARKER) {
            FatalErrorKind::Io
        } else {
            FatalErrorKind::Internal
        }
    }

    /// External causes the host may react to, e.g. by offering a reinstall
    pub fn is_external(self) -> bool {
        !matches!(self, FatalErrorKind::Internal)
    }
}

pub fn is_database_broken_error(message: &str) -> bool {
    DATABASE_BROKEN_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

pub fn is_disk_full_error(message: &str) -> bool {
    DISK_FULL_MARKERS.iter().any(|marker| message.contains(marker))
}

pub fn is_external_error(message: &str) -> bool {
    FatalErrorKind::classify(message).is_external()
}
