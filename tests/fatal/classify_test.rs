/*!
 * Fatal Error Classification Tests
 */

use proptest::prelude::*;
use tdclient::fatal::{is_database_broken_error, is_disk_full_error, is_external_error};
use tdclient::FatalErrorKind;

#[test]
fn test_malformed_database_is_broken_not_full() {
    let message = "[ 0][t 1][1663524892.9][SqliteDb.cpp:120][!Td] database disk image is malformed: code 11";
    assert!(is_database_broken_error(message));
    assert!(!is_disk_full_error(message));
    assert!(is_external_error(message));
    assert_eq!(FatalErrorKind::classify(message), FatalErrorKind::DatabaseBroken);
}

#[test]
fn test_disk_full_markers() {
    for message in [
        "Failed to write: PosixError : No space left on device : 28",
        "database or disk is full",
    ] {
        assert!(is_disk_full_error(message), "{message}");
        assert_eq!(FatalErrorKind::classify(message), FatalErrorKind::DiskFull);
    }
}

#[test]
fn test_io_error_is_external() {
    let kind = FatalErrorKind::classify("pread failed: I/O error");
    assert_eq!(kind, FatalErrorKind::Io);
    assert!(kind.is_external());
}

#[test]
fn test_internal_defects() {
    for message in ["Check `x > 0` failed", "Lost promise", ""] {
        assert_eq!(FatalErrorKind::classify(message), FatalErrorKind::Internal);
        assert!(!is_external_error(message));
    }
}

proptest! {
    #[test]
    fn prop_classification_is_consistent(message in ".{0,80}") {
        let kind = FatalErrorKind::classify(&message);
        prop_assert_eq!(kind.is_external(), is_external_error(&message));
        if is_database_broken_error(&message) {
            prop_assert_eq!(kind, FatalErrorKind::DatabaseBroken);
        }
    }
}
