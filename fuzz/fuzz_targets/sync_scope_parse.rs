#![no_main]

use libfuzzer_sys::fuzz_target;
use rex_sync::SyncScope;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    if let Some(scope) = SyncScope::parse(&raw) {
        // The canonical word round-trips to the same scope.
        assert_eq!(SyncScope::parse(scope.as_str()), Some(scope));
        assert!(!scope.kinds().is_empty());
        if scope.includes_marketing() {
            assert!(matches!(scope, SyncScope::Contacts | SyncScope::All));
        }
    }
});
