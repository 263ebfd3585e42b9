#![no_main]

use libfuzzer_sys::fuzz_target;
use rex_commands::classify_intent;

fuzz_target!(|data: &[u8]| {
    let message = String::from_utf8_lossy(data);
    let intent = classify_intent(&message);
    assert!(!intent.as_str().trim().is_empty());

    // Classification is deterministic and already case-folds internally.
    assert_eq!(classify_intent(&message), intent);
    assert_eq!(classify_intent(&message.to_lowercase()), intent);
});
