#![no_main]

use std::sync::OnceLock;

use libfuzzer_sys::fuzz_target;
use rex_providers::EntityRecord;
use rex_sync::ContactTextParser;

fn parser() -> &'static ContactTextParser {
    static PARSER: OnceLock<ContactTextParser> = OnceLock::new();
    PARSER.get_or_init(|| ContactTextParser::new().expect("patterns compile"))
}

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let contacts = parser().contacts_from_text(&text);

    // Each contact needs at least one detail line, plus one end-of-text flush.
    assert!(contacts.len() <= text.lines().count() + 1);
    for contact in &contacts {
        assert!(!contact.name.trim().is_empty());
        assert!(contact.email.is_some() || contact.phone.is_some());
        if let Some(email) = &contact.email {
            assert!(email.contains('@'));
        }

        let entity = EntityRecord::Contact {
            id: None,
            name: contact.name.clone(),
            email: contact.email.clone(),
            phone: contact.phone.clone(),
            company: None,
        };
        let fingerprint = entity.fingerprint();
        assert_eq!(fingerprint.len(), 64);
        assert!(fingerprint.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(entity.fingerprint(), fingerprint);
    }
});
