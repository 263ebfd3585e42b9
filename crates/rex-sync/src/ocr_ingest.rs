//! Contact extraction from OCR text.
//!
//! Scanned business cards and tenant rosters come back from the OCR
//! collaborator as loose text; this walks it line by line and recovers
//! `(name, email, phone)` triples. A fresh name after a completed card
//! starts the next contact, so multi-contact documents parse too.

use regex::Regex;

const NAME_PATTERN: &str = r"[A-Z][a-z]+ [A-Z][a-z]+";
const EMAIL_PATTERN: &str = r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b";
const PHONE_PATTERN: &str = r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b";

/// Fallback display name for contacts recognized only by email or phone.
pub const UNKNOWN_CONTACT_NAME: &str = "Unknown";

/// One contact recovered from OCR text. Kept only when at least an email or
/// a phone number was recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedContact {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Default)]
struct Draft {
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
}

impl Draft {
    fn has_reachable_detail(&self) -> bool {
        self.email.is_some() || self.phone.is_some()
    }

    fn finish(self) -> Option<ParsedContact> {
        if !self.has_reachable_detail() {
            return None;
        }
        Some(ParsedContact {
            name: self
                .name
                .unwrap_or_else(|| UNKNOWN_CONTACT_NAME.to_string()),
            email: self.email,
            phone: self.phone,
        })
    }
}

/// Line-oriented contact parser over compiled patterns.
pub struct ContactTextParser {
    name: Regex,
    email: Regex,
    phone: Regex,
}

impl ContactTextParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            name: Regex::new(NAME_PATTERN)?,
            email: Regex::new(EMAIL_PATTERN)?,
            phone: Regex::new(PHONE_PATTERN)?,
        })
    }

    /// Extracts every contact with at least an email or phone from `text`.
    pub fn contacts_from_text(&self, text: &str) -> Vec<ParsedContact> {
        let mut contacts = Vec::new();
        let mut draft = Draft::default();
        for line in text.lines() {
            if let Some(hit) = self.name.find(line) {
                if draft.name.is_some() && draft.has_reachable_detail() {
                    // Completed card; this name opens the next one.
                    contacts.extend(draft.finish());
                    draft = Draft::default();
                }
                // First recognized name wins; later name-shaped lines on the
                // same card are usually company names.
                if draft.name.is_none() {
                    draft.name = Some(hit.as_str().to_string());
                }
            }
            if draft.email.is_none() {
                if let Some(hit) = self.email.find(line) {
                    draft.email = Some(hit.as_str().to_string());
                }
            }
            if draft.phone.is_none() {
                if let Some(hit) = self.phone.find(line) {
                    draft.phone = Some(hit.as_str().to_string());
                }
            }
        }
        contacts.extend(draft.finish());
        contacts
    }
}
