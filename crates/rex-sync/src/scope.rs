use rex_providers::EntityKind;

/// Which entity kinds one sync invocation targets.
///
/// `Crm` covers the four CRM kinds; `All` additionally fans surviving
/// contacts out to the configured marketing platforms, as does the plain
/// contact sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncScope {
    Contacts,
    Companies,
    Properties,
    Spaces,
    Crm,
    All,
}

const CRM_KINDS: [EntityKind; 4] = [
    EntityKind::Contact,
    EntityKind::Company,
    EntityKind::Property,
    EntityKind::Space,
];

impl SyncScope {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "contacts" | "contact" => Some(SyncScope::Contacts),
            "companies" | "company" => Some(SyncScope::Companies),
            "properties" | "property" => Some(SyncScope::Properties),
            "spaces" | "space" => Some(SyncScope::Spaces),
            "crm" => Some(SyncScope::Crm),
            "all" => Some(SyncScope::All),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncScope::Contacts => "contacts",
            SyncScope::Companies => "companies",
            SyncScope::Properties => "properties",
            SyncScope::Spaces => "spaces",
            SyncScope::Crm => "crm",
            SyncScope::All => "all",
        }
    }

    pub fn kinds(&self) -> &'static [EntityKind] {
        match self {
            SyncScope::Contacts => &CRM_KINDS[0..1],
            SyncScope::Companies => &CRM_KINDS[1..2],
            SyncScope::Properties => &CRM_KINDS[2..3],
            SyncScope::Spaces => &CRM_KINDS[3..4],
            SyncScope::Crm | SyncScope::All => &CRM_KINDS,
        }
    }

    pub fn includes(&self, kind: EntityKind) -> bool {
        self.kinds().contains(&kind)
    }

    /// Whether surviving contacts also fan out to marketing platforms.
    pub fn includes_marketing(&self) -> bool {
        matches!(self, SyncScope::Contacts | SyncScope::All)
    }
}

impl std::fmt::Display for SyncScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_parse_accepts_scope_words_and_singular_aliases() {
        assert_eq!(SyncScope::parse("contacts"), Some(SyncScope::Contacts));
        assert_eq!(SyncScope::parse(" Contact "), Some(SyncScope::Contacts));
        assert_eq!(SyncScope::parse("CRM"), Some(SyncScope::Crm));
        assert_eq!(SyncScope::parse("all"), Some(SyncScope::All));
        assert_eq!(SyncScope::parse("deals"), None);
    }

    #[test]
    fn unit_kind_coverage_matches_scope() {
        assert_eq!(SyncScope::Contacts.kinds(), &[EntityKind::Contact]);
        assert_eq!(SyncScope::Spaces.kinds(), &[EntityKind::Space]);
        assert_eq!(SyncScope::Crm.kinds().len(), 4);
        assert!(SyncScope::Crm.includes(EntityKind::Property));
        assert!(!SyncScope::Companies.includes(EntityKind::Contact));
    }

    #[test]
    fn unit_marketing_fan_out_applies_to_contacts_and_all_only() {
        assert!(SyncScope::Contacts.includes_marketing());
        assert!(SyncScope::All.includes_marketing());
        assert!(!SyncScope::Crm.includes_marketing());
        assert!(!SyncScope::Companies.includes_marketing());
    }
}
