use std::collections::BTreeMap;

use rex_core::entity_fingerprint;
use serde::{Deserialize, Serialize};

/// Public enum `EntityRecord` used across Rex components.
///
/// One variant per CRM entity kind with a fixed field schema. Provider
/// adapters normalize their wire payloads into this shape; the sync
/// orchestrator and the duplicate log never see provider-specific fields.
///
/// The `id` on each variant is the source-system identifier when one is
/// known. It is deliberately excluded from the identity fields: the same
/// person carries different ids in RealNex and Apollo, and duplicate
/// detection must be content-based to match across systems.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityRecord {
    Contact {
        id: Option<String>,
        name: String,
        email: Option<String>,
        phone: Option<String>,
        company: Option<String>,
    },
    Company {
        id: Option<String>,
        name: String,
        website: Option<String>,
        address: Option<String>,
        city: Option<String>,
    },
    Property {
        id: Option<String>,
        name: Option<String>,
        address: String,
        city: Option<String>,
        postal_code: Option<String>,
        sq_ft: Option<f64>,
    },
    Space {
        id: Option<String>,
        property_address: String,
        floor: Option<String>,
        suite: Option<String>,
        sq_ft: Option<f64>,
        rent_month: Option<f64>,
    },
}

/// Entity kinds a sync pass can target. Mirrors the `EntityRecord` variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Contact,
    Company,
    Property,
    Space,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contact => "contact",
            Self::Company => "company",
            Self::Property => "property",
            Self::Space => "space",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

fn field(map: &mut BTreeMap<String, String>, key: &str, value: Option<&str>) {
    map.insert(key.to_string(), value.unwrap_or_default().trim().to_lowercase());
}

impl EntityRecord {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Contact { .. } => EntityKind::Contact,
            Self::Company { .. } => EntityKind::Company,
            Self::Property { .. } => EntityKind::Property,
            Self::Space { .. } => EntityKind::Space,
        }
    }

    pub fn source_id(&self) -> Option<&str> {
        match self {
            Self::Contact { id, .. }
            | Self::Company { id, .. }
            | Self::Property { id, .. }
            | Self::Space { id, .. } => id.as_deref(),
        }
    }

    /// Canonical identity fields, one fixed set per kind, normalized by
    /// trimming and lowercasing. Missing optional fields hash as the empty
    /// string so two records agree regardless of which fields were absent
    /// versus blank at the source.
    pub fn identity_fields(&self) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        match self {
            Self::Contact {
                name, email, phone, ..
            } => {
                field(&mut fields, "name", Some(name));
                field(&mut fields, "email", email.as_deref());
                field(&mut fields, "phone", phone.as_deref());
            }
            Self::Company { name, website, .. } => {
                field(&mut fields, "name", Some(name));
                field(&mut fields, "website", website.as_deref());
            }
            Self::Property { address, city, .. } => {
                field(&mut fields, "address", Some(address));
                field(&mut fields, "city", city.as_deref());
            }
            Self::Space {
                property_address,
                floor,
                suite,
                ..
            } => {
                field(&mut fields, "property_address", Some(property_address));
                field(&mut fields, "floor", floor.as_deref());
                field(&mut fields, "suite", suite.as_deref());
            }
        }
        fields
    }

    pub fn fingerprint(&self) -> String {
        entity_fingerprint(self.kind().as_str(), &self.identity_fields())
    }

    /// Short human label for logs and reports.
    pub fn label(&self) -> String {
        match self {
            Self::Contact { id, name, .. } | Self::Company { id, name, .. } => id
                .clone()
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| name.clone()),
            Self::Property { id, address, .. } => id
                .clone()
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| address.clone()),
            Self::Space {
                id,
                property_address,
                suite,
                ..
            } => id.clone().filter(|value| !value.is_empty()).unwrap_or_else(|| {
                match suite {
                    Some(suite) if !suite.is_empty() => {
                        format!("{property_address} suite {suite}")
                    }
                    _ => property_address.clone(),
                }
            }),
        }
    }

    pub fn contact_email(&self) -> Option<&str> {
        match self {
            Self::Contact { email, .. } => email.as_deref().filter(|value| !value.is_empty()),
            _ => None,
        }
    }

    pub fn contact_phone(&self) -> Option<&str> {
        match self {
            Self::Contact { phone, .. } => phone.as_deref().filter(|value| !value.is_empty()),
            _ => None,
        }
    }
}
