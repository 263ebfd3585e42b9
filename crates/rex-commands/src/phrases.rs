use regex::Regex;
use rex_store::{AlertKind, DealType};
use rex_sync::SyncScope;

/// Matches `$1,250,000`, `$4.5m`, `300k`, and plain `$5000`.
const MONEY_PATTERN: &str = r"(?i)\$\s*([0-9][0-9,]*(?:\.[0-9]+)?)\s*([km])?\b";
const SQ_FT_PATTERN: &str =
    r"(?i)([0-9][0-9,]*(?:\.[0-9]+)?)\s*(?:sq\.?\s*ft\.?|sqft|square\s+feet|sf)\b";
const THRESHOLD_PATTERN: &str = r"(?i)\b(?:over|above|tops?)\s*\$?\s*([0-9][0-9,]*(?:\.[0-9]+)?)\s*([km])?\b";
const TARGET_ID_PATTERN: &str = r"(?i)\b(?:group|audience|list)\s+(?:id\s+)?#?([A-Za-z0-9][A-Za-z0-9_\-]*)\b";
const QUOTED_PATTERN: &str = r#""([^"]+)"|“([^”]+)”"#;

/// Compiled free-text parsers shared by the command handlers. Building the
/// set once at service construction keeps `Regex::new` errors out of the
/// request path.
pub struct PhraseParsers {
    money: Regex,
    sq_ft: Regex,
    threshold: Regex,
    target_id: Regex,
    quoted: Regex,
}

impl PhraseParsers {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            money: Regex::new(MONEY_PATTERN)?,
            sq_ft: Regex::new(SQ_FT_PATTERN)?,
            threshold: Regex::new(THRESHOLD_PATTERN)?,
            target_id: Regex::new(TARGET_ID_PATTERN)?,
            quoted: Regex::new(QUOTED_PATTERN)?,
        })
    }

    /// First dollar amount in the message, with `k`/`m` suffixes expanded.
    pub fn offer_amount(&self, text: &str) -> Option<f64> {
        let captures = self.money.captures(text)?;
        parse_amount(captures.get(1)?.as_str(), captures.get(2).map(|m| m.as_str()))
    }

    /// Square footage, e.g. `4,200 sq ft` or `900sf`.
    pub fn square_feet(&self, text: &str) -> Option<f64> {
        let captures = self.sq_ft.captures(text)?;
        parse_amount(captures.get(1)?.as_str(), None)
    }

    /// Alert threshold following `over`/`above`, e.g. `over $5,000`.
    pub fn threshold_amount(&self, text: &str) -> Option<f64> {
        let captures = self.threshold.captures(text)?;
        parse_amount(captures.get(1)?.as_str(), captures.get(2).map(|m| m.as_str()))
    }

    /// Identifier following `group`/`audience`/`list`, e.g. `group grp-7`.
    pub fn target_id(&self, text: &str) -> Option<String> {
        let captures = self.target_id.captures(text)?;
        let id = captures.get(1)?.as_str();
        if id.eq_ignore_ascii_case("id") {
            return None;
        }
        Some(id.to_string())
    }

    /// First double-quoted span, used for inline campaign copy and subjects.
    pub fn quoted_text(&self, text: &str) -> Option<String> {
        let captures = self.quoted.captures(text)?;
        captures
            .get(1)
            .or_else(|| captures.get(2))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

fn parse_amount(digits: &str, suffix: Option<&str>) -> Option<f64> {
    let cleaned = digits.replace(',', "");
    let value: f64 = cleaned.parse().ok()?;
    let multiplier = match suffix.map(str::to_ascii_lowercase).as_deref() {
        Some("k") => 1_000.0,
        Some("m") => 1_000_000.0,
        _ => 1.0,
    };
    Some(value * multiplier)
}

/// Deal type mentioned in the message, if any.
pub fn parse_deal_type(text: &str) -> Option<DealType> {
    let normalized = text.to_ascii_lowercase();
    if normalized.contains("lease") || normalized.contains("rent") {
        return Some(DealType::Lease);
    }
    if normalized.contains("sale") || normalized.contains("sell") || normalized.contains("purchase")
    {
        return Some(DealType::Sale);
    }
    None
}

/// Alert kind for notify-on-threshold requests; unscoped requests watch
/// every deal type.
pub fn parse_alert_kind(text: &str) -> AlertKind {
    match parse_deal_type(text) {
        Some(DealType::Lease) => AlertKind::LeaseComp,
        Some(DealType::Sale) => AlertKind::SaleComp,
        None => AlertKind::Any,
    }
}

/// Sync scope word in the message; bare "sync my data" targets contacts.
pub fn parse_sync_scope(text: &str) -> SyncScope {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .find_map(SyncScope::parse)
        .unwrap_or(SyncScope::Contacts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsers() -> PhraseParsers {
        PhraseParsers::new().expect("compile phrase parsers")
    }

    #[test]
    fn unit_offer_amount_expands_suffixes_and_strips_commas() {
        let p = parsers();
        assert_eq!(p.offer_amount("offered $1,250,000 for it"), Some(1_250_000.0));
        assert_eq!(p.offer_amount("around $4.5m total"), Some(4_500_000.0));
        assert_eq!(p.offer_amount("$300k"), Some(300_000.0));
        assert_eq!(p.offer_amount("no numbers here"), None);
    }

    #[test]
    fn unit_square_feet_accepts_common_spellings() {
        let p = parsers();
        assert_eq!(p.square_feet("a 4,200 sq ft office"), Some(4_200.0));
        assert_eq!(p.square_feet("900sf retail"), Some(900.0));
        assert_eq!(p.square_feet("2500 square feet"), Some(2_500.0));
        assert_eq!(p.square_feet("sq ft unknown"), None);
    }

    #[test]
    fn unit_threshold_requires_an_over_or_above_cue() {
        let p = parsers();
        assert_eq!(p.threshold_amount("alert me over $5,000"), Some(5_000.0));
        assert_eq!(p.threshold_amount("anything above 10k"), Some(10_000.0));
        assert_eq!(p.threshold_amount("offered $5,000"), None);
    }

    #[test]
    fn unit_target_id_follows_group_or_audience_keyword() {
        let p = parsers();
        assert_eq!(p.target_id("send it to group grp-7").as_deref(), Some("grp-7"));
        assert_eq!(p.target_id("audience id aud42 please").as_deref(), Some("aud42"));
        assert_eq!(p.target_id("no target mentioned"), None);
    }

    #[test]
    fn unit_quoted_text_takes_first_span() {
        let p = parsers();
        assert_eq!(
            p.quoted_text(r#"send "Open house Friday" to the list"#).as_deref(),
            Some("Open house Friday")
        );
        assert_eq!(p.quoted_text("nothing quoted"), None);
    }

    #[test]
    fn unit_deal_type_and_alert_kind_share_vocabulary() {
        assert_eq!(parse_deal_type("a lease renewal"), Some(DealType::Lease));
        assert_eq!(parse_deal_type("ready to sell"), Some(DealType::Sale));
        assert_eq!(parse_deal_type("some deal"), None);
        assert_eq!(parse_alert_kind("lease deals over $5k"), AlertKind::LeaseComp);
        assert_eq!(parse_alert_kind("any deal over $5k"), AlertKind::Any);
    }

    #[test]
    fn unit_sync_scope_defaults_to_contacts() {
        assert_eq!(parse_sync_scope("sync my properties"), SyncScope::Properties);
        assert_eq!(parse_sync_scope("sync everything, all of it"), SyncScope::All);
        assert_eq!(parse_sync_scope("sync my data"), SyncScope::Contacts);
    }

}
