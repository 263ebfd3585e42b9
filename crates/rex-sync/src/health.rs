//! Contact health validators.
//!
//! Two independent deterministic scorers, each mapping a raw field to an
//! integer 0–100. Scores are recorded to health history during sync and have
//! no side effects of their own.

const ROLE_LOCAL_PARTS: [&str; 8] = [
    "info", "sales", "admin", "support", "contact", "office", "noreply", "no-reply",
];

const DISPOSABLE_DOMAINS: [&str; 4] = [
    "mailinator.com",
    "guerrillamail.com",
    "10minutemail.com",
    "tempmail.com",
];

const FREEMAIL_DOMAINS: [&str; 5] = [
    "gmail.com",
    "yahoo.com",
    "hotmail.com",
    "outlook.com",
    "aol.com",
];

/// Scores an email address 0–100 on format and deliverability risk.
pub fn score_email(email: &str) -> u8 {
    let email = email.trim().to_ascii_lowercase();
    if email.is_empty() || email.chars().any(char::is_whitespace) {
        return 0;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return 0;
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return 0;
    }
    let Some((_, tld)) = domain.rsplit_once('.') else {
        return 10;
    };
    if tld.len() < 2 || domain.starts_with('.') || domain.contains("..") {
        return 10;
    }

    let mut score: u8 = 100;
    if ROLE_LOCAL_PARTS.contains(&local) {
        score = score.saturating_sub(30);
    }
    if DISPOSABLE_DOMAINS.contains(&domain) {
        score = score.saturating_sub(60);
    }
    if FREEMAIL_DOMAINS.contains(&domain) {
        score = score.saturating_sub(15);
    }
    if local.len() < 2 {
        score = score.saturating_sub(10);
    }
    score
}

/// Scores a phone number 0–100 on digit count and shape.
pub fn score_phone(phone: &str) -> u8 {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return 0;
    }
    let mut chars = digits.chars();
    let first = chars.next().unwrap_or('0');
    if digits.len() > 1 && digits.chars().all(|c| c == first) {
        // Placeholder shapes like 555-5555555 score near the floor.
        return 20;
    }
    match digits.len() {
        10 => 100,
        11 if digits.starts_with('1') => 95,
        7 => 60,
        _ => 25,
    }
}
