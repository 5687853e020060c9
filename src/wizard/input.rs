//! Input normalization shared by the step forms.
//!
//! Users on the Persian locale type Persian or Arabic-Indic digits; all
//! shape checks run on the ASCII-normalized text.

use std::sync::LazyLock;

use regex::Regex;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

// Optional leading +, then 10 to 15 digits once separators are stripped.
static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9]{10,15}$").expect("phone pattern is valid"));

/// Map Persian (`۰`–`۹`) and Arabic-Indic (`٠`–`٩`) digits to ASCII.
pub fn normalize_digits(s: &str) -> String {
    s.chars().map(ascii_digit_of).collect()
}

fn ascii_digit_of(c: char) -> char {
    match c {
        '\u{06F0}'..='\u{06F9}' => char::from(b'0' + (c as u32 - 0x06F0) as u8),
        '\u{0660}'..='\u{0669}' => char::from(b'0' + (c as u32 - 0x0660) as u8),
        _ => c,
    }
}

pub fn is_email(s: &str) -> bool {
    EMAIL.is_match(s)
}

pub fn is_phone(s: &str) -> bool {
    let compact: String = s
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    PHONE.is_match(&compact)
}

/// Email-or-phone shape check on already-normalized text.
pub fn is_contact(s: &str) -> bool {
    is_email(s) || is_phone(s)
}

/// Pull a verification code out of pasted clipboard text.
///
/// Takes the first `len` digits found anywhere in the text; returns `None`
/// when fewer are present so the caller can show its generic fallback.
pub fn code_from_paste(text: &str, len: usize) -> Option<String> {
    let digits: String = normalize_digits(text)
        .chars()
        .filter(char::is_ascii_digit)
        .take(len)
        .collect();
    (digits.len() == len).then_some(digits)
}
