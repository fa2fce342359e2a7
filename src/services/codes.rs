//! Coupon and redemption code generation plus small text helpers.

use rand::Rng;
use time::OffsetDateTime;

/// Uppercase letters and digits without the look-alikes `I`, `O`, `0`, `1`.
pub const COUPON_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const COUPON_CHARS: usize = 8;
const REDEMPTION_CODE_SPACE: u32 = 1_000_000;

/// Random coupon code in `XXXX-XXXX` form.
#[must_use]
pub fn coupon_code() -> String {
    coupon_code_with(&mut rand::rng())
}

pub fn coupon_code_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut code = String::with_capacity(COUPON_CHARS + 1);
    for i in 0..COUPON_CHARS {
        if i == COUPON_CHARS / 2 {
            code.push('-');
        }
        let idx = rng.random_range(0..COUPON_ALPHABET.len());
        code.push(char::from(COUPON_ALPHABET[idx]));
    }
    code
}

/// Random six-digit redemption code, zero padded.
#[must_use]
pub fn redemption_code() -> String {
    redemption_code_with(&mut rand::rng())
}

pub fn redemption_code_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("{:06}", rng.random_range(0..REDEMPTION_CODE_SPACE))
}

#[must_use]
pub fn is_redemption_code(input: &str) -> bool {
    input.len() == 6 && input.bytes().all(|b| b.is_ascii_digit())
}

#[must_use]
pub fn expiry_after(now: OffsetDateTime, days: i64) -> OffsetDateTime {
    now + time::Duration::days(days)
}

/// First whitespace-separated word of a full name.
#[must_use]
pub fn first_name(name: &str) -> String {
    name.split_whitespace().next().unwrap_or_default().to_string()
}

/// URL slug: lowercase ASCII alphanumerics joined by single dashes.
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

#[cfg(test)]
#[path = "codes_test.rs"]
mod tests;
