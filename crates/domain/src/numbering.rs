//! Date-prefixed document numbers.
//!
//! ```text
//! ORD-20261018000042      order number: prefix + 6-digit daily sequence
//! INV-20261018-000042     invoice number: prefix + dash + 6-digit daily sequence
//! ```
//!
//! The next sequence is the highest suffix already stored under the day's
//! prefix plus one. Two writers can compute the same number; the storage
//! layer's unique constraint rejects the loser. A day holds at most
//! [`MAX_SEQUENCE`] numbers per prefix.

use chrono::NaiveDate;

const SEQUENCE_WIDTH: usize = 6;

/// Highest sequence that fits the fixed-width suffix.
pub const MAX_SEQUENCE: u32 = 999_999;

/// The order-number prefix for a day, e.g. `ORD-20261018`.
pub fn order_number_prefix(date: NaiveDate) -> String {
    format!("ORD-{}", date.format("%Y%m%d"))
}

/// The invoice-number prefix for a day, e.g. `INV-20261018-`.
pub fn invoice_number_prefix(date: NaiveDate) -> String {
    format!("INV-{}-", date.format("%Y%m%d"))
}

pub fn format_order_number(date: NaiveDate, sequence: u32) -> String {
    format!("{}{sequence:06}", order_number_prefix(date))
}

pub fn format_invoice_number(date: NaiveDate, sequence: u32) -> String {
    format!("{}{sequence:06}", invoice_number_prefix(date))
}

/// Extracts the sequence suffix of a number issued under `prefix`.
pub fn parse_sequence(number: &str, prefix: &str) -> Option<u32> {
    let suffix = number.strip_prefix(prefix)?;
    if suffix.len() != SEQUENCE_WIDTH || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

/// The sequence following the highest existing number, if any. Returns
/// `None` once the day's sequence is used up.
pub fn next_sequence(highest_existing: Option<&str>, prefix: &str) -> Option<u32> {
    let next = highest_existing
        .and_then(|number| parse_sequence(number, prefix))
        .map_or(1, |seq| seq + 1);
    (next <= MAX_SEQUENCE).then_some(next)
}
