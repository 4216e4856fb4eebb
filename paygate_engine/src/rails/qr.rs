//! Static-QR rail.
//!
//! Payers scan a fixed QR code and type the amount themselves. The only evidence of payment is the notification text
//! forwarded from the merchant's banking app, e.g. `"Pembayaran QRIS diterima Rp15.000 dari BUDI"`. The amount is the
//! sole correlation key, which is why the rail admits one pending order at a time.
use async_trait::async_trait;
use blake2::{Blake2s256, Digest};
use chrono::Duration;
use log::*;
use paygate_common::Amount;
use regex::Regex;

use crate::{
    db_types::{NewOrder, Order, PaymentFact, Rail},
    rails::{QrNotification, RailAdapter, RailError, RailSignal},
};

/// A number with `.`/`,` thousands groups and an optional 1-2 digit fraction, or a plain number.
const NUMBER: &str = r"\d{1,3}(?:[.,]\d{3})+(?:[.,]\d{1,2})?|\d+(?:[.,]\d{1,2})?";
// Unseparated digit runs longer than this are account or transaction numbers, not amounts
const MAX_BARE_DIGITS: usize = 10;

/// Turns `"15.000"`, `"15,000.00"` or `"0.05"` into an amount.
///
/// A trailing group of one or two digits after the last separator is a fraction. Any other separator is a thousands
/// separator, so `"1.500"` is fifteen hundred.
fn parse_number(token: &str) -> Option<Amount> {
    let (int_part, fraction) = match token.rfind(['.', ',']) {
        Some(i) if token.len() - i - 1 <= 2 => (&token[..i], Some(&token[i + 1..])),
        _ => (token, None),
    };
    let digits = int_part.chars().filter(char::is_ascii_digit).collect::<String>();
    let normalized = match fraction {
        Some(f) => format!("{digits}.{f}"),
        None => digits,
    };
    normalized.parse().ok()
}

/// Extracts the paid amount from free-form notification text.
#[derive(Debug, Clone)]
pub struct QrAmountParser {
    currency: Regex,
    number: Regex,
    reference: Regex,
}

impl QrAmountParser {
    pub fn new() -> Result<Self, regex::Error> {
        let currency = Regex::new(&format!(r"(?i)\b(?:rp|idr)\.?\s*({NUMBER})\b"))?;
        let number = Regex::new(&format!(r"\b(?:{NUMBER})\b"))?;
        let reference = Regex::new(r"(?i)\b(?:ref|no|trx|id)\b\.?\s*[:#]?\s*\d[\d-]*")?;
        Ok(Self { currency, number, reference })
    }

    /// A number following a currency marker (`Rp`, `IDR`) wins. Without a marker, the largest number in the text is
    /// taken, which skips over times and dates in typical notifications. Numbers labelled as a reference (`ref`, `no`,
    /// `trx`, `id`) and long unseparated digit runs are never taken as the amount.
    pub fn extract(&self, text: &str) -> Result<Amount, RailError> {
        let marked = self.currency.captures(text).and_then(|c| c.get(1)).and_then(|m| parse_number(m.as_str()));
        if let Some(amount) = marked {
            return Ok(amount);
        }
        let references = self.reference.find_iter(text).map(|m| m.range()).collect::<Vec<_>>();
        self.number
            .find_iter(text)
            .filter(|m| !references.iter().any(|r| m.start() < r.end && r.start < m.end()))
            .filter(|m| m.as_str().len() <= MAX_BARE_DIGITS || !m.as_str().bytes().all(|b| b.is_ascii_digit()))
            .filter_map(|m| parse_number(m.as_str()))
            .max()
            .ok_or_else(|| RailError::MalformedSignal(format!("No amount found in notification \"{text}\"")))
    }
}

pub struct QrRail {
    payload: String,
    ttl: Duration,
    parser: QrAmountParser,
}

impl QrRail {
    pub fn new<S: Into<String>>(payload: S, ttl: Duration) -> Result<Self, regex::Error> {
        let parser = QrAmountParser::new()?;
        Ok(Self { payload: payload.into(), ttl, parser })
    }

    /// A stable reference for a notification: the same delivery always hashes to the same reference, so a replayed
    /// webhook cannot settle a second order.
    pub fn notification_ref(notification: &QrNotification) -> String {
        let key = notification.id.clone().unwrap_or_else(|| notification.received_at.to_rfc3339());
        let hash = Blake2s256::new()
            .chain_update(key.as_bytes())
            .chain_update(b"\n")
            .chain_update(notification.text.as_bytes())
            .finalize();
        let hex = hash.iter().take(16).map(|b| format!("{b:02x}")).collect::<String>();
        format!("qr-{hex}")
    }
}

#[async_trait]
impl RailAdapter for QrRail {
    fn rail(&self) -> Rail {
        Rail::Qr
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }

    fn compute_target(&self, _order: &NewOrder) -> String {
        self.payload.clone()
    }

    fn extract_candidates(&self, _order: &Order, signal: &RailSignal) -> Result<Vec<PaymentFact>, RailError> {
        let notification = match signal {
            RailSignal::Notification(n) => n,
            RailSignal::Transactions(_) => return Err(RailError::UnsupportedSignal(Rail::Qr)),
        };
        let amount = self.parser.extract(&notification.text)?;
        let fact = PaymentFact::new(amount)
            .with_external_id(Self::notification_ref(notification))
            .with_timestamp(notification.received_at);
        trace!("🔎️ QR notification parsed as {amount}");
        Ok(vec![fact])
    }
}
