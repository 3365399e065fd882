use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::buyer::BuyerId;
use crate::cart::money::{line_total, round_money};
use crate::inventory::BatchId;

pub type CartId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CartStatus {
    Opened,
    Closed,
}

impl fmt::Display for CartStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CartStatus::Opened => "OPENED",
            CartStatus::Closed => "CLOSED",
        };
        f.write_str(s)
    }
}

impl FromStr for CartStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPENED" => Ok(CartStatus::Opened),
            "CLOSED" => Ok(CartStatus::Closed),
            other => Err(anyhow::anyhow!("invalid cart status: {other}")),
        }
    }
}

/// Reservation of one batch by one cart. `unit_price` is captured when the
/// line is first inserted and never rewritten.
#[derive(Debug, Clone, PartialEq)]
pub struct CartLine {
    pub batch_id: BatchId,
    pub quantity: u32,
    pub unit_price: Decimal,
    /// Insertion order within the cart.
    pub position: i64,

    // Read-through from the batch, for views.
    pub product_id: i64,
    pub due_date: NaiveDate,
}

impl CartLine {
    pub fn total(&self) -> Decimal {
        line_total(self.unit_price, self.quantity)
    }
}

/// A buyer's order, open (being filled) or closed (terminal).
///
/// `reserved` is true iff every line's quantity is currently debited from
/// its batch. Only the reclaimer clears it.
#[derive(Debug, Clone, PartialEq)]
pub struct Cart {
    pub cart_id: CartId,
    pub buyer_id: BuyerId,
    pub created_date: NaiveDate,
    /// Idleness clock for the reclaimer.
    pub updated_at: NaiveDateTime,
    pub status: CartStatus,
    pub reserved: bool,
    /// Lines in insertion order, unique by `batch_id`.
    pub lines: Vec<CartLine>,
}

impl Cart {
    pub fn is_closed(&self) -> bool {
        self.status == CartStatus::Closed
    }

    pub fn line(&self, batch_id: BatchId) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.batch_id == batch_id)
    }

    pub fn line_mut(&mut self, batch_id: BatchId) -> Option<&mut CartLine> {
        self.lines.iter_mut().find(|l| l.batch_id == batch_id)
    }

    pub fn next_position(&self) -> i64 {
        self.lines.iter().map(|l| l.position).max().map_or(0, |p| p + 1)
    }

    pub fn touch(&mut self, now: NaiveDateTime) {
        self.updated_at = now;
    }

    /// Σ unit_price × quantity, rounded half-up to cents.
    pub fn total_price(&self) -> Decimal {
        round_money(self.lines.iter().map(CartLine::total).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(batch_id: BatchId, quantity: u32, price: &str, position: i64) -> CartLine {
        CartLine {
            batch_id,
            quantity,
            unit_price: price.parse().unwrap(),
            position,
            product_id: 1,
            due_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        }
    }

    fn cart(lines: Vec<CartLine>) -> Cart {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        Cart {
            cart_id: 1,
            buyer_id: 1,
            created_date: today,
            updated_at: today.and_hms_opt(12, 0, 0).unwrap(),
            status: CartStatus::Opened,
            reserved: true,
            lines,
        }
    }

    #[test]
    fn status_text_round_trips() {
        for s in [CartStatus::Opened, CartStatus::Closed] {
            assert_eq!(s.to_string().parse::<CartStatus>().unwrap(), s);
        }
        assert!("Opened".parse::<CartStatus>().is_err());
    }

    #[test]
    fn total_sums_lines_in_decimal() {
        let c = cart(vec![line(1, 10, "10.00", 0), line(2, 3, "0.10", 1)]);
        assert_eq!(c.total_price().to_string(), "100.30");
    }

    #[test]
    fn empty_cart_totals_zero_with_cents() {
        assert_eq!(cart(vec![]).total_price().to_string(), "0.00");
    }

    #[test]
    fn next_position_follows_the_last_line() {
        assert_eq!(cart(vec![]).next_position(), 0);
        assert_eq!(
            cart(vec![line(1, 1, "1.00", 0), line(2, 1, "1.00", 4)]).next_position(),
            5
        );
    }
}
