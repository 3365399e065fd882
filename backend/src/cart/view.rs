use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::cart::model::{Cart, CartId, CartLine, CartStatus};
use crate::inventory::BatchId;

/// What the engine hands back to the request layer after a cart mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartView {
    pub cart_id: CartId,
    pub status: CartStatus,
    pub total_price: Decimal,
    pub lines: Vec<LineView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineView {
    pub batch_id: BatchId,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub product_id: i64,
    pub due_date: NaiveDate,
}

impl From<&CartLine> for LineView {
    fn from(l: &CartLine) -> Self {
        Self {
            batch_id: l.batch_id,
            quantity: l.quantity,
            unit_price: l.unit_price,
            product_id: l.product_id,
            due_date: l.due_date,
        }
    }
}

impl From<&Cart> for CartView {
    fn from(c: &Cart) -> Self {
        Self {
            cart_id: c.cart_id,
            status: c.status,
            total_price: c.total_price(),
            lines: c.lines.iter().map(LineView::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_serializes_money_as_decimal_text() {
        let due = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let cart = Cart {
            cart_id: 9,
            buyer_id: 1,
            created_date: due,
            updated_at: due.and_hms_opt(0, 0, 0).unwrap(),
            status: CartStatus::Opened,
            reserved: true,
            lines: vec![CartLine {
                batch_id: 3,
                quantity: 10,
                unit_price: "10.00".parse().unwrap(),
                position: 0,
                product_id: 7,
                due_date: due,
            }],
        };

        let json = serde_json::to_value(CartView::from(&cart)).unwrap();

        assert_eq!(json["cart_id"], 9);
        assert_eq!(json["status"], "OPENED");
        assert_eq!(json["total_price"], "100.00");
        assert_eq!(json["lines"][0]["due_date"], "2024-05-01");
        assert_eq!(json["lines"][0]["unit_price"], "10.00");
    }
}
