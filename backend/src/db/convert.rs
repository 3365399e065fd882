//! Numeric and date conversions between domain types and column types.

use anyhow::{Context, anyhow};
use chrono::NaiveDate;
use rust_decimal::Decimal;

pub(crate) fn i64_to_u32(v: i64) -> anyhow::Result<u32> {
    u32::try_from(v).map_err(|_| anyhow!("out of range for u32: {v}"))
}

pub(crate) fn parse_date(raw: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").with_context(|| format!("invalid date '{raw}'"))
}

pub(crate) fn format_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

pub(crate) fn parse_money(raw: &str) -> anyhow::Result<Decimal> {
    let value: Decimal = raw
        .parse()
        .with_context(|| format!("invalid decimal '{raw}'"))?;
    if value.is_sign_negative() {
        return Err(anyhow!("negative amount: {raw}"));
    }
    Ok(value)
}
