//! Platform fees charged to organizers.

use rust_decimal::{Decimal, prelude::FromPrimitive};

use crate::config::FeeSettings;

/// What a tournament's entry fees add up to, and how much of that the
/// platform keeps. All amounts are in NPR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeBreakdown {
    pub total_revenue: Decimal,
    pub commission: Decimal,
    pub premium_fee: Decimal,
    pub total_fees: Decimal,
    pub organizer_earnings: Decimal,
}

fn decimal(x: f64) -> Decimal {
    Decimal::from_f64(x).unwrap_or(Decimal::ZERO)
}

impl FeeBreakdown {
    pub fn calculate(
        entry_fee: f64,
        participants: i64,
        commission_percent: f64,
        premium_listing: bool,
        premium_listing_fee: f64,
    ) -> FeeBreakdown {
        let total_revenue = decimal(entry_fee) * Decimal::from(participants);
        let commission =
            total_revenue * decimal(commission_percent) / Decimal::ONE_HUNDRED;
        let premium_fee = if premium_listing {
            decimal(premium_listing_fee)
        } else {
            Decimal::ZERO
        };
        let total_fees = commission + premium_fee;

        FeeBreakdown {
            total_revenue: total_revenue.normalize(),
            commission: commission.normalize(),
            premium_fee: premium_fee.normalize(),
            total_fees: total_fees.normalize(),
            organizer_earnings: (total_revenue - total_fees).normalize(),
        }
    }

    pub fn with_settings(
        entry_fee: f64,
        participants: i64,
        premium_listing: bool,
        settings: &FeeSettings,
    ) -> FeeBreakdown {
        FeeBreakdown::calculate(
            entry_fee,
            participants,
            settings.commission_percent,
            premium_listing,
            settings.premium_listing_fee,
        )
    }
}

/// Formats an amount the way it is shown to users, e.g. `NPR 19,400`.
pub fn format_npr(amount: Decimal) -> String {
    let rounded = amount.round_dp(2).normalize();
    let text = rounded.abs().to_string();
    let (whole, frac) = match text.split_once('.') {
        Some((whole, frac)) => (whole.to_string(), Some(frac.to_string())),
        None => (text, None),
    };

    let mut grouped = String::new();
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    match frac {
        Some(frac) => format!("NPR {sign}{grouped}.{frac}"),
        None => format!("NPR {sign}{grouped}"),
    }
}

pub fn format_npr_f64(amount: f64) -> String {
    format_npr(decimal(amount))
}
