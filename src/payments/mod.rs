//! Entry fee payments.
//!
//! A payment is created when a player submits a registration for a
//! tournament with an entry fee. The registration itself is only written
//! once the gateway reports success:
//!
//! ```text
//! pending ──> authorized ──> captured
//!    │             │
//!    └─────────────┴──> failed
//! ```

use chrono::{NaiveDateTime, Utc};
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use rust_decimal::{Decimal, prelude::FromPrimitive};
use uuid::Uuid;

use crate::{
    registrations::RegistrationDetails,
    schema::payments,
    sql_text::text_enum,
    tournaments::Tournament,
};

pub mod gateway;
pub mod signature;

text_enum! {
    pub enum PaymentState {
        Pending => "pending",
        Authorized => "authorized",
        Captured => "captured",
        Failed => "failed",
    }
}

impl PaymentState {
    pub fn can_become(&self, next: PaymentState) -> bool {
        matches!(
            (self, next),
            (PaymentState::Pending, PaymentState::Authorized)
                | (PaymentState::Authorized, PaymentState::Captured)
                | (PaymentState::Pending, PaymentState::Failed)
                | (PaymentState::Authorized, PaymentState::Failed)
        )
    }
}

#[derive(Queryable, Selectable, Clone, Debug)]
#[diesel(table_name = payments)]
#[diesel(check_for_backend(Sqlite))]
pub struct Payment {
    /// The transaction UUID sent to the gateway.
    pub id: String,
    pub tournament_id: String,
    pub player_id: String,
    pub amount: f64,
    pub product_code: String,
    pub status: PaymentState,
    /// The validated registration form, as JSON.
    pub registration_form: String,
    /// The gateway's own reference for the transaction.
    pub reference_code: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

pub fn product_code(tournament_id: &str) -> String {
    format!("TOURNAMENT_{tournament_id}")
}

/// Amounts are sent to the gateway without trailing zeros (`500`, `99.5`).
pub fn format_amount(amount: f64) -> String {
    Decimal::from_f64(amount)
        .map(|d| d.round_dp(2).normalize().to_string())
        .unwrap_or_else(|| amount.to_string())
}

#[derive(Debug, PartialEq, Eq)]
pub enum TransitionError {
    /// The state machine does not allow this step.
    Invalid { from: PaymentState, to: PaymentState },
    /// The payment was changed by somebody else first.
    Stale,
}

impl Payment {
    pub fn fetch(
        id: &str,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<Payment, diesel::result::Error> {
        payments::table
            .filter(payments::id.eq(id))
            .select(Payment::as_select())
            .first(conn)
    }

    /// Creates a pending payment for the tournament's entry fee.
    #[tracing::instrument(skip(conn, details))]
    pub fn start(
        tournament: &Tournament,
        player_id: &str,
        details: &RegistrationDetails,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<Payment, diesel::result::Error> {
        let now = Utc::now().naive_utc();
        let registration_form = serde_json::to_string(details).map_err(|e| {
            diesel::result::Error::SerializationError(Box::new(e))
        })?;

        let payment = Payment {
            id: format!("TXN_{}", Uuid::now_v7()),
            tournament_id: tournament.id.clone(),
            player_id: player_id.to_string(),
            amount: tournament.entry_fee,
            product_code: product_code(&tournament.id),
            status: PaymentState::Pending,
            registration_form,
            reference_code: None,
            created_at: now,
            updated_at: now,
        };

        diesel::insert_into(payments::table)
            .values((
                payments::id.eq(&payment.id),
                payments::tournament_id.eq(&payment.tournament_id),
                payments::player_id.eq(&payment.player_id),
                payments::amount.eq(payment.amount),
                payments::product_code.eq(&payment.product_code),
                payments::status.eq(payment.status),
                payments::registration_form.eq(&payment.registration_form),
                payments::created_at.eq(payment.created_at),
                payments::updated_at.eq(payment.updated_at),
            ))
            .execute(&mut *conn)?;

        tracing::info!("started payment {} of {}", payment.id, payment.amount);
        Ok(payment)
    }

    pub fn details(&self) -> Result<RegistrationDetails, serde_json::Error> {
        serde_json::from_str(&self.registration_form)
    }

    pub fn total_amount(&self) -> String {
        format_amount(self.amount)
    }

    /// Moves the payment to `to`, recording the gateway's reference if one is
    /// given. The update only applies if the stored state is still the one
    /// this value was loaded with.
    pub fn transition(
        &mut self,
        to: PaymentState,
        reference_code: Option<&str>,
        conn: &mut impl LoadConnection<Backend = Sqlite>,
    ) -> Result<Result<(), TransitionError>, diesel::result::Error> {
        if !self.status.can_become(to) {
            return Ok(Err(TransitionError::Invalid {
                from: self.status,
                to,
            }));
        }

        let now = Utc::now().naive_utc();
        let reference_code =
            reference_code.map(str::to_string).or(self.reference_code.clone());
        let n = diesel::update(
            payments::table
                .filter(payments::id.eq(&self.id))
                .filter(payments::status.eq(self.status)),
        )
        .set((
            payments::status.eq(to),
            payments::reference_code.eq(&reference_code),
            payments::updated_at.eq(now),
        ))
        .execute(&mut *conn)?;

        if n == 0 {
            return Ok(Err(TransitionError::Stale));
        }

        tracing::debug!("payment {} is now {to} (was {})", self.id, self.status);
        self.status = to;
        self.reference_code = reference_code;
        self.updated_at = now;
        Ok(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::{PaymentState, format_amount};

    #[test]
    fn state_machine() {
        use PaymentState::*;

        assert!(Pending.can_become(Authorized));
        assert!(Authorized.can_become(Captured));
        assert!(Pending.can_become(Failed));
        assert!(Authorized.can_become(Failed));

        assert!(!Pending.can_become(Captured));
        assert!(!Captured.can_become(Failed));
        assert!(!Failed.can_become(Authorized));
        assert!(!Captured.can_become(Captured));
    }

    #[test]
    fn amounts_have_no_trailing_zeros() {
        assert_eq!(format_amount(500.0), "500");
        assert_eq!(format_amount(99.5), "99.5");
        assert_eq!(format_amount(1250.5), "1250.5");
    }
}
