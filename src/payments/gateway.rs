//! The player-facing side of payments: handing off to the gateway (or the
//! local stand-in for it) and handling the callbacks it makes afterwards.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Redirect},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{NaiveDateTime, TimeDelta};
use hypertext::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::User,
    config::{PaymentMode, PaymentSettings, Settings},
    msg::Outbox,
    notifications::{Audience, NewNotification, NotificationKind, add_notification},
    payments::{Payment, PaymentState, TransitionError, signature},
    registrations::{Registration, Settlement},
    state::Conn,
    template::{APP_NAME, Page},
    tournaments::{Tournament, TournamentStatus, fees::format_npr_f64, today},
    util_resp::{
        FailureResponse, StandardResponse, bad_request, err_not_found,
        see_other_ok, success,
    },
    widgets::alert::{ErrorAlert, SuccessAlert},
};

const REQUEST_SIGNED_FIELDS: &str = "total_amount,transaction_uuid,product_code";
const RESPONSE_SIGNED_FIELDS: &str = "transaction_code,status,total_amount,transaction_uuid,product_code,signed_field_names";

fn nepal_time(t: NaiveDateTime) -> NaiveDateTime {
    t + TimeDelta::minutes(345)
}

fn urlencode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

/// The signed form posted to the gateway.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub amount: String,
    pub tax_amount: String,
    pub total_amount: String,
    pub transaction_uuid: String,
    pub product_code: String,
    pub product_service_charge: String,
    pub product_delivery_charge: String,
    pub success_url: String,
    pub failure_url: String,
    pub signed_field_names: String,
    pub signature: String,
    pub merchant_id: String,
}

impl GatewayRequest {
    pub fn new(payment: &Payment, settings: &PaymentSettings) -> Self {
        let total_amount = payment.total_amount();
        let base = settings.public_url.trim_end_matches('/');
        let message = format!(
            "total_amount={total_amount},transaction_uuid={},product_code={}",
            payment.id, payment.product_code
        );

        GatewayRequest {
            amount: total_amount.clone(),
            tax_amount: "0".to_string(),
            total_amount,
            transaction_uuid: payment.id.clone(),
            product_code: payment.product_code.clone(),
            product_service_charge: "0".to_string(),
            product_delivery_charge: "0".to_string(),
            success_url: format!("{base}/payment/success"),
            failure_url: format!(
                "{base}/payment/failure?transaction_uuid={}",
                urlencode(&payment.id)
            ),
            signed_field_names: REQUEST_SIGNED_FIELDS.to_string(),
            signature: signature::sign(&settings.secret_key, &message),
            merchant_id: settings.merchant_code.clone(),
        }
    }

    pub fn fields(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("amount", self.amount.as_str()),
            ("tax_amount", self.tax_amount.as_str()),
            ("total_amount", self.total_amount.as_str()),
            ("transaction_uuid", self.transaction_uuid.as_str()),
            ("product_code", self.product_code.as_str()),
            ("product_service_charge", self.product_service_charge.as_str()),
            ("product_delivery_charge", self.product_delivery_charge.as_str()),
            ("success_url", self.success_url.as_str()),
            ("failure_url", self.failure_url.as_str()),
            ("signed_field_names", self.signed_field_names.as_str()),
            ("signature", self.signature.as_str()),
            ("merchant_id", self.merchant_id.as_str()),
        ]
    }
}

/// What the gateway sends back (base64 encoded JSON) once a payment has gone
/// through.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayResponse {
    pub transaction_code: String,
    pub status: String,
    pub total_amount: String,
    pub transaction_uuid: String,
    pub product_code: String,
    pub signed_field_names: String,
    pub signature: String,
}

#[derive(Debug, PartialEq, Eq)]
pub enum CallbackError {
    Malformed,
    BadSignature,
}

impl GatewayResponse {
    fn signed_fields(&self) -> [(&'static str, &str); 6] {
        [
            ("transaction_code", self.transaction_code.as_str()),
            ("status", self.status.as_str()),
            ("total_amount", self.total_amount.as_str()),
            ("transaction_uuid", self.transaction_uuid.as_str()),
            ("product_code", self.product_code.as_str()),
            ("signed_field_names", self.signed_field_names.as_str()),
        ]
    }

    /// A completed response for `payment`, signed with `secret`. This is what
    /// the simulated gateway hands back.
    pub fn completed(payment: &Payment, secret: &str) -> GatewayResponse {
        let code = Uuid::new_v4().simple().to_string();
        let mut response = GatewayResponse {
            transaction_code: code[..7].to_uppercase(),
            status: "COMPLETE".to_string(),
            total_amount: payment.total_amount(),
            transaction_uuid: payment.id.clone(),
            product_code: payment.product_code.clone(),
            signed_field_names: RESPONSE_SIGNED_FIELDS.to_string(),
            signature: String::new(),
        };
        let message =
            signature::signed_message(RESPONSE_SIGNED_FIELDS, &response.signed_fields())
                .unwrap_or_default();
        response.signature = signature::sign(secret, &message);
        response
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        Ok(STANDARD.encode(serde_json::to_vec(self)?))
    }

    /// Decodes the `data` parameter and checks its signature.
    pub fn decode(data: &str, secret: &str) -> Result<GatewayResponse, CallbackError> {
        let bytes = STANDARD
            .decode(data.trim())
            .map_err(|_| CallbackError::Malformed)?;
        let response: GatewayResponse =
            serde_json::from_slice(&bytes).map_err(|_| CallbackError::Malformed)?;

        let message = signature::signed_message(
            &response.signed_field_names,
            &response.signed_fields(),
        )
        .ok_or(CallbackError::Malformed)?;

        if signature::verify(secret, &message, &response.signature) {
            Ok(response)
        } else {
            Err(CallbackError::BadSignature)
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == "COMPLETE"
    }

    /// Whether the response is for exactly this payment.
    pub fn matches(&self, payment: &Payment) -> bool {
        let amount = self
            .total_amount
            .replace(',', "")
            .parse::<f64>()
            .map(|amount| (amount - payment.amount).abs() < 0.005)
            .unwrap_or(false);
        amount
            && self.transaction_uuid == payment.id
            && self.product_code == payment.product_code
    }
}

/// Sends the player off to pay for `payment`.
pub fn checkout<const TX: bool>(
    payment: &Payment,
    tournament: &Tournament,
    user: User<TX>,
    settings: &PaymentSettings,
) -> StandardResponse {
    match settings.mode {
        PaymentMode::Simulated => see_other_ok(Redirect::to(&format!(
            "/payment/simulate/{}",
            payment.id
        ))),
        PaymentMode::Gateway => {
            let request = GatewayRequest::new(payment, settings);
            let gateway_url = settings.gateway_url.clone();
            let amount = format_npr_f64(payment.amount);
            let tournament_name = tournament.name.clone();

            success(
                Page::new()
                    .title("Redirecting to eSewa")
                    .user(user)
                    .body(maud! {
                        div class="text-center mt-5" {
                            h1 class="h3" { "Redirecting to eSewa" }
                            p class="text-muted" {
                                "Entry fee for " (tournament_name) ": " (amount)
                            }
                            form name="gateway" method="post" action=(gateway_url) {
                                @for (field, value) in request.fields() {
                                    input type="hidden" name=(field) value=(value);
                                }
                                button type="submit" class="btn btn-success" {
                                    "Continue to eSewa"
                                }
                            }
                            script { "document.forms.gateway.submit();" }
                        }
                    })
                    .render(),
            )
        }
    }
}

/// Stands in for the gateway's payment page: shows a progress bar, then
/// returns to the success callback with a signed response.
#[tracing::instrument(skip_all)]
pub async fn simulate_page(
    Path(txn): Path<String>,
    user: User<false>,
    mut conn: Conn<false>,
    State(settings): State<Arc<Settings>>,
) -> StandardResponse {
    // a real gateway confirms payments itself
    if settings.payment.mode != PaymentMode::Simulated {
        return err_not_found();
    }
    let payment = Payment::fetch(&txn, &mut *conn)?;
    if payment.player_id != user.id {
        return err_not_found();
    }
    if payment.status != PaymentState::Pending {
        return see_other_ok(Redirect::to("/player-dashboard"));
    }

    let response = GatewayResponse::completed(&payment, &settings.payment.secret_key);
    let data = response.encode()?;
    let delay = settings.payment.simulated_delay_secs;
    let refresh = format!("{delay}; url=/payment/success?data={}", urlencode(&data));
    let cancel = format!("/payment/failure?transaction_uuid={}", urlencode(&payment.id));
    let amount = format_npr_f64(payment.amount);

    success(
        Page::new_full()
            .title("eSewa payment")
            .user(user)
            .extra_head(maud! {
                meta "http-equiv"="refresh" content=(refresh);
                style {
                    "@keyframes progress { from { width: 0%; } to { width: 100%; } }"
                }
            })
            .body(maud! {
                div class="card mx-auto mt-5 text-center" style="max-width: 28rem" {
                    div class="card-body p-5" {
                        div class="rounded-circle bg-success text-white mx-auto mb-3 d-flex align-items-center justify-content-center"
                            style="width: 60px; height: 60px; font-size: 24px" {
                            "रू"
                        }
                        h2 class="h4 text-success" { "eSewa Payment Simulation" }
                        p class="text-muted" { "Processing payment of " (amount) }
                        div class="progress mb-3" style="height: 4px" {
                            div class="progress-bar bg-success"
                                style=(format!("width: 0%; animation: progress {delay}s ease-in-out forwards")) {}
                        }
                        p class="small text-muted" {
                            "This is a simulated payment. No money is charged."
                        }
                        a href=(cancel) class="btn btn-sm btn-outline-secondary" {
                            "Cancel payment"
                        }
                    }
                }
            })
            .render(),
    )
}

#[derive(Deserialize)]
pub struct SuccessQuery {
    data: String,
}

fn receipt_page<const TX: bool>(
    user: User<TX>,
    payment: &Payment,
    tournament_name: &str,
    notice: Option<&'static str>,
) -> hypertext::Rendered<String> {
    let amount = format_npr_f64(payment.amount);
    let txn = payment.id.clone();
    let reference = payment.reference_code.clone();
    let paid_at = nepal_time(payment.updated_at)
        .format("%Y-%m-%d %H:%M")
        .to_string();
    let tournament_name = tournament_name.to_string();
    let tournament_link = format!("/tournament/{}", payment.tournament_id);
    let receipt_link = format!("/payment/{}/receipt", payment.id);

    Page::new()
        .title("Payment successful")
        .user(user)
        .body(maud! {
            div class="card mx-auto mt-4" style="max-width: 36rem" {
                div class="card-body" {
                    h1 class="h3 text-success" { "Payment Successful!" }
                    @if let Some(notice) = notice {
                        SuccessAlert msg=(notice);
                    }
                    p { "You are now registered for " (tournament_name) "." }
                    dl class="row mb-0" {
                        dt class="col-sm-5" { "Tournament" }
                        dd class="col-sm-7" { (tournament_name) }
                        dt class="col-sm-5" { "Amount" }
                        dd class="col-sm-7" { (amount) }
                        dt class="col-sm-5" { "Transaction ID" }
                        dd class="col-sm-7" { code { (txn) } }
                        @if let Some(reference) = &reference {
                            dt class="col-sm-5" { "eSewa reference" }
                            dd class="col-sm-7" { code { (reference) } }
                        }
                        dt class="col-sm-5" { "Paid at" }
                        dd class="col-sm-7" { (paid_at) }
                    }
                    div class="d-flex flex-wrap gap-2 mt-4" {
                        a class="btn btn-primary" href=(receipt_link) { "Download receipt" }
                        a class="btn btn-outline-secondary" href="/player-dashboard" { "Go to dashboard" }
                        a class="btn btn-outline-secondary" href=(tournament_link) { "View tournament" }
                    }
                }
            }
        })
        .render()
}

fn refund_page<const TX: bool>(
    user: User<TX>,
    payment: &Payment,
    reason: &'static str,
) -> hypertext::Rendered<String> {
    let amount = format_npr_f64(payment.amount);
    let txn = payment.id.clone();

    Page::new()
        .title("Payment not applied")
        .user(user)
        .body(maud! {
            h1 class="h3" { "Your payment could not be applied" }
            ErrorAlert msg=(reason);
            p {
                "Your payment of " (amount) " (transaction " code { (txn) }
                ") will be refunded. Please contact the organizer if you have any questions."
            }
            a class="btn btn-primary" href="/player-dashboard" { "Go to dashboard" }
        })
        .render()
}

/// The gateway's success callback. Writes the registration the payment was
/// for.
#[tracing::instrument(skip_all)]
pub async fn payment_success(
    Query(query): Query<SuccessQuery>,
    user: User<true>,
    mut conn: Conn<true>,
    State(settings): State<Arc<Settings>>,
    outbox: Outbox,
) -> StandardResponse {
    let response = match GatewayResponse::decode(&query.data, &settings.payment.secret_key)
    {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("rejected payment callback: {e:?}");
            return bad_request(
                maud! {
                    ErrorAlert msg="The payment confirmation could not be verified.";
                }
                .render(),
            );
        }
    };

    let mut payment = Payment::fetch(&response.transaction_uuid, &mut *conn)?;
    if payment.player_id != user.id {
        return err_not_found();
    }

    let tournament = Tournament::fetch(&payment.tournament_id, &mut *conn)?;

    if payment.status == PaymentState::Captured {
        return success(receipt_page(user, &payment, &tournament.name, None));
    }

    if !response.is_complete() {
        return see_other_ok(Redirect::to(&format!(
            "/payment/failure?transaction_uuid={}",
            urlencode(&payment.id)
        )));
    }

    if !response.matches(&payment) {
        tracing::warn!(
            "callback for {} does not match the payment ({} {})",
            payment.id,
            response.total_amount,
            response.product_code
        );
        return bad_request(
            maud! {
                ErrorAlert msg="The payment confirmation does not match this payment.";
            }
            .render(),
        );
    }

    match payment.transition(
        PaymentState::Authorized,
        Some(&response.transaction_code),
        &mut *conn,
    )? {
        Ok(()) => (),
        Err(TransitionError::Stale) => return Err(crate::tournaments::stale_version()),
        Err(TransitionError::Invalid { from, .. }) => {
            tracing::debug!("payment {} is {from}, not completing it", payment.id);
            return bad_request(
                maud! {
                    ErrorAlert msg="This payment can no longer be completed.";
                }
                .render(),
            );
        }
    }

    let refund_reason = if tournament.status != TournamentStatus::Approved {
        Some("This tournament is no longer open for registration.")
    } else if Registration::find(&tournament.id, &user.id, &mut *conn)?.is_some() {
        Some("You are already registered for this tournament.")
    } else if !tournament.registration_open(today()) {
        Some("Registration closed before your payment arrived.")
    } else if tournament.is_full() {
        Some("The tournament filled up before your payment arrived.")
    } else {
        None
    };

    if let Some(reason) = refund_reason {
        tracing::warn!("payment {} cannot be applied: {reason}", payment.id);
        if let Err(e) = payment.transition(PaymentState::Failed, None, &mut *conn)? {
            tracing::error!("could not fail payment {}: {e:?}", payment.id);
            return Err(FailureResponse::ServerError(()));
        }
        // the failed state has to be committed, so this is not an error status
        return success(refund_page(user, &payment, reason));
    }

    let details = payment.details()?;
    Registration::create(
        &tournament,
        &user.id,
        &details,
        Settlement::Paid {
            transaction_id: payment.id.clone(),
        },
        &mut *conn,
    )?;

    if let Err(e) = payment.transition(PaymentState::Captured, None, &mut *conn)? {
        tracing::error!("could not capture payment {}: {e:?}", payment.id);
        return Err(FailureResponse::ServerError(()));
    }

    add_notification(
        NewNotification::new(
            NotificationKind::PaymentSuccess,
            Audience::User(user.id.clone()),
            "Payment Successful!",
            format!(
                "Payment of रू {} for \"{}\" has been completed successfully.",
                payment.total_amount(),
                tournament.name
            ),
        )
        .about(&tournament.id, &tournament.name),
        &mut *conn,
        &outbox,
    )?;

    tracing::info!("payment {} captured", payment.id);

    success(receipt_page(
        user,
        &payment,
        &tournament.name,
        Some("Your registration has been confirmed."),
    ))
}

#[derive(Deserialize)]
pub struct FailureQuery {
    transaction_uuid: Option<String>,
}

/// The gateway's failure callback (also used when a player cancels).
#[tracing::instrument(skip_all)]
pub async fn payment_failure(
    Query(query): Query<FailureQuery>,
    user: User<true>,
    mut conn: Conn<true>,
) -> StandardResponse {
    let payment = match &query.transaction_uuid {
        Some(txn) => match Payment::fetch(txn, &mut *conn) {
            Ok(payment) if payment.player_id == user.id => Some(payment),
            Ok(_) | Err(diesel::result::Error::NotFound) => None,
            Err(e) => return Err(e.into()),
        },
        None => None,
    };

    let mut retry = None;
    if let Some(mut payment) = payment {
        if payment.status.can_become(PaymentState::Failed) {
            if let Err(e) = payment.transition(PaymentState::Failed, None, &mut *conn)? {
                tracing::debug!("payment {} not failed: {e:?}", payment.id);
            } else {
                tracing::info!("payment {} failed", payment.id);
            }
        }
        if payment.status != PaymentState::Captured {
            retry = Some(format!("/tournament/{}/register", payment.tournament_id));
        }
    }

    success(
        Page::new()
            .title("Payment failed")
            .user(user)
            .body(maud! {
                div class="card mx-auto mt-4" style="max-width: 36rem" {
                    div class="card-body" {
                        h1 class="h3 text-danger" { "Payment Failed" }
                        p {
                            "Your payment was not completed and you have not been charged. "
                            "You are not registered for the tournament yet."
                        }
                        div class="d-flex flex-wrap gap-2 mt-3" {
                            @if let Some(retry) = &retry {
                                a class="btn btn-primary" href=(retry) { "Try again" }
                            }
                            a class="btn btn-outline-secondary" href="/player-dashboard" {
                                "Go to dashboard"
                            }
                        }
                    }
                }
            })
            .render(),
    )
}

pub fn receipt_text(payment: &Payment, tournament_name: &str) -> String {
    let paid_at = nepal_time(payment.updated_at);
    format!(
        "PAYMENT RECEIPT\n\
         ===============\n\
         \n\
         Tournament: {tournament_name}\n\
         Amount: रू {}\n\
         Transaction ID: {}\n\
         Date: {}\n\
         Time: {}\n\
         Payment Method: eSewa\n\
         Status: Completed\n\
         \n\
         Thank you for your payment!\n\
         {APP_NAME} - Nepal's Sports Platform\n",
        payment.total_amount(),
        payment.id,
        paid_at.format("%Y-%m-%d"),
        paid_at.format("%H:%M:%S"),
    )
}

/// Plain text receipt for a completed payment.
pub async fn payment_receipt(
    Path(txn): Path<String>,
    user: User<false>,
    mut conn: Conn<false>,
) -> Result<impl IntoResponse, FailureResponse> {
    let payment = Payment::fetch(&txn, &mut *conn)?;
    if payment.status != PaymentState::Captured
        || (payment.player_id != user.id && !user.is_admin())
    {
        return Err(FailureResponse::NotFound(()));
    }
    let tournament = Tournament::fetch(&payment.tournament_id, &mut *conn)?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"receipt-{}.txt\"", payment.id),
            ),
        ],
        receipt_text(&payment, &tournament.name),
    ))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn payment() -> Payment {
        let at = NaiveDate::from_ymd_opt(2026, 2, 1)
            .unwrap()
            .and_hms_opt(6, 15, 0)
            .unwrap();
        Payment {
            id: "TXN_1".to_string(),
            tournament_id: "tournament_test".to_string(),
            player_id: "ram".to_string(),
            amount: 500.0,
            product_code: "TOURNAMENT_tournament_test".to_string(),
            status: PaymentState::Captured,
            registration_form: "{}".to_string(),
            reference_code: Some("0007XYZ".to_string()),
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn requests_are_signed_over_the_named_fields() {
        let settings = PaymentSettings::default();
        let request = GatewayRequest::new(&payment(), &settings);
        let message = signature::signed_message(
            &request.signed_field_names,
            &request.fields(),
        )
        .unwrap();
        assert_eq!(
            message,
            "total_amount=500,transaction_uuid=TXN_1,product_code=TOURNAMENT_tournament_test"
        );
        assert!(signature::verify(&settings.secret_key, &message, &request.signature));
        assert_eq!(
            request.failure_url,
            "http://127.0.0.1:8000/payment/failure?transaction_uuid=TXN_1"
        );
    }

    #[test]
    fn simulated_responses_verify() {
        let secret = PaymentSettings::default().secret_key;
        let p = payment();
        let response = GatewayResponse::completed(&p, &secret);
        let data = response.encode().unwrap();

        let decoded = GatewayResponse::decode(&data, &secret).unwrap();
        assert_eq!(decoded, response);
        assert!(decoded.is_complete());
        assert!(decoded.matches(&p));

        assert_eq!(
            GatewayResponse::decode(&data, "another secret"),
            Err(CallbackError::BadSignature)
        );
        assert_eq!(
            GatewayResponse::decode("%%%", &secret),
            Err(CallbackError::Malformed)
        );
    }

    #[test]
    fn altered_amounts_are_refused() {
        let secret = PaymentSettings::default().secret_key;
        let p = payment();
        let mut response = GatewayResponse::completed(&p, &secret);
        response.total_amount = "5".to_string();
        let data = response.encode().unwrap();
        assert_eq!(
            GatewayResponse::decode(&data, &secret),
            Err(CallbackError::BadSignature)
        );
        assert!(!response.matches(&p));
    }

    #[test]
    fn receipt_lists_the_payment() {
        let text = receipt_text(&payment(), "Kathmandu Futsal Cup");
        assert!(text.starts_with("PAYMENT RECEIPT\n===============\n"));
        assert!(text.contains("Tournament: Kathmandu Futsal Cup\n"));
        assert!(text.contains("Amount: रू 500\n"));
        assert!(text.contains("Transaction ID: TXN_1\n"));
        // 06:15 UTC is 12:00 in Kathmandu
        assert!(text.contains("Date: 2026-02-01\nTime: 12:00:00\n"));
        assert!(text.contains("Payment Method: eSewa\n"));
    }
}
