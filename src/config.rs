use std::{fmt, path::Path, sync::Arc};

use axum::{
    Router, middleware,
    routing::{get, post},
};
use axum_extra::extract::cookie::Key;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use tower_http::trace::TraceLayer;

use crate::{
    auth::{
        login::{do_login, do_logout, login_page},
        register::{do_register, register_page},
    },
    msg::Msg,
    notifications::view::{
        do_clear, do_mark_all_read, do_mark_read, notification_updates,
        notifications_page, unread_badge,
    },
    payments::gateway::{
        payment_failure, payment_receipt, payment_success, simulate_page,
    },
    players::{
        dashboard::player_dashboard,
        profile::{do_update_profile, profile_page},
        stats::{do_record_result, record_results_page},
    },
    registrations::{
        manage::do_set_status,
        register::{do_register_for_tournament, registration_page},
    },
    state::{AppState, DbPool, commit_transactions},
    tournaments::{
        admin::{admin_dashboard, do_approve, do_delete, do_reject},
        bracket::manage::{do_record_match, do_seed_bracket, view_bracket_page},
        create::{create_tournament_page, do_create_tournament},
        discover::{facilities_page, home_page, map_markers, tournament_map_page},
        organizer::{export_registrations_csv, organizer_dashboard},
        view::view_tournament_page,
    },
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Address the HTTP server listens on.
    pub bind: String,
    pub database_url: String,
    /// Used to derive the key which encrypts session cookies. When unset a
    /// random key is generated, so sessions do not survive a restart.
    pub secret_key: Option<String>,
    pub fees: FeeSettings,
    pub payment: PaymentSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeSettings {
    pub commission_percent: f64,
    pub premium_listing_fee: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMode {
    /// Payments are confirmed by a local page standing in for the gateway.
    Simulated,
    /// Players are sent to `gateway_url` with a signed form.
    Gateway,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentSettings {
    pub mode: PaymentMode,
    pub merchant_code: String,
    pub secret_key: String,
    pub gateway_url: String,
    /// Base URL the gateway sends players back to.
    pub public_url: String,
    pub simulated_delay_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            database_url: "khelkheleko.db".to_string(),
            secret_key: None,
            fees: FeeSettings::default(),
            payment: PaymentSettings::default(),
        }
    }
}

impl Default for FeeSettings {
    fn default() -> Self {
        Self {
            commission_percent: 5.0,
            premium_listing_fee: 200.0,
        }
    }
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            mode: PaymentMode::Simulated,
            merchant_code: "EPAYTEST".to_string(),
            secret_key: "8gBm/:&EnhH.1/q".to_string(),
            gateway_url: "https://rc-epay.esewa.com.np/api/epay/main/v2/form"
                .to_string(),
            public_url: "http://127.0.0.1:8000".to_string(),
            simulated_delay_secs: 3,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Toml(toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "could not read config file: {e}"),
            ConfigError::Toml(e) => write!(f, "invalid config file: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Settings {
    pub fn from_toml(text: &str) -> Result<Settings, ConfigError> {
        toml::from_str(text).map_err(ConfigError::Toml)
    }

    /// Reads the settings file (if any), then applies the `DATABASE_URL` and
    /// `SECRET_KEY` environment variables on top.
    pub fn load(path: Option<&Path>) -> Result<Settings, ConfigError> {
        let mut settings = match path {
            Some(path) => {
                let text =
                    std::fs::read_to_string(path).map_err(ConfigError::Io)?;
                Settings::from_toml(&text)?
            }
            None => Settings::default(),
        };

        if let Ok(db_url) = std::env::var("DATABASE_URL") {
            settings.database_url = db_url;
        }
        if let Ok(secret) = std::env::var("SECRET_KEY") {
            settings.secret_key = Some(secret);
        }

        Ok(settings)
    }

    pub fn cookie_key(&self) -> Key {
        match &self.secret_key {
            Some(secret) => Key::from(Sha512::digest(secret.as_bytes()).as_slice()),
            None => {
                if !cfg!(test) {
                    tracing::warn!(
                        "no secret key configured, sessions will not survive a restart"
                    );
                }
                Key::generate()
            }
        }
    }
}

pub async fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

pub fn create_app(pool: DbPool, settings: Settings) -> Router {
    let (tx, _rx) = tokio::sync::broadcast::channel::<Msg>(1000);

    let state = AppState {
        pool,
        key: settings.cookie_key(),
        tx,
        settings: Arc::new(settings),
    };

    Router::new()
        .route("/", get(home_page))
        .route("/version", get(version))
        .route("/login", get(login_page).post(do_login))
        .route("/register", get(register_page).post(do_register))
        .route("/logout", post(do_logout))
        .route("/facilities", get(facilities_page))
        .route("/tournament-map", get(tournament_map_page))
        .route("/tournament-map/markers", get(map_markers))
        .route(
            "/create-tournament",
            get(create_tournament_page).post(do_create_tournament),
        )
        .route("/tournament/:id", get(view_tournament_page))
        .route(
            "/tournament/:id/register",
            get(registration_page).post(do_register_for_tournament),
        )
        .route("/tournament/:id/bracket", get(view_bracket_page))
        .route("/tournament/:id/bracket/seed", post(do_seed_bracket))
        .route(
            "/tournament/:id/bracket/matches/:match_id",
            post(do_record_match),
        )
        .route(
            "/tournament/:id/results",
            get(record_results_page).post(do_record_result),
        )
        .route("/registrations/:id/status", post(do_set_status))
        .route("/admin", get(admin_dashboard))
        .route("/admin/tournaments/:id/approve", post(do_approve))
        .route("/admin/tournaments/:id/reject", post(do_reject))
        .route("/admin/tournaments/:id/delete", post(do_delete))
        .route("/organizer-dashboard", get(organizer_dashboard))
        .route(
            "/organizer-dashboard/registrations.csv",
            get(export_registrations_csv),
        )
        .route("/player-dashboard", get(player_dashboard))
        .route("/profile", get(profile_page).post(do_update_profile))
        .route("/payment/simulate/:txn", get(simulate_page))
        .route("/payment/success", get(payment_success))
        .route("/payment/failure", get(payment_failure))
        .route("/payment/:txn/receipt", get(payment_receipt))
        .route("/notifications", get(notifications_page))
        .route("/notifications/badge", get(unread_badge))
        .route("/notifications/ws", get(notification_updates))
        .route("/notifications/read-all", post(do_mark_all_read))
        .route("/notifications/clear", post(do_clear))
        .route("/notifications/:id/read", post(do_mark_read))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            commit_transactions,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::{PaymentMode, Settings};

    #[test]
    fn defaults_are_used_for_missing_sections() {
        let settings = Settings::from_toml(
            r#"
            bind = "0.0.0.0:9000"

            [fees]
            commission_percent = 3.0
            "#,
        )
        .unwrap();

        assert_eq!(settings.bind, "0.0.0.0:9000");
        assert_eq!(settings.fees.commission_percent, 3.0);
        assert_eq!(settings.fees.premium_listing_fee, 200.0);
        assert_eq!(settings.payment.mode, PaymentMode::Simulated);
        assert_eq!(settings.payment.merchant_code, "EPAYTEST");
    }

    #[test]
    fn payment_mode_is_lowercase() {
        let settings = Settings::from_toml(
            r#"
            [payment]
            mode = "gateway"
            "#,
        )
        .unwrap();
        assert_eq!(settings.payment.mode, PaymentMode::Gateway);

        assert!(Settings::from_toml("[payment]\nmode = \"cash\"").is_err());
    }
}
