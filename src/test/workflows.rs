use axum::{Router, http::StatusCode};
use axum_test::{TestServer, TestServerConfig};
use diesel::prelude::*;
use diesel_migrations::MigrationHarness;

use crate::{
    MIGRATIONS,
    auth::register::create_user,
    config::{PaymentMode, Settings, create_app},
    payments::{Payment, gateway::GatewayResponse},
    permission::Role,
    schema::{
        bracket_matches, notifications, payments, player_achievements, player_stats,
        registrations, tournaments, users,
    },
    state::{DbPool, make_pool},
};

const PASSWORD: &str = "secret1";

fn app() -> (Router, DbPool) {
    app_with(Settings::default())
}

fn app_with(settings: Settings) -> (Router, DbPool) {
    let pool = make_pool(":memory:").unwrap();
    pool.get().unwrap().run_pending_migrations(MIGRATIONS).unwrap();
    (create_app(pool.clone(), settings), pool)
}

/// Each client keeps its own cookies, so one can be logged in per role.
fn client(app: &Router) -> TestServer {
    TestServer::new_with_config(
        app.clone(),
        TestServerConfig {
            save_cookies: true,
            ..TestServerConfig::default()
        },
    )
    .unwrap()
}

async fn sign_up(app: &Router, name: &str, email: &str, role: &str) -> TestServer {
    let client = client(app);
    let res = client
        .post("/register")
        .form(&[
            ("full_name", name),
            ("email", email),
            ("phone", "9841234567"),
            ("role", role),
            ("password", PASSWORD),
            ("password2", PASSWORD),
        ])
        .await;
    assert_eq!(res.status_code(), StatusCode::SEE_OTHER, "{}", res.text());
    client
}

async fn log_in(app: &Router, email: &str) -> TestServer {
    let client = client(app);
    let res = client
        .post("/login")
        .form(&[("email", email), ("password", PASSWORD)])
        .await;
    assert_eq!(res.status_code(), StatusCode::SEE_OTHER);
    client
}

async fn admin(app: &Router, pool: &DbPool) -> TestServer {
    {
        let mut conn = pool.get().unwrap();
        create_user(
            "admin@example.com",
            "Site Admin",
            None,
            Role::Admin,
            PASSWORD,
            &mut conn,
        )
        .unwrap();
    }
    let client = client(app);
    let res = client
        .post("/login")
        .form(&[("email", "admin@example.com"), ("password", PASSWORD)])
        .await;
    assert_eq!(res.status_code(), StatusCode::SEE_OTHER);
    assert_eq!(res.header("location"), "/admin");
    client
}

async fn submit_tournament(organizer: &TestServer, fee: &str, max_participants: &str) {
    let res = organizer
        .post("/create-tournament")
        .form(&[
            ("name", "Pokhara Open Badminton"),
            ("description", "A two day open badminton tournament."),
            ("sport_type", "Badminton"),
            ("tournament_type", "single_elimination"),
            ("start_date", "2030-05-10"),
            ("end_date", "2030-05-11"),
            ("registration_deadline", "2030-05-01"),
            ("max_participants", max_participants),
            ("entry_fee", fee),
            ("prize_pool", "25000"),
            ("venue_name", "Pokhara Covered Hall"),
            ("venue_address", "Lakeside, Pokhara"),
            ("province", "Gandaki Province"),
            ("district", "Kaski"),
            ("latitude", "28.2096"),
            ("longitude", "83.9856"),
            ("rules", "BWF rules, best of three games to 21."),
            ("requirements", "Bring your own racket."),
            ("contact_phone", "9856012345"),
            ("contact_email", "hall@example.com"),
            ("image_urls", ""),
        ])
        .await;
    assert_eq!(res.status_code(), StatusCode::SEE_OTHER, "{}", res.text());
    assert_eq!(res.header("location"), "/organizer-dashboard");
}

fn only_tournament(pool: &DbPool) -> (String, i64) {
    let mut conn = pool.get().unwrap();
    tournaments::table
        .select((tournaments::id, tournaments::version))
        .first(&mut conn)
        .unwrap()
}

fn participants(pool: &DbPool, id: &str) -> i64 {
    let mut conn = pool.get().unwrap();
    tournaments::table
        .filter(tournaments::id.eq(id))
        .select(tournaments::current_participants)
        .first(&mut conn)
        .unwrap()
}

fn count_registrations(pool: &DbPool, id: &str) -> i64 {
    let mut conn = pool.get().unwrap();
    registrations::table
        .filter(registrations::tournament_id.eq(id))
        .count()
        .get_result(&mut conn)
        .unwrap()
}

fn user_id(pool: &DbPool, email: &str) -> String {
    let mut conn = pool.get().unwrap();
    users::table
        .filter(users::email.eq(email))
        .select(users::id)
        .first(&mut conn)
        .unwrap()
}

/// The registration's id, status and version.
fn registration_of(pool: &DbPool, tournament_id: &str, email: &str) -> (String, String, i64) {
    let player_id = user_id(pool, email);
    let mut conn = pool.get().unwrap();
    registrations::table
        .filter(registrations::tournament_id.eq(tournament_id))
        .filter(registrations::player_id.eq(player_id))
        .select((registrations::id, registrations::status, registrations::version))
        .first(&mut conn)
        .unwrap()
}

/// The pending payment for a tournament along with a correctly signed
/// success callback for it, ready to go in a query string.
fn completed_callback(pool: &DbPool, tournament_id: &str) -> (String, String) {
    let mut conn = pool.get().unwrap();
    let txn: String = payments::table
        .filter(payments::tournament_id.eq(tournament_id))
        .select(payments::id)
        .first(&mut conn)
        .unwrap();
    let payment = Payment::fetch(&txn, &mut conn).unwrap();
    let data = GatewayResponse::completed(&payment, &Settings::default().payment.secret_key)
        .encode()
        .unwrap();
    (txn, url::form_urlencoded::byte_serialize(data.as_bytes()).collect())
}

fn payment_status(pool: &DbPool, txn: &str) -> String {
    let mut conn = pool.get().unwrap();
    payments::table
        .filter(payments::id.eq(txn))
        .select(payments::status)
        .first(&mut conn)
        .unwrap()
}

fn tournament_status(pool: &DbPool, id: &str) -> String {
    let mut conn = pool.get().unwrap();
    tournaments::table
        .filter(tournaments::id.eq(id))
        .select(tournaments::status)
        .first(&mut conn)
        .unwrap()
}

fn registration_form() -> [(&'static str, &'static str); 7] {
    [
        ("player_name", "Ram Thapa"),
        ("email", "ram@example.com"),
        ("phone", "9841000001"),
        ("age", "24"),
        ("experience_level", "intermediate"),
        ("emergency_contact", "9841000002"),
        ("terms_accepted", "on"),
    ]
}

/// Creates an approved tournament, returning its id.
async fn approved_tournament(
    app: &Router,
    pool: &DbPool,
    fee: &str,
) -> (String, TestServer) {
    approved_tournament_for(app, pool, fee, "8").await
}

async fn approved_tournament_for(
    app: &Router,
    pool: &DbPool,
    fee: &str,
    max_participants: &str,
) -> (String, TestServer) {
    let organizer = sign_up(app, "Sita Sharma", "sita@example.com", "organizer").await;
    submit_tournament(&organizer, fee, max_participants).await;
    let admin = admin(app, pool).await;
    let (id, version) = only_tournament(pool);
    let res = admin
        .post(&format!("/admin/tournaments/{id}/approve"))
        .form(&[("version", version.to_string())])
        .await;
    assert_eq!(res.status_code(), StatusCode::SEE_OTHER, "{}", res.text());
    (id, admin)
}

#[tokio::test]
async fn visitors_are_sent_to_login() {
    let (app, _pool) = app();
    let visitor = client(&app);

    let res = visitor.get("/player-dashboard").await;
    assert_eq!(res.status_code(), StatusCode::SEE_OTHER);
    assert_eq!(res.header("location"), "/login?next=%2Fplayer-dashboard");

    let res = visitor.get("/").await;
    assert_eq!(res.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn sign_up_then_log_in_again() {
    let (app, _pool) = app();
    let player = sign_up(&app, "Ram Thapa", "ram@example.com", "player").await;
    assert_eq!(player.get("/player-dashboard").await.status_code(), StatusCode::OK);

    let res = player.post("/logout").await;
    assert_eq!(res.status_code(), StatusCode::SEE_OTHER);

    let res = player
        .post("/login")
        .form(&[("email", "ram@example.com"), ("password", "wrong-password")])
        .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);

    let res = player
        .post("/login")
        .form(&[("email", "RAM@example.com"), ("password", PASSWORD)])
        .await;
    assert_eq!(res.status_code(), StatusCode::SEE_OTHER);
    assert_eq!(res.header("location"), "/player-dashboard");
}

#[tokio::test]
async fn emails_cannot_be_reused() {
    let (app, _pool) = app();
    sign_up(&app, "Ram Thapa", "ram@example.com", "player").await;

    let res = client(&app)
        .post("/register")
        .form(&[
            ("full_name", "Another Ram"),
            ("email", "ram@example.com"),
            ("role", "player"),
            ("password", PASSWORD),
            ("password2", PASSWORD),
        ])
        .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn players_cannot_create_tournaments() {
    let (app, pool) = app();
    let player = sign_up(&app, "Ram Thapa", "ram@example.com", "player").await;

    let res = player.get("/create-tournament").await;
    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);

    let mut conn = pool.get().unwrap();
    let n: i64 = tournaments::table.count().get_result(&mut conn).unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn approval_notifies_organizer_and_players_once() {
    let (app, pool) = app();
    let organizer = sign_up(&app, "Sita Sharma", "sita@example.com", "organizer").await;
    submit_tournament(&organizer, "0", "8").await;
    let (id, version) = only_tournament(&pool);

    // pending tournaments are hidden from the public
    let visitor = client(&app);
    assert_eq!(
        visitor.get(&format!("/tournament/{id}")).await.status_code(),
        StatusCode::NOT_FOUND
    );

    let admin = admin(&app, &pool).await;
    let res = admin
        .post(&format!("/admin/tournaments/{id}/approve"))
        .form(&[("version", version.to_string())])
        .await;
    assert_eq!(res.status_code(), StatusCode::SEE_OTHER);

    let kinds: Vec<String> = {
        let mut conn = pool.get().unwrap();
        notifications::table
            .filter(notifications::kind.ne("tournament_submitted"))
            .select(notifications::kind)
            .order_by(notifications::kind)
            .load(&mut conn)
            .unwrap()
    };
    assert_eq!(kinds, ["new_tournament_available", "tournament_approved"]);

    let (_, version) = only_tournament(&pool);
    let res = admin
        .post(&format!("/admin/tournaments/{id}/approve"))
        .form(&[("version", version.to_string())])
        .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);

    assert_eq!(
        visitor.get(&format!("/tournament/{id}")).await.status_code(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn rejection_needs_a_reason() {
    let (app, pool) = app();
    let organizer = sign_up(&app, "Sita Sharma", "sita@example.com", "organizer").await;
    submit_tournament(&organizer, "0", "8").await;
    let (id, version) = only_tournament(&pool);
    let version = version.to_string();
    let admin = admin(&app, &pool).await;

    let res = admin
        .post(&format!("/admin/tournaments/{id}/reject"))
        .form(&[("reason", " "), ("version", version.as_str())])
        .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);

    let res = admin
        .post(&format!("/admin/tournaments/{id}/reject"))
        .form(&[("reason", "Venue details are missing."), ("version", version.as_str())])
        .await;
    assert_eq!(res.status_code(), StatusCode::SEE_OTHER);

    let mut conn = pool.get().unwrap();
    let (status, notes): (String, Option<String>) = tournaments::table
        .filter(tournaments::id.eq(&id))
        .select((tournaments::status, tournaments::admin_notes))
        .first(&mut conn)
        .unwrap();
    assert_eq!(status, "rejected");
    assert_eq!(notes.as_deref(), Some("Venue details are missing."));
}

#[tokio::test]
async fn free_registration_is_immediate() {
    let (app, pool) = app();
    let (id, _admin) = approved_tournament(&app, &pool, "0").await;
    let player = sign_up(&app, "Ram Thapa", "ram@example.com", "player").await;

    let res = player
        .post(&format!("/tournament/{id}/register"))
        .form(&registration_form())
        .await;
    assert_eq!(res.status_code(), StatusCode::SEE_OTHER, "{}", res.text());
    assert_eq!(res.header("location"), "/player-dashboard");
    assert_eq!(participants(&pool, &id), 1);
    assert_eq!(count_registrations(&pool, &id), 1);

    // a second attempt is refused and changes nothing
    let res = player
        .post(&format!("/tournament/{id}/register"))
        .form(&registration_form())
        .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(participants(&pool, &id), 1);

    let dashboard = player.get("/player-dashboard").await;
    assert_eq!(dashboard.status_code(), StatusCode::OK);
    assert!(dashboard.text().contains("Pokhara Open Badminton"));
}

#[tokio::test]
async fn paid_registration_waits_for_the_payment() {
    let (app, pool) = app();
    let (id, _admin) = approved_tournament(&app, &pool, "500").await;
    let player = sign_up(&app, "Ram Thapa", "ram@example.com", "player").await;

    let res = player
        .post(&format!("/tournament/{id}/register"))
        .form(&registration_form())
        .await;
    assert_eq!(res.status_code(), StatusCode::SEE_OTHER, "{}", res.text());
    assert!(res.header("location").to_str().unwrap().starts_with("/payment/simulate/"));
    assert_eq!(count_registrations(&pool, &id), 0);
    assert_eq!(participants(&pool, &id), 0);

    let txn: String = {
        let mut conn = pool.get().unwrap();
        payments::table
            .filter(payments::tournament_id.eq(&id))
            .select(payments::id)
            .first(&mut conn)
            .unwrap()
    };
    let data = {
        let mut conn = pool.get().unwrap();
        let payment = Payment::fetch(&txn, &mut conn).unwrap();
        GatewayResponse::completed(&payment, &Settings::default().payment.secret_key)
            .encode()
            .unwrap()
    };
    let data: String = url::form_urlencoded::byte_serialize(data.as_bytes()).collect();

    let res = player.get(&format!("/payment/success?data={data}")).await;
    assert_eq!(res.status_code(), StatusCode::OK, "{}", res.text());
    assert!(res.text().contains("Payment Successful!"));
    assert_eq!(count_registrations(&pool, &id), 1);
    assert_eq!(participants(&pool, &id), 1);

    // the gateway may call back twice
    let res = player.get(&format!("/payment/success?data={data}")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(count_registrations(&pool, &id), 1);

    let res = player.get(&format!("/payment/{txn}/receipt")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn tampered_payment_callbacks_are_refused() {
    let (app, pool) = app();
    let (id, _admin) = approved_tournament(&app, &pool, "500").await;
    let player = sign_up(&app, "Ram Thapa", "ram@example.com", "player").await;
    player
        .post(&format!("/tournament/{id}/register"))
        .form(&registration_form())
        .await;

    let data = {
        let mut conn = pool.get().unwrap();
        let txn: String = payments::table
            .select(payments::id)
            .first(&mut conn)
            .unwrap();
        let payment = Payment::fetch(&txn, &mut conn).unwrap();
        GatewayResponse::completed(&payment, "not the merchant secret")
            .encode()
            .unwrap()
    };
    let data: String = url::form_urlencoded::byte_serialize(data.as_bytes()).collect();

    let res = player.get(&format!("/payment/success?data={data}")).await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(count_registrations(&pool, &id), 0);
}

#[tokio::test]
async fn deleting_a_tournament_removes_its_registrations() {
    let (app, pool) = app();
    let (id, admin) = approved_tournament(&app, &pool, "0").await;
    let player = sign_up(&app, "Ram Thapa", "ram@example.com", "player").await;
    player
        .post(&format!("/tournament/{id}/register"))
        .form(&registration_form())
        .await;
    assert_eq!(count_registrations(&pool, &id), 1);

    let res = player.post(&format!("/admin/tournaments/{id}/delete")).await;
    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);

    let organizer = log_in(&app, "sita@example.com").await;
    let ram = user_id(&pool, "ram@example.com");
    let res = organizer
        .post(&format!("/tournament/{id}/results"))
        .form(&[
            ("player_id", ram.as_str()),
            ("matches_played", "3"),
            ("matches_won", "3"),
            ("hours_played", "2"),
            ("position", "1"),
            ("performance_rating", "4.5"),
        ])
        .await;
    assert_eq!(res.status_code(), StatusCode::SEE_OTHER, "{}", res.text());

    let res = admin.post(&format!("/admin/tournaments/{id}/delete")).await;
    assert_eq!(res.status_code(), StatusCode::SEE_OTHER);
    assert_eq!(count_registrations(&pool, &id), 0);

    let mut conn = pool.get().unwrap();
    let left: i64 = tournaments::table.count().get_result(&mut conn).unwrap();
    assert_eq!(left, 0);
    let stats: i64 = player_stats::table
        .filter(player_stats::tournament_id.eq(&id))
        .count()
        .get_result(&mut conn)
        .unwrap();
    assert_eq!(stats, 0);
    // milestones are not tied to one tournament, so they stay
    let achievements: Vec<Option<String>> = player_achievements::table
        .filter(player_achievements::player_id.eq(&ram))
        .select(player_achievements::tournament_id)
        .load(&mut conn)
        .unwrap();
    assert_eq!(achievements, [None]);
}

#[tokio::test]
async fn organizers_export_their_registrations() {
    let (app, pool) = app();
    let (id, _admin) = approved_tournament(&app, &pool, "0").await;
    let player = sign_up(&app, "Ram Thapa", "ram@example.com", "player").await;
    player
        .post(&format!("/tournament/{id}/register"))
        .form(&registration_form())
        .await;

    let organizer = client(&app);
    organizer
        .post("/login")
        .form(&[("email", "sita@example.com"), ("password", PASSWORD)])
        .await;
    let res = organizer.get("/organizer-dashboard/registrations.csv").await;
    assert_eq!(res.status_code(), StatusCode::OK);
    let csv = res.text();
    assert_eq!(csv.lines().count(), 2);
    assert!(csv.contains("Ram Thapa"));
}

#[tokio::test]
async fn forms_render_and_rerender_with_errors() {
    let (app, pool) = app();
    let visitor = client(&app);
    for page in ["/login", "/register"] {
        let res = visitor.get(page).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert!(res.text().contains(r#"name="password""#));
    }

    let (id, _admin) = approved_tournament(&app, &pool, "0").await;
    let player = sign_up(&app, "Ram Thapa", "ram@example.com", "player").await;
    let res = player.get(&format!("/tournament/{id}/register")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert!(res.text().contains(r#"name="player_name""#));

    let mut form = registration_form();
    form[3] = ("age", "two");
    let res = player
        .post(&format!("/tournament/{id}/register"))
        .form(&form)
        .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    assert!(res.text().contains(r#"name="player_name""#));
    assert_eq!(count_registrations(&pool, &id), 0);
}

#[tokio::test]
async fn simulated_payments_are_unavailable_with_a_real_gateway() {
    let mut settings = Settings::default();
    settings.payment.mode = PaymentMode::Gateway;
    let (app, pool) = app_with(settings);
    let (id, _admin) = approved_tournament(&app, &pool, "500").await;
    let player = sign_up(&app, "Ram Thapa", "ram@example.com", "player").await;

    let res = player
        .post(&format!("/tournament/{id}/register"))
        .form(&registration_form())
        .await;
    assert_eq!(res.status_code(), StatusCode::OK, "{}", res.text());
    assert!(res.text().contains(r#"name="signature""#));

    let (txn, _) = completed_callback(&pool, &id);
    let res = player.get(&format!("/payment/simulate/{txn}")).await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(payment_status(&pool, &txn), "pending");
    assert_eq!(count_registrations(&pool, &id), 0);
}

#[tokio::test]
async fn stale_versions_are_refused() {
    let (app, pool) = app();
    let organizer = sign_up(&app, "Sita Sharma", "sita@example.com", "organizer").await;
    submit_tournament(&organizer, "0", "8").await;
    let (id, version) = only_tournament(&pool);
    let admin = admin(&app, &pool).await;

    let res = admin
        .post(&format!("/admin/tournaments/{id}/approve"))
        .form(&[("version", (version + 1).to_string())])
        .await;
    assert_eq!(res.status_code(), StatusCode::CONFLICT);
    assert_eq!(tournament_status(&pool, &id), "pending_approval");

    let res = admin
        .post(&format!("/admin/tournaments/{id}/approve"))
        .form(&[("version", version.to_string())])
        .await;
    assert_eq!(res.status_code(), StatusCode::SEE_OTHER);

    let player = sign_up(&app, "Ram Thapa", "ram@example.com", "player").await;
    player
        .post(&format!("/tournament/{id}/register"))
        .form(&registration_form())
        .await;
    let (registration, _, version) = registration_of(&pool, &id, "ram@example.com");

    let stale = (version + 1).to_string();
    let res = organizer
        .post(&format!("/registrations/{registration}/status"))
        .form(&[("status", "confirmed"), ("version", stale.as_str())])
        .await;
    assert_eq!(res.status_code(), StatusCode::CONFLICT);
    let (_, status, _) = registration_of(&pool, &id, "ram@example.com");
    assert_eq!(status, "registered");

    let current = version.to_string();
    let res = organizer
        .post(&format!("/registrations/{registration}/status"))
        .form(&[("status", "confirmed"), ("version", current.as_str())])
        .await;
    assert_eq!(res.status_code(), StatusCode::SEE_OTHER);
    let (_, status, _) = registration_of(&pool, &id, "ram@example.com");
    assert_eq!(status, "confirmed");
}

#[tokio::test]
async fn rejected_players_cannot_be_restored_into_a_full_tournament() {
    let (app, pool) = app();
    let (id, _admin) = approved_tournament_for(&app, &pool, "0", "2").await;
    let organizer = log_in(&app, "sita@example.com").await;

    for (name, email) in [("Ram Thapa", "ram@example.com"), ("Gita Gurung", "gita@example.com")] {
        let player = sign_up(&app, name, email, "player").await;
        let res = player
            .post(&format!("/tournament/{id}/register"))
            .form(&registration_form())
            .await;
        assert_eq!(res.status_code(), StatusCode::SEE_OTHER, "{}", res.text());
    }
    assert_eq!(participants(&pool, &id), 2);

    let late = sign_up(&app, "Hari Rai", "hari@example.com", "player").await;
    let res = late
        .post(&format!("/tournament/{id}/register"))
        .form(&registration_form())
        .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);

    let (ram, _, version) = registration_of(&pool, &id, "ram@example.com");
    let version = version.to_string();
    let res = organizer
        .post(&format!("/registrations/{ram}/status"))
        .form(&[("status", "rejected"), ("version", version.as_str())])
        .await;
    assert_eq!(res.status_code(), StatusCode::SEE_OTHER);
    assert_eq!(participants(&pool, &id), 1);

    let res = late
        .post(&format!("/tournament/{id}/register"))
        .form(&registration_form())
        .await;
    assert_eq!(res.status_code(), StatusCode::SEE_OTHER, "{}", res.text());
    assert_eq!(participants(&pool, &id), 2);

    let (_, status, version) = registration_of(&pool, &id, "ram@example.com");
    assert_eq!(status, "rejected");
    let version = version.to_string();
    let res = organizer
        .post(&format!("/registrations/{ram}/status"))
        .form(&[("status", "registered"), ("version", version.as_str())])
        .await;
    assert_eq!(res.status_code(), StatusCode::CONFLICT);
    assert_eq!(participants(&pool, &id), 2);
    let (_, status, _) = registration_of(&pool, &id, "ram@example.com");
    assert_eq!(status, "rejected");
}

#[tokio::test]
async fn organizers_draw_and_score_a_bracket() {
    let (app, pool) = app();
    let (id, _admin) = approved_tournament(&app, &pool, "0").await;
    let organizer = log_in(&app, "sita@example.com").await;

    let res = organizer.post(&format!("/tournament/{id}/bracket/seed")).await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);

    for (name, email) in [("Ram Thapa", "ram@example.com"), ("Gita Gurung", "gita@example.com")] {
        let player = sign_up(&app, name, email, "player").await;
        player
            .post(&format!("/tournament/{id}/register"))
            .form(&registration_form())
            .await;
    }

    let res = organizer.post(&format!("/tournament/{id}/bracket/seed")).await;
    assert_eq!(res.status_code(), StatusCode::SEE_OTHER, "{}", res.text());
    let res = organizer.post(&format!("/tournament/{id}/bracket/seed")).await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);

    let finalist: String = {
        let mut conn = pool.get().unwrap();
        bracket_matches::table
            .filter(bracket_matches::tournament_id.eq(&id))
            .filter(bracket_matches::id.eq("round_0_match_0"))
            .select(bracket_matches::player1_id)
            .first::<Option<String>>(&mut conn)
            .unwrap()
            .unwrap()
    };

    let path = format!("/tournament/{id}/bracket/matches/round_0_match_0");
    let res = organizer
        .post(&path)
        .form(&[("winner_id", "somebody-else"), ("score", "21-10")])
        .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);

    let res = organizer
        .post(&path)
        .form(&[("winner_id", finalist.as_str()), ("score", "21-10, 21-15")])
        .await;
    assert_eq!(res.status_code(), StatusCode::SEE_OTHER, "{}", res.text());

    let (winner, status): (Option<String>, String) = {
        let mut conn = pool.get().unwrap();
        bracket_matches::table
            .filter(bracket_matches::tournament_id.eq(&id))
            .filter(bracket_matches::id.eq("round_0_match_0"))
            .select((bracket_matches::winner_id, bracket_matches::status))
            .first(&mut conn)
            .unwrap()
    };
    assert_eq!(winner.as_deref(), Some(finalist.as_str()));
    assert_eq!(status, "completed");

    let res = organizer
        .post(&format!("/tournament/{id}/results"))
        .form(&[
            ("player_id", finalist.as_str()),
            ("matches_played", "1"),
            ("matches_won", "2"),
        ])
        .await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);

    let res = organizer
        .post(&format!("/tournament/{id}/results"))
        .form(&[
            ("player_id", finalist.as_str()),
            ("matches_played", "1"),
            ("matches_won", "1"),
            ("position", "1"),
        ])
        .await;
    assert_eq!(res.status_code(), StatusCode::SEE_OTHER, "{}", res.text());

    let mut conn = pool.get().unwrap();
    let titles: Vec<String> = player_achievements::table
        .filter(player_achievements::player_id.eq(&finalist))
        .select(player_achievements::title)
        .order_by(player_achievements::title)
        .load(&mut conn)
        .unwrap();
    assert_eq!(titles, ["First Steps", "Tournament Champion"]);
}

#[tokio::test]
async fn payments_arriving_after_the_last_place_went_are_refunded() {
    let (app, pool) = app();
    let (id, _admin) = approved_tournament(&app, &pool, "500").await;
    let player = sign_up(&app, "Ram Thapa", "ram@example.com", "player").await;
    player
        .post(&format!("/tournament/{id}/register"))
        .form(&registration_form())
        .await;
    let (txn, data) = completed_callback(&pool, &id);

    {
        let mut conn = pool.get().unwrap();
        diesel::update(tournaments::table.filter(tournaments::id.eq(&id)))
            .set(tournaments::current_participants.eq(tournaments::max_participants))
            .execute(&mut conn)
            .unwrap();
    }

    let res = player.get(&format!("/payment/success?data={data}")).await;
    assert_eq!(res.status_code(), StatusCode::OK, "{}", res.text());
    assert!(res.text().contains("could not be applied"));
    assert!(res.text().contains("filled up"));
    assert_eq!(payment_status(&pool, &txn), "failed");
    assert_eq!(count_registrations(&pool, &id), 0);
    assert_eq!(participants(&pool, &id), 8);
}

#[tokio::test]
async fn payments_for_withdrawn_or_closed_tournaments_are_refunded() {
    for (column, reason) in [("status", "no longer open"), ("deadline", "Registration closed")] {
        let (app, pool) = app();
        let (id, _admin) = approved_tournament(&app, &pool, "500").await;
        let player = sign_up(&app, "Ram Thapa", "ram@example.com", "player").await;
        player
            .post(&format!("/tournament/{id}/register"))
            .form(&registration_form())
            .await;
        let (txn, data) = completed_callback(&pool, &id);

        {
            let mut conn = pool.get().unwrap();
            let target = tournaments::table.filter(tournaments::id.eq(&id));
            if column == "status" {
                diesel::update(target)
                    .set(tournaments::status.eq("cancelled"))
                    .execute(&mut conn)
                    .unwrap();
            } else {
                let past = chrono::NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
                diesel::update(target)
                    .set(tournaments::registration_deadline.eq(past))
                    .execute(&mut conn)
                    .unwrap();
            }
        }

        let res = player.get(&format!("/payment/success?data={data}")).await;
        assert_eq!(res.status_code(), StatusCode::OK, "{}", res.text());
        assert!(res.text().contains(reason), "{}", res.text());
        assert_eq!(payment_status(&pool, &txn), "failed");
        assert_eq!(count_registrations(&pool, &id), 0);
    }
}
