//! Fills a database with demo accounts and tournaments.

use chrono::{Days, NaiveDate};
use clap::Parser;
use diesel::{Connection, SqliteConnection};
use diesel_migrations::MigrationHarness;
use khelkheleko::{
    MIGRATIONS,
    auth::{User, register::create_user},
    permission::Role,
    tournaments::{
        TournamentStatus, TournamentType,
        create::{TournamentDetails, insert_tournament},
        today,
    },
};

#[derive(Parser)]
struct Seed {
    /// Falls back to `DATABASE_URL`.
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
    /// Password given to every demo account.
    #[arg(long, default_value = "password")]
    password: String,
}

struct Demo {
    name: &'static str,
    sport: &'static str,
    province: &'static str,
    district: &'static str,
    venue: &'static str,
    location: Option<(f64, f64)>,
    fee: f64,
    prize: f64,
    max: i64,
    /// Days from today until registration closes.
    closes_in: u64,
    approve: bool,
    premium: bool,
}

const DEMOS: &[Demo] = &[
    Demo {
        name: "Kathmandu Futsal Cup",
        sport: "Futsal",
        province: "Bagmati Province",
        district: "Kathmandu",
        venue: "Dasharath Stadium",
        location: Some((27.6947, 85.3145)),
        fee: 0.0,
        prize: 50000.0,
        max: 16,
        closes_in: 20,
        approve: true,
        premium: true,
    },
    Demo {
        name: "Pokhara Lakeside Badminton Open",
        sport: "Badminton",
        province: "Gandaki Province",
        district: "Kaski",
        venue: "Pokhara Covered Hall",
        location: Some((28.2096, 83.9856)),
        fee: 500.0,
        prize: 20000.0,
        max: 32,
        closes_in: 14,
        approve: true,
        premium: false,
    },
    Demo {
        name: "Biratnagar Table Tennis League",
        sport: "Table Tennis",
        province: "Koshi Province",
        district: "Morang",
        venue: "Biratnagar Sports Hall",
        location: Some((26.4525, 87.2718)),
        fee: 300.0,
        prize: 10000.0,
        max: 24,
        closes_in: 30,
        approve: true,
        premium: false,
    },
    Demo {
        name: "Chitwan Cricket Challenge",
        sport: "Cricket",
        province: "Bagmati Province",
        district: "Chitwan",
        venue: "Bharatpur Cricket Ground",
        location: None,
        fee: 2000.0,
        prize: 100000.0,
        max: 8,
        closes_in: 10,
        approve: false,
        premium: false,
    },
];

fn details(demo: &Demo, start: NaiveDate) -> TournamentDetails {
    let deadline = start - Days::new(2);
    TournamentDetails {
        name: demo.name.to_string(),
        description: format!("{} at {}.", demo.sport, demo.venue),
        sport_type: demo.sport.to_string(),
        tournament_type: TournamentType::SingleElimination,
        start_date: start,
        end_date: start + Days::new(2),
        registration_deadline: deadline,
        max_participants: demo.max,
        entry_fee: demo.fee,
        prize_pool: demo.prize,
        venue_name: demo.venue.to_string(),
        venue_address: format!("{}, {}", demo.district, demo.province),
        province: demo.province.to_string(),
        district: demo.district.to_string(),
        location: demo.location,
        rules: "Standard federation rules apply.".to_string(),
        requirements: "Bring your own kit.".to_string(),
        contact_phone: "9841000000".to_string(),
        contact_email: "organizer@example.com".to_string(),
        image_urls: Vec::new(),
        premium_listing: demo.premium,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Seed::parse();
    let mut conn = SqliteConnection::establish(&args.database_url)?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| format!("could not run migrations: {e}"))?;

    let account = |email: &str, name: &str, role: Role, conn: &mut SqliteConnection| {
        create_user(email, name, Some("9800000000"), role, &args.password, conn)
            .map_err(|e| format!("could not create {email}: {e:?}"))
    };

    account("admin@example.com", "Site Admin", Role::Admin, &mut conn)?;
    let organizer_id =
        account("organizer@example.com", "Sita Sharma", Role::Organizer, &mut conn)?;
    for (email, name) in [
        ("ram@example.com", "Ram Thapa"),
        ("gita@example.com", "Gita Gurung"),
        ("hari@example.com", "Hari Rai"),
    ] {
        account(email, name, Role::Player, &mut conn)?;
    }

    let organizer = User::<false>::fetch(&organizer_id, &mut conn)?
        .ok_or("organizer disappeared")?;

    for demo in DEMOS {
        let start = today() + Days::new(demo.closes_in + 2);
        let tournament = insert_tournament(details(demo, start), &organizer, &mut conn)?;
        if demo.approve {
            tournament
                .set_status(TournamentStatus::Approved, None, tournament.version, &mut conn)
                .map_err(|e| format!("could not approve {}: {e:?}", demo.name))?;
        }
        println!("added {} ({})", tournament.name, tournament.id);
    }

    Ok(())
}
