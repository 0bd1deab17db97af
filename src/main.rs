use std::path::PathBuf;

use clap::{Parser, Subcommand};
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, RunQueryDsl};
use diesel_migrations::MigrationHarness;
use khelkheleko::{
    MIGRATIONS,
    auth::{User, register::create_user},
    config::{Settings, create_app},
    permission::Role,
    schema::users,
    state::make_pool,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "खेल खेलेको tournament server")]
struct Cli {
    /// Path to a TOML settings file.
    #[arg(long, short, env = "KHEL_CONFIG")]
    config: Option<PathBuf>,
    /// Log filter, e.g. `info` or `khelkheleko=debug,tower_http=debug`.
    #[arg(long, default_value = "info")]
    log: String,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the web server (the default).
    Serve,
    /// Create an administrator account.
    CreateAdmin {
        #[arg(long)]
        email: String,
        #[arg(long)]
        full_name: String,
        #[arg(long)]
        password: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log)?)
        .init();

    let settings = Settings::load(cli.config.as_deref())?;
    let pool = make_pool(&settings.database_url)?;
    {
        let mut conn = pool.get()?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| format!("could not run migrations: {e}"))?;
    }

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let listener = tokio::net::TcpListener::bind(&settings.bind).await?;
            tracing::info!("listening on {}", listener.local_addr()?);
            axum::serve(listener, create_app(pool, settings)).await?;
        }
        Command::CreateAdmin {
            email,
            full_name,
            password,
        } => {
            if !User::<false>::validate_full_name(&full_name)
                || !User::<false>::validate_password(&password)
            {
                return Err("the name needs at least 2 characters and the password at least 6".into());
            }
            let mut conn = pool.get()?;
            let taken = users::table
                .filter(users::email.eq(email.trim().to_lowercase()))
                .select(users::id)
                .first::<String>(&mut conn)
                .optional()?;
            if taken.is_some() {
                return Err(format!("an account already uses {email}").into());
            }
            let id = create_user(
                &email,
                &full_name,
                None,
                Role::Admin,
                &password,
                &mut conn,
            )
            .map_err(|e| format!("could not create account: {e:?}"))?;
            println!("created administrator {id}");
        }
    }

    Ok(())
}
