//! Tournament discovery and registration for Nepal's sports community.
//!
//! Organizers submit tournaments, administrators approve them, players find
//! them (by sport, province or on the map), register and pay their entry fee.

use diesel_migrations::{EmbeddedMigrations, embed_migrations};

pub(crate) mod sql_text;

pub mod auth;
pub mod config;
pub mod msg;
pub mod notifications;
pub mod payments;
pub mod permission;
pub mod players;
pub mod registrations;
pub mod schema;
pub mod state;
pub mod template;
pub mod tournaments;
pub mod util_resp;
pub mod validation;
pub mod widgets;

#[cfg(test)]
mod test;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
