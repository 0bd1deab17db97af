//! In-app notifications.
//!
//! A notification is either addressed to a single user (`recipient_id`) or to
//! everybody holding a role (`target_role`). Whether a notification has been
//! read or dismissed is tracked per viewer in `notification_receipts`, so a
//! broadcast read by one player stays unread for the others.

use chrono::{NaiveDateTime, Utc};
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::User,
    msg::{Msg, MsgContents, Outbox},
    permission::Role,
    schema::{notification_receipts, notifications},
    sql_text::text_enum,
};

pub mod view;

text_enum! {
    pub enum NotificationKind {
        TournamentSubmitted => "tournament_submitted",
        TournamentApproved => "tournament_approved",
        TournamentRejected => "tournament_rejected",
        TournamentDeleted => "tournament_deleted",
        NewTournamentAvailable => "new_tournament_available",
        RegistrationSuccess => "tournament_registration_success",
        RegistrationConfirmed => "registration_confirmed",
        RegistrationRejected => "registration_rejected",
        PaymentSuccess => "payment_success",
    }
}

text_enum! {
    pub enum TargetRole {
        Player => "player",
        Organizer => "organizer",
        Admin => "admin",
        All => "all",
    }
}

impl From<Role> for TargetRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Player => TargetRole::Player,
            Role::Organizer => TargetRole::Organizer,
            Role::Admin => TargetRole::Admin,
        }
    }
}

impl NotificationKind {
    /// Bootstrap colour used for the notification's accent.
    pub fn colour(&self) -> &'static str {
        match self {
            NotificationKind::TournamentSubmitted => "info",
            NotificationKind::TournamentApproved
            | NotificationKind::RegistrationSuccess
            | NotificationKind::RegistrationConfirmed
            | NotificationKind::PaymentSuccess => "success",
            NotificationKind::TournamentRejected
            | NotificationKind::TournamentDeleted
            | NotificationKind::RegistrationRejected => "danger",
            NotificationKind::NewTournamentAvailable => "primary",
        }
    }
}

#[derive(Queryable, Selectable, Clone, Debug, Serialize, Deserialize)]
#[diesel(table_name = notifications)]
#[diesel(check_for_backend(Sqlite))]
pub struct Notification {
    pub id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub recipient_id: Option<String>,
    pub target_role: Option<TargetRole>,
    pub tournament_id: Option<String>,
    pub tournament_name: Option<String>,
    pub created_at: NaiveDateTime,
}

impl Notification {
    pub fn is_visible_to<const TX: bool>(&self, user: &User<TX>) -> bool {
        match (&self.recipient_id, self.target_role) {
            (Some(recipient), _) => *recipient == user.id,
            (None, Some(TargetRole::All)) => true,
            (None, Some(role)) => role == TargetRole::from(user.role),
            (None, None) => false,
        }
    }
}

/// Who a new notification is for.
#[derive(Debug, Clone)]
pub enum Audience {
    User(String),
    Role(TargetRole),
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub audience: Audience,
    /// `(id, name)` of the tournament this is about.
    pub tournament: Option<(String, String)>,
}

impl NewNotification {
    pub fn new(
        kind: NotificationKind,
        audience: Audience,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            audience,
            tournament: None,
        }
    }

    pub fn about(mut self, tournament_id: &str, tournament_name: &str) -> Self {
        self.tournament =
            Some((tournament_id.to_string(), tournament_name.to_string()));
        self
    }
}

/// Stores a notification and forwards it to connected viewers.
#[tracing::instrument(skip(conn, outbox))]
pub fn add_notification(
    payload: NewNotification,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
    outbox: &Outbox,
) -> QueryResult<Notification> {
    let (recipient_id, target_role) = match payload.audience {
        Audience::User(id) => (Some(id), None),
        Audience::Role(role) => (None, Some(role)),
    };
    let (tournament_id, tournament_name) = match payload.tournament {
        Some((id, name)) => (Some(id), Some(name)),
        None => (None, None),
    };

    let notification = Notification {
        id: format!("notification_{}", Uuid::now_v7()),
        kind: payload.kind,
        title: payload.title,
        message: payload.message,
        recipient_id,
        target_role,
        tournament_id,
        tournament_name,
        created_at: Utc::now().naive_utc(),
    };

    diesel::insert_into(notifications::table)
        .values((
            notifications::id.eq(&notification.id),
            notifications::kind.eq(notification.kind),
            notifications::title.eq(&notification.title),
            notifications::message.eq(&notification.message),
            notifications::recipient_id.eq(&notification.recipient_id),
            notifications::target_role.eq(notification.target_role),
            notifications::tournament_id.eq(&notification.tournament_id),
            notifications::tournament_name.eq(&notification.tournament_name),
            notifications::created_at.eq(notification.created_at),
        ))
        .execute(&mut *conn)?;

    tracing::debug!("added {} notification {}", notification.kind, notification.id);

    outbox.publish(Msg {
        inner: MsgContents::Notification(notification.clone()),
    });

    Ok(notification)
}

#[derive(Debug, Clone)]
pub struct InboxItem {
    pub notification: Notification,
    pub read: bool,
}

/// Ids of the notifications the user can see and has not dismissed.
fn visible_ids<const TX: bool>(
    user: &User<TX>,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<Vec<String>> {
    inbox(user, conn).map(|items| {
        items
            .into_iter()
            .map(|item| item.notification.id)
            .collect()
    })
}

/// The user's notifications, newest first. Dismissed notifications are left
/// out.
pub fn inbox<const TX: bool>(
    user: &User<TX>,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<Vec<InboxItem>> {
    let role = TargetRole::from(user.role);

    notifications::table
        .left_join(
            notification_receipts::table.on(notification_receipts::notification_id
                .eq(notifications::id)
                .and(notification_receipts::user_id.eq(&user.id))),
        )
        .filter(
            notifications::recipient_id.eq(&user.id).or(notifications::recipient_id
                .is_null()
                .and(
                    notifications::target_role
                        .eq(role)
                        .or(notifications::target_role.eq(TargetRole::All)),
                )),
        )
        .filter(
            notification_receipts::dismissed
                .is_null()
                .or(notification_receipts::dismissed.eq(false)),
        )
        .order_by((notifications::created_at.desc(), notifications::id.desc()))
        .select((
            Notification::as_select(),
            notification_receipts::read.nullable(),
        ))
        .load::<(Notification, Option<bool>)>(&mut *conn)
        .map(|rows| {
            rows.into_iter()
                .map(|(notification, read)| InboxItem {
                    notification,
                    read: read.unwrap_or(false),
                })
                .collect()
        })
}

pub fn unread_count<const TX: bool>(
    user: &User<TX>,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<usize> {
    Ok(inbox(user, conn)?.iter().filter(|item| !item.read).count())
}

fn upsert_receipts(
    user_id: &str,
    ids: &[String],
    read: bool,
    dismissed: bool,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<()> {
    for id in ids {
        let insert = diesel::insert_into(notification_receipts::table).values((
            notification_receipts::notification_id.eq(id),
            notification_receipts::user_id.eq(user_id),
            notification_receipts::read.eq(read),
            notification_receipts::dismissed.eq(dismissed),
        ));

        if dismissed {
            insert
                .on_conflict((
                    notification_receipts::notification_id,
                    notification_receipts::user_id,
                ))
                .do_update()
                .set(notification_receipts::dismissed.eq(true))
                .execute(&mut *conn)?;
        } else {
            insert
                .on_conflict((
                    notification_receipts::notification_id,
                    notification_receipts::user_id,
                ))
                .do_update()
                .set(notification_receipts::read.eq(true))
                .execute(&mut *conn)?;
        }
    }
    Ok(())
}

/// Marks a single notification as read. Returns `Ok(false)` if the user
/// cannot see a notification with that id.
pub fn mark_as_read<const TX: bool>(
    user: &User<TX>,
    id: &str,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<bool> {
    let visible = visible_ids(user, conn)?;
    if !visible.iter().any(|v| v == id) {
        return Ok(false);
    }
    upsert_receipts(&user.id, &[id.to_string()], true, false, conn)?;
    Ok(true)
}

pub fn mark_all_as_read<const TX: bool>(
    user: &User<TX>,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<usize> {
    let ids = visible_ids(user, conn)?;
    upsert_receipts(&user.id, &ids, true, false, conn)?;
    Ok(ids.len())
}

/// Dismisses every notification the user can currently see. Notifications
/// created afterwards are unaffected.
pub fn clear_notifications<const TX: bool>(
    user: &User<TX>,
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<usize> {
    let ids = visible_ids(user, conn)?;
    upsert_receipts(&user.id, &ids, false, true, conn)?;
    Ok(ids.len())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use diesel::{Connection, RunQueryDsl, SqliteConnection};
    use diesel_migrations::MigrationHarness;

    use super::*;
    use crate::{MIGRATIONS, schema::users};

    fn conn() -> SqliteConnection {
        let mut conn = SqliteConnection::establish(":memory:").unwrap();
        conn.run_pending_migrations(MIGRATIONS).unwrap();
        conn
    }

    fn user(id: &str, role: Role, conn: &mut SqliteConnection) -> User<false> {
        diesel::insert_into(users::table)
            .values((
                users::id.eq(id),
                users::email.eq(format!("{id}@example.com")),
                users::full_name.eq(id),
                users::role.eq(role),
                users::password_hash.eq("x"),
                users::created_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)
            .unwrap();
        User::fetch(id, conn).unwrap().unwrap()
    }

    #[test]
    fn broadcasts_are_read_per_viewer() {
        let mut conn = conn();
        let (tx, _rx) = tokio::sync::broadcast::channel(16);
        let outbox = Outbox::immediate(tx);
        let ram = user("ram", Role::Player, &mut conn);
        let sita = user("sita", Role::Player, &mut conn);
        let org = user("org", Role::Organizer, &mut conn);

        add_notification(
            NewNotification::new(
                NotificationKind::NewTournamentAvailable,
                Audience::Role(TargetRole::Player),
                "New Tournament Available!",
                "Kathmandu Cup is open for registration.",
            ),
            &mut conn,
            &outbox,
        )
        .unwrap();

        assert_eq!(unread_count(&ram, &mut conn).unwrap(), 1);
        assert_eq!(unread_count(&sita, &mut conn).unwrap(), 1);
        assert_eq!(unread_count(&org, &mut conn).unwrap(), 0);

        assert_eq!(mark_all_as_read(&ram, &mut conn).unwrap(), 1);
        assert_eq!(unread_count(&ram, &mut conn).unwrap(), 0);
        assert_eq!(unread_count(&sita, &mut conn).unwrap(), 1);
    }

    #[test]
    fn direct_notifications_are_private() {
        let mut conn = conn();
        let (tx, mut rx) = tokio::sync::broadcast::channel(16);
        let outbox = Outbox::immediate(tx);
        let ram = user("ram", Role::Player, &mut conn);
        let sita = user("sita", Role::Player, &mut conn);

        let n = add_notification(
            NewNotification::new(
                NotificationKind::PaymentSuccess,
                Audience::User(ram.id.clone()),
                "Payment Successful!",
                "Paid NPR 500",
            ),
            &mut conn,
            &outbox,
        )
        .unwrap();

        assert!(n.is_visible_to(&ram));
        assert!(!n.is_visible_to(&sita));
        assert_eq!(inbox(&sita, &mut conn).unwrap().len(), 0);
        assert!(!mark_as_read(&sita, &n.id, &mut conn).unwrap());
        assert!(mark_as_read(&ram, &n.id, &mut conn).unwrap());

        let published = rx.try_recv().unwrap();
        let MsgContents::Notification(published) = published.inner;
        assert_eq!(published.id, n.id);
    }

    #[test]
    fn cleared_notifications_disappear() {
        let mut conn = conn();
        let (tx, _rx) = tokio::sync::broadcast::channel(16);
        let outbox = Outbox::immediate(tx);
        let admin = user("admin", Role::Admin, &mut conn);

        for name in ["A", "B"] {
            add_notification(
                NewNotification::new(
                    NotificationKind::TournamentSubmitted,
                    Audience::Role(TargetRole::Admin),
                    "New Tournament Submitted",
                    format!("{name} needs review"),
                ),
                &mut conn,
                &outbox,
            )
            .unwrap();
        }

        assert_eq!(inbox(&admin, &mut conn).unwrap().len(), 2);
        assert_eq!(clear_notifications(&admin, &mut conn).unwrap(), 2);
        assert_eq!(inbox(&admin, &mut conn).unwrap().len(), 0);
        assert_eq!(unread_count(&admin, &mut conn).unwrap(), 0);
    }
}
