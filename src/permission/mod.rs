use crate::{
    auth::User,
    sql_text::text_enum,
    util_resp::FailureResponse,
};

text_enum! {
    /// What a user is allowed to do on the platform.
    pub enum Role {
        Player => "player",
        Organizer => "organizer",
        Admin => "admin",
    }
}

impl Role {
    /// Roles which can be chosen when signing up.
    pub const SELF_SERVICE: &'static [Role] = &[Role::Player, Role::Organizer];

    pub fn label(&self) -> &'static str {
        match self {
            Role::Player => "Player",
            Role::Organizer => "Organizer",
            Role::Admin => "Administrator",
        }
    }

    /// The page a user lands on after logging in.
    pub fn home(&self) -> &'static str {
        match self {
            Role::Player => "/player-dashboard",
            Role::Organizer => "/organizer-dashboard",
            Role::Admin => "/admin",
        }
    }

    pub fn can_create_tournaments(&self) -> bool {
        matches!(self, Role::Organizer | Role::Admin)
    }
}

/// Fails with [`FailureResponse::Unauthorized`] unless the user has one of
/// the given roles.
pub fn require_role<const TX: bool>(
    user: &User<TX>,
    roles: &[Role],
) -> Result<(), FailureResponse> {
    if roles.contains(&user.role) {
        Ok(())
    } else {
        tracing::trace!(
            "user {} with role {} denied (needs one of {roles:?})",
            user.id,
            user.role
        );
        Err(FailureResponse::Unauthorized(()))
    }
}
