//! Staff directory and the canvas user pool.
//!
//! Materialises every profile holding a moderation role and serves the
//! searchable, role-filtered pool the team canvas drags users out of.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use diesel::prelude::*;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::shared::schema::{profiles, user_roles};
use crate::shared::state::AppState;

/// Platform role, one per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    SuperModerator,
    SeniorModerator,
    Moderator,
    User,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "super_moderator" => Some(Self::SuperModerator),
            "senior_moderator" => Some(Self::SeniorModerator),
            "moderator" => Some(Self::Moderator),
            "user" => Some(Self::User),
            _ => None,
        }
    }

    /// Roles the canvas admits into the pool.
    pub fn is_moderation(self) -> bool {
        matches!(
            self,
            Self::SuperModerator | Self::SeniorModerator | Self::Moderator
        )
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::SuperModerator => write!(f, "super_moderator"),
            Self::SeniorModerator => write!(f, "senior_moderator"),
            Self::Moderator => write!(f, "moderator"),
            Self::User => write!(f, "user"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = profiles)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = user_roles)]
pub struct UserRoleRow {
    pub user_id: Uuid,
    pub role: String,
}

/// A profile joined with its single role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserWithRole {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub role: Role,
}

impl UserWithRole {
    fn matches(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.email.to_lowercase().contains(&needle)
            || self
                .full_name
                .as_deref()
                .map(|n| n.to_lowercase().contains(&needle))
                .unwrap_or(false)
    }
}

/// Loads every user holding a moderation role. Rows whose role string is
/// unrecognised are dropped, not raised.
pub fn load_user_pool(conn: &mut PgConnection) -> Result<Vec<UserWithRole>, diesel::result::Error> {
    let all_profiles: Vec<UserProfile> = profiles::table.load(conn)?;
    let all_roles: Vec<UserRoleRow> = user_roles::table.load(conn)?;

    let mut by_id: HashMap<Uuid, UserProfile> =
        all_profiles.into_iter().map(|p| (p.id, p)).collect();

    let mut pool = Vec::new();
    for row in all_roles {
        let Some(role) = Role::parse(&row.role) else {
            warn!("Dropping user {} with unrecognised role {:?}", row.user_id, row.role);
            continue;
        };
        if !role.is_moderation() {
            continue;
        }
        if let Some(profile) = by_id.remove(&row.user_id) {
            pool.push(UserWithRole {
                id: profile.id,
                email: profile.email,
                full_name: profile.full_name,
                avatar_url: profile.avatar_url,
                role,
            });
        }
    }
    pool.sort_by(|a, b| {
        a.full_name
            .as_deref()
            .unwrap_or(&a.email)
            .to_lowercase()
            .cmp(&b.full_name.as_deref().unwrap_or(&b.email).to_lowercase())
    });
    Ok(pool)
}

/// Resolves one user with their role, if the role is recognised.
pub fn find_user(
    conn: &mut PgConnection,
    user_id: Uuid,
) -> Result<Option<UserWithRole>, diesel::result::Error> {
    let profile: Option<UserProfile> = profiles::table
        .filter(profiles::id.eq(user_id))
        .first(conn)
        .optional()?;
    let Some(profile) = profile else {
        return Ok(None);
    };
    let role_row: Option<UserRoleRow> = user_roles::table
        .filter(user_roles::user_id.eq(user_id))
        .first(conn)
        .optional()?;
    let Some(role) = role_row.and_then(|r| Role::parse(&r.role)) else {
        return Ok(None);
    };
    Ok(Some(UserWithRole {
        id: profile.id,
        email: profile.email,
        full_name: profile.full_name,
        avatar_url: profile.avatar_url,
        role,
    }))
}

/// In-memory search and role filter over the materialised pool.
pub fn filter_pool(pool: &[UserWithRole], search: Option<&str>, role: Option<Role>) -> Vec<UserWithRole> {
    pool.iter()
        .filter(|u| role.map(|r| u.role == r).unwrap_or(true))
        .filter(|u| search.map(|s| s.trim().is_empty() || u.matches(s)).unwrap_or(true))
        .cloned()
        .collect()
}

#[derive(Debug, Default, Serialize)]
pub struct PoolGroups {
    pub super_moderators: Vec<UserWithRole>,
    pub senior_moderators: Vec<UserWithRole>,
    pub moderators: Vec<UserWithRole>,
}

pub fn group_by_role(users: Vec<UserWithRole>) -> PoolGroups {
    let mut groups = PoolGroups::default();
    for user in users {
        match user.role {
            Role::SuperModerator => groups.super_moderators.push(user),
            Role::SeniorModerator => groups.senior_moderators.push(user),
            Role::Moderator => groups.moderators.push(user),
            _ => {}
        }
    }
    groups
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Invalid role filter: {0}")]
    InvalidRole(String),
}

impl IntoResponse for DirectoryError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            Self::Database(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            Self::InvalidRole(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct PoolQuery {
    pub search: Option<String>,
    pub role: Option<String>,
}

/// `GET /api/directory/pool` — the draggable user pool, grouped by role.
pub async fn handle_get_pool(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PoolQuery>,
) -> Result<Json<serde_json::Value>, DirectoryError> {
    let role = match query.role.as_deref() {
        None | Some("") | Some("all") => None,
        Some(raw) => Some(
            Role::parse(raw)
                .filter(|r| r.is_moderation())
                .ok_or_else(|| DirectoryError::InvalidRole(raw.to_string()))?,
        ),
    };

    let pool = state.conn.clone();
    let users = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().map_err(|e| DirectoryError::Database(e.to_string()))?;
        load_user_pool(&mut conn).map_err(|e| DirectoryError::Database(e.to_string()))
    })
    .await
    .map_err(|e| DirectoryError::Database(e.to_string()))??;

    let filtered = filter_pool(&users, query.search.as_deref(), role);
    let groups = group_by_role(filtered);

    Ok(Json(serde_json::json!({
        "success": true,
        "data": groups
    })))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new().route("/api/directory/pool", get(handle_get_pool))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str, email: &str, role: Role) -> UserWithRole {
        UserWithRole {
            id: Uuid::new_v4(),
            email: email.to_string(),
            full_name: Some(name.to_string()),
            avatar_url: None,
            role,
        }
    }

    #[test]
    fn test_role_round_trip() {
        for raw in ["admin", "super_moderator", "senior_moderator", "moderator", "user"] {
            let role = Role::parse(raw).unwrap();
            assert_eq!(role.to_string(), raw);
        }
        assert!(Role::parse("owner").is_none());
        assert!(Role::parse("").is_none());
    }

    #[test]
    fn test_moderation_roles() {
        assert!(Role::SuperModerator.is_moderation());
        assert!(Role::SeniorModerator.is_moderation());
        assert!(Role::Moderator.is_moderation());
        assert!(!Role::Admin.is_moderation());
        assert!(!Role::User.is_moderation());
    }

    #[test]
    fn test_search_is_case_insensitive_over_name_and_email() {
        let pool = vec![
            user("Alice Jones", "alice@example.com", Role::Moderator),
            user("Bob Marsh", "bob@example.com", Role::Moderator),
        ];
        let hits = filter_pool(&pool, Some("ALICE"), None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].email, "alice@example.com");

        let hits = filter_pool(&pool, Some("marsh"), None);
        assert_eq!(hits.len(), 1);

        let hits = filter_pool(&pool, Some("@example.com"), None);
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_role_filter() {
        let pool = vec![
            user("Alice", "alice@example.com", Role::SuperModerator),
            user("Bob", "bob@example.com", Role::Moderator),
        ];
        let hits = filter_pool(&pool, None, Some(Role::Moderator));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].role, Role::Moderator);
    }

    #[test]
    fn test_blank_search_matches_everyone() {
        let pool = vec![user("Alice", "alice@example.com", Role::Moderator)];
        assert_eq!(filter_pool(&pool, Some("   "), None).len(), 1);
    }

    #[test]
    fn test_grouping() {
        let users = vec![
            user("A", "a@x.com", Role::SuperModerator),
            user("B", "b@x.com", Role::SeniorModerator),
            user("C", "c@x.com", Role::Moderator),
            user("D", "d@x.com", Role::Moderator),
        ];
        let groups = group_by_role(users);
        assert_eq!(groups.super_moderators.len(), 1);
        assert_eq!(groups.senior_moderators.len(), 1);
        assert_eq!(groups.moderators.len(), 2);
    }
}
