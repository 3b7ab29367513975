//! Row structs and wire types for the team ownership canvas.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::schema::{career_assignments, careers, course_assignments, courses, teams};

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable)]
#[diesel(table_name = careers)]
pub struct Career {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub icon: Option<String>,
    pub color: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable)]
#[diesel(table_name = courses)]
pub struct Course {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub icon: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable)]
#[diesel(table_name = teams)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    pub career_id: Uuid,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = teams)]
pub struct NewTeam {
    pub id: Uuid,
    pub name: String,
    pub career_id: Uuid,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable)]
pub struct CareerCourseLink {
    pub career_id: Uuid,
    pub course_id: Uuid,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, Identifiable)]
#[diesel(table_name = career_assignments)]
pub struct CareerAssignmentRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub career_id: Uuid,
    pub team_id: Uuid,
    pub assigned_by: Option<Uuid>,
    pub assigned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, Identifiable)]
#[diesel(table_name = course_assignments)]
pub struct CourseAssignmentRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub team_id: Uuid,
    pub role: String,
    pub is_default_manager: bool,
    pub assigned_by: Option<Uuid>,
    pub assigned_at: DateTime<Utc>,
}

/// The two roles a `course_assignments` row may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentRole {
    SeniorModerator,
    Moderator,
}

impl AssignmentRole {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "senior_moderator" => Some(Self::SeniorModerator),
            "moderator" => Some(Self::Moderator),
            _ => None,
        }
    }
}

impl std::fmt::Display for AssignmentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SeniorModerator => write!(f, "senior_moderator"),
            Self::Moderator => write!(f, "moderator"),
        }
    }
}

// ----- Gesture payloads -----

#[derive(Debug, Deserialize)]
pub struct SelectCareerRequest {
    pub career_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct AddUserRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct AddCourseRequest {
    pub course_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct DefaultManagerRequest {
    pub assignment_id: String,
}

#[derive(Debug, Deserialize)]
pub struct DragStartRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct DropRequest {
    pub zone: String,
}

#[derive(Debug, Deserialize)]
pub struct UserSelectorQuery {
    pub role: String,
    /// Comma-separated user ids already occupying the slot being filled.
    pub exclude: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TeamListEntry {
    pub id: Uuid,
    pub name: String,
    pub career_id: Uuid,
    pub career_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
