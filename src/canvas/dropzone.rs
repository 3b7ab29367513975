//! Drop-zone typing and the drag/drop guard.
//!
//! A zone id is `super_moderator`, `senior_moderator:<courseId>` or
//! `moderator:<courseId>`. Role compatibility is re-checked at drop time,
//! not only on hover, and any failed drop leaves the model untouched.

use serde::Serialize;
use uuid::Uuid;

use crate::canvas::model::CanvasModel;
use crate::directory::{Role, UserWithRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropZone {
    SuperModerator,
    SeniorModerator(Uuid),
    Moderator(Uuid),
}

impl DropZone {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.split_once(':') {
            None => match raw {
                "super_moderator" => Some(Self::SuperModerator),
                _ => None,
            },
            Some((kind, course)) => {
                let course_id = Uuid::parse_str(course).ok()?;
                match kind {
                    "senior_moderator" => Some(Self::SeniorModerator(course_id)),
                    "moderator" => Some(Self::Moderator(course_id)),
                    _ => None,
                }
            }
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Self::SuperModerator => Role::SuperModerator,
            Self::SeniorModerator(_) => Role::SeniorModerator,
            Self::Moderator(_) => Role::Moderator,
        }
    }
}

impl std::fmt::Display for DropZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SuperModerator => write!(f, "super_moderator"),
            Self::SeniorModerator(course) => write!(f, "senior_moderator:{}", course),
            Self::Moderator(course) => write!(f, "moderator:{}", course),
        }
    }
}

/// The transient drag register: set on drag-start, cleared on drop or
/// cancel. The drag event itself is transport, not state.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DragSource {
    pub user_id: Uuid,
    pub role: Role,
}

/// Hover preview: does the zone accept this source? Purely a visual hint.
pub fn accepts(zone: DropZone, source: &DragSource) -> bool {
    zone.role() == source.role
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropOutcome {
    Applied,
    Ignored,
}

/// Drops a user on a zone. Role mismatches, duplicate occupants and
/// unknown courses are all silently ignored; only a compatible drop on a
/// vacant slot mutates the model.
pub fn drop_on(model: &mut CanvasModel, zone: DropZone, user: UserWithRole) -> DropOutcome {
    if user.role != zone.role() {
        return DropOutcome::Ignored;
    }
    let occupied = match zone {
        DropZone::SuperModerator => model
            .super_moderators
            .iter()
            .any(|s| s.user.id == user.id),
        DropZone::SeniorModerator(course_id) => match model.course(course_id) {
            Some(node) => node.senior_moderators.iter().any(|s| s.user.id == user.id),
            None => return DropOutcome::Ignored,
        },
        DropZone::Moderator(course_id) => match model.course(course_id) {
            Some(node) => node.moderators.iter().any(|s| s.user.id == user.id),
            None => return DropOutcome::Ignored,
        },
    };
    if occupied {
        return DropOutcome::Ignored;
    }
    let applied = match zone {
        DropZone::SuperModerator => model.add_super_moderator(user),
        DropZone::SeniorModerator(course_id) => model.add_senior_moderator(course_id, user),
        DropZone::Moderator(course_id) => model.add_moderator(course_id, user),
    };
    match applied {
        Ok(()) => DropOutcome::Applied,
        Err(_) => DropOutcome::Ignored,
    }
}
