//! In-memory model of the team being composed on the canvas.
//!
//! Pure data transforms, no I/O. The persistence engine diffs this model
//! against the baseline captured at load time; the HTTP layer is the only
//! writer and drives it one gesture at a time.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use uuid::Uuid;

use crate::canvas::types::{Career, Course};
use crate::directory::{Role, UserWithRole};
use crate::shared::utils::normalize_name;

pub const DEFAULT_TEAM_NAME: &str = "New Team";

/// Identity of an assignment on the canvas. Rows loaded from the backend
/// keep their persisted id; rows added during the session are drafts and
/// serialise as `temp-<uuid>` until committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignmentId {
    Persisted(Uuid),
    Draft(Uuid),
}

impl AssignmentId {
    pub fn draft() -> Self {
        Self::Draft(Uuid::new_v4())
    }

    pub fn is_draft(&self) -> bool {
        matches!(self, Self::Draft(_))
    }

    pub fn persisted(&self) -> Option<Uuid> {
        match self {
            Self::Persisted(id) => Some(*id),
            Self::Draft(_) => None,
        }
    }
}

impl std::fmt::Display for AssignmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Persisted(id) => write!(f, "{}", id),
            Self::Draft(id) => write!(f, "temp-{}", id),
        }
    }
}

impl FromStr for AssignmentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix("temp-") {
            Ok(Self::Draft(Uuid::parse_str(rest)?))
        } else {
            Ok(Self::Persisted(Uuid::parse_str(s)?))
        }
    }
}

impl Serialize for AssignmentId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AssignmentId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A super-moderator bound at the team level.
#[derive(Debug, Clone, Serialize)]
pub struct SuperModSlot {
    pub id: AssignmentId,
    pub user: UserWithRole,
}

/// A senior-moderator or moderator bound to one course.
#[derive(Debug, Clone, Serialize)]
pub struct CourseMemberSlot {
    pub id: AssignmentId,
    pub user: UserWithRole,
    pub is_default_manager: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseNode {
    pub course: Course,
    pub senior_moderators: Vec<CourseMemberSlot>,
    pub moderators: Vec<CourseMemberSlot>,
}

/// Snapshot of the persisted state captured when an edit session loads.
#[derive(Debug, Clone, Serialize)]
pub struct Baseline {
    pub team_id: Uuid,
    pub career_id: Uuid,
    pub team_name: String,
    pub super_mod_ids: HashSet<Uuid>,
    pub course_assignment_ids: HashSet<Uuid>,
    /// course id → persisted assignment id of the default manager.
    pub default_manager_by_course: HashMap<Uuid, Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CanvasMode {
    Create,
    Edit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CanvasPhase {
    Empty,
    Loading,
    Composing,
    Saving,
    Archived,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ModelError {
    #[error("A team must keep at least one super-moderator")]
    LastSuperModerator,
    #[error("A course must keep at least one senior moderator")]
    LastSeniorModerator,
    #[error("A {found} cannot fill a {expected} slot")]
    RoleMismatch { expected: Role, found: Role },
    #[error("Course {0} is not on the canvas")]
    UnknownCourse(Uuid),
    #[error("Assignment {0} is not on the canvas")]
    UnknownAssignment(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct CanvasModel {
    pub name: String,
    pub career: Option<Career>,
    pub super_moderators: Vec<SuperModSlot>,
    pub courses: Vec<CourseNode>,
    pub baseline: Option<Baseline>,
}

impl Default for CanvasModel {
    fn default() -> Self {
        Self::new()
    }
}

impl CanvasModel {
    pub fn new() -> Self {
        Self {
            name: DEFAULT_TEAM_NAME.to_string(),
            career: None,
            super_moderators: Vec::new(),
            courses: Vec::new(),
            baseline: None,
        }
    }

    /// Binds the career. Reassigning a different career (or any selection
    /// in create mode) resets super-moderators and courses; the placeholder
    /// name is replaced with `"<career> Team"`.
    pub fn select_career(&mut self, career: Career, mode: CanvasMode) {
        let changed = self
            .career
            .as_ref()
            .map(|current| current.id != career.id)
            .unwrap_or(false);
        if mode == CanvasMode::Create || changed {
            self.super_moderators.clear();
            self.courses.clear();
        }
        if self.name.trim().is_empty() || self.name == DEFAULT_TEAM_NAME {
            self.name = format!("{} Team", career.name);
        }
        self.career = Some(career);
    }

    pub fn rename(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn add_super_moderator(&mut self, user: UserWithRole) -> Result<(), ModelError> {
        if user.role != Role::SuperModerator {
            return Err(ModelError::RoleMismatch {
                expected: Role::SuperModerator,
                found: user.role,
            });
        }
        if self.super_moderators.iter().any(|s| s.user.id == user.id) {
            return Ok(());
        }
        self.super_moderators.push(SuperModSlot {
            id: AssignmentId::draft(),
            user,
        });
        Ok(())
    }

    pub fn remove_super_moderator(&mut self, id: &AssignmentId) -> Result<(), ModelError> {
        let index = self
            .super_moderators
            .iter()
            .position(|s| s.id == *id)
            .ok_or_else(|| ModelError::UnknownAssignment(id.to_string()))?;
        if self.super_moderators.len() == 1 {
            return Err(ModelError::LastSuperModerator);
        }
        self.super_moderators.remove(index);
        Ok(())
    }

    /// Appends a course node. Already-present courses are a no-op; the
    /// course selector only offers rows from the selected career.
    pub fn add_course(&mut self, course: Course) {
        if self.courses.iter().any(|c| c.course.id == course.id) {
            return;
        }
        self.courses.push(CourseNode {
            course,
            senior_moderators: Vec::new(),
            moderators: Vec::new(),
        });
    }

    pub fn remove_course(&mut self, course_id: Uuid) -> Result<(), ModelError> {
        let index = self
            .courses
            .iter()
            .position(|c| c.course.id == course_id)
            .ok_or(ModelError::UnknownCourse(course_id))?;
        self.courses.remove(index);
        Ok(())
    }

    pub fn add_senior_moderator(
        &mut self,
        course_id: Uuid,
        user: UserWithRole,
    ) -> Result<(), ModelError> {
        if user.role != Role::SeniorModerator {
            return Err(ModelError::RoleMismatch {
                expected: Role::SeniorModerator,
                found: user.role,
            });
        }
        let node = self.course_mut(course_id)?;
        if node.senior_moderators.iter().any(|s| s.user.id == user.id) {
            return Ok(());
        }
        // The first senior moderator of a course is its default manager.
        let is_default_manager = node.senior_moderators.is_empty();
        node.senior_moderators.push(CourseMemberSlot {
            id: AssignmentId::draft(),
            user,
            is_default_manager,
        });
        Ok(())
    }

    pub fn remove_senior_moderator(
        &mut self,
        course_id: Uuid,
        id: &AssignmentId,
    ) -> Result<(), ModelError> {
        let node = self.course_mut(course_id)?;
        let index = node
            .senior_moderators
            .iter()
            .position(|s| s.id == *id)
            .ok_or_else(|| ModelError::UnknownAssignment(id.to_string()))?;
        if node.senior_moderators.len() == 1 {
            return Err(ModelError::LastSeniorModerator);
        }
        let removed = node.senior_moderators.remove(index);
        if removed.is_default_manager {
            if let Some(first) = node.senior_moderators.first_mut() {
                first.is_default_manager = true;
            }
        }
        Ok(())
    }

    /// Marks exactly one senior moderator of the course as default manager.
    pub fn set_default_manager(
        &mut self,
        course_id: Uuid,
        id: &AssignmentId,
    ) -> Result<(), ModelError> {
        let node = self.course_mut(course_id)?;
        if !node.senior_moderators.iter().any(|s| s.id == *id) {
            return Err(ModelError::UnknownAssignment(id.to_string()));
        }
        for slot in &mut node.senior_moderators {
            slot.is_default_manager = slot.id == *id;
        }
        Ok(())
    }

    pub fn add_moderator(&mut self, course_id: Uuid, user: UserWithRole) -> Result<(), ModelError> {
        if user.role != Role::Moderator {
            return Err(ModelError::RoleMismatch {
                expected: Role::Moderator,
                found: user.role,
            });
        }
        let node = self.course_mut(course_id)?;
        if node.moderators.iter().any(|s| s.user.id == user.id) {
            return Ok(());
        }
        node.moderators.push(CourseMemberSlot {
            id: AssignmentId::draft(),
            user,
            is_default_manager: false,
        });
        Ok(())
    }

    pub fn remove_moderator(&mut self, course_id: Uuid, id: &AssignmentId) -> Result<(), ModelError> {
        let node = self.course_mut(course_id)?;
        let index = node
            .moderators
            .iter()
            .position(|s| s.id == *id)
            .ok_or_else(|| ModelError::UnknownAssignment(id.to_string()))?;
        node.moderators.remove(index);
        Ok(())
    }

    /// True iff the structural invariants hold: non-blank name, a career,
    /// at least one super-moderator, and every course carrying at least one
    /// senior moderator with exactly one default manager among them.
    pub fn can_save(&self) -> bool {
        if normalize_name(&self.name).is_empty() {
            return false;
        }
        if self.career.is_none() {
            return false;
        }
        if self.super_moderators.is_empty() {
            return false;
        }
        self.courses.iter().all(|node| {
            !node.senior_moderators.is_empty()
                && node
                    .senior_moderators
                    .iter()
                    .filter(|s| s.is_default_manager)
                    .count()
                    == 1
        })
    }

    pub fn course(&self, course_id: Uuid) -> Option<&CourseNode> {
        self.courses.iter().find(|c| c.course.id == course_id)
    }

    fn course_mut(&mut self, course_id: Uuid) -> Result<&mut CourseNode, ModelError> {
        self.courses
            .iter_mut()
            .find(|c| c.course.id == course_id)
            .ok_or(ModelError::UnknownCourse(course_id))
    }

    pub fn course_ids(&self) -> Vec<Uuid> {
        self.courses.iter().map(|c| c.course.id).collect()
    }

    /// User ids already occupying the team-level super-moderator slot.
    pub fn super_moderator_user_ids(&self) -> Vec<Uuid> {
        self.super_moderators.iter().map(|s| s.user.id).collect()
    }
}


#[cfg(test)]
mod tests {
    use super::test_fixtures::*;
    use super::*;

    fn composed_model() -> (CanvasModel, Uuid) {
        let mut model = CanvasModel::new();
        model.select_career(career("Data"), CanvasMode::Create);
        model
            .add_super_moderator(user("Sara", Role::SuperModerator))
            .unwrap();
        let k1 = course("SQL Basics");
        let course_id = k1.id;
        model.add_course(k1);
        model
            .add_senior_moderator(course_id, user("Mina", Role::SeniorModerator))
            .unwrap();
        (model, course_id)
    }

    #[test]
    fn test_assignment_id_wire_format() {
        let uuid = Uuid::new_v4();
        let draft = AssignmentId::Draft(uuid);
        let persisted = AssignmentId::Persisted(uuid);
        assert_eq!(draft.to_string(), format!("temp-{}", uuid));
        assert_eq!(persisted.to_string(), uuid.to_string());

        assert_eq!(draft.to_string().parse::<AssignmentId>().unwrap(), draft);
        assert_eq!(persisted.to_string().parse::<AssignmentId>().unwrap(), persisted);
        assert!("not-an-id".parse::<AssignmentId>().is_err());
        assert!(draft.is_draft());
        assert_eq!(persisted.persisted(), Some(uuid));
        assert_eq!(draft.persisted(), None);
    }

    #[test]
    fn test_select_career_sets_default_name() {
        let mut model = CanvasModel::new();
        model.select_career(career("Data"), CanvasMode::Create);
        assert_eq!(model.name, "Data Team");
    }

    #[test]
    fn test_select_career_keeps_custom_name() {
        let mut model = CanvasModel::new();
        model.rename("Night Shift");
        model.select_career(career("Data"), CanvasMode::Create);
        assert_eq!(model.name, "Night Shift");
    }

    #[test]
    fn test_career_reassignment_resets_composition_in_edit_mode() {
        let (mut model, _) = composed_model();
        assert!(!model.super_moderators.is_empty());
        assert!(!model.courses.is_empty());

        model.select_career(career("Design"), CanvasMode::Edit);
        assert!(model.super_moderators.is_empty());
        assert!(model.courses.is_empty());
    }

    #[test]
    fn test_reselecting_same_career_in_edit_mode_keeps_composition() {
        let (mut model, _) = composed_model();
        let same = model.career.clone().unwrap();
        model.select_career(same, CanvasMode::Edit);
        assert_eq!(model.super_moderators.len(), 1);
        assert_eq!(model.courses.len(), 1);
    }

    #[test]
    fn test_add_super_moderator_rejects_wrong_role() {
        let mut model = CanvasModel::new();
        let err = model
            .add_super_moderator(user("Max", Role::Moderator))
            .unwrap_err();
        assert_eq!(
            err,
            ModelError::RoleMismatch {
                expected: Role::SuperModerator,
                found: Role::Moderator
            }
        );
    }

    #[test]
    fn test_duplicate_super_moderator_is_noop() {
        let mut model = CanvasModel::new();
        let sara = user("Sara", Role::SuperModerator);
        model.add_super_moderator(sara.clone()).unwrap();
        model.add_super_moderator(sara).unwrap();
        assert_eq!(model.super_moderators.len(), 1);
    }

    #[test]
    fn test_last_super_moderator_is_protected() {
        let (mut model, _) = composed_model();
        let only = model.super_moderators[0].id;
        let err = model.remove_super_moderator(&only).unwrap_err();
        assert_eq!(err, ModelError::LastSuperModerator);
        assert_eq!(model.super_moderators.len(), 1);
    }

    #[test]
    fn test_add_remove_super_moderator_restores_set() {
        let (mut model, _) = composed_model();
        let before: Vec<Uuid> = model.super_moderator_user_ids();
        let extra = user("Noor", Role::SuperModerator);
        model.add_super_moderator(extra.clone()).unwrap();
        let added_id = model
            .super_moderators
            .iter()
            .find(|s| s.user.id == extra.id)
            .unwrap()
            .id;
        model.remove_super_moderator(&added_id).unwrap();
        assert_eq!(model.super_moderator_user_ids(), before);
    }

    #[test]
    fn test_first_senior_moderator_becomes_default_manager() {
        let (model, course_id) = composed_model();
        let node = model.course(course_id).unwrap();
        assert_eq!(node.senior_moderators.len(), 1);
        assert!(node.senior_moderators[0].is_default_manager);
    }

    #[test]
    fn test_default_manager_promotion_on_removal() {
        let (mut model, course_id) = composed_model();
        model
            .add_senior_moderator(course_id, user("Bea", Role::SeniorModerator))
            .unwrap();
        model
            .add_senior_moderator(course_id, user("Cal", Role::SeniorModerator))
            .unwrap();

        let default_id = model.course(course_id).unwrap().senior_moderators[0].id;
        model.remove_senior_moderator(course_id, &default_id).unwrap();

        let node = model.course(course_id).unwrap();
        assert_eq!(node.senior_moderators.len(), 2);
        assert!(node.senior_moderators[0].is_default_manager);
        assert!(!node.senior_moderators[1].is_default_manager);
    }

    #[test]
    fn test_last_senior_moderator_is_protected() {
        let (mut model, course_id) = composed_model();
        let only = model.course(course_id).unwrap().senior_moderators[0].id;
        let err = model.remove_senior_moderator(course_id, &only).unwrap_err();
        assert_eq!(err, ModelError::LastSeniorModerator);
    }

    #[test]
    fn test_set_default_manager_is_exclusive_and_idempotent() {
        let (mut model, course_id) = composed_model();
        model
            .add_senior_moderator(course_id, user("Bea", Role::SeniorModerator))
            .unwrap();
        model
            .add_senior_moderator(course_id, user("Cal", Role::SeniorModerator))
            .unwrap();

        let third = model.course(course_id).unwrap().senior_moderators[2].id;
        model.set_default_manager(course_id, &third).unwrap();

        let defaults = |m: &CanvasModel| {
            m.course(course_id)
                .unwrap()
                .senior_moderators
                .iter()
                .filter(|s| s.is_default_manager)
                .count()
        };
        assert_eq!(defaults(&model), 1);
        assert!(model.course(course_id).unwrap().senior_moderators[2].is_default_manager);

        // Second call with the same id leaves the state unchanged.
        model.set_default_manager(course_id, &third).unwrap();
        assert_eq!(defaults(&model), 1);
        assert!(model.course(course_id).unwrap().senior_moderators[2].is_default_manager);
    }

    #[test]
    fn test_moderator_add_remove_and_dedup() {
        let (mut model, course_id) = composed_model();
        let max = user("Max", Role::Moderator);
        model.add_moderator(course_id, max.clone()).unwrap();
        model.add_moderator(course_id, max).unwrap();
        assert_eq!(model.course(course_id).unwrap().moderators.len(), 1);

        let id = model.course(course_id).unwrap().moderators[0].id;
        model.remove_moderator(course_id, &id).unwrap();
        assert!(model.course(course_id).unwrap().moderators.is_empty());
    }

    #[test]
    fn test_duplicate_user_ids_never_appear_within_a_slot() {
        let (mut model, course_id) = composed_model();
        let bea = user("Bea", Role::SeniorModerator);
        model.add_senior_moderator(course_id, bea.clone()).unwrap();
        model.add_senior_moderator(course_id, bea).unwrap();
        let node = model.course(course_id).unwrap();
        let mut ids: Vec<Uuid> = node.senior_moderators.iter().map(|s| s.user.id).collect();
        let before = ids.len();
        ids.dedup();
        assert_eq!(ids.len(), before);
    }

    #[test]
    fn test_can_save_requires_every_invariant() {
        let mut model = CanvasModel::new();
        assert!(!model.can_save());

        model.select_career(career("Data"), CanvasMode::Create);
        assert!(!model.can_save());

        model
            .add_super_moderator(user("Sara", Role::SuperModerator))
            .unwrap();
        assert!(model.can_save());

        let k1 = course("SQL Basics");
        let course_id = k1.id;
        model.add_course(k1);
        assert!(!model.can_save(), "course without senior moderator blocks save");

        model
            .add_senior_moderator(course_id, user("Mina", Role::SeniorModerator))
            .unwrap();
        assert!(model.can_save());

        model.rename("   ");
        assert!(!model.can_save());
    }

    #[test]
    fn test_no_super_moderators_blocks_save() {
        let mut model = CanvasModel::new();
        model.select_career(career("Data"), CanvasMode::Create);
        assert!(model.super_moderators.is_empty());
        assert!(!model.can_save());
    }

    #[test]
    fn test_remove_course() {
        let (mut model, course_id) = composed_model();
        model.remove_course(course_id).unwrap();
        assert!(model.courses.is_empty());
        assert_eq!(
            model.remove_course(course_id),
            Err(ModelError::UnknownCourse(course_id))
        );
    }

    #[test]
    fn test_course_dedup() {
        let (mut model, course_id) = composed_model();
        let existing = model.course(course_id).unwrap().course.clone();
        model.add_course(existing);
        assert_eq!(model.courses.len(), 1);
    }
}
