//! Persistence engine: commits a canvas model to the `teams`,
//! `career_assignments` and `course_assignments` tables.
//!
//! The edit-mode diff is computed by a pure function over the model and
//! its baseline; the executors then replay the plan against diesel.
//! Deletions always run before the insertions they could collide with.

use chrono::Utc;
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use log::{info, warn};
use rand::Rng;
use uuid::Uuid;

use crate::canvas::model::{Baseline, CanvasModel};
use crate::canvas::types::{AssignmentRole, CareerAssignmentRow, CourseAssignmentRow, NewTeam};
use crate::canvas::CanvasError;
use crate::shared::schema::{career_assignments, course_assignments, teams};
use crate::shared::utils::normalize_name;

const MAX_NAME_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct NewCourseAssignment {
    pub course_id: Uuid,
    pub user_id: Uuid,
    pub role: AssignmentRole,
    pub is_default_manager: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CareerChange {
    Unchanged,
    Reassigned(Uuid),
}

/// Edit-mode commit plan. For `CareerChange::Reassigned` the kept-id sets
/// are empty and the insert sets cover the whole model (full reset).
#[derive(Debug, Clone)]
pub struct UpdatePlan {
    pub team_id: Uuid,
    pub rename: Option<String>,
    pub career: CareerChange,
    pub kept_super_ids: Vec<Uuid>,
    pub new_super_users: Vec<Uuid>,
    pub course_ids: Vec<Uuid>,
    pub kept_course_assignment_ids: Vec<Uuid>,
    pub new_course_rows: Vec<NewCourseAssignment>,
    pub default_manager_updates: Vec<(Uuid, bool)>,
}

#[derive(Debug, Clone)]
pub struct SaveResult {
    pub team_id: Uuid,
    pub name: String,
}

fn course_rows_of(model: &CanvasModel, only_new: bool) -> Vec<NewCourseAssignment> {
    let mut rows = Vec::new();
    for node in &model.courses {
        for slot in &node.senior_moderators {
            if only_new && !slot.id.is_draft() {
                continue;
            }
            rows.push(NewCourseAssignment {
                course_id: node.course.id,
                user_id: slot.user.id,
                role: AssignmentRole::SeniorModerator,
                is_default_manager: slot.is_default_manager,
            });
        }
        for slot in &node.moderators {
            if only_new && !slot.id.is_draft() {
                continue;
            }
            rows.push(NewCourseAssignment {
                course_id: node.course.id,
                user_id: slot.user.id,
                role: AssignmentRole::Moderator,
                is_default_manager: false,
            });
        }
    }
    rows
}

/// Rows the create path bulk-inserts once the team row exists.
pub fn compute_create_rows(model: &CanvasModel) -> (Vec<Uuid>, Vec<NewCourseAssignment>) {
    let super_users = model.super_moderators.iter().map(|s| s.user.id).collect();
    (super_users, course_rows_of(model, false))
}

/// Diffs the model against its baseline into an executable plan.
pub fn compute_update_plan(model: &CanvasModel, baseline: &Baseline) -> UpdatePlan {
    let name = normalize_name(&model.name);
    let rename = if name != baseline.team_name {
        Some(name)
    } else {
        None
    };

    let career_id = model.career.as_ref().map(|c| c.id);
    if career_id.is_some() && career_id != Some(baseline.career_id) {
        // Career reassignment wipes every assignment row and re-inserts the
        // model wholesale under the new career.
        let (new_super_users, new_course_rows) = compute_create_rows(model);
        return UpdatePlan {
            team_id: baseline.team_id,
            rename,
            career: CareerChange::Reassigned(career_id.unwrap_or(baseline.career_id)),
            kept_super_ids: Vec::new(),
            new_super_users,
            course_ids: model.course_ids(),
            kept_course_assignment_ids: Vec::new(),
            new_course_rows,
            default_manager_updates: Vec::new(),
        };
    }

    let kept_super_ids: Vec<Uuid> = model
        .super_moderators
        .iter()
        .filter_map(|s| s.id.persisted())
        .collect();
    let new_super_users: Vec<Uuid> = model
        .super_moderators
        .iter()
        .filter(|s| s.id.is_draft())
        .map(|s| s.user.id)
        .collect();

    let mut kept_course_assignment_ids = Vec::new();
    let mut default_manager_updates = Vec::new();
    for node in &model.courses {
        let baseline_default = baseline.default_manager_by_course.get(&node.course.id);
        for slot in &node.senior_moderators {
            if let Some(id) = slot.id.persisted() {
                kept_course_assignment_ids.push(id);
                let was_default = baseline_default == Some(&id);
                if was_default != slot.is_default_manager {
                    default_manager_updates.push((id, slot.is_default_manager));
                }
            }
        }
        for slot in &node.moderators {
            if let Some(id) = slot.id.persisted() {
                kept_course_assignment_ids.push(id);
            }
        }
    }

    UpdatePlan {
        team_id: baseline.team_id,
        rename,
        career: CareerChange::Unchanged,
        kept_super_ids,
        new_super_users,
        course_ids: model.course_ids(),
        kept_course_assignment_ids,
        new_course_rows: course_rows_of(model, true),
        default_manager_updates,
    }
}

/// Variant tried after a `(name, career_id)` unique violation.
fn suffixed_name(base: &str) -> String {
    format!("{} {:04}", base, rand::thread_rng().gen_range(0..10_000))
}

fn career_rows(
    users: &[Uuid],
    career_id: Uuid,
    team_id: Uuid,
    acting_user: Option<Uuid>,
) -> Vec<CareerAssignmentRow> {
    let now = Utc::now();
    users
        .iter()
        .map(|user_id| CareerAssignmentRow {
            id: Uuid::new_v4(),
            user_id: *user_id,
            career_id,
            team_id,
            assigned_by: acting_user,
            assigned_at: now,
        })
        .collect()
}

fn course_assignment_rows(
    rows: &[NewCourseAssignment],
    team_id: Uuid,
    acting_user: Option<Uuid>,
) -> Vec<CourseAssignmentRow> {
    let now = Utc::now();
    rows.iter()
        .map(|row| CourseAssignmentRow {
            id: Uuid::new_v4(),
            user_id: row.user_id,
            course_id: row.course_id,
            team_id,
            role: row.role.to_string(),
            is_default_manager: row.is_default_manager,
            assigned_by: acting_user,
            assigned_at: now,
        })
        .collect()
}

fn insert_assignments(
    conn: &mut PgConnection,
    career_id: Uuid,
    team_id: Uuid,
    super_users: &[Uuid],
    course_rows: &[NewCourseAssignment],
    acting_user: Option<Uuid>,
) -> Result<(), diesel::result::Error> {
    let supers = career_rows(super_users, career_id, team_id, acting_user);
    if !supers.is_empty() {
        diesel::insert_into(career_assignments::table)
            .values(&supers)
            .execute(conn)?;
    }
    let courses = course_assignment_rows(course_rows, team_id, acting_user);
    if !courses.is_empty() {
        diesel::insert_into(course_assignments::table)
            .values(&courses)
            .execute(conn)?;
    }
    Ok(())
}

/// Create path. Inserts the team row, retrying `(name, career_id)` unique
/// collisions with a random 4-digit suffix, then bulk-inserts the
/// assignment rows. A failure after the team insert leaves a partial team
/// for manual cleanup rather than attempting a distributed transaction.
pub fn create_team(
    conn: &mut PgConnection,
    model: &CanvasModel,
    acting_user: Option<Uuid>,
) -> Result<SaveResult, CanvasError> {
    let career = model
        .career
        .as_ref()
        .ok_or_else(|| CanvasError::Validation("no career selected".to_string()))?;
    let base_name = normalize_name(&model.name);

    let mut attempt_name = base_name.clone();
    let mut team_id = None;
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let now = Utc::now();
        let row = NewTeam {
            id: Uuid::new_v4(),
            name: attempt_name.clone(),
            career_id: career.id,
            created_by: acting_user,
            created_at: now,
            updated_at: now,
        };
        match diesel::insert_into(teams::table).values(&row).execute(conn) {
            Ok(_) => {
                team_id = Some(row.id);
                break;
            }
            Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                warn!(
                    "Team name {:?} already taken for career {} (attempt {})",
                    attempt_name,
                    career.id,
                    attempt + 1
                );
                attempt_name = suffixed_name(&base_name);
            }
            Err(e) => return Err(CanvasError::Database(e.to_string())),
        }
    }
    let team_id = team_id.ok_or(CanvasError::TeamNameConflict(base_name))?;

    let (super_users, course_rows) = compute_create_rows(model);
    insert_assignments(conn, career.id, team_id, &super_users, &course_rows, acting_user)
        .map_err(|e| CanvasError::Database(e.to_string()))?;

    info!("Created team {} ({:?})", team_id, attempt_name);
    Ok(SaveResult {
        team_id,
        name: attempt_name,
    })
}

/// Update path. Executes a precomputed plan; deletions run before the
/// insertions that could collide with them.
pub fn update_team(
    conn: &mut PgConnection,
    plan: &UpdatePlan,
    acting_user: Option<Uuid>,
) -> Result<SaveResult, CanvasError> {
    let team_id = plan.team_id;

    let career_id = match plan.career {
        CareerChange::Reassigned(new_career) => {
            // Wholesale reset: every assignment row goes, the team row is
            // repointed, and the model is inserted create-style.
            diesel::delete(
                career_assignments::table.filter(career_assignments::team_id.eq(team_id)),
            )
            .execute(conn)
            .map_err(|e| CanvasError::Database(e.to_string()))?;
            diesel::delete(
                course_assignments::table.filter(course_assignments::team_id.eq(team_id)),
            )
            .execute(conn)
            .map_err(|e| CanvasError::Database(e.to_string()))?;

            diesel::update(teams::table.filter(teams::id.eq(team_id)))
                .set((
                    teams::career_id.eq(new_career),
                    teams::updated_at.eq(Utc::now()),
                ))
                .execute(conn)
                .map_err(|e| CanvasError::Database(e.to_string()))?;
            new_career
        }
        CareerChange::Unchanged => {
            // Remove super-moderator rows no longer on the canvas.
            if plan.kept_super_ids.is_empty() {
                diesel::delete(
                    career_assignments::table.filter(career_assignments::team_id.eq(team_id)),
                )
                .execute(conn)
                .map_err(|e| CanvasError::Database(e.to_string()))?;
            } else {
                diesel::delete(
                    career_assignments::table
                        .filter(career_assignments::team_id.eq(team_id))
                        .filter(career_assignments::id.ne_all(&plan.kept_super_ids)),
                )
                .execute(conn)
                .map_err(|e| CanvasError::Database(e.to_string()))?;
            }

            // Remove course rows for dropped courses, then dropped members.
            if plan.course_ids.is_empty() {
                diesel::delete(
                    course_assignments::table.filter(course_assignments::team_id.eq(team_id)),
                )
                .execute(conn)
                .map_err(|e| CanvasError::Database(e.to_string()))?;
            } else {
                diesel::delete(
                    course_assignments::table
                        .filter(course_assignments::team_id.eq(team_id))
                        .filter(course_assignments::course_id.ne_all(&plan.course_ids)),
                )
                .execute(conn)
                .map_err(|e| CanvasError::Database(e.to_string()))?;
                if plan.kept_course_assignment_ids.is_empty() {
                    diesel::delete(
                        course_assignments::table.filter(course_assignments::team_id.eq(team_id)),
                    )
                    .execute(conn)
                    .map_err(|e| CanvasError::Database(e.to_string()))?;
                } else {
                    diesel::delete(
                        course_assignments::table
                            .filter(course_assignments::team_id.eq(team_id))
                            .filter(
                                course_assignments::id.ne_all(&plan.kept_course_assignment_ids),
                            ),
                    )
                    .execute(conn)
                    .map_err(|e| CanvasError::Database(e.to_string()))?;
                }
            }

            let existing_career: Uuid = teams::table
                .filter(teams::id.eq(team_id))
                .select(teams::career_id)
                .first(conn)
                .map_err(|e| CanvasError::Database(e.to_string()))?;
            existing_career
        }
    };

    insert_assignments(
        conn,
        career_id,
        team_id,
        &plan.new_super_users,
        &plan.new_course_rows,
        acting_user,
    )
    .map_err(|e| CanvasError::Database(e.to_string()))?;

    // Clear outgoing default managers before starring the incoming ones so
    // no course ever holds two defaults at once.
    for pass in [false, true] {
        for (assignment_id, is_default) in plan
            .default_manager_updates
            .iter()
            .filter(|(_, flag)| *flag == pass)
        {
            diesel::update(
                course_assignments::table.filter(course_assignments::id.eq(assignment_id)),
            )
            .set(course_assignments::is_default_manager.eq(is_default))
            .execute(conn)
            .map_err(|e| CanvasError::Database(e.to_string()))?;
        }
    }

    let name = if let Some(new_name) = &plan.rename {
        diesel::update(teams::table.filter(teams::id.eq(team_id)))
            .set((teams::name.eq(new_name), teams::updated_at.eq(Utc::now())))
            .execute(conn)
            .map_err(|e| CanvasError::Database(e.to_string()))?;
        new_name.clone()
    } else {
        teams::table
            .filter(teams::id.eq(team_id))
            .select(teams::name)
            .first(conn)
            .map_err(|e| CanvasError::Database(e.to_string()))?
    };

    info!("Updated team {}", team_id);
    Ok(SaveResult { team_id, name })
}

/// Soft-archives the team. Assignment rows are preserved for audit.
pub fn archive_team(conn: &mut PgConnection, team_id: Uuid) -> Result<(), CanvasError> {
    let affected = diesel::update(teams::table.filter(teams::id.eq(team_id)))
        .set(teams::archived_at.eq(Some(Utc::now())))
        .execute(conn)
        .map_err(|e| CanvasError::Archive(e.to_string()))?;
    if affected == 0 {
        return Err(CanvasError::NotFound(format!("team {}", team_id)));
    }
    info!("Archived team {}", team_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::model::test_fixtures::{career, course, user};
    use crate::canvas::model::{
        AssignmentId, Baseline, CanvasMode, CourseMemberSlot, SuperModSlot,
    };
    use crate::directory::Role;
    use std::collections::{HashMap, HashSet};

    fn persisted_slot(name: &str, role: Role) -> (Uuid, SuperModSlot) {
        let id = Uuid::new_v4();
        (
            id,
            SuperModSlot {
                id: AssignmentId::Persisted(id),
                user: user(name, role),
            },
        )
    }

    fn persisted_member(name: &str, role: Role, is_default: bool) -> (Uuid, CourseMemberSlot) {
        let id = Uuid::new_v4();
        (
            id,
            CourseMemberSlot {
                id: AssignmentId::Persisted(id),
                user: user(name, role),
                is_default_manager: is_default,
            },
        )
    }

    /// A loaded edit-mode model: one super-mod, one course with a default
    /// senior and one moderator, baseline captured to match.
    fn loaded_model() -> (CanvasModel, Baseline) {
        let the_career = career("Data");
        let the_course = course("SQL Basics");
        let (super_id, super_slot) = persisted_slot("Sara", Role::SuperModerator);
        let (senior_id, senior_slot) = persisted_member("Mina", Role::SeniorModerator, true);
        let (mod_id, mod_slot) = persisted_member("Max", Role::Moderator, false);

        let mut model = CanvasModel::new();
        model.career = Some(the_career.clone());
        model.name = "Data Team".to_string();
        model.super_moderators.push(super_slot);
        model.add_course(the_course.clone());
        {
            let node = model.courses.last_mut().unwrap();
            node.senior_moderators.push(senior_slot);
            node.moderators.push(mod_slot);
        }

        let baseline = Baseline {
            team_id: Uuid::new_v4(),
            career_id: the_career.id,
            team_name: "Data Team".to_string(),
            super_mod_ids: HashSet::from([super_id]),
            course_assignment_ids: HashSet::from([senior_id, mod_id]),
            default_manager_by_course: HashMap::from([(the_course.id, senior_id)]),
        };
        model.baseline = Some(baseline.clone());
        (model, baseline)
    }

    #[test]
    fn test_create_rows_cover_whole_model() {
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
        model
            .add_moderator(course_id, user("Max", Role::Moderator))
            .unwrap();

        let (super_users, course_rows) = compute_create_rows(&model);
        assert_eq!(super_users.len(), 1);
        assert_eq!(course_rows.len(), 2);

        let senior = course_rows
            .iter()
            .find(|r| r.role == AssignmentRole::SeniorModerator)
            .unwrap();
        assert!(senior.is_default_manager);
        let moderator = course_rows
            .iter()
            .find(|r| r.role == AssignmentRole::Moderator)
            .unwrap();
        assert!(!moderator.is_default_manager);
        assert_eq!(senior.course_id, course_id);
    }

    #[test]
    fn test_untouched_model_produces_empty_plan() {
        let (model, baseline) = loaded_model();
        let plan = compute_update_plan(&model, &baseline);
        assert_eq!(plan.career, CareerChange::Unchanged);
        assert_eq!(plan.rename, None);
        assert_eq!(plan.kept_super_ids.len(), 1);
        assert!(plan.new_super_users.is_empty());
        assert_eq!(plan.kept_course_assignment_ids.len(), 2);
        assert!(plan.new_course_rows.is_empty());
        assert!(plan.default_manager_updates.is_empty());
    }

    #[test]
    fn test_plan_splits_kept_and_new_assignments() {
        let (mut model, baseline) = loaded_model();
        model
            .add_super_moderator(user("Noor", Role::SuperModerator))
            .unwrap();
        let course_id = model.course_ids()[0];
        model
            .add_moderator(course_id, user("Lena", Role::Moderator))
            .unwrap();

        let plan = compute_update_plan(&model, &baseline);
        assert_eq!(plan.kept_super_ids.len(), 1);
        assert_eq!(plan.new_super_users.len(), 1);
        assert_eq!(plan.kept_course_assignment_ids.len(), 2);
        assert_eq!(plan.new_course_rows.len(), 1);
        assert_eq!(plan.new_course_rows[0].role, AssignmentRole::Moderator);
    }

    #[test]
    fn test_plan_detects_rename() {
        let (mut model, baseline) = loaded_model();
        model.rename("  Data  Platform Team ");
        let plan = compute_update_plan(&model, &baseline);
        assert_eq!(plan.rename.as_deref(), Some("Data Platform Team"));
    }

    #[test]
    fn test_career_reassignment_is_a_full_reset() {
        let (mut model, baseline) = loaded_model();
        let new_career = career("Design");
        let new_career_id = new_career.id;
        model.select_career(new_career, CanvasMode::Edit);
        model
            .add_super_moderator(user("Noor", Role::SuperModerator))
            .unwrap();

        let plan = compute_update_plan(&model, &baseline);
        assert_eq!(plan.career, CareerChange::Reassigned(new_career_id));
        assert!(plan.kept_super_ids.is_empty());
        assert!(plan.kept_course_assignment_ids.is_empty());
        assert_eq!(plan.new_super_users.len(), 1);
        assert!(plan.default_manager_updates.is_empty());
    }

    #[test]
    fn test_default_manager_flag_diff() {
        let (mut model, baseline) = loaded_model();
        let course_id = model.course_ids()[0];
        let (second_id, second) = persisted_member("Bea", Role::SeniorModerator, false);
        let first_id = {
            let node = model.courses.first_mut().unwrap();
            let first = node.senior_moderators[0].id.persisted().unwrap();
            node.senior_moderators.push(second);
            first
        };
        // Baseline knows both rows; the star moves from the first to the
        // second senior.
        let mut baseline = baseline;
        baseline.course_assignment_ids.insert(second_id);
        model
            .set_default_manager(course_id, &AssignmentId::Persisted(second_id))
            .unwrap();

        let plan = compute_update_plan(&model, &baseline);
        let mut updates = plan.default_manager_updates.clone();
        updates.sort_by_key(|(_, flag)| *flag);
        assert_eq!(updates, vec![(first_id, false), (second_id, true)]);
    }

    #[test]
    fn test_conflict_suffix_shape() {
        for _ in 0..20 {
            let name = suffixed_name("Data Team");
            let suffix = name.strip_prefix("Data Team ").expect("base name kept");
            assert_eq!(suffix.len(), 4);
            assert!(suffix.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_removed_course_drops_out_of_plan() {
        let (mut model, baseline) = loaded_model();
        let course_id = model.course_ids()[0];
        model.remove_course(course_id).unwrap();

        let plan = compute_update_plan(&model, &baseline);
        assert!(plan.course_ids.is_empty());
        assert!(plan.kept_course_assignment_ids.is_empty());
        assert!(plan.new_course_rows.is_empty());
    }
}
