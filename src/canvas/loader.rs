//! Edit-mode hydration: fetches the team and its assignment rows and
//! assembles the canvas model plus the baseline the save-time diff runs
//! against. The session is only published once assembly has finished.

use diesel::prelude::*;
use log::warn;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::canvas::model::{
    AssignmentId, Baseline, CanvasModel, CourseMemberSlot, CourseNode, SuperModSlot,
};
use crate::canvas::types::{
    AssignmentRole, Career, CareerAssignmentRow, CareerCourseLink, Course, CourseAssignmentRow,
    Team,
};
use crate::canvas::CanvasError;
use crate::directory::{load_user_pool, UserWithRole};
use crate::shared::schema::{career_assignments, career_courses, careers, course_assignments, courses, teams};

/// Pure assembly of the hydrated model. Courses shown on the canvas are
/// the career's live courses that carry at least one assignment for this
/// team; assignment rows that cannot be resolved against the user pool or
/// whose role string is unrecognised are dropped.
pub fn assemble_model(
    team: &Team,
    career: Career,
    users_by_id: &HashMap<Uuid, UserWithRole>,
    super_rows: &[CareerAssignmentRow],
    links: &[CareerCourseLink],
    career_course_rows: &[Course],
    assignment_rows: &[CourseAssignmentRow],
) -> CanvasModel {
    let mut model = CanvasModel::new();
    model.name = team.name.clone();
    model.career = Some(career);

    let mut super_mod_ids = HashSet::new();
    for row in super_rows {
        let Some(user) = users_by_id.get(&row.user_id) else {
            warn!(
                "Dropping career assignment {}: user {} not in the pool",
                row.id, row.user_id
            );
            continue;
        };
        super_mod_ids.insert(row.id);
        model.super_moderators.push(SuperModSlot {
            id: AssignmentId::Persisted(row.id),
            user: user.clone(),
        });
    }

    let live_course_ids: HashSet<Uuid> = links.iter().map(|l| l.course_id).collect();
    let mut by_course: HashMap<Uuid, Vec<&CourseAssignmentRow>> = HashMap::new();
    for row in assignment_rows {
        by_course.entry(row.course_id).or_default().push(row);
    }

    let mut course_assignment_ids = HashSet::new();
    let mut default_manager_by_course = HashMap::new();
    let mut nodes: Vec<CourseNode> = Vec::new();
    for course in career_course_rows {
        if !live_course_ids.contains(&course.id) {
            continue;
        }
        let Some(rows) = by_course.get(&course.id) else {
            // Career course without assignments for this team stays off
            // the canvas (it remains offered by the course selector).
            continue;
        };
        let mut node = CourseNode {
            course: course.clone(),
            senior_moderators: Vec::new(),
            moderators: Vec::new(),
        };
        for row in rows {
            let Some(role) = AssignmentRole::parse(&row.role) else {
                warn!(
                    "Dropping course assignment {}: unrecognised role {:?}",
                    row.id, row.role
                );
                continue;
            };
            let Some(user) = users_by_id.get(&row.user_id) else {
                warn!(
                    "Dropping course assignment {}: user {} not in the pool",
                    row.id, row.user_id
                );
                continue;
            };
            course_assignment_ids.insert(row.id);
            let slot = CourseMemberSlot {
                id: AssignmentId::Persisted(row.id),
                user: user.clone(),
                is_default_manager: role == AssignmentRole::SeniorModerator
                    && row.is_default_manager,
            };
            match role {
                AssignmentRole::SeniorModerator => {
                    if slot.is_default_manager {
                        default_manager_by_course.insert(course.id, row.id);
                    }
                    node.senior_moderators.push(slot);
                }
                AssignmentRole::Moderator => node.moderators.push(slot),
            }
        }
        if !node.senior_moderators.is_empty() || !node.moderators.is_empty() {
            nodes.push(node);
        }
    }
    nodes.sort_by(|a, b| a.course.name.to_lowercase().cmp(&b.course.name.to_lowercase()));
    model.courses = nodes;

    model.baseline = Some(Baseline {
        team_id: team.id,
        career_id: team.career_id,
        team_name: team.name.clone(),
        super_mod_ids,
        course_assignment_ids,
        default_manager_by_course,
    });
    model
}

/// Fetches everything an edit session needs and assembles the model.
pub fn hydrate(conn: &mut PgConnection, team_id: Uuid) -> Result<CanvasModel, CanvasError> {
    let team: Team = teams::table
        .filter(teams::id.eq(team_id))
        .first(conn)
        .optional()
        .map_err(|e| CanvasError::Load(e.to_string()))?
        .ok_or_else(|| CanvasError::NotFound(format!("team {}", team_id)))?;

    let career: Career = careers::table
        .filter(careers::id.eq(team.career_id))
        .first(conn)
        .map_err(|e| CanvasError::Load(e.to_string()))?;

    let users_by_id: HashMap<Uuid, UserWithRole> = load_user_pool(conn)
        .map_err(|e| CanvasError::Load(e.to_string()))?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();

    let super_rows: Vec<CareerAssignmentRow> = career_assignments::table
        .filter(career_assignments::team_id.eq(team_id))
        .order(career_assignments::assigned_at.asc())
        .load(conn)
        .map_err(|e| CanvasError::Load(e.to_string()))?;

    let links: Vec<CareerCourseLink> = career_courses::table
        .filter(career_courses::career_id.eq(team.career_id))
        .filter(career_courses::deleted_at.is_null())
        .load(conn)
        .map_err(|e| CanvasError::Load(e.to_string()))?;

    let link_ids: Vec<Uuid> = links.iter().map(|l| l.course_id).collect();
    let career_course_rows: Vec<Course> = if link_ids.is_empty() {
        Vec::new()
    } else {
        courses::table
            .filter(courses::id.eq_any(&link_ids))
            .load(conn)
            .map_err(|e| CanvasError::Load(e.to_string()))?
    };

    let assignment_rows: Vec<CourseAssignmentRow> = course_assignments::table
        .filter(course_assignments::team_id.eq(team_id))
        .order(course_assignments::assigned_at.asc())
        .load(conn)
        .map_err(|e| CanvasError::Load(e.to_string()))?;

    Ok(assemble_model(
        &team,
        career,
        &users_by_id,
        &super_rows,
        &links,
        &career_course_rows,
        &assignment_rows,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::model::test_fixtures::{career, course, user};
    use crate::directory::Role;
    use chrono::Utc;

    fn team_row(name: &str, career_id: Uuid) -> Team {
        Team {
            id: Uuid::new_v4(),
            name: name.to_string(),
            career_id,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            archived_at: None,
        }
    }

    fn super_row(team: &Team, user_id: Uuid) -> CareerAssignmentRow {
        CareerAssignmentRow {
            id: Uuid::new_v4(),
            user_id,
            career_id: team.career_id,
            team_id: team.id,
            assigned_by: None,
            assigned_at: Utc::now(),
        }
    }

    fn course_row(
        team: &Team,
        course_id: Uuid,
        user_id: Uuid,
        role: &str,
        is_default: bool,
    ) -> CourseAssignmentRow {
        CourseAssignmentRow {
            id: Uuid::new_v4(),
            user_id,
            course_id,
            team_id: team.id,
            role: role.to_string(),
            is_default_manager: is_default,
            assigned_by: None,
            assigned_at: Utc::now(),
        }
    }

    fn link(career_id: Uuid, course_id: Uuid) -> CareerCourseLink {
        CareerCourseLink {
            career_id,
            course_id,
            deleted_at: None,
        }
    }

    #[test]
    fn test_assembles_model_and_baseline() {
        let the_career = career("Data");
        let team = team_row("Data Team", the_career.id);
        let sara = user("Sara", Role::SuperModerator);
        let mina = user("Mina", Role::SeniorModerator);
        let max = user("Max", Role::Moderator);
        let k1 = course("SQL Basics");

        let users: HashMap<Uuid, UserWithRole> = [sara.clone(), mina.clone(), max.clone()]
            .into_iter()
            .map(|u| (u.id, u))
            .collect();
        let supers = vec![super_row(&team, sara.id)];
        let links = vec![link(the_career.id, k1.id)];
        let assignments = vec![
            course_row(&team, k1.id, mina.id, "senior_moderator", true),
            course_row(&team, k1.id, max.id, "moderator", false),
        ];

        let model = assemble_model(
            &team,
            the_career.clone(),
            &users,
            &supers,
            &links,
            &[k1.clone()],
            &assignments,
        );

        assert_eq!(model.name, "Data Team");
        assert_eq!(model.super_moderators.len(), 1);
        assert!(!model.super_moderators[0].id.is_draft());
        assert_eq!(model.courses.len(), 1);
        let node = &model.courses[0];
        assert_eq!(node.senior_moderators.len(), 1);
        assert!(node.senior_moderators[0].is_default_manager);
        assert_eq!(node.moderators.len(), 1);
        assert!(model.can_save());

        let baseline = model.baseline.as_ref().unwrap();
        assert_eq!(baseline.team_id, team.id);
        assert_eq!(baseline.career_id, the_career.id);
        assert_eq!(baseline.team_name, "Data Team");
        assert_eq!(baseline.super_mod_ids.len(), 1);
        assert_eq!(baseline.course_assignment_ids.len(), 2);
        assert_eq!(
            baseline.default_manager_by_course.get(&k1.id),
            Some(&assignments[0].id)
        );
    }

    #[test]
    fn test_courses_without_assignments_stay_off_the_canvas() {
        let the_career = career("Data");
        let team = team_row("Data Team", the_career.id);
        let sara = user("Sara", Role::SuperModerator);
        let users: HashMap<Uuid, UserWithRole> =
            [(sara.id, sara.clone())].into_iter().collect();
        let k1 = course("SQL Basics");
        let k2 = course("Pandas");

        let model = assemble_model(
            &team,
            the_career.clone(),
            &users,
            &[super_row(&team, sara.id)],
            &[link(the_career.id, k1.id), link(the_career.id, k2.id)],
            &[k1, k2],
            &[],
        );
        assert!(model.courses.is_empty());
    }

    #[test]
    fn test_assignments_for_unlinked_courses_are_dropped() {
        let the_career = career("Data");
        let team = team_row("Data Team", the_career.id);
        let mina = user("Mina", Role::SeniorModerator);
        let users: HashMap<Uuid, UserWithRole> =
            [(mina.id, mina.clone())].into_iter().collect();
        let orphan = course("Unlinked");

        // The course row exists but carries no live career link.
        let model = assemble_model(
            &team,
            the_career,
            &users,
            &[],
            &[],
            &[orphan.clone()],
            &[course_row(&team, orphan.id, mina.id, "senior_moderator", true)],
        );
        assert!(model.courses.is_empty());
    }

    #[test]
    fn test_unrecognised_roles_and_unknown_users_are_dropped() {
        let the_career = career("Data");
        let team = team_row("Data Team", the_career.id);
        let mina = user("Mina", Role::SeniorModerator);
        let users: HashMap<Uuid, UserWithRole> =
            [(mina.id, mina.clone())].into_iter().collect();
        let k1 = course("SQL Basics");

        let assignments = vec![
            course_row(&team, k1.id, mina.id, "senior_moderator", true),
            course_row(&team, k1.id, Uuid::new_v4(), "moderator", false),
            course_row(&team, k1.id, mina.id, "owner", false),
        ];
        let model = assemble_model(
            &team,
            the_career.clone(),
            &users,
            &[],
            &[link(the_career.id, k1.id)],
            &[k1],
            &assignments,
        );
        let node = &model.courses[0];
        assert_eq!(node.senior_moderators.len(), 1);
        assert!(node.moderators.is_empty());
        assert_eq!(
            model.baseline.as_ref().unwrap().course_assignment_ids.len(),
            1
        );
    }
}
