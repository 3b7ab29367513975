//! Modal selector queries: careers, the current career's courses, and
//! users of a requested role minus the slot's current occupants.

use diesel::prelude::*;
use uuid::Uuid;

use crate::canvas::model::CanvasMode;
use crate::canvas::types::{Career, Course};
use crate::directory::{load_user_pool, Role, UserWithRole};
use crate::shared::schema::{career_courses, careers, courses};

pub fn list_careers(conn: &mut PgConnection) -> Result<Vec<Career>, diesel::result::Error> {
    careers::table.order(careers::name.asc()).load(conn)
}

/// Courses offered by the course selector: live links of the career, minus
/// those already on the canvas. The create path additionally requires
/// `status = "published"`; the edit path admits every status.
pub fn selectable_courses(
    conn: &mut PgConnection,
    career_id: Uuid,
    on_canvas: &[Uuid],
    mode: CanvasMode,
) -> Result<Vec<Course>, diesel::result::Error> {
    let link_ids: Vec<Uuid> = career_courses::table
        .filter(career_courses::career_id.eq(career_id))
        .filter(career_courses::deleted_at.is_null())
        .select(career_courses::course_id)
        .load(conn)?;
    if link_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut query = courses::table
        .filter(courses::id.eq_any(&link_ids))
        .into_boxed();
    if !on_canvas.is_empty() {
        query = query.filter(courses::id.ne_all(on_canvas));
    }
    if mode == CanvasMode::Create {
        query = query.filter(courses::status.eq("published"));
    }
    query.order(courses::name.asc()).load(conn)
}

/// True iff the course is a live link of the career.
pub fn course_belongs_to_career(
    conn: &mut PgConnection,
    career_id: Uuid,
    course_id: Uuid,
) -> Result<bool, diesel::result::Error> {
    use diesel::dsl::count_star;
    let hits: i64 = career_courses::table
        .filter(career_courses::career_id.eq(career_id))
        .filter(career_courses::course_id.eq(course_id))
        .filter(career_courses::deleted_at.is_null())
        .select(count_star())
        .first(conn)?;
    Ok(hits > 0)
}

/// Users of the requested role, minus the explicit exclusion list the
/// controller derives from the slot being filled.
pub fn selectable_users(
    conn: &mut PgConnection,
    role: Role,
    exclude: &[Uuid],
) -> Result<Vec<UserWithRole>, diesel::result::Error> {
    let pool = load_user_pool(conn)?;
    Ok(pool
        .into_iter()
        .filter(|u| u.role == role)
        .filter(|u| !exclude.contains(&u.id))
        .collect())
}
