//! Shared diesel schema for the team administration tables.

diesel::table! {
    teams (id) {
        id -> Uuid,
        name -> Text,
        career_id -> Uuid,
        created_by -> Nullable<Uuid>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        archived_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    careers (id) {
        id -> Uuid,
        name -> Text,
        slug -> Text,
        icon -> Nullable<Text>,
        color -> Text,
        status -> Text,
    }
}

diesel::table! {
    courses (id) {
        id -> Uuid,
        name -> Text,
        slug -> Text,
        icon -> Nullable<Text>,
        status -> Text,
    }
}

diesel::table! {
    career_courses (career_id, course_id) {
        career_id -> Uuid,
        course_id -> Uuid,
        deleted_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    profiles (id) {
        id -> Uuid,
        email -> Text,
        full_name -> Nullable<Text>,
        avatar_url -> Nullable<Text>,
    }
}

diesel::table! {
    user_roles (user_id) {
        user_id -> Uuid,
        role -> Text,
    }
}

diesel::table! {
    career_assignments (id) {
        id -> Uuid,
        user_id -> Uuid,
        career_id -> Uuid,
        team_id -> Uuid,
        assigned_by -> Nullable<Uuid>,
        assigned_at -> Timestamptz,
    }
}

diesel::table! {
    course_assignments (id) {
        id -> Uuid,
        user_id -> Uuid,
        course_id -> Uuid,
        team_id -> Uuid,
        role -> Text,
        is_default_manager -> Bool,
        assigned_by -> Nullable<Uuid>,
        assigned_at -> Timestamptz,
    }
}

diesel::joinable!(teams -> careers (career_id));
diesel::joinable!(career_assignments -> teams (team_id));
diesel::joinable!(course_assignments -> teams (team_id));
diesel::joinable!(course_assignments -> courses (course_id));
diesel::joinable!(user_roles -> profiles (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    teams,
    careers,
    courses,
    career_courses,
    profiles,
    user_roles,
    career_assignments,
    course_assignments,
);
