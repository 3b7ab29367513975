//! Team ownership canvas.
//!
//! An administrator composes a team here: one career, its super-moderators,
//! and a set of courses each carrying senior moderators (one starred as
//! default manager) and moderators. The composition lives in a server-held
//! session and is committed atomically-enough to the `teams`,
//! `career_assignments` and `course_assignments` tables on save.

pub mod dropzone;
pub mod loader;
pub mod model;
pub mod persist;
pub mod selectors;
pub mod types;
pub mod ui;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use diesel::prelude::*;
use log::{info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::directory::{find_user, Role, UserWithRole};
use crate::shared::models::Notice;
use crate::shared::schema::{careers, courses, teams};
use crate::shared::state::AppState;
use crate::shared::utils::DbPool;

use dropzone::{drop_on, DragSource, DropOutcome, DropZone};
use model::{AssignmentId, CanvasMode, CanvasModel, CanvasPhase, ModelError};
use persist::compute_update_plan;
use types::{
    AddCourseRequest, AddUserRequest, Career, DefaultManagerRequest, DragStartRequest,
    DropRequest, RenameRequest, SelectCareerRequest, Team, TeamListEntry, UserSelectorQuery,
};

#[derive(Debug, thiserror::Error)]
pub enum CanvasError {
    #[error("Canvas session not found")]
    SessionNotFound,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("A save is already in progress")]
    SaveInProgress,
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("No free name variant for {0:?}")]
    TeamNameConflict(String),
    #[error("Load failed: {0}")]
    Load(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Archive failed: {0}")]
    Archive(String),
}

impl CanvasError {
    fn status(&self) -> StatusCode {
        match self {
            Self::SessionNotFound | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::SaveInProgress | Self::Model(_) | Self::TeamNameConflict(_) => {
                StatusCode::CONFLICT
            }
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Load(_) | Self::Database(_) | Self::Archive(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// The user-visible notification for this failure.
    pub fn notice(&self) -> Notice {
        match self {
            Self::Model(ModelError::LastSuperModerator) => Notice::destructive(
                "Cannot remove super-moderator",
                "A team needs at least one super-moderator",
            ),
            Self::Model(ModelError::LastSeniorModerator) => Notice::destructive(
                "Cannot remove senior moderator",
                "Each course needs at least one senior moderator",
            ),
            Self::TeamNameConflict(name) => Notice::destructive(
                "Team name in use",
                format!("No free variant of {:?} was found; rename the team and try again", name),
            ),
            Self::SaveInProgress => {
                Notice::destructive("Save in progress", "Wait for the current save to finish")
            }
            Self::Archive(msg) => Notice::destructive("Archive failed", msg.clone()),
            Self::Load(msg) => Notice::destructive("Load failed", msg.clone()),
            Self::Database(msg) => Notice::destructive("Save failed", msg.clone()),
            other => Notice::destructive("Request failed", other.to_string()),
        }
    }
}

impl IntoResponse for CanvasError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({
            "success": false,
            "error": self.to_string(),
            "notice": self.notice(),
        });
        (self.status(), Json(body)).into_response()
    }
}

/// One canvas being edited. Transient UI state (the drag register, the
/// saving flag folded into `phase`) lives here, outside the model.
#[derive(Debug)]
pub struct CanvasSession {
    pub id: Uuid,
    pub mode: CanvasMode,
    pub phase: CanvasPhase,
    pub model: CanvasModel,
    pub current_drag: Option<DragSource>,
    pub acting_user: Option<Uuid>,
}

impl CanvasSession {
    /// Open for select-career and rename gestures.
    fn require_open(&self) -> Result<(), CanvasError> {
        match self.phase {
            CanvasPhase::Saving => Err(CanvasError::SaveInProgress),
            CanvasPhase::Loading => {
                Err(CanvasError::Validation("canvas is still loading".to_string()))
            }
            CanvasPhase::Archived => {
                Err(CanvasError::Validation("team is archived".to_string()))
            }
            CanvasPhase::Empty | CanvasPhase::Composing => Ok(()),
        }
    }

    /// Open and past career selection; required by every other mutation.
    fn require_composing(&self) -> Result<(), CanvasError> {
        self.require_open()?;
        if self.phase != CanvasPhase::Composing {
            return Err(CanvasError::Validation("select a career first".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct CanvasRegistry {
    sessions: HashMap<Uuid, CanvasSession>,
}

impl CanvasRegistry {
    pub fn open(
        &mut self,
        mode: CanvasMode,
        phase: CanvasPhase,
        model: CanvasModel,
        acting_user: Option<Uuid>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.sessions.insert(
            id,
            CanvasSession {
                id,
                mode,
                phase,
                model,
                current_drag: None,
                acting_user,
            },
        );
        id
    }

    pub fn get(&self, id: Uuid) -> Result<&CanvasSession, CanvasError> {
        self.sessions.get(&id).ok_or(CanvasError::SessionNotFound)
    }

    pub fn get_mut(&mut self, id: Uuid) -> Result<&mut CanvasSession, CanvasError> {
        self.sessions.get_mut(&id).ok_or(CanvasError::SessionNotFound)
    }

    pub fn close(&mut self, id: Uuid) -> Option<CanvasSession> {
        self.sessions.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Snapshot returned to the page after every gesture.
#[derive(Debug, Serialize)]
pub struct CanvasView {
    pub session_id: Uuid,
    pub mode: CanvasMode,
    pub phase: CanvasPhase,
    pub model: CanvasModel,
    pub can_save: bool,
    pub current_drag: Option<DragSource>,
}

impl CanvasView {
    fn of(session: &CanvasSession) -> Self {
        Self {
            session_id: session.id,
            mode: session.mode,
            phase: session.phase,
            model: session.model.clone(),
            can_save: session.model.can_save(),
            current_drag: session.current_drag,
        }
    }
}

fn view_response(session: &CanvasSession) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "data": CanvasView::of(session),
    }))
}

async fn with_conn<T, F>(pool: DbPool, f: F) -> Result<T, CanvasError>
where
    T: Send + 'static,
    F: FnOnce(&mut PgConnection) -> Result<T, CanvasError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| CanvasError::Database(e.to_string()))?;
        f(&mut conn)
    })
    .await
    .map_err(|e| CanvasError::Database(e.to_string()))?
}

fn acting_user_from(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
}

fn parse_assignment_id(raw: &str) -> Result<AssignmentId, CanvasError> {
    raw.parse()
        .map_err(|_| CanvasError::Validation(format!("malformed assignment id {:?}", raw)))
}

async fn resolve_user(pool: DbPool, user_id: Uuid) -> Result<UserWithRole, CanvasError> {
    with_conn(pool, move |conn| {
        find_user(conn, user_id)
            .map_err(|e| CanvasError::Database(e.to_string()))?
            .ok_or_else(|| CanvasError::NotFound(format!("user {}", user_id)))
    })
    .await
}

// ----- Session lifecycle -----

/// `POST /api/teams/canvas` — open an empty create-mode canvas.
pub async fn handle_open_create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, CanvasError> {
    let acting_user = acting_user_from(&headers);
    let mut registry = state.canvases.lock().await;
    let id = registry.open(
        CanvasMode::Create,
        CanvasPhase::Empty,
        CanvasModel::new(),
        acting_user,
    );
    info!("Opened create canvas {}", id);
    Ok(view_response(registry.get(id)?))
}

/// `POST /api/teams/{team_id}/canvas` — hydrate a team into a new
/// edit-mode session. The model is only published once every fetch has
/// resolved; closing the session mid-load discards the result.
pub async fn handle_open_edit(
    State(state): State<Arc<AppState>>,
    Path(team_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, CanvasError> {
    let acting_user = acting_user_from(&headers);
    let id = {
        let mut registry = state.canvases.lock().await;
        registry.open(
            CanvasMode::Edit,
            CanvasPhase::Loading,
            CanvasModel::new(),
            acting_user,
        )
    };

    let hydrated = with_conn(state.conn.clone(), move |conn| loader::hydrate(conn, team_id)).await;

    let mut registry = state.canvases.lock().await;
    match hydrated {
        Ok(model) => {
            let Ok(session) = registry.get_mut(id) else {
                // Closed while loading; drop the result.
                warn!("Edit canvas {} closed during hydration", id);
                return Err(CanvasError::SessionNotFound);
            };
            session.model = model;
            session.phase = CanvasPhase::Composing;
            info!("Opened edit canvas {} for team {}", id, team_id);
            Ok(view_response(session))
        }
        Err(e) => {
            registry.close(id);
            Err(e)
        }
    }
}

/// `GET /api/teams/canvas/{sid}` — current view of the session.
pub async fn handle_get(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<Uuid>,
) -> Result<Json<serde_json::Value>, CanvasError> {
    let registry = state.canvases.lock().await;
    Ok(view_response(registry.get(sid)?))
}

/// `DELETE /api/teams/canvas/{sid}` — abandon the session. In-flight
/// writes are not cancelled; they complete against the backend.
pub async fn handle_close(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<Uuid>,
) -> Result<Json<serde_json::Value>, CanvasError> {
    let mut registry = state.canvases.lock().await;
    registry.close(sid).ok_or(CanvasError::SessionNotFound)?;
    Ok(Json(serde_json::json!({ "success": true })))
}

// ----- Composition gestures -----

pub async fn handle_select_career(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<Uuid>,
    Json(req): Json<SelectCareerRequest>,
) -> Result<Json<serde_json::Value>, CanvasError> {
    let career: Career = with_conn(state.conn.clone(), move |conn| {
        careers::table
            .filter(careers::id.eq(req.career_id))
            .first(conn)
            .optional()
            .map_err(|e| CanvasError::Database(e.to_string()))?
            .ok_or_else(|| CanvasError::NotFound(format!("career {}", req.career_id)))
    })
    .await?;

    let mut registry = state.canvases.lock().await;
    let session = registry.get_mut(sid)?;
    session.require_open()?;
    session.model.select_career(career, session.mode);
    session.phase = CanvasPhase::Composing;
    Ok(view_response(session))
}

pub async fn handle_rename(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<Uuid>,
    Json(req): Json<RenameRequest>,
) -> Result<Json<serde_json::Value>, CanvasError> {
    let mut registry = state.canvases.lock().await;
    let session = registry.get_mut(sid)?;
    session.require_open()?;
    session.model.rename(req.name.trim());
    Ok(view_response(session))
}

pub async fn handle_add_super_moderator(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<Uuid>,
    Json(req): Json<AddUserRequest>,
) -> Result<Json<serde_json::Value>, CanvasError> {
    let user = resolve_user(state.conn.clone(), req.user_id).await?;
    let mut registry = state.canvases.lock().await;
    let session = registry.get_mut(sid)?;
    session.require_composing()?;
    session.model.add_super_moderator(user)?;
    Ok(view_response(session))
}

pub async fn handle_remove_super_moderator(
    State(state): State<Arc<AppState>>,
    Path((sid, assignment_id)): Path<(Uuid, String)>,
) -> Result<Json<serde_json::Value>, CanvasError> {
    let id = parse_assignment_id(&assignment_id)?;
    let mut registry = state.canvases.lock().await;
    let session = registry.get_mut(sid)?;
    session.require_composing()?;
    session.model.remove_super_moderator(&id)?;
    Ok(view_response(session))
}

pub async fn handle_add_course(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<Uuid>,
    Json(req): Json<AddCourseRequest>,
) -> Result<Json<serde_json::Value>, CanvasError> {
    let career_id = {
        let registry = state.canvases.lock().await;
        let session = registry.get(sid)?;
        session.require_composing()?;
        session
            .model
            .career
            .as_ref()
            .map(|c| c.id)
            .ok_or_else(|| CanvasError::Validation("select a career first".to_string()))?
    };

    let course_id = req.course_id;
    let course = with_conn(state.conn.clone(), move |conn| {
        if !selectors::course_belongs_to_career(conn, career_id, course_id)
            .map_err(|e| CanvasError::Database(e.to_string()))?
        {
            return Err(CanvasError::Validation(format!(
                "course {} does not belong to the selected career",
                course_id
            )));
        }
        courses::table
            .filter(courses::id.eq(course_id))
            .first::<types::Course>(conn)
            .optional()
            .map_err(|e| CanvasError::Database(e.to_string()))?
            .ok_or_else(|| CanvasError::NotFound(format!("course {}", course_id)))
    })
    .await?;

    let mut registry = state.canvases.lock().await;
    let session = registry.get_mut(sid)?;
    session.require_composing()?;
    // The career may have been reassigned while the lookup ran.
    if session.model.career.as_ref().map(|c| c.id) != Some(career_id) {
        return Err(CanvasError::Validation(
            "career changed while adding the course".to_string(),
        ));
    }
    session.model.add_course(course);
    Ok(view_response(session))
}

pub async fn handle_remove_course(
    State(state): State<Arc<AppState>>,
    Path((sid, course_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<serde_json::Value>, CanvasError> {
    let mut registry = state.canvases.lock().await;
    let session = registry.get_mut(sid)?;
    session.require_composing()?;
    session.model.remove_course(course_id)?;
    Ok(view_response(session))
}

pub async fn handle_add_senior_moderator(
    State(state): State<Arc<AppState>>,
    Path((sid, course_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<AddUserRequest>,
) -> Result<Json<serde_json::Value>, CanvasError> {
    let user = resolve_user(state.conn.clone(), req.user_id).await?;
    let mut registry = state.canvases.lock().await;
    let session = registry.get_mut(sid)?;
    session.require_composing()?;
    session.model.add_senior_moderator(course_id, user)?;
    Ok(view_response(session))
}

pub async fn handle_remove_senior_moderator(
    State(state): State<Arc<AppState>>,
    Path((sid, course_id, assignment_id)): Path<(Uuid, Uuid, String)>,
) -> Result<Json<serde_json::Value>, CanvasError> {
    let id = parse_assignment_id(&assignment_id)?;
    let mut registry = state.canvases.lock().await;
    let session = registry.get_mut(sid)?;
    session.require_composing()?;
    session.model.remove_senior_moderator(course_id, &id)?;
    Ok(view_response(session))
}

pub async fn handle_set_default_manager(
    State(state): State<Arc<AppState>>,
    Path((sid, course_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<DefaultManagerRequest>,
) -> Result<Json<serde_json::Value>, CanvasError> {
    let id = parse_assignment_id(&req.assignment_id)?;
    let mut registry = state.canvases.lock().await;
    let session = registry.get_mut(sid)?;
    session.require_composing()?;
    session.model.set_default_manager(course_id, &id)?;
    Ok(view_response(session))
}

pub async fn handle_add_moderator(
    State(state): State<Arc<AppState>>,
    Path((sid, course_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<AddUserRequest>,
) -> Result<Json<serde_json::Value>, CanvasError> {
    let user = resolve_user(state.conn.clone(), req.user_id).await?;
    let mut registry = state.canvases.lock().await;
    let session = registry.get_mut(sid)?;
    session.require_composing()?;
    session.model.add_moderator(course_id, user)?;
    Ok(view_response(session))
}

pub async fn handle_remove_moderator(
    State(state): State<Arc<AppState>>,
    Path((sid, course_id, assignment_id)): Path<(Uuid, Uuid, String)>,
) -> Result<Json<serde_json::Value>, CanvasError> {
    let id = parse_assignment_id(&assignment_id)?;
    let mut registry = state.canvases.lock().await;
    let session = registry.get_mut(sid)?;
    session.require_composing()?;
    session.model.remove_moderator(course_id, &id)?;
    Ok(view_response(session))
}

// ----- Drag and drop -----

pub async fn handle_drag_start(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<Uuid>,
    Json(req): Json<DragStartRequest>,
) -> Result<Json<serde_json::Value>, CanvasError> {
    let user = resolve_user(state.conn.clone(), req.user_id).await?;
    let mut registry = state.canvases.lock().await;
    let session = registry.get_mut(sid)?;
    session.require_composing()?;
    session.current_drag = Some(DragSource {
        user_id: user.id,
        role: user.role,
    });
    Ok(view_response(session))
}

pub async fn handle_drag_cancel(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<Uuid>,
) -> Result<Json<serde_json::Value>, CanvasError> {
    let mut registry = state.canvases.lock().await;
    let session = registry.get_mut(sid)?;
    session.current_drag = None;
    Ok(view_response(session))
}

/// Drop the dragged user on a zone. A mismatched or malformed drop is
/// ignored without touching the model; the register clears either way.
pub async fn handle_drop(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<Uuid>,
    Json(req): Json<DropRequest>,
) -> Result<Json<serde_json::Value>, CanvasError> {
    let source = {
        let mut registry = state.canvases.lock().await;
        let session = registry.get_mut(sid)?;
        session.require_composing()?;
        session.current_drag.take()
    };
    let Some(source) = source else {
        return drop_ignored(&state, sid).await;
    };
    let Some(zone) = DropZone::parse(&req.zone) else {
        return drop_ignored(&state, sid).await;
    };

    let user = match resolve_user(state.conn.clone(), source.user_id).await {
        Ok(user) => user,
        Err(_) => return drop_ignored(&state, sid).await,
    };

    let mut registry = state.canvases.lock().await;
    let session = registry.get_mut(sid)?;
    session.require_composing()?;
    let outcome = drop_on(&mut session.model, zone, user);
    Ok(drop_response(session, outcome))
}

async fn drop_ignored(
    state: &Arc<AppState>,
    sid: Uuid,
) -> Result<Json<serde_json::Value>, CanvasError> {
    let registry = state.canvases.lock().await;
    let session = registry.get(sid)?;
    Ok(drop_response(session, DropOutcome::Ignored))
}

fn drop_response(session: &CanvasSession, outcome: DropOutcome) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "outcome": outcome,
        "data": CanvasView::of(session),
    }))
}

// ----- Selectors -----

pub async fn handle_selector_careers(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<Uuid>,
) -> Result<Json<serde_json::Value>, CanvasError> {
    {
        let registry = state.canvases.lock().await;
        registry.get(sid)?;
    }
    let careers = with_conn(state.conn.clone(), |conn| {
        selectors::list_careers(conn).map_err(|e| CanvasError::Database(e.to_string()))
    })
    .await?;
    Ok(Json(serde_json::json!({ "success": true, "data": careers })))
}

pub async fn handle_selector_courses(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<Uuid>,
) -> Result<Json<serde_json::Value>, CanvasError> {
    let (career_id, on_canvas, mode) = {
        let registry = state.canvases.lock().await;
        let session = registry.get(sid)?;
        let career_id = session
            .model
            .career
            .as_ref()
            .map(|c| c.id)
            .ok_or_else(|| CanvasError::Validation("select a career first".to_string()))?;
        (career_id, session.model.course_ids(), session.mode)
    };
    let courses = with_conn(state.conn.clone(), move |conn| {
        selectors::selectable_courses(conn, career_id, &on_canvas, mode)
            .map_err(|e| CanvasError::Database(e.to_string()))
    })
    .await?;
    Ok(Json(serde_json::json!({ "success": true, "data": courses })))
}

pub async fn handle_selector_users(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<Uuid>,
    Query(query): Query<UserSelectorQuery>,
) -> Result<Json<serde_json::Value>, CanvasError> {
    let role = Role::parse(&query.role)
        .filter(|r| r.is_moderation())
        .ok_or_else(|| CanvasError::Validation(format!("invalid selector role {:?}", query.role)))?;
    let exclude: Vec<Uuid> = query
        .exclude
        .as_deref()
        .unwrap_or("")
        .split(',')
        .filter_map(|raw| Uuid::parse_str(raw.trim()).ok())
        .collect();
    {
        let registry = state.canvases.lock().await;
        registry.get(sid)?;
    }
    let users = with_conn(state.conn.clone(), move |conn| {
        selectors::selectable_users(conn, role, &exclude)
            .map_err(|e| CanvasError::Database(e.to_string()))
    })
    .await?;
    Ok(Json(serde_json::json!({ "success": true, "data": users })))
}

// ----- Commit paths -----

/// `POST /api/teams/canvas/{sid}/save`. Validation gates entry to the
/// Saving phase; a failed commit returns the session to Composing with its
/// model intact so the administrator can retry.
pub async fn handle_save(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<Uuid>,
) -> Result<Json<serde_json::Value>, CanvasError> {
    let (mode, model, acting_user) = {
        let mut registry = state.canvases.lock().await;
        let session = registry.get_mut(sid)?;
        if session.phase == CanvasPhase::Saving {
            return Err(CanvasError::SaveInProgress);
        }
        session.require_composing()?;
        if !session.model.can_save() {
            return Err(CanvasError::Validation(
                "the team composition is incomplete".to_string(),
            ));
        }
        session.phase = CanvasPhase::Saving;
        (session.mode, session.model.clone(), session.acting_user)
    };

    let committed = with_conn(state.conn.clone(), move |conn| match mode {
        CanvasMode::Create => persist::create_team(conn, &model, acting_user),
        CanvasMode::Edit => {
            let baseline = model.baseline.clone().ok_or_else(|| {
                CanvasError::Validation("edit session lost its baseline".to_string())
            })?;
            let plan = compute_update_plan(&model, &baseline);
            persist::update_team(conn, &plan, acting_user)
        }
    })
    .await;

    let mut registry = state.canvases.lock().await;
    match committed {
        Ok(result) => {
            registry.close(sid);
            Ok(Json(serde_json::json!({
                "success": true,
                "team_id": result.team_id,
                "name": result.name,
                "notice": Notice::info("Team saved", format!("{:?} was saved", result.name)),
            })))
        }
        Err(e) => {
            if let Ok(session) = registry.get_mut(sid) {
                session.phase = CanvasPhase::Composing;
            }
            Err(e)
        }
    }
}

/// `POST /api/teams/canvas/{sid}/archive` — edit mode only. The canvas
/// stays open if archiving fails.
pub async fn handle_archive(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<Uuid>,
) -> Result<Json<serde_json::Value>, CanvasError> {
    let team_id = {
        let mut registry = state.canvases.lock().await;
        let session = registry.get_mut(sid)?;
        session.require_composing()?;
        if session.mode != CanvasMode::Edit {
            return Err(CanvasError::Validation(
                "only persisted teams can be archived".to_string(),
            ));
        }
        let team_id = session
            .model
            .baseline
            .as_ref()
            .map(|b| b.team_id)
            .ok_or_else(|| {
                CanvasError::Validation("edit session lost its baseline".to_string())
            })?;
        session.phase = CanvasPhase::Saving;
        team_id
    };

    let archived =
        with_conn(state.conn.clone(), move |conn| persist::archive_team(conn, team_id)).await;

    let mut registry = state.canvases.lock().await;
    match archived {
        Ok(()) => {
            registry.close(sid);
            Ok(Json(serde_json::json!({
                "success": true,
                "team_id": team_id,
                "notice": Notice::info("Team archived", "Assignments are kept for audit"),
            })))
        }
        Err(e) => {
            if let Ok(session) = registry.get_mut(sid) {
                session.phase = CanvasPhase::Composing;
            }
            Err(e)
        }
    }
}

// ----- Teams listing -----

/// `GET /api/teams` — non-archived teams for the edit entry point.
pub async fn handle_list_teams(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, CanvasError> {
    let rows: Vec<(Team, String)> = with_conn(state.conn.clone(), |conn| {
        teams::table
            .inner_join(careers::table)
            .filter(teams::archived_at.is_null())
            .order(teams::updated_at.desc())
            .select((teams::all_columns, careers::name))
            .load(conn)
            .map_err(|e| CanvasError::Database(e.to_string()))
    })
    .await?;

    let entries: Vec<TeamListEntry> = rows
        .into_iter()
        .map(|(team, career_name)| TeamListEntry {
            id: team.id,
            name: team.name,
            career_id: team.career_id,
            career_name,
            created_at: team.created_at,
            updated_at: team.updated_at,
        })
        .collect();
    Ok(Json(serde_json::json!({ "success": true, "data": entries })))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/teams", get(handle_list_teams))
        .route("/api/teams/canvas", post(handle_open_create))
        .route("/api/teams/{team_id}/canvas", post(handle_open_edit))
        .route("/api/teams/canvas/{sid}", get(handle_get).delete(handle_close))
        .route("/api/teams/canvas/{sid}/career", post(handle_select_career))
        .route("/api/teams/canvas/{sid}/name", post(handle_rename))
        .route(
            "/api/teams/canvas/{sid}/super-moderators",
            post(handle_add_super_moderator),
        )
        .route(
            "/api/teams/canvas/{sid}/super-moderators/{assignment_id}",
            delete(handle_remove_super_moderator),
        )
        .route("/api/teams/canvas/{sid}/courses", post(handle_add_course))
        .route(
            "/api/teams/canvas/{sid}/courses/{course_id}",
            delete(handle_remove_course),
        )
        .route(
            "/api/teams/canvas/{sid}/courses/{course_id}/senior-moderators",
            post(handle_add_senior_moderator),
        )
        .route(
            "/api/teams/canvas/{sid}/courses/{course_id}/senior-moderators/{assignment_id}",
            delete(handle_remove_senior_moderator),
        )
        .route(
            "/api/teams/canvas/{sid}/courses/{course_id}/default-manager",
            post(handle_set_default_manager),
        )
        .route(
            "/api/teams/canvas/{sid}/courses/{course_id}/moderators",
            post(handle_add_moderator),
        )
        .route(
            "/api/teams/canvas/{sid}/courses/{course_id}/moderators/{assignment_id}",
            delete(handle_remove_moderator),
        )
        .route(
            "/api/teams/canvas/{sid}/drag",
            post(handle_drag_start).delete(handle_drag_cancel),
        )
        .route("/api/teams/canvas/{sid}/drop", post(handle_drop))
        .route(
            "/api/teams/canvas/{sid}/selectors/careers",
            get(handle_selector_careers),
        )
        .route(
            "/api/teams/canvas/{sid}/selectors/courses",
            get(handle_selector_courses),
        )
        .route(
            "/api/teams/canvas/{sid}/selectors/users",
            get(handle_selector_users),
        )
        .route("/api/teams/canvas/{sid}/save", post(handle_save))
        .route("/api/teams/canvas/{sid}/archive", post(handle_archive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::model::test_fixtures::{career, user};

    #[test]
    fn test_registry_open_get_close() {
        let mut registry = CanvasRegistry::default();
        let id = registry.open(
            CanvasMode::Create,
            CanvasPhase::Empty,
            CanvasModel::new(),
            None,
        );
        assert_eq!(registry.len(), 1);
        assert!(registry.get(id).is_ok());
        assert!(registry.get(Uuid::new_v4()).is_err());
        assert!(registry.close(id).is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_phase_guards() {
        let mut registry = CanvasRegistry::default();
        let id = registry.open(
            CanvasMode::Create,
            CanvasPhase::Empty,
            CanvasModel::new(),
            None,
        );
        let session = registry.get_mut(id).unwrap();

        // Empty: career selection allowed, other mutations not.
        assert!(session.require_open().is_ok());
        assert!(session.require_composing().is_err());

        session.model.select_career(career("Data"), CanvasMode::Create);
        session.phase = CanvasPhase::Composing;
        assert!(session.require_composing().is_ok());

        session.phase = CanvasPhase::Saving;
        assert!(matches!(
            session.require_composing(),
            Err(CanvasError::SaveInProgress)
        ));

        session.phase = CanvasPhase::Loading;
        assert!(session.require_open().is_err());
    }

    #[test]
    fn test_model_errors_map_to_destructive_notices() {
        let err = CanvasError::Model(ModelError::LastSuperModerator);
        let notice = err.notice();
        assert_eq!(
            notice.variant,
            crate::shared::models::NoticeVariant::Destructive
        );
        assert!(notice.title.contains("super-moderator"));
    }

    #[test]
    fn test_view_reports_can_save() {
        let mut registry = CanvasRegistry::default();
        let id = registry.open(
            CanvasMode::Create,
            CanvasPhase::Empty,
            CanvasModel::new(),
            None,
        );
        let session = registry.get_mut(id).unwrap();
        session.model.select_career(career("Data"), CanvasMode::Create);
        session
            .model
            .add_super_moderator(user("Sara", Role::SuperModerator))
            .unwrap();
        let view = CanvasView::of(session);
        assert!(view.can_save);
        assert_eq!(view.model.name, "Data Team");
    }
}
