//! Class management endpoints.
//!
//! Flow Overview:
//! 1) Authenticate via the session token.
//! 2) Enforce the route's role policy. Class CRUD and roster changes are
//!    flag-based (a teacher keeps those rights while acting as a student);
//!    scheduling class sessions is deliberately current-role-based.
//! 3) For mutations against a specific class, resolve existence and the
//!    actor's teacher assignment before touching anything; admins bypass the
//!    assignment check. Audit rows are written after the mutation commits.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::{error, Instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use super::auth::gate::{class_access, ensure_resource, require_policy, require_session, GateError};
use super::auth::principal::Principal;
use super::auth::role::{AccessPolicy, Role};
use super::auth::state::AuthState;
use crate::api::audit;

#[derive(Debug, Serialize, ToSchema)]
pub struct ClassSummary {
    pub id: String,
    pub program_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TeacherEntry {
    pub user_id: String,
    pub display_name: String,
    pub is_primary: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MemberEntry {
    pub user_id: String,
    pub display_name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ClassDetail {
    pub id: String,
    pub program_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
    pub teachers: Vec<TeacherEntry>,
    pub members: Vec<MemberEntry>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ClassCreateRequest {
    pub name: String,
    pub description: Option<String>,
    pub program_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ClassUpdateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub program_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct MemberRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct TeacherAssignRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub is_primary: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ClassSessionEntry {
    pub id: String,
    pub class_id: String,
    pub title: String,
    pub starts_at: String,
    pub duration_minutes: i32,
    pub location: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ClassSessionCreateRequest {
    pub title: String,
    pub starts_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub location: Option<String>,
}

fn summary_from_row(row: &sqlx::postgres::PgRow) -> ClassSummary {
    ClassSummary {
        id: row.get::<Uuid, _>("id").to_string(),
        program_id: row.get::<Option<Uuid>, _>("program_id").map(|id| id.to_string()),
        name: row.get("name"),
        description: row.get("description"),
        created_at: row.get::<DateTime<Utc>, _>("created_at").to_rfc3339(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/classes",
    responses(
        (status = 200, description = "Classes visible to the current persona.", body = [ClassSummary]),
        (status = 401, description = "Missing or invalid session."),
    ),
    tag = "classes"
)]
pub async fn list_classes(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    let (principal, _) = match require_session(&headers, &auth_state, Utc::now()) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };

    // Listing is persona-scoped: the same multi-role account sees different
    // classes as admin, teacher, or student.
    let result = match principal.current_role {
        Role::Admin => fetch_all_classes(&pool).await,
        Role::Teacher => fetch_classes_linked(&pool, principal.user_id, "class_teachers").await,
        Role::Student => fetch_classes_linked(&pool, principal.user_id, "class_members").await,
    };

    match result {
        Ok(list) => (StatusCode::OK, Json(list)).into_response(),
        Err(err) => {
            error!("Failed to list classes: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn fetch_all_classes(pool: &PgPool) -> Result<Vec<ClassSummary>> {
    let query = r"
        SELECT id, program_id, name, description, created_at
        FROM classes
        ORDER BY created_at DESC
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list classes")?;
    Ok(rows.iter().map(summary_from_row).collect())
}

async fn fetch_classes_linked(
    pool: &PgPool,
    user_id: Uuid,
    link_table: &str,
) -> Result<Vec<ClassSummary>> {
    // link_table is one of two compile-time constants, never user input.
    let query = format!(
        r"
        SELECT c.id, c.program_id, c.name, c.description, c.created_at
        FROM classes c
        JOIN {link_table} l ON l.class_id = c.id
        WHERE l.user_id = $1
        ORDER BY c.created_at DESC
        "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let rows = sqlx::query(&query)
        .bind(user_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list linked classes")?;
    Ok(rows.iter().map(summary_from_row).collect())
}

#[utoipa::path(
    post,
    path = "/v1/classes",
    request_body = ClassCreateRequest,
    responses(
        (status = 201, description = "Class created; the creator becomes its primary teacher.", body = ClassSummary),
        (status = 400, description = "Invalid input."),
        (status = 401, description = "Missing or invalid session."),
        (status = 403, description = "Teacher flag required."),
    ),
    tag = "classes"
)]
pub async fn create_class(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    pool: Extension<PgPool>,
    Json(payload): Json<ClassCreateRequest>,
) -> impl IntoResponse {
    let (principal, _) = match require_session(&headers, &auth_state, Utc::now()) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = require_policy(&principal, AccessPolicy::Flag(Role::Teacher)) {
        return err.into_response();
    }

    let name = payload.name.trim();
    if name.is_empty() {
        return (StatusCode::BAD_REQUEST, "class name is required").into_response();
    }

    match insert_class(&pool, &principal, name, payload.description, payload.program_id).await {
        Ok(summary) => {
            audit::record(
                &pool,
                principal.user_id,
                "class.create",
                "class",
                Uuid::parse_str(&summary.id).ok(),
                serde_json::json!({ "name": summary.name }),
            )
            .await;
            (StatusCode::CREATED, Json(summary)).into_response()
        }
        Err(err) => {
            error!("Failed to create class: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn insert_class(
    pool: &PgPool,
    principal: &Principal,
    name: &str,
    description: Option<String>,
    program_id: Option<Uuid>,
) -> Result<ClassSummary> {
    // Class row and the creator's primary assignment land together.
    let mut tx = pool.begin().await.context("begin class transaction")?;

    let query = r"
        INSERT INTO classes (name, description, program_id)
        VALUES ($1, $2, $3)
        RETURNING id, program_id, name, description, created_at
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(name)
        .bind(description)
        .bind(program_id)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert class")?;

    let class_id: Uuid = row.get("id");
    let query = r"
        INSERT INTO class_teachers (class_id, user_id, is_primary)
        VALUES ($1, $2, TRUE)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(class_id)
        .bind(principal.user_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert primary teacher assignment")?;

    let summary = summary_from_row(&row);
    tx.commit().await.context("commit class transaction")?;
    Ok(summary)
}

#[utoipa::path(
    get,
    path = "/v1/classes/{id}",
    params(("id" = String, Path, description = "Class id")),
    responses(
        (status = 200, description = "Class detail with roster.", body = ClassDetail),
        (status = 400, description = "Invalid class id."),
        (status = 401, description = "Missing or invalid session."),
        (status = 404, description = "Class not found or not visible."),
    ),
    tag = "classes"
)]
pub async fn get_class(
    Path(id): Path<String>,
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    let (principal, _) = match require_session(&headers, &auth_state, Utc::now()) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    let class_id = match Uuid::parse_str(id.trim()) {
        Ok(id) => id,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    match fetch_class_detail(&pool, &principal, class_id).await {
        Ok(Some(detail)) => (StatusCode::OK, Json(detail)).into_response(),
        // Unrelated actors get the same 404 as a missing class.
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to fetch class detail: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn class_visible(pool: &PgPool, principal: &Principal, class_id: Uuid) -> Result<bool> {
    if principal.is_admin() {
        return Ok(true);
    }
    let query = r"
        SELECT EXISTS(
            SELECT 1 FROM class_teachers WHERE class_id = $1 AND user_id = $2
        ) OR EXISTS(
            SELECT 1 FROM class_members WHERE class_id = $1 AND user_id = $2
        ) AS linked
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(class_id)
        .bind(principal.user_id)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to resolve class visibility")?;
    Ok(row.get("linked"))
}

async fn fetch_class_detail(
    pool: &PgPool,
    principal: &Principal,
    class_id: Uuid,
) -> Result<Option<ClassDetail>> {
    let query = r"
        SELECT id, program_id, name, description, created_at
        FROM classes
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(class_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch class")?;

    let Some(row) = row else {
        return Ok(None);
    };
    if !class_visible(pool, principal, class_id).await? {
        return Ok(None);
    }

    let query = r"
        SELECT ct.user_id, u.display_name, ct.is_primary
        FROM class_teachers ct
        JOIN users u ON u.id = ct.user_id
        WHERE ct.class_id = $1
        ORDER BY ct.is_primary DESC, u.display_name
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let teachers = sqlx::query(query)
        .bind(class_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to fetch class teachers")?
        .iter()
        .map(|row| TeacherEntry {
            user_id: row.get::<Uuid, _>("user_id").to_string(),
            display_name: row.get("display_name"),
            is_primary: row.get("is_primary"),
        })
        .collect();

    let query = r"
        SELECT cm.user_id, u.display_name
        FROM class_members cm
        JOIN users u ON u.id = cm.user_id
        WHERE cm.class_id = $1
        ORDER BY u.display_name
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let members = sqlx::query(query)
        .bind(class_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to fetch class members")?
        .iter()
        .map(|row| MemberEntry {
            user_id: row.get::<Uuid, _>("user_id").to_string(),
            display_name: row.get("display_name"),
        })
        .collect();

    let summary = summary_from_row(&row);
    Ok(Some(ClassDetail {
        id: summary.id,
        program_id: summary.program_id,
        name: summary.name,
        description: summary.description,
        created_at: summary.created_at,
        teachers,
        members,
    }))
}

/// Run the mutation-side gate for a class: flag policy, existence, ownership.
async fn gate_class_mutation(
    pool: &PgPool,
    principal: &Principal,
    class_id: Uuid,
    policy: AccessPolicy,
) -> Result<(), GateError> {
    require_policy(principal, policy)?;
    let access = class_access(pool, class_id, principal.user_id).await?;
    ensure_resource(principal, access)
}

#[utoipa::path(
    patch,
    path = "/v1/classes/{id}",
    request_body = ClassUpdateRequest,
    responses(
        (status = 200, description = "Class updated.", body = ClassSummary),
        (status = 400, description = "Invalid input."),
        (status = 401, description = "Missing or invalid session."),
        (status = 403, description = "Not assigned to this class."),
        (status = 404, description = "Class not found."),
    ),
    tag = "classes"
)]
pub async fn patch_class(
    Path(id): Path<String>,
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    pool: Extension<PgPool>,
    Json(payload): Json<ClassUpdateRequest>,
) -> impl IntoResponse {
    let (principal, _) = match require_session(&headers, &auth_state, Utc::now()) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    let class_id = match Uuid::parse_str(id.trim()) {
        Ok(id) => id,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };
    if let Err(err) =
        gate_class_mutation(&pool, &principal, class_id, AccessPolicy::Flag(Role::Teacher)).await
    {
        return err.into_response();
    }

    let name = payload.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
    if name.is_none() && payload.description.is_none() && payload.program_id.is_none() {
        return (StatusCode::BAD_REQUEST, "No updates provided.").into_response();
    }

    let query = r"
        UPDATE classes SET
            name = COALESCE($1, name),
            description = COALESCE($2, description),
            program_id = COALESCE($3, program_id),
            updated_at = NOW()
        WHERE id = $4
        RETURNING id, program_id, name, description, created_at
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(name)
        .bind(payload.description)
        .bind(payload.program_id)
        .bind(class_id)
        .fetch_optional(&pool.0)
        .instrument(span)
        .await;

    match row {
        Ok(Some(row)) => {
            audit::record(
                &pool,
                principal.user_id,
                "class.update",
                "class",
                Some(class_id),
                serde_json::json!({}),
            )
            .await;
            (StatusCode::OK, Json(summary_from_row(&row))).into_response()
        }
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to update class: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/v1/classes/{id}",
    responses(
        (status = 204, description = "Class deleted."),
        (status = 400, description = "Invalid class id."),
        (status = 401, description = "Missing or invalid session."),
        (status = 403, description = "Not assigned to this class."),
        (status = 404, description = "Class not found."),
    ),
    tag = "classes"
)]
pub async fn delete_class(
    Path(id): Path<String>,
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    let (principal, _) = match require_session(&headers, &auth_state, Utc::now()) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    let class_id = match Uuid::parse_str(id.trim()) {
        Ok(id) => id,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };
    if let Err(err) =
        gate_class_mutation(&pool, &principal, class_id, AccessPolicy::Flag(Role::Teacher)).await
    {
        return err.into_response();
    }

    match delete_class_cascade(&pool, class_id).await {
        Ok(true) => {
            audit::record(
                &pool,
                principal.user_id,
                "class.delete",
                "class",
                Some(class_id),
                serde_json::json!({}),
            )
            .await;
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to delete class: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn delete_class_cascade(pool: &PgPool, class_id: Uuid) -> Result<bool> {
    let mut tx = pool.begin().await.context("begin class delete")?;
    for statement in [
        "DELETE FROM class_sessions WHERE class_id = $1",
        "DELETE FROM class_members WHERE class_id = $1",
        "DELETE FROM class_teachers WHERE class_id = $1",
    ] {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = statement
        );
        sqlx::query(statement)
            .bind(class_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to delete class dependents")?;
    }

    let query = "DELETE FROM classes WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(class_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to delete class")?;

    tx.commit().await.context("commit class delete")?;
    Ok(result.rows_affected() > 0)
}

#[utoipa::path(
    post,
    path = "/v1/classes/{id}/members",
    request_body = MemberRequest,
    responses(
        (status = 201, description = "Student enrolled."),
        (status = 400, description = "Unknown user or user not student-flagged."),
        (status = 401, description = "Missing or invalid session."),
        (status = 403, description = "Not assigned to this class."),
        (status = 404, description = "Class not found."),
    ),
    tag = "classes"
)]
pub async fn add_member(
    Path(id): Path<String>,
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    pool: Extension<PgPool>,
    Json(payload): Json<MemberRequest>,
) -> impl IntoResponse {
    let (principal, _) = match require_session(&headers, &auth_state, Utc::now()) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    let class_id = match Uuid::parse_str(id.trim()) {
        Ok(id) => id,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };
    if let Err(err) =
        gate_class_mutation(&pool, &principal, class_id, AccessPolicy::Flag(Role::Teacher)).await
    {
        return err.into_response();
    }

    match require_flagged_user(&pool, payload.user_id, "is_student").await {
        Ok(true) => {}
        Ok(false) => {
            return (StatusCode::BAD_REQUEST, "user is not student-flagged").into_response()
        }
        Err(err) => {
            error!("Failed to resolve member: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    let query = r"
        INSERT INTO class_members (class_id, user_id)
        VALUES ($1, $2)
        ON CONFLICT (class_id, user_id) DO NOTHING
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    match sqlx::query(query)
        .bind(class_id)
        .bind(payload.user_id)
        .execute(&pool.0)
        .instrument(span)
        .await
    {
        Ok(_) => {
            audit::record(
                &pool,
                principal.user_id,
                "class.member_add",
                "class",
                Some(class_id),
                serde_json::json!({ "member": payload.user_id }),
            )
            .await;
            StatusCode::CREATED.into_response()
        }
        Err(err) => {
            error!("Failed to enroll member: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// True when the user exists and carries the given flag column.
async fn require_flagged_user(pool: &PgPool, user_id: Uuid, flag_column: &str) -> Result<bool> {
    // flag_column is a compile-time constant at every call site.
    let query = format!("SELECT {flag_column} AS flagged FROM users WHERE id = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to resolve user flags")?;
    Ok(row.is_some_and(|row| row.get("flagged")))
}

#[utoipa::path(
    delete,
    path = "/v1/classes/{id}/members/{user_id}",
    responses(
        (status = 204, description = "Membership removed."),
        (status = 400, description = "Invalid id."),
        (status = 401, description = "Missing or invalid session."),
        (status = 403, description = "Not assigned to this class."),
        (status = 404, description = "Class not found."),
    ),
    tag = "classes"
)]
pub async fn remove_member(
    Path((id, user_id)): Path<(String, String)>,
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    let (principal, _) = match require_session(&headers, &auth_state, Utc::now()) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    let (class_id, member_id) = match (Uuid::parse_str(id.trim()), Uuid::parse_str(user_id.trim()))
    {
        (Ok(class_id), Ok(member_id)) => (class_id, member_id),
        _ => return StatusCode::BAD_REQUEST.into_response(),
    };
    if let Err(err) =
        gate_class_mutation(&pool, &principal, class_id, AccessPolicy::Flag(Role::Teacher)).await
    {
        return err.into_response();
    }

    let query = "DELETE FROM class_members WHERE class_id = $1 AND user_id = $2";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    match sqlx::query(query)
        .bind(class_id)
        .bind(member_id)
        .execute(&pool.0)
        .instrument(span)
        .await
    {
        Ok(_) => {
            audit::record(
                &pool,
                principal.user_id,
                "class.member_remove",
                "class",
                Some(class_id),
                serde_json::json!({ "member": member_id }),
            )
            .await;
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => {
            error!("Failed to remove member: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/classes/{id}/teachers",
    request_body = TeacherAssignRequest,
    responses(
        (status = 201, description = "Teacher assigned."),
        (status = 400, description = "Unknown user or user not teacher-flagged."),
        (status = 401, description = "Missing or invalid session."),
        (status = 403, description = "Not assigned to this class."),
        (status = 404, description = "Class not found."),
    ),
    tag = "classes"
)]
pub async fn assign_teacher(
    Path(id): Path<String>,
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    pool: Extension<PgPool>,
    Json(payload): Json<TeacherAssignRequest>,
) -> impl IntoResponse {
    let (principal, _) = match require_session(&headers, &auth_state, Utc::now()) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    let class_id = match Uuid::parse_str(id.trim()) {
        Ok(id) => id,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };
    if let Err(err) =
        gate_class_mutation(&pool, &principal, class_id, AccessPolicy::Flag(Role::Teacher)).await
    {
        return err.into_response();
    }

    match require_flagged_user(&pool, payload.user_id, "is_teacher").await {
        Ok(true) => {}
        Ok(false) => {
            return (StatusCode::BAD_REQUEST, "user is not teacher-flagged").into_response()
        }
        Err(err) => {
            error!("Failed to resolve teacher: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    let query = r"
        INSERT INTO class_teachers (class_id, user_id, is_primary)
        VALUES ($1, $2, $3)
        ON CONFLICT (class_id, user_id) DO UPDATE SET is_primary = EXCLUDED.is_primary
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    match sqlx::query(query)
        .bind(class_id)
        .bind(payload.user_id)
        .bind(payload.is_primary)
        .execute(&pool.0)
        .instrument(span)
        .await
    {
        Ok(_) => {
            audit::record(
                &pool,
                principal.user_id,
                "class.teacher_assign",
                "class",
                Some(class_id),
                serde_json::json!({ "teacher": payload.user_id, "is_primary": payload.is_primary }),
            )
            .await;
            StatusCode::CREATED.into_response()
        }
        Err(err) => {
            error!("Failed to assign teacher: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/classes/{id}/sessions",
    responses(
        (status = 200, description = "Scheduled sessions for the class.", body = [ClassSessionEntry]),
        (status = 400, description = "Invalid class id."),
        (status = 401, description = "Missing or invalid session."),
        (status = 404, description = "Class not found or not visible."),
    ),
    tag = "classes"
)]
pub async fn list_class_sessions(
    Path(id): Path<String>,
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    let (principal, _) = match require_session(&headers, &auth_state, Utc::now()) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    let class_id = match Uuid::parse_str(id.trim()) {
        Ok(id) => id,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    let visible = match class_exists(&pool, class_id).await {
        Ok(true) => class_visible(&pool, &principal, class_id).await,
        Ok(false) => Ok(false),
        Err(err) => Err(err),
    };
    match visible {
        Ok(true) => {}
        Ok(false) => return StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to resolve class visibility: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    let query = r"
        SELECT id, class_id, title, starts_at, duration_minutes, location
        FROM class_sessions
        WHERE class_id = $1
        ORDER BY starts_at
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    match sqlx::query(query)
        .bind(class_id)
        .fetch_all(&pool.0)
        .instrument(span)
        .await
    {
        Ok(rows) => {
            let list: Vec<ClassSessionEntry> = rows
                .iter()
                .map(|row| ClassSessionEntry {
                    id: row.get::<Uuid, _>("id").to_string(),
                    class_id: row.get::<Uuid, _>("class_id").to_string(),
                    title: row.get("title"),
                    starts_at: row.get::<DateTime<Utc>, _>("starts_at").to_rfc3339(),
                    duration_minutes: row.get("duration_minutes"),
                    location: row.get("location"),
                })
                .collect();
            (StatusCode::OK, Json(list)).into_response()
        }
        Err(err) => {
            error!("Failed to list class sessions: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn class_exists(pool: &PgPool, class_id: Uuid) -> Result<bool> {
    let query = "SELECT 1 FROM classes WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(class_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to check class existence")?;
    Ok(row.is_some())
}

#[utoipa::path(
    post,
    path = "/v1/classes/{id}/sessions",
    request_body = ClassSessionCreateRequest,
    responses(
        (status = 201, description = "Session scheduled.", body = ClassSessionEntry),
        (status = 400, description = "Invalid input."),
        (status = 401, description = "Missing or invalid session."),
        (status = 403, description = "Session must be acting as teacher and assigned to the class."),
        (status = 404, description = "Class not found."),
    ),
    tag = "classes"
)]
pub async fn create_class_session(
    Path(id): Path<String>,
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    pool: Extension<PgPool>,
    Json(payload): Json<ClassSessionCreateRequest>,
) -> impl IntoResponse {
    let (principal, _) = match require_session(&headers, &auth_state, Utc::now()) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    let class_id = match Uuid::parse_str(id.trim()) {
        Ok(id) => id,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };
    // Scheduling is persona-gated: the session must be acting as teacher.
    if let Err(err) = gate_class_mutation(
        &pool,
        &principal,
        class_id,
        AccessPolicy::CurrentRole(Role::Teacher),
    )
    .await
    {
        return err.into_response();
    }

    let title = payload.title.trim();
    if title.is_empty() {
        return (StatusCode::BAD_REQUEST, "session title is required").into_response();
    }
    if payload.duration_minutes <= 0 {
        return (StatusCode::BAD_REQUEST, "duration must be positive").into_response();
    }

    let query = r"
        INSERT INTO class_sessions (class_id, title, starts_at, duration_minutes, location)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, class_id, title, starts_at, duration_minutes, location
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    match sqlx::query(query)
        .bind(class_id)
        .bind(title)
        .bind(payload.starts_at)
        .bind(payload.duration_minutes)
        .bind(payload.location)
        .fetch_one(&pool.0)
        .instrument(span)
        .await
    {
        Ok(row) => {
            let entry = ClassSessionEntry {
                id: row.get::<Uuid, _>("id").to_string(),
                class_id: row.get::<Uuid, _>("class_id").to_string(),
                title: row.get("title"),
                starts_at: row.get::<DateTime<Utc>, _>("starts_at").to_rfc3339(),
                duration_minutes: row.get("duration_minutes"),
                location: row.get("location"),
            };
            audit::record(
                &pool,
                principal.user_id,
                "class.session_create",
                "class_session",
                Uuid::parse_str(&entry.id).ok(),
                serde_json::json!({ "class": class_id }),
            )
            .await;
            (StatusCode::CREATED, Json(entry)).into_response()
        }
        Err(err) => {
            error!("Failed to schedule class session: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/v1/classes/{id}/sessions/{session_id}",
    responses(
        (status = 204, description = "Session removed."),
        (status = 400, description = "Invalid id."),
        (status = 401, description = "Missing or invalid session."),
        (status = 403, description = "Session must be acting as teacher and assigned to the class."),
        (status = 404, description = "Class or session not found."),
    ),
    tag = "classes"
)]
pub async fn delete_class_session(
    Path((id, session_id)): Path<(String, String)>,
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    let (principal, _) = match require_session(&headers, &auth_state, Utc::now()) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    let (class_id, session_id) =
        match (Uuid::parse_str(id.trim()), Uuid::parse_str(session_id.trim())) {
            (Ok(class_id), Ok(session_id)) => (class_id, session_id),
            _ => return StatusCode::BAD_REQUEST.into_response(),
        };
    if let Err(err) = gate_class_mutation(
        &pool,
        &principal,
        class_id,
        AccessPolicy::CurrentRole(Role::Teacher),
    )
    .await
    {
        return err.into_response();
    }

    let query = "DELETE FROM class_sessions WHERE id = $1 AND class_id = $2";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    match sqlx::query(query)
        .bind(session_id)
        .bind(class_id)
        .execute(&pool.0)
        .instrument(span)
        .await
    {
        Ok(result) if result.rows_affected() > 0 => {
            audit::record(
                &pool,
                principal.user_id,
                "class.session_delete",
                "class_session",
                Some(session_id),
                serde_json::json!({ "class": class_id }),
            )
            .await;
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(_) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to delete class session: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_detail_serializes_roster() {
        let detail = ClassDetail {
            id: "class-id".to_string(),
            program_id: None,
            name: "Cohort 12".to_string(),
            description: None,
            created_at: "2026-01-01T00:00:00+00:00".to_string(),
            teachers: vec![],
            members: vec![],
        };
        let value = serde_json::to_value(&detail).expect("serialize");
        assert_eq!(value["name"], serde_json::json!("Cohort 12"));
        assert!(value["teachers"].as_array().expect("array").is_empty());
    }

    #[test]
    fn teacher_assignment_defaults_to_secondary() {
        let request: TeacherAssignRequest = serde_json::from_value(serde_json::json!({
            "user_id": Uuid::new_v4(),
        }))
        .expect("deserialize");
        assert!(!request.is_primary);
    }

    #[test]
    fn session_create_request_rejects_unknown_fields() {
        let result: Result<ClassSessionCreateRequest, _> =
            serde_json::from_value(serde_json::json!({
                "title": "Kickoff",
                "starts_at": "2026-09-01T10:00:00Z",
                "duration_minutes": 60,
                "teacher": "someone"
            }));
        assert!(result.is_err());
    }
}
