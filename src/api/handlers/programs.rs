//! Certification program endpoints. Reads are open to any authenticated
//! account; writes are admin-flag gated.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::{error, Instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use super::auth::gate::{require_policy, require_session};
use super::auth::role::{AccessPolicy, Role};
use super::auth::state::AuthState;
use crate::api::audit;

#[derive(Debug, Serialize, ToSchema)]
pub struct ProgramEntry {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ProgramCreateRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ProgramUpdateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

fn entry_from_row(row: &sqlx::postgres::PgRow) -> ProgramEntry {
    ProgramEntry {
        id: row.get::<Uuid, _>("id").to_string(),
        name: row.get("name"),
        description: row.get("description"),
        created_at: row.get::<DateTime<Utc>, _>("created_at").to_rfc3339(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/programs",
    responses(
        (status = 200, description = "All certification programs.", body = [ProgramEntry]),
        (status = 401, description = "Missing or invalid session."),
    ),
    tag = "programs"
)]
pub async fn list_programs(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    if let Err(err) = require_session(&headers, &auth_state, Utc::now()) {
        return err.into_response();
    }

    let query = r"
        SELECT id, name, description, created_at
        FROM programs
        ORDER BY name
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    match sqlx::query(query).fetch_all(&pool.0).instrument(span).await {
        Ok(rows) => {
            let list: Vec<ProgramEntry> = rows.iter().map(entry_from_row).collect();
            (StatusCode::OK, Json(list)).into_response()
        }
        Err(err) => {
            error!("Failed to list programs: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/programs",
    request_body = ProgramCreateRequest,
    responses(
        (status = 201, description = "Program created (admin flag).", body = ProgramEntry),
        (status = 400, description = "Invalid input."),
        (status = 401, description = "Missing or invalid session."),
        (status = 403, description = "Forbidden."),
    ),
    tag = "programs"
)]
pub async fn create_program(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    pool: Extension<PgPool>,
    Json(payload): Json<ProgramCreateRequest>,
) -> impl IntoResponse {
    let (principal, _) = match require_session(&headers, &auth_state, Utc::now()) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = require_policy(&principal, AccessPolicy::Flag(Role::Admin)) {
        return err.into_response();
    }

    let name = payload.name.trim();
    if name.is_empty() {
        return (StatusCode::BAD_REQUEST, "program name is required").into_response();
    }

    let query = r"
        INSERT INTO programs (name, description)
        VALUES ($1, $2)
        RETURNING id, name, description, created_at
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    match sqlx::query(query)
        .bind(name)
        .bind(payload.description)
        .fetch_one(&pool.0)
        .instrument(span)
        .await
    {
        Ok(row) => {
            let entry = entry_from_row(&row);
            audit::record(
                &pool,
                principal.user_id,
                "program.create",
                "program",
                Uuid::parse_str(&entry.id).ok(),
                serde_json::json!({ "name": entry.name }),
            )
            .await;
            (StatusCode::CREATED, Json(entry)).into_response()
        }
        Err(err) => {
            error!("Failed to create program: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    patch,
    path = "/v1/programs/{id}",
    request_body = ProgramUpdateRequest,
    responses(
        (status = 200, description = "Program updated (admin flag).", body = ProgramEntry),
        (status = 400, description = "Invalid input."),
        (status = 401, description = "Missing or invalid session."),
        (status = 403, description = "Forbidden."),
        (status = 404, description = "Program not found."),
    ),
    tag = "programs"
)]
pub async fn patch_program(
    Path(id): Path<String>,
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    pool: Extension<PgPool>,
    Json(payload): Json<ProgramUpdateRequest>,
) -> impl IntoResponse {
    let (principal, _) = match require_session(&headers, &auth_state, Utc::now()) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = require_policy(&principal, AccessPolicy::Flag(Role::Admin)) {
        return err.into_response();
    }

    let program_id = match Uuid::parse_str(id.trim()) {
        Ok(id) => id,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    let name = payload
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    if name.is_none() && payload.description.is_none() {
        return (StatusCode::BAD_REQUEST, "No updates provided.").into_response();
    }

    let query = r"
        UPDATE programs SET
            name = COALESCE($1, name),
            description = COALESCE($2, description),
            updated_at = NOW()
        WHERE id = $3
        RETURNING id, name, description, created_at
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    match sqlx::query(query)
        .bind(name)
        .bind(payload.description)
        .bind(program_id)
        .fetch_optional(&pool.0)
        .instrument(span)
        .await
    {
        Ok(Some(row)) => {
            audit::record(
                &pool,
                principal.user_id,
                "program.update",
                "program",
                Some(program_id),
                serde_json::json!({}),
            )
            .await;
            (StatusCode::OK, Json(entry_from_row(&row))).into_response()
        }
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to update program: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/v1/programs/{id}",
    responses(
        (status = 204, description = "Program deleted (admin flag)."),
        (status = 400, description = "Invalid program id."),
        (status = 401, description = "Missing or invalid session."),
        (status = 403, description = "Forbidden."),
        (status = 404, description = "Program not found."),
    ),
    tag = "programs"
)]
pub async fn delete_program(
    Path(id): Path<String>,
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    let (principal, _) = match require_session(&headers, &auth_state, Utc::now()) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = require_policy(&principal, AccessPolicy::Flag(Role::Admin)) {
        return err.into_response();
    }

    let program_id = match Uuid::parse_str(id.trim()) {
        Ok(id) => id,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    // Classes keep their rows; the reference just goes away.
    let mut tx = match pool.begin().await {
        Ok(tx) => tx,
        Err(err) => {
            error!("Failed to begin program delete: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let detach = "UPDATE classes SET program_id = NULL WHERE program_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = detach
    );
    if let Err(err) = sqlx::query(detach)
        .bind(program_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
    {
        error!("Failed to detach classes from program: {err}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let query = "DELETE FROM programs WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = match sqlx::query(query)
        .bind(program_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
    {
        Ok(result) => result,
        Err(err) => {
            error!("Failed to delete program: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if let Err(err) = tx.commit().await {
        error!("Failed to commit program delete: {err}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    if result.rows_affected() > 0 {
        audit::record(
            &pool,
            principal.user_id,
            "program.delete",
            "program",
            Some(program_id),
            serde_json::json!({}),
        )
        .await;
        StatusCode::NO_CONTENT.into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}
