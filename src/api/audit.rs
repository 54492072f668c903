//! Fire-and-forget audit logging.
//!
//! Handlers call [`record`] after the primary mutation has committed, never
//! before. A failed audit write is logged and swallowed; it must not roll
//! back or fail the request it describes.

use sqlx::PgPool;
use tracing::{error, Instrument};
use uuid::Uuid;

pub async fn record(
    pool: &PgPool,
    actor_id: Uuid,
    action: &str,
    entity_type: &str,
    entity_id: Option<Uuid>,
    metadata: serde_json::Value,
) {
    let query = r"
        INSERT INTO audit_log (actor_id, action, entity_type, entity_id, metadata)
        VALUES ($1, $2, $3, $4, $5)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(actor_id)
        .bind(action)
        .bind(entity_type)
        .bind(entity_id)
        .bind(metadata)
        .execute(pool)
        .instrument(span)
        .await;

    if let Err(err) = result {
        error!(action, entity_type, "Failed to write audit log entry: {err}");
    }
}
