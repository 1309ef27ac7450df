use async_trait::async_trait;
use sqlx::PgPool;
use wayfare_core::repository::AuditSink;
use wayfare_core::CoreResult;
use wayfare_shared::AuditEvent;

use crate::database::db_err;

/// Width of `audit_logs.ip_address`.
const ORIGIN_WIDTH: usize = 45;

pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record(&self, event: AuditEvent) -> CoreResult<()> {
        let origin = event
            .origin
            .as_deref()
            .map(|origin| origin.chars().take(ORIGIN_WIDTH).collect::<String>());

        sqlx::query(
            r#"
            INSERT INTO audit_logs (timestamp, user_email, action, details, ip_address, status, resource_type, resource_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(event.timestamp)
        .bind(&event.actor)
        .bind(&event.action)
        .bind(&event.detail)
        .bind(origin)
        .bind(event.outcome.as_str())
        .bind(&event.resource_type)
        .bind(&event.resource_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}
