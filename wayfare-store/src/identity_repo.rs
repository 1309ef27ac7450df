use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use wayfare_core::identity::{Identity, IdentityPatch, NewIdentity, Role};
use wayfare_core::repository::IdentityRepository;
use wayfare_core::{CoreError, CoreResult};

use crate::database::{db_err, ping};

const IDENTITY_COLUMNS: &str =
    "id, first_name, last_name, email, hash_password, role, status, permissions, last_login, created_at";

pub struct PgIdentityRepository {
    pool: PgPool,
}

impl PgIdentityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct IdentityRow {
    id: i64,
    first_name: String,
    last_name: String,
    email: String,
    hash_password: String,
    role: String,
    status: String,
    permissions: Json<Vec<String>>,
    last_login: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<IdentityRow> for Identity {
    type Error = CoreError;

    fn try_from(row: IdentityRow) -> Result<Self, Self::Error> {
        // A row the schema's CHECK constraints should have rejected.
        let corrupt = |field: &str| CoreError::persistence(format!("login_users.{} holds an unknown value", field));

        Ok(Identity {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            password_hash: row.hash_password,
            role: row.role.parse().map_err(|_| corrupt("role"))?,
            status: row.status.parse().map_err(|_| corrupt("status"))?,
            permissions: row.permissions.0.into_iter().collect(),
            last_login: row.last_login,
            created_at: row.created_at,
        })
    }
}

fn into_identities(rows: Vec<IdentityRow>) -> CoreResult<Vec<Identity>> {
    rows.into_iter().map(Identity::try_from).collect()
}

#[async_trait]
impl IdentityRepository for PgIdentityRepository {
    async fn find_by_email(&self, email: &str) -> CoreResult<Option<Identity>> {
        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            "SELECT {} FROM login_users WHERE email = $1",
            IDENTITY_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(Identity::try_from).transpose()
    }

    async fn find_by_id(&self, id: i64) -> CoreResult<Option<Identity>> {
        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            "SELECT {} FROM login_users WHERE id = $1",
            IDENTITY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(Identity::try_from).transpose()
    }

    async fn insert(&self, identity: NewIdentity) -> CoreResult<Identity> {
        let permissions: Vec<String> = identity.permissions.into_iter().collect();

        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            r#"
            INSERT INTO login_users (first_name, last_name, email, hash_password, role, status, permissions)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            IDENTITY_COLUMNS
        ))
        .bind(&identity.first_name)
        .bind(&identity.last_name)
        .bind(&identity.email)
        .bind(&identity.password_hash)
        .bind(identity.role.as_str())
        .bind(identity.status.as_str())
        .bind(Json(permissions))
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Identity::try_from(row)
    }

    async fn update(&self, id: i64, patch: &IdentityPatch) -> CoreResult<Option<Identity>> {
        if patch.is_empty() {
            return self.find_by_id(id).await;
        }

        // Only the provided fields are written; every value is a bind
        // parameter.
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new("UPDATE login_users SET ");
        let mut set = qb.separated(", ");
        if let Some(v) = &patch.first_name {
            set.push("first_name = ").push_bind_unseparated(v.clone());
        }
        if let Some(v) = &patch.last_name {
            set.push("last_name = ").push_bind_unseparated(v.clone());
        }
        if let Some(v) = &patch.email {
            set.push("email = ").push_bind_unseparated(v.clone());
        }
        if let Some(v) = &patch.password_hash {
            set.push("hash_password = ").push_bind_unseparated(v.clone());
        }
        if let Some(v) = patch.role {
            set.push("role = ").push_bind_unseparated(v.as_str());
        }
        if let Some(v) = patch.status {
            set.push("status = ").push_bind_unseparated(v.as_str());
        }
        if let Some(v) = &patch.permissions {
            let tags: Vec<String> = v.iter().cloned().collect();
            set.push("permissions = ").push_bind_unseparated(Json(tags));
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.push(" RETURNING ").push(IDENTITY_COLUMNS);

        let row = qb
            .build_query_as::<IdentityRow>()
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(Identity::try_from).transpose()
    }

    async fn delete(&self, id: i64) -> CoreResult<bool> {
        let result = sqlx::query("DELETE FROM login_users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, role: Option<Role>) -> CoreResult<Vec<Identity>> {
        let rows = match role {
            Some(role) => {
                sqlx::query_as::<_, IdentityRow>(&format!(
                    "SELECT {} FROM login_users WHERE role = $1 ORDER BY created_at DESC",
                    IDENTITY_COLUMNS
                ))
                .bind(role.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, IdentityRow>(&format!(
                    r#"
                    SELECT {} FROM login_users
                    ORDER BY CASE role WHEN 'superadmin' THEN 1 WHEN 'admin' THEN 2 ELSE 3 END, created_at DESC
                    "#,
                    IDENTITY_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(db_err)?;

        into_identities(rows)
    }

    async fn touch_last_login(&self, email: &str) -> CoreResult<()> {
        sqlx::query("UPDATE login_users SET last_login = NOW() WHERE email = $1")
            .bind(email)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn ping(&self) -> CoreResult<()> {
        ping(&self.pool).await
    }
}
