use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{info, warn};
use wayfare_shared::{AuditEvent, Masked};

use crate::identity::{split_name, Actor, Identity, IdentityPatch, IdentityStatus, NewIdentity, Role};
use crate::password::{spawn_hash, spawn_verify};
use crate::repository::{emit, AuditSink, IdentityRepository};
use crate::{CoreError, CoreResult};

#[derive(Debug, Clone)]
pub struct Signup {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: Masked<String>,
    pub confirm_password: Masked<String>,
}

/// Identity created by a superadmin. `name` is split into first/last.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub password: Masked<String>,
    pub role: Role,
    pub permissions: BTreeSet<String>,
}

/// Fields a superadmin may change on an identity; `None` leaves the field
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<Masked<String>>,
    pub role: Option<Role>,
    pub status: Option<IdentityStatus>,
    pub permissions: Option<BTreeSet<String>>,
}

/// Signup, login and superadmin identity administration.
pub struct AccountService {
    identities: Arc<dyn IdentityRepository>,
    audit: Arc<dyn AuditSink>,
}

impl AccountService {
    pub fn new(identities: Arc<dyn IdentityRepository>, audit: Arc<dyn AuditSink>) -> Self {
        Self { identities, audit }
    }

    pub async fn signup(&self, req: Signup, origin: Option<String>) -> CoreResult<Identity> {
        let email = req.email.trim().to_string();
        if req.first_name.trim().is_empty()
            || req.last_name.trim().is_empty()
            || email.is_empty()
            || req.password.is_blank()
            || req.confirm_password.is_blank()
        {
            return Err(CoreError::validation("All fields are required"));
        }
        if req.password.expose() != req.confirm_password.expose() {
            return Err(CoreError::validation("Passwords do not match"));
        }

        let identity = self
            .identities
            .insert(NewIdentity {
                first_name: req.first_name.trim().to_string(),
                last_name: req.last_name.trim().to_string(),
                email: email.clone(),
                password_hash: spawn_hash(req.password.clone()).await?,
                role: Role::User,
                status: IdentityStatus::Active,
                permissions: BTreeSet::new(),
            })
            .await
            .map_err(|e| match e {
                CoreError::Conflict(_) => CoreError::Conflict("Email already exists".to_string()),
                other => other,
            })?;

        info!("New identity registered: {}", identity.email);
        let event = AuditEvent::success(
            &identity.email,
            "SIGNUP",
            format!("New user registered: {}", identity.display_name()),
        )
        .resource("USER", &identity.email)
        .origin(origin);
        emit(self.audit.as_ref(), event).await;

        Ok(identity)
    }

    /// An unknown email is `NotFound`, a wrong password `Unauthenticated`.
    /// Callers surface the two differently on purpose.
    pub async fn login(&self, email: &str, password: &Masked<String>, origin: Option<String>) -> CoreResult<Identity> {
        let email = email.trim();
        if email.is_empty() || password.is_blank() {
            return Err(CoreError::validation("Both Email and Password are required"));
        }

        let failed = |detail: &str| {
            AuditEvent::failed(email, "LOGIN", detail)
                .resource("AUTH", email)
                .origin(origin.clone())
        };

        let Some(identity) = self.identities.find_by_email(email).await? else {
            emit(self.audit.as_ref(), failed("Login attempt - user not found")).await;
            return Err(CoreError::NotFound("User".to_string()));
        };

        if !spawn_verify(identity.password_hash.clone(), password.clone()).await {
            warn!("Incorrect password for {}", email);
            emit(self.audit.as_ref(), failed("Login attempt - incorrect password")).await;
            return Err(CoreError::Unauthenticated("Incorrect password".to_string()));
        }

        if !identity.is_active() {
            emit(self.audit.as_ref(), failed("Login attempt - account inactive")).await;
            return Err(CoreError::Forbidden("Account is inactive".to_string()));
        }

        if identity.role.is_staff() {
            if let Err(e) = self.identities.touch_last_login(email).await {
                warn!("Could not record last login for {}: {}", email, e);
            }
        }

        let event = AuditEvent::success(
            email,
            "LOGIN",
            format!("User logged in successfully - Role: {}", identity.role),
        )
        .resource("AUTH", email)
        .origin(origin);
        emit(self.audit.as_ref(), event).await;

        Ok(identity)
    }

    pub async fn profile(&self, email: &str) -> CoreResult<Identity> {
        self.identities
            .find_by_email(email)
            .await?
            .ok_or_else(|| CoreError::NotFound("User".to_string()))
    }

    pub async fn list_users(&self) -> CoreResult<Vec<Identity>> {
        self.identities.list(None).await
    }

    pub async fn list_admins(&self) -> CoreResult<Vec<Identity>> {
        self.identities.list(Some(Role::Admin)).await
    }

    pub async fn create_user(&self, actor: &Actor, req: NewAccount) -> CoreResult<Identity> {
        let result = self.insert_account(req.clone()).await;
        self.finish(actor, "CREATE_USER", &req.email, format!("Created {} account for {}", req.role, req.email), result)
            .await
    }

    pub async fn create_admin(&self, actor: &Actor, mut req: NewAccount) -> CoreResult<Identity> {
        req.role = Role::Admin;
        let result = self.insert_account(req.clone()).await;
        self.finish(actor, "CREATE_ADMIN", &req.email, format!("Created admin account for {}", req.email), result)
            .await
    }

    async fn insert_account(&self, req: NewAccount) -> CoreResult<Identity> {
        let email = req.email.trim().to_string();
        if req.name.trim().is_empty() || email.is_empty() || req.password.is_blank() {
            return Err(CoreError::validation("Name, email and password are required"));
        }
        let (first_name, last_name) = split_name(&req.name);

        self.identities
            .insert(NewIdentity {
                first_name,
                last_name,
                email,
                password_hash: spawn_hash(req.password.clone()).await?,
                role: req.role,
                status: IdentityStatus::Active,
                permissions: req.permissions,
            })
            .await
            .map_err(|e| match e {
                CoreError::Conflict(_) => CoreError::Conflict("Email already exists".to_string()),
                other => other,
            })
    }

    pub async fn update_user(&self, actor: &Actor, id: i64, update: AccountUpdate) -> CoreResult<Identity> {
        let result = self.apply_update(id, update).await;
        self.finish(actor, "UPDATE_USER", &id.to_string(), format!("Updated user {}", id), result)
            .await
    }

    async fn apply_update(&self, id: i64, update: AccountUpdate) -> CoreResult<Identity> {
        let mut patch = IdentityPatch::default();

        if let Some(name) = &update.name {
            if name.trim().is_empty() {
                return Err(CoreError::validation("Name must not be empty"));
            }
            let (first, last) = split_name(name);
            patch.first_name = Some(first);
            patch.last_name = Some(last);
        }
        if let Some(email) = &update.email {
            if email.trim().is_empty() {
                return Err(CoreError::validation("Email must not be empty"));
            }
            patch.email = Some(email.trim().to_string());
        }
        if let Some(password) = update.password.as_ref().filter(|p| !p.is_blank()) {
            patch.password_hash = Some(spawn_hash(password.clone()).await?);
        }
        patch.role = update.role;
        patch.status = update.status;
        patch.permissions = update.permissions;

        if patch.is_empty() {
            return Err(CoreError::validation("No fields to update"));
        }

        self.identities
            .update(id, &patch)
            .await
            .map_err(|e| match e {
                CoreError::Conflict(_) => CoreError::Conflict("Email already exists".to_string()),
                other => other,
            })?
            .ok_or_else(|| CoreError::NotFound("User".to_string()))
    }

    pub async fn set_role(&self, actor: &Actor, id: i64, role: Role) -> CoreResult<Identity> {
        let patch = IdentityPatch {
            role: Some(role),
            ..Default::default()
        };
        let result = self
            .identities
            .update(id, &patch)
            .await
            .and_then(|found| found.ok_or_else(|| CoreError::NotFound("User".to_string())));
        self.finish(actor, "UPDATE_USER_ROLE", &id.to_string(), format!("Changed role of user {} to {}", id, role), result)
            .await
    }

    pub async fn delete_user(&self, actor: &Actor, id: i64) -> CoreResult<()> {
        let result = match self.identities.delete(id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(CoreError::NotFound("User".to_string())),
            Err(e) => Err(e),
        };
        self.finish(actor, "DELETE_USER", &id.to_string(), format!("Deleted user {}", id), result)
            .await
    }

    pub async fn toggle_admin_status(&self, actor: &Actor, id: i64) -> CoreResult<Identity> {
        let result = async {
            let admin = self.find_admin(id).await?;
            let patch = IdentityPatch {
                status: Some(admin.status.toggled()),
                ..Default::default()
            };
            self.identities
                .update(id, &patch)
                .await?
                .ok_or_else(|| CoreError::NotFound("Admin".to_string()))
        }
        .await;
        self.finish(actor, "TOGGLE_ADMIN_STATUS", &id.to_string(), format!("Toggled status of admin {}", id), result)
            .await
    }

    pub async fn set_admin_permissions(&self, actor: &Actor, id: i64, permissions: BTreeSet<String>) -> CoreResult<Identity> {
        let result = async {
            self.find_admin(id).await?;
            let patch = IdentityPatch {
                permissions: Some(permissions),
                ..Default::default()
            };
            self.identities
                .update(id, &patch)
                .await?
                .ok_or_else(|| CoreError::NotFound("Admin".to_string()))
        }
        .await;
        self.finish(actor, "UPDATE_ADMIN_PERMISSIONS", &id.to_string(), format!("Updated permissions of admin {}", id), result)
            .await
    }

    /// Only identities whose role is exactly `admin` can be removed here.
    pub async fn delete_admin(&self, actor: &Actor, email: &str) -> CoreResult<()> {
        let email = email.trim();
        let result = async {
            if email.is_empty() {
                return Err(CoreError::validation("Email is required"));
            }
            let target = self
                .identities
                .find_by_email(email)
                .await?
                .ok_or_else(|| CoreError::NotFound("User".to_string()))?;
            if target.role != Role::Admin {
                return Err(CoreError::validation("Only admins can be deleted"));
            }
            if self.identities.delete(target.id).await? {
                Ok(())
            } else {
                Err(CoreError::NotFound("User".to_string()))
            }
        }
        .await;
        self.finish(actor, "DELETE_ADMIN", email, format!("Deleted admin account {}", email), result)
            .await
    }

    async fn find_admin(&self, id: i64) -> CoreResult<Identity> {
        self.identities
            .find_by_id(id)
            .await?
            .filter(|identity| identity.role == Role::Admin)
            .ok_or_else(|| CoreError::NotFound("Admin".to_string()))
    }

    async fn finish<T>(
        &self,
        actor: &Actor,
        action: &str,
        target: &str,
        detail: String,
        result: CoreResult<T>,
    ) -> CoreResult<T> {
        let event = match &result {
            Ok(_) => {
                info!("{} by {}: {}", action, actor.email, detail);
                AuditEvent::success(&actor.email, action, detail)
            }
            Err(e) => {
                warn!("{} by {} failed: {}", action, actor.email, e);
                AuditEvent::failed(&actor.email, action, format!("{} failed: {}", detail, e))
            }
        };
        emit(
            self.audit.as_ref(),
            event.resource("USER", target).origin(actor.origin.clone()),
        )
        .await;
        result
    }
}
