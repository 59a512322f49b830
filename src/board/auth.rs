//! Registration, login, bearer-token sessions and admin user management.
//!
//! Nothing here knows about HTTP: handlers resolve the `Authorization`
//! header into a [`Caller`] with [`resolve_session`] and pass it explicitly
//! into every board operation.

use argon2::Argon2;
use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Serialize;

use super::db::BoardDb;
use super::models::{Project, Role, User};
use crate::errors::BoardError;

pub const MIN_PASSWORD_LEN: usize = 8;

/// The authenticated user an operation runs on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: i64,
    pub role: Role,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn can_access(&self, project: &Project) -> bool {
        self.is_admin() || project.owner_id == self.user_id
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
}

/// Trimmed, lower-cased email with a minimal shape check.
pub fn normalize_email(raw: &str) -> Result<String, BoardError> {
    let email = raw.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ if email.is_empty() => Err(BoardError::invalid("email is required")),
        _ => Err(BoardError::invalid(format!("'{}' is not a valid email", email))),
    }
}

/// Argon2id hash in PHC string form (`$argon2id$v=19$...`), salted per call.
pub fn hash_password(password: &str) -> Result<String, BoardError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e).into())
}

/// False for a wrong password and for a stored value that is not a PHC hash.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

pub fn register(db: &BoardDb, email: &str, password: &str) -> Result<User, BoardError> {
    let email = normalize_email(email)?;
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(BoardError::invalid(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    if db.find_credentials(&email)?.is_some() {
        return Err(BoardError::EmailTaken { email });
    }
    let user = db.create_user(&email, &hash_password(password)?, Role::User)?;
    tracing::info!(user_id = user.id, "user registered");
    Ok(user)
}

/// Verify credentials and open a session lasting `ttl`.
///
/// Unknown email and wrong password produce the same error.
pub fn login(
    db: &BoardDb,
    email: &str,
    password: &str,
    ttl: Duration,
) -> Result<Session, BoardError> {
    let email = normalize_email(email)?;
    if password.is_empty() {
        return Err(BoardError::invalid("password is required"));
    }
    let user = match db.find_credentials(&email)? {
        Some((user, hash)) if verify_password(password, &hash) => user,
        _ => {
            tracing::info!("login rejected");
            return Err(BoardError::unauthorized("invalid credentials"));
        }
    };

    let now = Utc::now();
    let expires_at = now.checked_add_signed(ttl).ok_or_else(|| {
        anyhow::anyhow!("Session lifetime of {} hours is out of range", ttl.num_hours())
    })?;
    db.delete_expired_sessions(now.timestamp())?;
    let token = uuid::Uuid::new_v4().to_string();
    db.create_session(&token, user.id, expires_at.timestamp())?;
    tracing::info!(user_id = user.id, "session opened");
    Ok(Session {
        token,
        user_id: user.id,
        expires_at,
    })
}

pub fn logout(db: &BoardDb, token: &str) -> Result<bool, BoardError> {
    Ok(db.delete_session(token)?)
}

/// Resolve a bearer token to its caller. Missing, unknown and expired tokens
/// are all `Unauthorized`; an expired session is removed on the way out.
pub fn resolve_session(db: &BoardDb, token: &str) -> Result<Caller, BoardError> {
    let (user_id, expires_at) = db
        .find_session(token)?
        .ok_or_else(|| BoardError::unauthorized("invalid or expired session"))?;

    let expired = match Utc.timestamp_opt(expires_at, 0).single() {
        Some(at) => at <= Utc::now(),
        None => true,
    };
    if expired {
        db.delete_session(token)?;
        return Err(BoardError::unauthorized("invalid or expired session"));
    }

    let user = db
        .get_user(user_id)?
        .ok_or_else(|| BoardError::unauthorized("invalid or expired session"))?;
    Ok(Caller {
        user_id: user.id,
        role: user.role,
    })
}

pub fn current_user(db: &BoardDb, caller: &Caller) -> Result<User, BoardError> {
    db.get_user(caller.user_id)?
        .ok_or_else(|| BoardError::NotFound(format!("User {} not found", caller.user_id)))
}

/// Grant the admin role to an existing user.
pub fn promote_to_admin(db: &BoardDb, email: &str) -> Result<User, BoardError> {
    let email = normalize_email(email)?;
    let (user, _) = db
        .find_credentials(&email)?
        .ok_or_else(|| BoardError::NotFound(format!("User {} not found", email)))?;
    Ok(db.set_user_role(user.id, Role::Admin)?)
}

// ── User administration (admin only) ──────────────────────────────────

fn require_admin(caller: &Caller) -> Result<(), BoardError> {
    if caller.is_admin() {
        return Ok(());
    }
    tracing::warn!(user_id = caller.user_id, "user administration denied");
    Err(BoardError::AdminRequired)
}

fn existing_user(db: &BoardDb, id: i64) -> Result<User, BoardError> {
    db.get_user(id)?
        .ok_or_else(|| BoardError::NotFound(format!("User {} not found", id)))
}

pub fn list_users(db: &BoardDb, caller: &Caller) -> Result<Vec<User>, BoardError> {
    require_admin(caller)?;
    Ok(db.list_users()?)
}

pub fn get_user(db: &BoardDb, caller: &Caller, id: i64) -> Result<User, BoardError> {
    require_admin(caller)?;
    existing_user(db, id)
}

/// Change a user's email and/or role. An admin cannot demote themselves.
pub fn update_user(
    db: &BoardDb,
    caller: &Caller,
    id: i64,
    email: Option<&str>,
    role: Option<Role>,
) -> Result<User, BoardError> {
    require_admin(caller)?;
    let user = existing_user(db, id)?;
    if id == caller.user_id && role == Some(Role::User) {
        return Err(BoardError::invalid("admins cannot remove their own admin role"));
    }
    let email = email.map(normalize_email).transpose()?;
    if let Some(new_email) = &email
        && *new_email != user.email
        && db.find_credentials(new_email)?.is_some()
    {
        return Err(BoardError::EmailTaken {
            email: new_email.clone(),
        });
    }
    let updated = db.update_user(id, email.as_deref(), role)?;
    tracing::info!(user_id = id, role = updated.role.as_str(), "user updated");
    Ok(updated)
}

/// Delete a user together with their sessions, projects and tasks. Returns
/// the removed user and the ids of the projects that went with them.
pub fn delete_user(
    db: &BoardDb,
    caller: &Caller,
    id: i64,
) -> Result<(User, Vec<i64>), BoardError> {
    require_admin(caller)?;
    if id == caller.user_id {
        return Err(BoardError::invalid("admins cannot delete their own account"));
    }
    let user = existing_user(db, id)?;
    let project_ids = db
        .list_projects(Some(id))?
        .into_iter()
        .map(|p| p.id)
        .collect();
    db.delete_user(id)?;
    tracing::info!(user_id = id, "user deleted");
    Ok((user, project_ids))
}
