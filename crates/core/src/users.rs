//! Accounts: registration, login and staff-managed fields

use mediadesk_auth::password::{hash_password, verify_password};
use mediadesk_storage::Storage;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{AdminUserUpdate, ContactType, RegisterInput, UploadedFile, User};
use crate::site_settings::SiteSettingsService;
use crate::validation::{parse_contact_type, validate_password, validate_phone, validate_username};

const USERNAME_CONSTRAINT: &str = "users_username_key";
const SEARCH_LIMIT: i64 = 200;

#[derive(Debug)]
pub struct Registration {
    pub user: User,
    pub warnings: Vec<String>,
}

/// Validated registration fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CleanRegistration {
    pub username: String,
    pub email: String,
    pub primary_phone: String,
    pub primary_type: ContactType,
    pub secondary_phone: Option<String>,
    pub secondary_type: Option<ContactType>,
}

pub(crate) fn clean_registration(input: &RegisterInput) -> Result<CleanRegistration, CoreError> {
    let username = validate_username(&input.username)?;
    validate_password(&input.password)?;
    let primary_phone = validate_phone("primary_phone", &input.primary_phone)?;
    let primary_type = parse_contact_type("primary_type", input.primary_type.as_deref())?.unwrap_or_default();
    let secondary_phone = input
        .secondary_phone
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| validate_phone("secondary_phone", p))
        .transpose()?;
    let secondary_type = parse_contact_type("secondary_type", input.secondary_type.as_deref())?;

    Ok(CleanRegistration {
        username,
        email: input.email.trim().to_string(),
        primary_phone,
        primary_type,
        secondary_phone,
        secondary_type,
    })
}

/// `ILIKE` pattern matching `q` anywhere, with wildcards in `q` taken
/// literally. `None` for a blank query.
pub(crate) fn contains_pattern(q: &str) -> Option<String> {
    let q = q.trim();
    if q.is_empty() {
        return None;
    }
    let mut pattern = String::with_capacity(q.len() + 2);
    pattern.push('%');
    for c in q.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    Some(pattern)
}

async fn hash_off_thread(password: String) -> Result<String, CoreError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| CoreError::Password(e.to_string()))?
        .map_err(CoreError::from)
}

#[derive(Clone)]
pub struct UserService {
    pool: PgPool,
    storage: Arc<dyn Storage>,
    settings: SiteSettingsService,
}

impl UserService {
    pub fn new(pool: PgPool, storage: Arc<dyn Storage>, settings: SiteSettingsService) -> Self {
        Self { pool, storage, settings }
    }

    pub async fn register(
        &self,
        input: RegisterInput,
        profile_picture: Option<UploadedFile>,
    ) -> Result<Registration, CoreError> {
        let clean = clean_registration(&input)?;

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
            .bind(&clean.username)
            .fetch_one(&self.pool)
            .await?;
        if exists {
            return Err(CoreError::UsernameTaken);
        }

        let password_hash = hash_off_thread(input.password).await?;

        let mut user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash, primary_phone, primary_type, secondary_phone, secondary_type)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#
        )
        .bind(&clean.username)
        .bind(&clean.email)
        .bind(&password_hash)
        .bind(&clean.primary_phone)
        .bind(clean.primary_type.as_str())
        .bind(&clean.secondary_phone)
        .bind(clean.secondary_type.map(|t| t.as_str()))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            // Lost a race with a concurrent registration of the same name
            sqlx::Error::Database(db) if db.constraint() == Some(USERNAME_CONSTRAINT) => CoreError::UsernameTaken,
            _ => CoreError::Database(e),
        })?;

        tracing::info!("Registered user {} ({})", user.username, user.id);

        let mut warnings = Vec::new();
        if let Some(file) = profile_picture {
            match self.upload_profile_picture(&user, file).await {
                Ok(Some(file_id)) => {
                    sqlx::query("UPDATE users SET profile_picture = $1 WHERE id = $2")
                        .bind(&file_id)
                        .bind(user.id)
                        .execute(&self.pool)
                        .await?;
                    user.profile_picture = Some(file_id);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Profile picture upload failed for {}: {}", user.username, e);
                    warnings.push(format!("Profile saved but upload failed: {}", e));
                }
            }
        }

        Ok(Registration { user, warnings })
    }

    /// Returns the stored file id, or `None` when no profile folder is configured
    async fn upload_profile_picture(&self, user: &User, file: UploadedFile) -> Result<Option<String>, String> {
        let folders = self.settings.folders().await.map_err(|e| e.to_string())?;
        let Some(folder_id) = folders.profile else {
            tracing::debug!("No profile folder configured, skipping upload");
            return Ok(None);
        };
        let filename = format!("{}_{}", user.username, file.filename);
        self.storage
            .upload(file.data, &filename, file.content_type.as_deref(), &folder_id)
            .await
            .map(Some)
            .map_err(|e| e.to_string())
    }

    /// Log in with either the username or the primary phone number
    pub async fn authenticate(&self, login: &str, password: &str) -> Result<User, CoreError> {
        let login = login.trim();
        if login.is_empty() || password.is_empty() {
            return Err(CoreError::InvalidCredentials);
        }

        // An exact username match takes precedence over a phone match
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE username = $1 OR primary_phone = $1
             ORDER BY (username = $1) DESC, date_joined ASC LIMIT 1"
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(CoreError::InvalidCredentials)?;

        let password = password.to_string();
        let hash = user.password_hash.clone();
        let valid = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| CoreError::Password(e.to_string()))?;

        if !valid {
            tracing::warn!("Failed login for {}", user.username);
            return Err(CoreError::InvalidCredentials);
        }
        if !user.is_active {
            tracing::warn!("Inactive user {} attempted to log in", user.username);
            return Err(CoreError::InvalidCredentials);
        }

        Ok(user)
    }

    pub async fn get(&self, id: Uuid) -> Result<User, CoreError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(CoreError::NotFound)
    }

    /// Users whose username, email or primary phone contains `q`, newest
    /// first. A blank query lists everyone.
    pub async fn search(&self, q: &str) -> Result<Vec<User>, CoreError> {
        let users = sqlx::query_as::<_, User>(
            "SELECT * FROM users
             WHERE $1::text IS NULL OR username ILIKE $1 OR email ILIKE $1 OR primary_phone ILIKE $1
             ORDER BY date_joined DESC
             LIMIT $2"
        )
        .bind(contains_pattern(q))
        .bind(SEARCH_LIMIT)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    pub async fn update_admin_fields(&self, id: Uuid, update: AdminUserUpdate) -> Result<User, CoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                is_satsangi = COALESCE($2, is_satsangi),
                is_ambrish = COALESCE($3, is_ambrish),
                department_notes = COALESCE($4, department_notes),
                is_active = COALESCE($5, is_active),
                is_staff = COALESCE($6, is_staff)
            WHERE id = $1
            RETURNING *
            "#
        )
        .bind(id)
        .bind(update.is_satsangi)
        .bind(update.is_ambrish)
        .bind(update.department_notes.as_deref().map(str::trim))
        .bind(update.is_active)
        .bind(update.is_staff)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(CoreError::NotFound)?;

        tracing::info!("Admin fields updated for user {}", user.id);
        Ok(user)
    }

    /// Create a staff account if no user with this name exists.
    /// Returns true when an account was created.
    pub async fn ensure_superuser(&self, username: &str, password: &str) -> Result<bool, CoreError> {
        let username = validate_username(username)?;
        validate_password(password)?;

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
            .bind(&username)
            .fetch_one(&self.pool)
            .await?;
        if exists {
            return Ok(false);
        }

        let password_hash = hash_off_thread(password.to_string()).await?;
        let result = sqlx::query(
            r#"
            INSERT INTO users (username, password_hash, primary_phone, is_staff)
            VALUES ($1, $2, '', TRUE)
            ON CONFLICT (username) DO NOTHING
            "#
        )
        .bind(&username)
        .bind(&password_hash)
        .execute(&self.pool)
        .await?;

        let created = result.rows_affected() > 0;
        if created {
            tracing::info!("Created staff account {}", username);
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> RegisterInput {
        RegisterInput {
            username: " asha ".into(),
            email: " asha@example.org ".into(),
            password: "correct horse".into(),
            primary_phone: "+919876543210".into(),
            primary_type: None,
            secondary_phone: Some("".into()),
            secondary_type: None,
        }
    }

    #[test]
    fn test_contains_pattern() {
        assert_eq!(contains_pattern(" asha ").as_deref(), Some("%asha%"));
        assert_eq!(contains_pattern("+91").as_deref(), Some("%+91%"));
        assert_eq!(contains_pattern("a_b%c").as_deref(), Some("%a\\_b\\%c%"));
        assert_eq!(contains_pattern("   "), None);
    }

    #[test]
    fn test_clean_registration_defaults() {
        let clean = clean_registration(&input()).unwrap();
        assert_eq!(clean.username, "asha");
        assert_eq!(clean.email, "asha@example.org");
        assert_eq!(clean.primary_type, ContactType::Whatsapp);
        assert_eq!(clean.secondary_phone, None);
    }

    #[test]
    fn test_clean_registration_rejects_bad_secondary_phone() {
        let mut bad = input();
        bad.secondary_phone = Some("0123".into());
        assert!(matches!(clean_registration(&bad), Err(CoreError::Validation(_))));
    }

    #[test]
    fn test_clean_registration_rejects_numeric_password() {
        let mut bad = input();
        bad.password = "1234567890".into();
        assert!(matches!(clean_registration(&bad), Err(CoreError::Validation(_))));
    }

    #[test]
    fn test_clean_registration_parses_contact_types() {
        let mut both = input();
        both.primary_type = Some("both".into());
        both.secondary_phone = Some("+14155550123".into());
        both.secondary_type = Some("telegram".into());
        let clean = clean_registration(&both).unwrap();
        assert_eq!(clean.primary_type, ContactType::Both);
        assert_eq!(clean.secondary_phone.as_deref(), Some("+14155550123"));
        assert_eq!(clean.secondary_type, Some(ContactType::Telegram));
    }
}
