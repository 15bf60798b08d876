//! Singleton site settings: which storage folders uploads go to

use mediadesk_storage::extract_folder_id;
use sqlx::PgPool;

use crate::error::CoreError;
use crate::models::{SiteSettings, UpdateSiteSettingsInput};
use crate::validation::validate_folder_setting;

/// Folder ids configured through the environment, used when a setting is empty
#[derive(Debug, Clone, Default)]
pub struct FolderDefaults {
    pub profile: Option<String>,
    pub reference: Option<String>,
    pub data: Option<String>,
}

/// Effective folder ids after applying settings over the defaults
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedFolders {
    pub profile: Option<String>,
    pub reference: Option<String>,
    pub data: Option<String>,
}

/// A non-empty setting wins over the environment default; both may be a
/// folder link or a bare id. `None` means uploads to that folder are skipped.
pub fn resolve_folder(setting: &str, env_default: Option<&str>) -> Option<String> {
    extract_folder_id(setting).or_else(|| env_default.and_then(extract_folder_id))
}

impl SiteSettings {
    pub fn resolve(&self, defaults: &FolderDefaults) -> ResolvedFolders {
        ResolvedFolders {
            profile: resolve_folder(&self.drive_profile_folder, defaults.profile.as_deref()),
            reference: resolve_folder(&self.drive_reference_folder, defaults.reference.as_deref()),
            data: resolve_folder(&self.drive_data_folder, defaults.data.as_deref()),
        }
    }
}

#[derive(Clone)]
pub struct SiteSettingsService {
    pool: PgPool,
    defaults: FolderDefaults,
}

impl SiteSettingsService {
    pub fn new(pool: PgPool, defaults: FolderDefaults) -> Self {
        Self { pool, defaults }
    }

    pub fn defaults(&self) -> &FolderDefaults {
        &self.defaults
    }

    pub async fn get(&self) -> Result<SiteSettings, CoreError> {
        sqlx::query("INSERT INTO site_settings (id) VALUES (1) ON CONFLICT (id) DO NOTHING")
            .execute(&self.pool)
            .await?;

        let settings = sqlx::query_as::<_, SiteSettings>(
            "SELECT drive_profile_folder, drive_reference_folder, drive_data_folder, updated_at
             FROM site_settings WHERE id = 1"
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(settings)
    }

    pub async fn folders(&self) -> Result<ResolvedFolders, CoreError> {
        Ok(self.get().await?.resolve(&self.defaults))
    }

    pub async fn update(&self, input: UpdateSiteSettingsInput) -> Result<SiteSettings, CoreError> {
        let profile = input
            .drive_profile_folder
            .map(|v| validate_folder_setting("drive_profile_folder", &v))
            .transpose()?;
        let reference = input
            .drive_reference_folder
            .map(|v| validate_folder_setting("drive_reference_folder", &v))
            .transpose()?;
        let data = input
            .drive_data_folder
            .map(|v| validate_folder_setting("drive_data_folder", &v))
            .transpose()?;

        let settings = sqlx::query_as::<_, SiteSettings>(
            r#"
            INSERT INTO site_settings (id, drive_profile_folder, drive_reference_folder, drive_data_folder)
            VALUES (1, COALESCE($1, ''), COALESCE($2, ''), COALESCE($3, ''))
            ON CONFLICT (id) DO UPDATE SET
                drive_profile_folder = COALESCE($1, site_settings.drive_profile_folder),
                drive_reference_folder = COALESCE($2, site_settings.drive_reference_folder),
                drive_data_folder = COALESCE($3, site_settings.drive_data_folder),
                updated_at = NOW()
            RETURNING drive_profile_folder, drive_reference_folder, drive_data_folder, updated_at
            "#
        )
        .bind(profile)
        .bind(reference)
        .bind(data)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!("Site settings updated");
        Ok(settings)
    }
}
