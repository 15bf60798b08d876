//! Domain layer: models, request number allocation and the services the HTTP
//! layer calls into.

pub mod error;
pub mod media_requests;
pub mod models;
pub mod request_number;
pub mod site_settings;
pub mod users;
pub mod validation;

pub use error::CoreError;
pub use media_requests::{MediaRequestOptions, MediaRequestService, UploadPolicy};
pub use request_number::{
    AllocationError, AllocatorConfig, Claim, MemoryRequestStore, PgRequestStore, RequestNumber,
    RequestNumberAllocator, RequestNumberStore, StoreError,
};
pub use site_settings::{FolderDefaults, SiteSettingsService};
pub use users::{Registration, UserService};
