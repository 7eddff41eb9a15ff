use thiserror::Error;
use warden_model::EntityRef;
use warden_storage::WardenStorageError;

/// The common error type used by this crate
#[derive(Error, Debug)]
pub enum WardenError {
    /// A permission map was requested for an authority that has not been
    /// persisted
    #[error("Authority not found: {0} has no stable identity")]
    AuthorityNotFound(EntityRef),

    /// A command referenced an authority that has not been persisted
    #[error("Invalid authority: {0}")]
    InvalidAuthority(String),

    /// A command referenced an ability that cannot be resolved or created
    #[error("Invalid permission: {0}")]
    InvalidPermission(String),

    /// A command referenced a role id that does not exist
    #[error("Role not found: {0}")]
    RoleNotFound(String),

    /// A command attempted to delete a system role
    #[error("Role '{0}' is a system role and cannot be deleted")]
    ProtectedRole(String),

    /// The grant store failed
    #[error(transparent)]
    Storage(#[from] WardenStorageError),

    /// Cached permission maps could not be invalidated
    #[error("Cache invalidation failed: {0}")]
    Cache(String),

    /// Settings could not be parsed
    #[error("Invalid settings: {0}")]
    Settings(String),
}
