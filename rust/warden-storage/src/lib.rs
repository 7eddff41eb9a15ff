#![warn(missing_docs)]

//! The storage boundary of the warden authorization engine.
//!
//! The engine only ever issues simple predicate reads, inserts and deletes
//! against four relations (roles, abilities, role assignments and grants).
//! That surface is captured by the [GrantStore] trait, so any relational or
//! document store can back the engine. Computed permission maps are kept in a
//! [CacheBackend], which may optionally support tags ([TaggedCacheBackend]) so
//! that flushing can be confined to a [Partition].
//!
//! ```rust
//! # async fn example() -> Result<(), warden_storage::WardenStorageError> {
//! use warden_model::{EntityRef, RoleId};
//! use warden_storage::{GrantStore, MeasuredGrantStore, MemoryGrantStore};
//!
//! let store = MeasuredGrantStore::new(MemoryGrantStore::default());
//! let user = EntityRef::new("user", 1u64);
//!
//! assert!(store.assignments_for(&user).await?.is_empty());
//! assert_eq!(store.reads(), 1);
//! # Ok(())
//! # }
//! ```

mod sync;
pub use sync::*;

mod error;
pub use error::*;

mod store;
pub use store::*;

mod cache;
pub use cache::*;
