#![warn(missing_docs)]

//! The data model shared by every part of the warden authorization engine.
//!
//! An authorization decision is made for an **authority** (any host entity,
//! referenced through an [`EntityRef`]) asking to perform an **ability** on an
//! optional [`Target`]. Abilities are granted, or explicitly forbidden, to
//! authorities either directly or through [`Role`]s. Each stored grant points
//! at an [`Ability`] record, and every ability derives a canonical identifier
//! string:
//!
//! ```rust
//! use warden_model::{AbilityKey, Target};
//!
//! let key = AbilityKey::new("Edit", Some(&Target::instance("document", 42)));
//! assert_eq!(key.identifier(), "edit-document-42");
//! ```
//!
//! At check time the [`compile`] function enumerates every identifier a
//! matching ability could have been stored under:
//!
//! ```rust
//! use warden_model::{compile, Target};
//!
//! assert_eq!(
//!     compile("edit", Some(&Target::of_type("document"))),
//!     vec!["edit-document", "edit-*", "*-document", "*-*"]
//! );
//! ```

mod entity;
pub use entity::*;

mod target;
pub use target::*;

mod role;
pub use role::*;

mod ability;
pub use ability::*;

mod grant;
pub use grant::*;

mod identifier;
pub use identifier::*;
