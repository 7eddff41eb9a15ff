#![warn(missing_docs)]

//! A role and ability based authorization engine.
//!
//! Every check compiles the requested ability and target into the canonical
//! identifiers a matching grant could have been stored under (see
//! [`warden_model::compile`]) and resolves them against the authority's
//! [`PermissionMap`]: a forbidding grant wins over any number of allowing
//! ones, whatever their specificity.
//!
//! Permission maps are computed once per authority by a [`StoreMapSource`]
//! and, when caching is enabled, kept by a [`CachedMapSource`] until a
//! mutation command invalidates them. Commands ([`AssignRoles`],
//! [`GiveAbility`] and friends) are idempotent and run through the [`Warden`]
//! facade, which drops stale maps before returning. A [`Gate`] adapts the
//! engine to a host application's own authorization dispatch.

mod error;
pub use error::*;

mod settings;
pub use settings::*;

mod map;
pub use map::*;

mod source;
pub use source::*;

mod command;
pub use command::*;

mod gate;
pub use gate::*;

mod warden;
pub use warden::*;
