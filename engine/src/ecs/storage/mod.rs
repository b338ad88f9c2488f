//! Columnar storage for the ECS.
//!
//! Storage is layered: [`Column`] is the raw type-erased buffer with per-row
//! construction tracking, [`Archetype`] groups parallel columns under one
//! entity list, and [`Archetypes`] owns every archetype together with the
//! lazily built add/remove transition graph. [`Location`] records where an
//! entity's row lives; [`DirtyFlags`] carry pending changes to the query
//! cache.

pub mod archetype;
pub mod change;
pub mod column;
pub mod location;

pub use archetype::{Archetype, Archetypes};
pub use change::DirtyFlags;
pub use column::Column;
pub use location::Location;
