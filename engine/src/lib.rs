//! An archetype-based entity-component store for data-oriented simulation.
//!
//! Entities are opaque generational handles; components are arbitrary
//! `Clone + 'static` value types attached to them. The [`World`] keeps every
//! entity with the same exact component set contiguous in column-major
//! storage, so iterating any component subset touches only matching
//! archetypes.
//!
//! ```rust
//! use archon_engine::World;
//!
//! #[derive(Clone, Copy, Debug, PartialEq)]
//! struct Position { x: f32, y: f32 }
//!
//! #[derive(Clone, Copy, Debug, PartialEq)]
//! struct Velocity { dx: f32, dy: f32 }
//!
//! let mut world = World::new();
//!
//! let e = world.entity();
//! world
//!     .set(e, Position { x: 0.0, y: 0.0 })
//!     .set(e, Velocity { dx: 1.0, dy: 0.5 });
//!
//! let step: Vec<_> = world
//!     .query::<(Position, Velocity)>()
//!     .into_iter()
//!     .map(|(entity, position, velocity)| {
//!         (entity, Position { x: position.x + velocity.dx, y: position.y + velocity.dy })
//!     })
//!     .collect();
//! for (entity, next) in step {
//!     world.set(entity, next);
//! }
//!
//! assert_eq!(world.get::<Position>(e), Some(&Position { x: 1.0, y: 0.5 }));
//! ```
//!
//! The engine is single-threaded and in-memory: no scheduler, no
//! serialization, no intra-world locking. Logging goes through the `log`
//! facade; bring your own logger implementation.

pub mod ecs;

pub use ecs::{Component, Data, Entity, World};
