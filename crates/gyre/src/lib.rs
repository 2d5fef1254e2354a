//! gyre - a thread-affine game-loop runtime
//!
//! The concurrency core of an entity-component server: a pool of
//! single-threaded executors ("game loops"), each owning a disjoint
//! partition of entities it ticks periodically, plus cross-loop
//! primitives for load distribution, querying, and event delivery.
//!
//! - [`GameLoop`] / [`GameLoopGroup`]: thread-confined execution,
//!   round-robin dispatch, scatter-gather selection
//! - [`Entity`] / [`Component`] / [`EntityRegistry`]: capability-typed
//!   state owned by exactly one loop at a time
//! - [`EventBus`]: per-entity, override-aware synchronous event dispatch

pub mod config;
pub mod ecs;
pub mod eventbus;
pub mod gameloop;
mod types;

pub use config::{ConfigError, GroupConfig, TickConfig};
pub use ecs::{Component, Entity, EntityRegistry};
pub use eventbus::{Event, EventBus, Handler, Subscriber};
pub use gameloop::{GameLoop, GameLoopGroup, LoopContext, PendingTask, TaskHandle};
pub use types::{Error, LoopId, LoopState, Result};
