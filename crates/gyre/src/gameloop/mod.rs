//! Thread-affine executors and their pool
//!
//! - [`GameLoop`]: one dedicated worker thread running FIFO submissions
//!   and a periodic tick over the entities it owns
//! - [`GameLoopGroup`]: a fixed pool of loops with round-robin dispatch
//!   and fault-tolerant scatter-gather selection
//!
//! Thread confinement is the central discipline: all mutation of a loop's
//! entities happens on that loop's worker thread, and `submit` is the only
//! sanctioned way to cross into it from outside.

mod context;
mod game_loop;
mod group;
mod task;
mod worker;

pub use context::LoopContext;
pub use game_loop::GameLoop;
pub use group::GameLoopGroup;
pub use task::{PendingTask, TaskHandle};
