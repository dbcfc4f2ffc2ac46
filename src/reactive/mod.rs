//! Reactive value graph - cells, derived values, merge.
//!
//! - [`cell`] - [`Readable`]/[`Writable`] cells and [`StopHandle`]
//! - [`merge`](crate::reactive::merge::merge) - combine N cells into one
//! - [`batch`] - group writes into one propagation turn

pub mod cell;
pub mod merge;
pub(crate) mod scheduler;

pub use cell::{Readable, StopHandle, Writable};
pub use merge::{merge, MergeSources};
pub use scheduler::batch;
