//! Collection rendering - keyed repeat.

pub mod repeat;

pub use repeat::Repeat;
