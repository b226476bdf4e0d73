//! # Expression layer
//!
//! The front end the backend compiles from: the [`expr::Expr`] contract,
//! a small catalog of nodes and the per-compilation [`program::Program`]
//! registry of scratch variables and subroutines.
//!
//! ## Conventions
//!
//! - Every node lowers to a connected (entry, exit) pair of blocks.
//! - Stack effects are written as `( before -- after )`.

pub mod expr;
pub mod node;
pub mod program;
