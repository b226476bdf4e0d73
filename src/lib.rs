//! Backend for a stack-machine smart-contract language: lowers expression
//! trees to per-routine control-flow graphs, orders and flattens them,
//! assigns scratch cells, protects locals across recursive calls and links
//! the result into assembly text.

pub mod compiler;
pub mod ir;
pub mod lang;
pub mod vm;

#[cfg(test)]
mod tests;
