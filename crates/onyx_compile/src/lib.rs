//! The semantic pipeline of fnxc: Onyx AST construction over parsed CSTs,
//! the per-program C prototype index, and MLIR specialization.

pub mod ast;
pub mod cast;
pub mod mlir;
pub mod program;

pub use ast::Ast;
pub use cast::CAst;
pub use program::Program;
