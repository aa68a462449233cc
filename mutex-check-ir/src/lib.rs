#![forbid(unsafe_code)]

//! Program model consumed by the lock checker: declarations, per-function
//! instruction streams and the whole-program call graph, all addressed by
//! integer ids into flat tables.

pub mod ir;

pub mod builder;
pub mod comments;
pub mod error;
pub mod load;
pub mod model;

pub use builder::*;
pub use comments::*;
pub use error::*;
pub use ir::*;
pub use load::*;
pub use model::*;
