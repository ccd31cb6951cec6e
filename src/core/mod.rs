pub mod keys;
pub mod model;
pub mod set;

pub use model::*;
pub use set::*;
