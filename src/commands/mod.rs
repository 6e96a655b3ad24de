pub mod grammar;
pub mod types;

pub use grammar::{Classification, ResponseGrammar};
pub use types::{Command, Failure};
