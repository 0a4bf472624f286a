//! Command-line interface of the replay binary

mod args;

pub use args::Args;
