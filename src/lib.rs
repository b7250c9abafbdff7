pub mod config;
pub mod discovery;
pub mod error;
pub mod maven;
pub mod output;
pub mod report;
pub mod run;
pub mod tree;

pub use error::{Error, Result};
