pub mod cli;
pub mod crawl;
pub mod diagnostics;
pub mod error;
pub mod models;
pub mod portal;
pub mod session;
pub mod signals;
pub mod util;

pub use error::{Error, Result};
