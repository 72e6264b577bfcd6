pub mod action;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod history;
pub mod ids;
pub mod incident;
pub mod io;
pub mod paths;
pub mod processors;
pub mod store;
pub mod template;

pub use error::{CrisisError, Result};
