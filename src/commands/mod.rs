//! Command handlers.
//!
//! Commands are organized by functionality:
//! - `review`: user-driven transitions of a single code review
//! - `settings`: remote user and mention trigger settings

pub mod review;
pub mod settings;
