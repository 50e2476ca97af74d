//! API handlers module

pub mod advanced;
pub mod articles;
pub mod doi;
pub mod health;
pub mod summaries;
