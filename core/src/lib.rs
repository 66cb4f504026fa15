pub mod assist;
pub mod error;
pub mod models;
