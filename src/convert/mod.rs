pub mod converter;
pub mod error;
