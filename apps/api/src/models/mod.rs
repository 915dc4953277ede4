pub mod cache;
pub mod family;
