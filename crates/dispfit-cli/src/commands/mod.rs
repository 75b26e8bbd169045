pub mod fit;
pub mod models;
