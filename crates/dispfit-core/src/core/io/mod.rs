//! Dataset I/O: loading the measurement table into a
//! [`crate::core::models::dataset::Dataset`] and saving fitted parameters.

pub mod results;
pub mod table;

pub use results::save_parameters;
pub use table::{DatasetError, load_dataset};
