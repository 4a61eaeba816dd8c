pub mod endpoints;
pub mod errors;
pub mod types;

pub use errors::ApiError;
