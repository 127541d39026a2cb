pub mod error;
pub mod image;
pub mod info;
pub mod options;
pub(crate) mod traits;
