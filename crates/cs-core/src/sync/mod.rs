//! Error taxonomy of the upload path.

mod error;

pub use error::{RemoteError, UploadError};
