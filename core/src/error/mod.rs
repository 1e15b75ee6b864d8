mod error;

pub use error::{CliError, VerifyError};
