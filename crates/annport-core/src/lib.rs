pub mod artifact;
pub mod backend;
pub mod binding;
pub mod error;
pub mod options;
pub mod tensor;

pub use artifact::*;
pub use backend::*;
pub use binding::*;
pub use error::{AnnError, ErrorKind, Result};
pub use options::*;
pub use tensor::*;
