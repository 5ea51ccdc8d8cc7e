pub mod config;
pub mod error;
pub mod types;

pub use config::{CryptoConfig, VeilConfig};
pub use error::{VeilError, VeilResult};
pub use types::AccessList;
