pub mod dependencies;
pub mod error;
pub mod keys;

pub use dependencies::{Dependencies, DependencyStore, KeyItem, SubPair, ValueItem};
pub use error::StoreError;
pub use keys::{sanitize_key, KeyStore};
