pub mod assertion;
pub mod credentials;
pub mod models;

pub use credentials::{AuthError, CredentialProvider};
