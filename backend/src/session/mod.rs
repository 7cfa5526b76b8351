pub mod extractor;
pub mod models;
pub mod service;

pub use extractor::Session;
pub use models::{AnnotationError, DoctorAnnotation, SessionState};
pub use service::{SESSION_COOKIE, SessionError, SessionService};
