pub mod authentication;
pub mod authorization;

pub use authentication::{Viewer, auth_middleware, identify_viewer};
pub use authorization::require_moderator;
