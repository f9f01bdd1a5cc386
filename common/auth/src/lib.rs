pub mod config;
pub mod error;
pub mod extractors;
pub mod identity;
pub mod user;

pub use config::{IdentityConfig, IdentityEnvironment};
pub use error::{AuthError, AuthResult};
pub use extractors::AuthContext;
pub use identity::{IdentityClient, RegistrationRequest, TokenValidator};
pub use user::AuthenticatedUser;
