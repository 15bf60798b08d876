//! Identity primitives: password hashing, session tokens and the axum
//! middleware that turns a bearer token into an [`AuthUser`].

pub mod error;
pub mod jwt;
pub mod middleware;
pub mod password;

pub use error::AuthError;
pub use jwt::{Claims, JwtKeys};
pub use middleware::{AuthState, AuthUser};
