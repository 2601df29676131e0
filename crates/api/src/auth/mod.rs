//! Authentication: JWT issuance/verification and persisted revocation

pub mod jwt;
pub mod middleware;
pub mod revocation;

pub use jwt::{Claims, JwtManager};
pub use middleware::{require_auth, AuthState, AuthUser};
