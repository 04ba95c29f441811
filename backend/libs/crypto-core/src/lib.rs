//! Credential primitives shared by Flatmate services.
//!
//! Currently this is the HS256 bearer token format issued by the auth API and
//! accepted by the realtime relay at websocket handshake time.

pub mod jwt;

pub use jwt::{Claims, JwtKeys};
