//! Typed access to the CarBN backend.
//!
//! Call layout:
//! ```text
//! /auth/google             POST   (anonymous)
//! /auth/apple              POST   (anonymous)
//! /auth/refresh            POST   (anonymous, via RefreshEndpoint)
//! /auth/logout             POST   (anonymous, bypasses the logout gate)
//! /user/{id}/details       GET    (bearer)
//! everything else          any    (bearer, 401 refresh and replay)
//! ```

pub mod client;
pub mod endpoints;
pub mod images;
pub mod refresh;
pub mod response;
pub mod users;

pub use client::{ApiClient, DEFAULT_REFRESH_WAIT};
pub use images::ImageLoader;
pub use refresh::RefreshEndpoint;
pub use response::{NoContent, decode_body};
pub use users::UserDirectory;
