#![deny(unreachable_pub)]

// Public modules that make up the protocol surface.
pub mod models;
pub mod protocol;
mod session_id;

pub use session_id::SessionId;

// Convenience prelude that re-exports the full public API of the submodules.
pub mod prelude {
    pub use crate::SessionId;
    pub use crate::models::*;
    pub use crate::protocol::*;
}
