//! Shore-side proxy.
//!
//! Listens for the single ship link, reads frames in order, and turns each
//! one back into real traffic: REQUEST frames become live HTTP fetches,
//! CONNECT_OPEN frames become TCP tunnels. Responses stream back as frames
//! on the same link.

pub mod cli;
pub mod error;
pub mod session;
pub mod upstream;

pub use cli::{Cli, ShoreConfig};
pub use error::{Result, ShoreError};
pub use session::serve;
