//! One MPV instance bound to a player on the display.

mod error;
mod session;

pub use error::SessionError;
pub use session::{Lifecycle, Session, SessionOptions};
