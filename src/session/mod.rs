mod controller;
mod state;

pub use controller::{Collaborators, SessionController};
pub use state::{SessionSnapshot, SessionState, SessionStatus};
