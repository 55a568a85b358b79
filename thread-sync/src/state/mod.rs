//! Application state management

mod session_manager;

pub use session_manager::SessionManager;
