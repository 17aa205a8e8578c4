pub mod manager;
pub mod session;
pub mod types;

pub use manager::ConversationManager;
pub use session::SessionCache;
