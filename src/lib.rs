pub mod banner;
pub mod config;
pub mod error;
pub mod filter;
pub mod net;
pub mod protocol;
pub mod router;
pub mod state;

// Convenient re-exports (so call sites can do `chat_relay::Registry`, etc.)
pub use filter::{BannedWords, censor};
pub use router::route;
pub use state::{
    registry::{Registry, SessionId},
    session::{Session, SessionState},
};
