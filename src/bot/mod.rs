/// Recently offered search results per chat
pub mod candidate_cache;
/// Slash command routing
pub mod commands;
/// Bounded-parallelism update loop
pub mod dispatcher;
/// Inbound update classification
pub mod event;
/// Handling paths and the per-event failure boundary
pub mod handlers;
/// Chat transport and send primitives
pub mod messaging;
/// User-facing texts
pub mod views;

pub use candidate_cache::CandidateCache;
pub use dispatcher::Dispatcher;
pub use event::InboundEvent;
pub use handlers::{EventHandler, HandlerError};
pub use messaging::{ChatTransport, MessageSender, TelegramTransport};
