pub mod filter;
pub mod handler;
pub mod messages;
pub mod registry;
pub mod status_tracker;

pub use filter::{Channel, Subscription, SubscriptionFilter};
pub use handler::stream;
pub use messages::{ClientMessage, ServerMessage};
pub use registry::Registry;
pub use status_tracker::StatusTracker;
