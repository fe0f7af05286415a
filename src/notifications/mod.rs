pub mod channels;
pub mod engine;
pub mod payload;

pub use channels::{ChannelRegistry, NotificationSender, SenderError};
pub use engine::NotificationEngine;
pub use payload::NotificationPayload;
