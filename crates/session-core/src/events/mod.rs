pub mod event;
pub mod provider;
pub mod subscription;

pub use event::{Event, Payload, SessionUpdate};
pub use provider::{EventProvider, EventReceiver, EventSender};
pub use subscription::{Subscription, SubscriptionSet};
