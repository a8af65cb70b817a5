pub mod event;
pub mod id;
pub mod messages;
pub mod notification;
pub mod status;

pub use event::{GenericMessage, UpstreamEvent};
pub use id::{Hashtag, Principal};
pub use messages::{SubscriptionAck, TerminationAck};
pub use notification::{Destination, NotificationKind, OutboundNotification};
pub use status::{Account, Mention, Status};
