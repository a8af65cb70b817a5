pub mod control;
pub mod embed_policy;
pub mod reconciler;
pub mod registry;
pub mod relay;

pub use control::SubscriptionControl;
pub use embed_policy::{evaluate as evaluate_embed_policy, EmbedDecision, PolicyEvidence};
pub use reconciler::{DisconnectReconciler, SubscriptionReaper};
pub use registry::SubscriptionRegistry;
pub use relay::{BotHandle, EventRelay, RelayContext, RelayOutcome, RelaySettings};
