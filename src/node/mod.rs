mod election;
mod node;
mod peers;
mod timers;

pub use election::CoordinatorView;
pub use peers::ClusterConfigError;
pub use peers::NodeId;

pub(crate) use election::ElectionTimeouts;
pub(crate) use election::Round;
pub(crate) use node::CoreConfig;
pub(crate) use node::Node;
pub(crate) use peers::Registry;
