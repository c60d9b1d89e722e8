mod actor;
mod api;
mod node;
mod protocol;
mod transport;

pub use api::try_start_node;
pub use api::BullyOptions;
pub use api::MemberInfo;
pub use api::NodeClient;
pub use api::NodeConfig;
pub use api::NodeEvent;
pub use api::NodeEventListener;
pub use api::NodeStartError;
pub use node::ClusterConfigError;
pub use node::CoordinatorView;
pub use node::NodeId;
pub use protocol::MessageKind;
