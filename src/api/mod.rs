mod client;
pub(crate) mod event_bus;
mod options;
mod wiring;

pub use client::NodeClient;
pub use event_bus::NodeEvent;
pub use event_bus::NodeEventListener;
pub use options::BullyOptions;
pub use wiring::try_start_node;
pub use wiring::MemberInfo;
pub use wiring::NodeConfig;
pub use wiring::NodeStartError;
