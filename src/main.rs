use bully::{BullyOptions, MemberInfo, NodeConfig, NodeId, try_start_node};
use slog::Drain;
use std::net::Ipv4Addr;

/// Runs one node of a fixed local 3-node cluster. Pass the node id (1-3)
/// as the only argument, once per terminal.
#[tokio::main]
async fn main() {
    let my_node_id = NodeId::new(
        std::env::args()
            .nth(1)
            .and_then(|arg| arg.parse().ok())
            .expect("usage: bully <node-id>"),
    );

    let logger = stdout_logger();
    let config = NodeConfig {
        my_node_id,
        cluster_members: local_cluster_members(),
        info_logger: logger.clone(),
        options: BullyOptions::default(),
    };

    let mut client = try_start_node(config).await.expect("failed to start node");

    loop {
        tokio::select! {
            event = client.event_listener.next() => match event {
                Some(event) => slog::info!(logger, "Event: {:?}", event),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
}

fn local_cluster_members() -> Vec<MemberInfo> {
    let localhost = Ipv4Addr::new(127, 0, 0, 1);

    vec![
        MemberInfo {
            node_id: NodeId::new(1),
            ip_addr: localhost,
            port: 6001,
        },
        MemberInfo {
            node_id: NodeId::new(2),
            ip_addr: localhost,
            port: 6002,
        },
        MemberInfo {
            node_id: NodeId::new(3),
            ip_addr: localhost,
            port: 6003,
        },
    ]
}

fn stdout_logger() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::CompactFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!())
}
