use bully::{BullyOptions, CoordinatorView, MemberInfo, NodeClient, NodeConfig, NodeEvent, NodeId};
use chrono::Utc;
use slog::Drain;
use std::error::Error;
use std::fs::OpenOptions;
use std::net::Ipv4Addr;
use tokio::time::{Duration, Instant};

const CONVERGE_TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::test]
async fn cluster_converges_on_highest_id() -> Result<(), Box<dyn Error>> {
    let clients = start_cluster(&[1, 2, 3], 3, 7700).await?;

    wait_for_view(&clients[2], CoordinatorView::Me).await;
    wait_for_view(&clients[0], CoordinatorView::Other(NodeId::new(3))).await;
    wait_for_view(&clients[1], CoordinatorView::Other(NodeId::new(3))).await;

    Ok(())
}

#[tokio::test]
async fn coordinator_failure_triggers_reelection() -> Result<(), Box<dyn Error>> {
    let mut clients = start_cluster(&[1, 2, 3], 3, 7800).await?;

    wait_for_view(&clients[2], CoordinatorView::Me).await;
    wait_for_view(&clients[1], CoordinatorView::Other(NodeId::new(3))).await;

    // Kill the coordinator. The survivors' ping monitors notice and the
    // next-highest id wins the re-election.
    clients.pop().unwrap().shutdown();

    wait_for_view(&clients[1], CoordinatorView::Me).await;
    wait_for_view(&clients[0], CoordinatorView::Other(NodeId::new(2))).await;

    Ok(())
}

#[tokio::test]
async fn highest_id_first_stays_coordinator_as_others_join() -> Result<(), Box<dyn Error>> {
    // Start order 3, 2, 1: node 3 claims coordinatorship immediately, and
    // each joiner's startup election ends with an OK from 3 followed by 3
    // re-announcing itself.
    let clients = start_cluster(&[3, 2, 1], 3, 7900).await?;

    wait_for_view(&clients[0], CoordinatorView::Me).await;
    wait_for_view(&clients[1], CoordinatorView::Other(NodeId::new(3))).await;
    wait_for_view(&clients[2], CoordinatorView::Other(NodeId::new(3))).await;

    Ok(())
}

#[tokio::test]
async fn single_member_announces_itself_without_an_election() -> Result<(), Box<dyn Error>> {
    let mut client = bully::try_start_node(config(1, 1, 8000)).await?;

    wait_for_view(&client, CoordinatorView::Me).await;

    // Holding the highest id, the node announces directly; the election
    // path is never taken.
    let mut saw_announcement = false;
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(200), client.event_listener.next()).await {
        match event {
            NodeEvent::CoordinatorChanged(id) => {
                assert_eq!(id, NodeId::new(1));
                saw_announcement = true;
            }
            NodeEvent::ElectionStarted => panic!("single member should never start an election"),
            other => panic!("unexpected event in single-member cluster: {:?}", other),
        }
    }
    assert!(saw_announcement);

    Ok(())
}

/// Starts the listed node ids in order, staggered so each joiner dials a
/// cluster that is done handling the previous arrival. Returned clients are
/// in the same order as `start_order`.
async fn start_cluster(start_order: &[u32], num_members: u32, port_base: u16) -> Result<Vec<NodeClient>, Box<dyn Error>> {
    let mut clients = Vec::with_capacity(start_order.len());
    for &id in start_order {
        let client = bully::try_start_node(config(id, num_members, port_base)).await?;
        clients.push(client);
        sleep(Duration::from_millis(150)).await;
    }

    Ok(clients)
}

fn config(id: u32, num_members: u32, port_base: u16) -> NodeConfig {
    let mut cluster_members = Vec::with_capacity(num_members as usize);
    for i in 1..=num_members {
        cluster_members.push(member_info(port_base, i));
    }

    NodeConfig {
        my_node_id: NodeId::new(id),
        cluster_members,
        info_logger: create_root_logger_for_stdout(id),
        options: BullyOptions {
            election_timeout: Some(Duration::from_millis(250)),
            announcement_timeout: Some(Duration::from_millis(400)),
            ping_timeout: Some(Duration::from_millis(300)),
        },
    }
}

fn member_info(port_base: u16, id: u32) -> MemberInfo {
    MemberInfo {
        node_id: NodeId::new(id),
        ip_addr: Ipv4Addr::from([127, 0, 0, 1]),
        port: port_base + id as u16,
    }
}

async fn wait_for_view(client: &NodeClient, expected: CoordinatorView) {
    let deadline = Instant::now() + CONVERGE_TIMEOUT;

    loop {
        let view = client.coordinator().await;
        if view == expected {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "Timed out waiting for coordinator view {:?}, last saw {:?}",
            expected,
            view
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[allow(dead_code)]
fn create_root_logger_for_file(directory_prefix: String, node_id: u32) -> slog::Logger {
    let now = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    let log_path = format!("{}/info_log_node_{}/{}_info.log", directory_prefix, node_id, now);
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(log_path)
        .unwrap();

    let decorator = slog_term::PlainDecorator::new(file);
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!())
}

#[allow(dead_code)]
fn create_root_logger_for_stdout(node_id: u32) -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).use_file_location().build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!("NodeId" => node_id))
}

async fn sleep(duration: Duration) {
    println!("Sleep {}ms", duration.as_millis());
    tokio::time::sleep(duration).await;
    println!("Awake!");
}
