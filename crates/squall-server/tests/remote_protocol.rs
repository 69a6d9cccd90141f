//! End-to-end remote search protocol tests over real HTTP
//!
//! Binds the control surface on an ephemeral port and drives it with
//! the production HTTP transport.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use squall_common::prelude::*;
use squall_index::{MemSearcherFactory, MemShardMetaStore, PassThroughExtractor};
use squall_search::{
    ClusterSearchTask, HttpRemoteTransport, LocalNodeExecutor, RemoteNodeSearch,
    RemoteSearchManager, RemoteSearchTransport, ResultSink, TaskRegistry,
};
use squall_server::{router, AppState};
use tokio_util::sync::CancellationToken;

fn fast_remote_config() -> RemoteProtocolConfig {
    RemoteProtocolConfig {
        poll_interval: Duration::from_millis(20),
        poll_wait: Duration::from_millis(100),
        ..Default::default()
    }
}

/// Stand up one worker node with `shards` single-document shards and
/// serve its control surface on an ephemeral port.
async fn spawn_worker_node(shards: u64) -> (SocketAddr, IndexUuid) {
    let meta = Arc::new(MemShardMetaStore::new());
    let factory = Arc::new(MemSearcherFactory::new());
    let index = IndexUuid(uuid::Uuid::new_v4());
    meta.add_index(IndexDef {
        uuid: index,
        name: "events".to_string(),
        partition_scheme: PartitionScheme::All,
    });
    for id in 1..=shards {
        meta.add_shard(
            index,
            ShardRef {
                id: ShardId(id),
                node: NodeName::new("node2"),
                partition: "all".to_string(),
                status: ShardStatus::Closed,
                format_version: FormatVersion(1),
            },
        );
        factory.add_document(
            ShardId(id),
            vec![("message".to_string(), format!("error in shard {}", id))],
        );
    }

    let executor = Arc::new(LocalNodeExecutor::new(
        meta,
        factory,
        Arc::new(PassThroughExtractor),
        &SearchConfig::default(),
    ));
    let manager = Arc::new(RemoteSearchManager::new(
        NodeName::new("node2"),
        executor,
        Arc::new(TaskRegistry::new()),
        fast_remote_config(),
    ));

    let app = router(AppState { manager });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, index)
}

fn wire_task(index: IndexUuid, shards: Vec<u64>) -> ClusterSearchTask {
    ClusterSearchTask {
        parent_task_id: TaskId(0),
        task_name: "http e2e".to_string(),
        query_key: QueryKey::generate(),
        query: SearchQuery {
            index,
            expression: Expression::Term {
                field: "message".into(),
                value: "error".into(),
            },
            time_range: TimeRange::all(),
        },
        shard_ids: shards.into_iter().map(ShardId).collect(),
        settings: vec![CoprocessorSettings::table(1, None, vec!["message".into()])],
        date_time: DateTimeSettings::default(),
        now_ms: 0,
    }
}

#[tokio::test]
async fn health_endpoint_responds() {
    let (addr, _) = spawn_worker_node(1).await;
    let body = reqwest::get(format!("http://{}/health", addr))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn full_protocol_round_trip_over_http() {
    let (addr, index) = spawn_worker_node(3).await;
    let endpoint = format!("http://{}", addr);
    let config = fast_remote_config();
    let transport = HttpRemoteTransport::new(&config).unwrap();

    let task = wire_task(index, vec![1, 2, 3]);
    let key = task.query_key.clone();

    assert!(transport.start(&endpoint, &task).await.unwrap());

    // Poll until the worker reports completion
    let sink = ResultSink::new(task.settings.clone());
    let node = NodeName::new("node2");
    let mut complete = false;
    for _ in 0..100 {
        let frame = transport.poll(&endpoint, &key).await.unwrap();
        let snapshot = squall_search::remote::decode_snapshot(&frame).unwrap();
        if sink.merge_poll_snapshot(&node, snapshot) {
            complete = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(complete, "worker never reported completion");
    assert_eq!(sink.row_count(CoprocessorId(1)), 3);
    assert_eq!(sink.error_count(), 0);

    assert!(transport.destroy(&endpoint, &key).await.unwrap());

    // The handle is gone now; polling it is an operator error (404)
    let err = transport.poll(&endpoint, &key).await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)));

    // Destroy stays idempotent over HTTP
    assert!(transport.destroy(&endpoint, &key).await.unwrap());
}

#[tokio::test]
async fn remote_client_drives_http_worker() {
    let (addr, index) = spawn_worker_node(2).await;
    let endpoint = format!("http://{}", addr);
    let config = fast_remote_config();
    let transport: Arc<dyn RemoteSearchTransport> =
        Arc::new(HttpRemoteTransport::new(&config).unwrap());
    let client = RemoteNodeSearch::new(transport, &config);

    let task = wire_task(index, vec![1, 2]);
    let sink = Arc::new(ResultSink::new(task.settings.clone()));
    let node = NodeName::new("node2");
    let token = CancellationToken::new();

    client.search(&endpoint, &node, &task, &sink, &token).await;

    assert_eq!(sink.row_count(CoprocessorId(1)), 2);
    assert_eq!(sink.error_count(), 0, "errors: {:?}", sink.errors());
}

#[tokio::test]
async fn unreachable_worker_records_transport_failure() {
    let config = RemoteProtocolConfig {
        connect_timeout: Duration::from_millis(200),
        request_timeout: Duration::from_millis(500),
        ..fast_remote_config()
    };
    let transport: Arc<dyn RemoteSearchTransport> =
        Arc::new(HttpRemoteTransport::new(&config).unwrap());
    let client = RemoteNodeSearch::new(transport, &config);

    let task = wire_task(IndexUuid(uuid::Uuid::new_v4()), vec![1]);
    let sink = Arc::new(ResultSink::new(task.settings.clone()));
    let node = NodeName::new("node2");

    // Port 9 is the discard service; nothing listens there in tests
    client
        .search(
            "http://127.0.0.1:9",
            &node,
            &task,
            &sink,
            &CancellationToken::new(),
        )
        .await;

    let errors = sink.errors();
    let node_errors = &errors[&node];
    assert!(node_errors.iter().any(|e| e.contains("start failed")));
    assert!(node_errors.iter().any(|e| e.contains("destroy failed")));
}
