// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Inject transport faults to check isolation, loss handling, timeouts and cancellation.
// Author: Lukas Bower

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sim_device::{AddressSpace, DeviceServer};
use tokio_util::sync::CancellationToken;
use ua_inspect::{
    discover, watch, ConnectError, Connector, DiscoveryError, DiscoveryOptions, FaultKind,
    InProcessConnector, InProcessTransport, ReportSink, SessionOptions, TextSink, Transport,
    TransportError, TransportSession, WatchError, WatchOptions,
};
use uasim_proto::frame::{RequestBody, ResponseBody};
use uasim_proto::{Endpoint, NodeRef, ServiceError, Value};

#[derive(Default)]
struct Faults {
    browse_name: HashSet<NodeRef>,
    children: HashSet<NodeRef>,
    read: HashSet<NodeRef>,
    hang: HashSet<NodeRef>,
    self_loop: HashSet<NodeRef>,
    lose_on_children_of: Option<NodeRef>,
}

struct FaultyTransport {
    inner: InProcessTransport,
    faults: Faults,
    requests: Arc<AtomicUsize>,
}

fn target(body: &RequestBody) -> Option<&NodeRef> {
    match body {
        RequestBody::BrowseChildren { node }
        | RequestBody::ReadBrowseName { node }
        | RequestBody::ReadNodeClass { node }
        | RequestBody::ReadValue { node }
        | RequestBody::WriteValue { node, .. } => Some(node),
        RequestBody::NamespaceArray | RequestBody::ResolveNamespace { .. } => None,
    }
}

#[async_trait]
impl Transport for FaultyTransport {
    async fn request(&self, body: RequestBody) -> Result<ResponseBody, TransportError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if let Some(node) = target(&body) {
            if self.faults.hang.contains(node) {
                std::future::pending::<()>().await;
            }
            let injected = match &body {
                RequestBody::ReadBrowseName { .. } => self.faults.browse_name.contains(node),
                RequestBody::BrowseChildren { .. } => {
                    if self.faults.lose_on_children_of.as_ref() == Some(node) {
                        return Err(TransportError::ConnectionLost("link down".into()));
                    }
                    self.faults.children.contains(node)
                }
                RequestBody::ReadValue { .. } => self.faults.read.contains(node),
                _ => false,
            };
            if injected {
                return Ok(ResponseBody::Error {
                    error: ServiceError::NodeNotFound(node.clone()),
                });
            }
        }
        let looped = match &body {
            RequestBody::BrowseChildren { node } if self.faults.self_loop.contains(node) => {
                Some(node.clone())
            }
            _ => None,
        };
        let reply = self.inner.request(body).await?;
        match (reply, looped) {
            (ResponseBody::BrowseChildren { mut children }, Some(node)) => {
                children.push(node);
                Ok(ResponseBody::BrowseChildren { children })
            }
            (reply, _) => Ok(reply),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.inner.close().await
    }
}

/// Objects -> A(B(b1, b2), c), D(d1)
struct Tree {
    a: NodeRef,
    b: NodeRef,
    b1: NodeRef,
    c: NodeRef,
    d: NodeRef,
    d1: NodeRef,
}

fn endpoint() -> Endpoint {
    Endpoint::parse("opc.tcp://localhost:4840/").expect("endpoint")
}

fn fixture(faults: impl FnOnce(&Tree) -> Faults) -> (TransportSession<FaultyTransport>, Tree, Arc<AtomicUsize>) {
    let mut space = AddressSpace::new();
    let ns = space.register_namespace("urn:faults");
    let root = space.root().clone();
    let a = space.create_object(&root, ns, "A").unwrap();
    let b = space.create_object(&a, ns, "B").unwrap();
    let b1 = space.create_variable(&b, ns, "b1", Value::Float(1.0), true).unwrap();
    space.create_variable(&b, ns, "b2", Value::Float(2.0), true).unwrap();
    let c = space.create_variable(&a, ns, "c", Value::Bool(true), false).unwrap();
    let d = space.create_object(&root, ns, "D").unwrap();
    let d1 = space.create_variable(&d, ns, "d1", Value::Int(4), true).unwrap();
    let tree = Tree { a, b, b1, c, d, d1 };

    let server = DeviceServer::new(space.into_shared());
    let requests = Arc::new(AtomicUsize::new(0));
    let transport = FaultyTransport {
        inner: InProcessTransport::new(server.connect().unwrap()),
        faults: faults(&tree),
        requests: requests.clone(),
    };
    let session = TransportSession::from_transport(transport, endpoint(), Duration::from_secs(1));
    (session, tree, requests)
}

fn deep() -> DiscoveryOptions {
    DiscoveryOptions {
        max_depth: 5,
        patterns: None,
    }
}

fn refs(records: &[ua_inspect::DiscoveryRecord]) -> Vec<NodeRef> {
    records.iter().map(|record| record.node_ref.clone()).collect()
}

#[tokio::test]
async fn children_failure_leaves_siblings_and_uncles_intact() {
    let (session, tree, _) = fixture(|tree| Faults {
        children: HashSet::from([tree.b.clone()]),
        ..Faults::default()
    });
    let records = discover(&session, NodeRef::objects_folder(), deep())
        .collect()
        .await
        .expect("discovery completes");
    assert_eq!(
        refs(&records),
        [
            NodeRef::objects_folder(),
            tree.a.clone(),
            tree.b.clone(),
            tree.c.clone(),
            tree.d.clone(),
            tree.d1.clone()
        ]
    );
    let b = &records[2];
    assert!(b.has_fault(FaultKind::Children));
    assert_eq!(b.browse_name.as_deref(), Some("B"));
    assert_eq!(records.iter().filter(|record| record.is_faulted()).count(), 1);
}

#[tokio::test]
async fn browse_name_failure_still_descends() {
    let (session, tree, _) = fixture(|tree| Faults {
        browse_name: HashSet::from([tree.b.clone()]),
        ..Faults::default()
    });
    let records = discover(&session, NodeRef::objects_folder(), deep())
        .collect()
        .await
        .expect("discovery completes");
    let b = records.iter().find(|record| record.node_ref == tree.b).unwrap();
    assert!(b.has_fault(FaultKind::Browse));
    assert_eq!(b.browse_name, None);
    assert!(refs(&records).contains(&tree.b1));
    assert_eq!(records.len(), 8);
}

#[tokio::test]
async fn read_failure_is_annotated_and_walk_continues() {
    let (session, tree, _) = fixture(|tree| Faults {
        read: HashSet::from([tree.b1.clone()]),
        ..Faults::default()
    });
    let records = discover(&session, NodeRef::objects_folder(), deep())
        .collect()
        .await
        .expect("discovery completes");
    let b1 = records.iter().find(|record| record.node_ref == tree.b1).unwrap();
    assert!(b1.has_fault(FaultKind::Read));
    assert_eq!(b1.browse_name.as_deref(), Some("b1"));
    assert_eq!(b1.value, None);
    let d1 = records.iter().find(|record| record.node_ref == tree.d1).unwrap();
    assert_eq!(d1.value, Some(Value::Int(4)));
}

#[tokio::test]
async fn connection_loss_aborts_the_run_and_poisons_the_session() {
    let (session, tree, requests) = fixture(|tree| Faults {
        lose_on_children_of: Some(tree.a.clone()),
        ..Faults::default()
    });
    let mut discovery = discover(&session, NodeRef::objects_folder(), deep());
    let root = discovery.next().await.expect("root").expect("root record");
    assert_eq!(root.node_ref, NodeRef::objects_folder());
    let err = discovery.next().await.expect("terminal item").expect_err("lost");
    assert!(matches!(err, DiscoveryError::ConnectionLost(TransportError::ConnectionLost(_))));
    assert!(discovery.next().await.is_none());

    assert!(session.is_lost());
    let before = requests.load(Ordering::SeqCst);
    let err = session.read_value(&tree.d1).await.expect_err("fails fast");
    assert!(err.is_fatal());
    assert_eq!(requests.load(Ordering::SeqCst), before, "no request reaches the transport");
}

#[tokio::test(start_paused = true)]
async fn timeouts_are_recoverable_per_node() {
    let (session, tree, _) = fixture(|tree| Faults {
        hang: HashSet::from([tree.c.clone()]),
        ..Faults::default()
    });
    let records = discover(&session, NodeRef::objects_folder(), deep())
        .collect()
        .await
        .expect("discovery completes");
    let c = records.iter().find(|record| record.node_ref == tree.c).unwrap();
    let kinds: Vec<_> = c.faults.iter().map(|fault| fault.kind).collect();
    assert_eq!(kinds, [FaultKind::Browse, FaultKind::Browse, FaultKind::Children]);
    assert!(c
        .faults
        .iter()
        .all(|fault| fault.error == TransportError::Timeout(Duration::from_secs(1))));
    assert_eq!(c.node_class, None);
    assert!(refs(&records).contains(&tree.d1));
    assert!(!session.is_lost());
}

#[tokio::test]
async fn cancellation_stops_before_the_next_request() {
    let (session, _, requests) = fixture(|_| Faults::default());
    let cancel = CancellationToken::new();
    let mut discovery =
        discover(&session, NodeRef::objects_folder(), deep()).with_cancellation(cancel.clone());
    discovery.next().await.expect("root").expect("root record");
    cancel.cancel();
    let before = requests.load(Ordering::SeqCst);
    assert_eq!(
        discovery.next().await.expect("terminal item"),
        Err(DiscoveryError::Cancelled)
    );
    assert!(discovery.next().await.is_none());
    assert_eq!(requests.load(Ordering::SeqCst), before);
}

struct StalledConnector;

#[async_trait]
impl Connector for StalledConnector {
    type Transport = InProcessTransport;

    async fn connect(&self, _endpoint: &Endpoint) -> Result<Self::Transport, TransportError> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn connect_timeout_is_fatal() {
    let options = SessionOptions {
        connect_timeout: Duration::from_millis(250),
        call_timeout: Duration::from_secs(1),
    };
    let err = TransportSession::connect(&StalledConnector, endpoint(), options)
        .await
        .expect_err("stalled connect");
    assert!(matches!(err, ConnectError::Timeout { timeout, .. } if timeout == Duration::from_millis(250)));
}

#[tokio::test]
async fn connect_to_shut_down_server_fails() {
    let server = DeviceServer::new(AddressSpace::new().into_shared());
    server.shutdown();
    let err = TransportSession::connect(
        &InProcessConnector::new(server),
        endpoint(),
        SessionOptions::default(),
    )
    .await
    .expect_err("closed server");
    assert!(matches!(err, ConnectError::Failed { source, .. } if source.is_fatal()));
}

#[tokio::test(start_paused = true)]
async fn watch_carries_read_failures_in_samples() {
    let (session, tree, _) = fixture(|tree| Faults {
        read: HashSet::from([tree.b1.clone()]),
        ..Faults::default()
    });
    let mut sink = TextSink::new(Vec::new());
    let options = WatchOptions {
        interval: Duration::from_secs(1),
        rounds: 3,
    };
    let rounds = watch(
        &session,
        &[tree.b1.clone(), tree.d1.clone()],
        options,
        &mut sink as &mut dyn ReportSink,
    )
    .await
    .expect("watch");
    assert_eq!(rounds.len(), 3);
    for round in &rounds {
        assert!(round.samples[0].outcome.is_err());
        assert_eq!(round.samples[1].outcome, Ok(Value::Int(4)));
    }
    let text = String::from_utf8(sink.into_inner()).unwrap();
    assert_eq!(text.matches("Read #").count(), 3);
}

#[tokio::test]
async fn zero_watch_interval_is_rejected() {
    let (session, tree, requests) = fixture(|_| Faults::default());
    let mut sink = TextSink::new(Vec::new());
    let options = WatchOptions {
        interval: Duration::ZERO,
        rounds: 1,
    };
    let err = watch(&session, &[tree.b1.clone()], options, &mut sink as &mut dyn ReportSink)
        .await
        .expect_err("zero interval");
    assert!(matches!(err, WatchError::Config(_)), "{err}");
    assert_eq!(requests.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn nodes_listing_themselves_are_visited_once() {
    let (session, tree, _) = fixture(|tree| Faults {
        self_loop: HashSet::from([NodeRef::objects_folder(), tree.b.clone()]),
        ..Faults::default()
    });
    let records = discover(&session, NodeRef::objects_folder(), deep())
        .collect()
        .await
        .expect("discovery completes");
    let visited = refs(&records);
    let unique: HashSet<_> = visited.iter().cloned().collect();
    assert_eq!(unique.len(), visited.len(), "{visited:?}");
    assert_eq!(visited.len(), 8);
    assert!(records.iter().all(|record| record.faults.is_empty()));
}

#[tokio::test]
async fn writes_respect_type_and_writable_rules() {
    let (session, tree, _) = fixture(|_| Faults::default());
    let err = session
        .write_value(&tree.b1, Value::Int(3))
        .await
        .expect_err("type mismatch");
    assert!(matches!(err, TransportError::Service(ServiceError::TypeMismatch { .. })));
    let err = session
        .write_value(&tree.c, Value::Bool(false))
        .await
        .expect_err("read-only");
    assert_eq!(err, TransportError::Service(ServiceError::NotWritable(tree.c.clone())));
    assert_eq!(session.read_value(&tree.c).await.unwrap(), Value::Bool(true));
    session.write_value(&tree.b1, Value::Float(9.5)).await.unwrap();
    assert_eq!(session.read_value(&tree.b1).await.unwrap(), Value::Float(9.5));
    session.close().await.unwrap();
    assert!(session.read_value(&tree.b1).await.unwrap_err().is_fatal());
}
