// SPDX-License-Identifier: Apache-2.0

// Cross-node tests against an in-process loopback transport: two systems in
// one process wired directly into each other's inbound entry points.

use actor::{
    code, ActorContext, ActorHandler, ActorSystem, Cluster, ClusterReply,
    Error, ResponsePacket, Settings, SystemRef,
};
use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

/// Delivers packets straight into the peer system, standing in for a real
/// broker.
struct Loopback {
    peer: SystemRef,
}

struct OneshotReply(oneshot::Sender<ResponsePacket>);

impl ClusterReply for OneshotReply {
    fn respond(self: Box<Self>, packet: ResponsePacket) -> Result<(), Error> {
        self.0
            .send(packet)
            .map_err(|_| Error::Cluster("requester went away".to_owned()))
    }
}

#[async_trait]
impl Cluster for Loopback {
    async fn init(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn publish_local(&self, _node_id: &str, packet: Vec<u8>) -> Result<(), Error> {
        let result = self.peer.cluster_post_local(&packet).await;
        if code::is_fail(result) {
            return Err(Error::Cluster(format!("peer refused with {result}")));
        }
        Ok(())
    }

    async fn publish_remote(&self, _node_id: &str, packet: Vec<u8>) -> Result<(), Error> {
        let result = self.peer.cluster_post_remote(&packet, None).await;
        if code::is_fail(result) {
            return Err(Error::Cluster(format!("peer refused with {result}")));
        }
        Ok(())
    }

    async fn request_remote(
        &self,
        _node_id: &str,
        packet: Vec<u8>,
        timeout: Duration,
    ) -> Result<ResponsePacket, Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let posted = self
            .peer
            .cluster_post_remote(&packet, Some(Box::new(OneshotReply(reply_tx))))
            .await;
        if code::is_fail(posted) {
            return Ok(ResponsePacket {
                code: posted,
                data: Vec::new(),
            });
        }
        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(packet)) => Ok(packet),
            _ => Err(Error::Cluster("request timed out".to_owned())),
        }
    }

    async fn stop(&self) {}
}

fn start_node(node_id: &str) -> SystemRef {
    let token = CancellationToken::new();
    let (system, runner) = ActorSystem::create(
        Settings {
            node_id: node_id.to_owned(),
            ..Settings::default()
        },
        token,
    );
    tokio::spawn(runner.run());
    system
}

async fn link(a: &SystemRef, b: &SystemRef) {
    a.set_cluster(Arc::new(Loopback { peer: b.clone() }))
        .await
        .unwrap();
    b.set_cluster(Arc::new(Loopback { peer: a.clone() }))
        .await
        .unwrap();
}

struct EchoActor {
    received: Arc<AtomicU64>,
}

#[async_trait]
impl ActorHandler for EchoActor {
    async fn on_init(&mut self, ctx: &mut ActorContext<Self>) -> Result<(), Error> {
        ctx.register_remote(
            "echo",
            |_state: &mut Self, _ctx: &mut ActorContext<Self>, text: String| {
                (code::OK, Some(format!("echo: {text}")))
            },
        )?;
        ctx.register_local(
            "notify",
            |state: &mut Self, _ctx: &mut ActorContext<Self>, _req: ()| {
                state.received.fetch_add(1, Ordering::SeqCst);
                code::OK
            },
        )?;
        Ok(())
    }
}

#[tokio::test]
#[traced_test]
async fn test_cross_node_call_wait() {
    let node1 = start_node("node1");
    let node2 = start_node("node2");
    link(&node1, &node2).await;

    let received = Arc::new(AtomicU64::new(0));
    node2
        .create_actor(
            "echo",
            EchoActor {
                received: received.clone(),
            },
        )
        .await
        .unwrap();

    // The payload round-trips through the wire serializer both ways.
    let (result, rsp) = node1
        .call_wait::<String, String>(
            "node1.gateway",
            "node2.echo",
            "echo",
            7,
            "hello".to_owned(),
        )
        .await;
    assert_eq!(result, code::OK);
    assert_eq!(rsp, Some("echo: hello".to_owned()));

    node1.stop().await;
    node2.stop().await;
}

#[tokio::test]
#[traced_test]
async fn test_cross_node_fire_and_forget() {
    let node1 = start_node("node1");
    let node2 = start_node("node2");
    link(&node1, &node2).await;

    let received = Arc::new(AtomicU64::new(0));
    node2
        .create_actor(
            "echo",
            EchoActor {
                received: received.clone(),
            },
        )
        .await
        .unwrap();

    let result = node1.call("", "node2.echo", "notify", 0, ()).await;
    assert_eq!(result, code::OK);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(received.load(Ordering::SeqCst), 1);

    node1.stop().await;
    node2.stop().await;
}

#[tokio::test]
#[traced_test]
async fn test_cross_node_failures() {
    let node1 = start_node("node1");
    let node2 = start_node("node2");

    // No transport installed yet.
    let (result, rsp) = node1
        .call_wait::<(), u32>("", "node2.echo", "echo", 1, ())
        .await;
    assert_eq!(result, code::ACTOR_PUBLISH_REMOTE_ERROR);
    assert_eq!(rsp, None);

    link(&node1, &node2).await;

    // The peer answers a missing actor with a code, not a timeout.
    let (result, _) = node1
        .call_wait::<(), u32>("", "node2.ghost", "echo", 2, ())
        .await;
    assert_eq!(result, code::ACTOR_NOT_FOUND);

    node1.stop().await;
    node2.stop().await;
}
