// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Integration tests for MessagePipe.
//!
//! Plugins interact only through published messages; these tests drive the
//! pipe through its public API with small plugins defined here.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use common::{RecordingPlugin, test_instance, wait_for};
use nginx_agent::bus::{
    self, BusError, Message, MessagePipe, MessagePipeInterface, Payload, PipeHandle, Plugin,
    PluginInfo, Topic,
};
use nginx_agent::model::{Instance, Resource};
use nginx_agent::resource::ResourcePlugin;

/// Republishes every instance list as a resource update.
struct Relay {
    pipe: PipeHandle,
}

#[async_trait]
impl Plugin for Relay {
    fn info(&self) -> PluginInfo {
        PluginInfo::new("relay")
    }

    async fn init(&self, pipe: Arc<dyn MessagePipeInterface>) -> bus::Result<()> {
        self.pipe.set(pipe);
        Ok(())
    }

    async fn close(&self) -> bus::Result<()> {
        Ok(())
    }

    async fn process(&self, message: &Message) {
        let instances: Vec<Instance> = message
            .payload
            .as_instances()
            .map(|i| i.to_vec())
            .unwrap_or_default();
        self.pipe
            .publish(
                "relay",
                vec![Message::new(
                    Topic::ResourceUpdate,
                    Payload::Resource(Resource {
                        resource_id: "host".to_string(),
                        instances,
                    }),
                )],
            )
            .await;
    }

    fn subscriptions(&self) -> Vec<Topic> {
        vec![Topic::InstancesUpdated]
    }
}

fn start(pipe: &Arc<MessagePipe>) -> (CancellationToken, tokio::task::JoinHandle<bus::Result<()>>) {
    let cancel = CancellationToken::new();
    let handle = {
        let pipe = pipe.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { pipe.run(cancel).await })
    };
    (cancel, handle)
}

#[tokio::test]
async fn test_plugins_communicate_through_the_pipe() {
    let pipe = Arc::new(MessagePipe::new(8));
    let sink = Arc::new(RecordingPlugin::new(
        "sink",
        vec![Topic::InstancesUpdated, Topic::ResourceUpdate],
    ));
    let plugins: Vec<Arc<dyn Plugin>> = vec![
        Arc::new(Relay {
            pipe: PipeHandle::new(),
        }),
        sink.clone(),
    ];
    pipe.register(2, plugins).await.unwrap();

    // Queued before the loop starts so every relayed update lands behind them.
    pipe.process(vec![
        Message::new(Topic::InstancesUpdated, Payload::Instances(vec![])),
        Message::empty(Topic::EnableWatchers),
        Message::new(Topic::InstancesUpdated, Payload::Instances(vec![])),
    ])
    .await
    .unwrap();
    let (cancel, handle) = start(&pipe);

    let s = sink.clone();
    wait_for(move || s.received().len() == 4).await;

    let topics: Vec<Topic> = sink.received().iter().map(|m| m.topic).collect();
    assert_eq!(
        topics,
        vec![
            Topic::InstancesUpdated,
            Topic::InstancesUpdated,
            Topic::ResourceUpdate,
            Topic::ResourceUpdate,
        ]
    );

    cancel.cancel();
    handle.await.unwrap().unwrap();
    assert!(sink.is_closed());
}

#[tokio::test]
async fn test_mismatched_payload_does_not_stall_the_pipe() {
    let pipe = Arc::new(MessagePipe::new(8));
    let resource = Arc::new(ResourcePlugin::new("host"));
    let sink = Arc::new(RecordingPlugin::new(
        "sink",
        vec![Topic::InstancesUpdated, Topic::ResourceUpdate],
    ));
    let plugins: Vec<Arc<dyn Plugin>> = vec![resource.clone(), sink.clone()];
    pipe.register(2, plugins).await.unwrap();
    let (cancel, handle) = start(&pipe);

    pipe.process(vec![
        Message::empty(Topic::InstancesUpdated),
        Message::new(
            Topic::InstancesUpdated,
            Payload::Instances(vec![test_instance("instance-1")]),
        ),
    ])
    .await
    .unwrap();

    let s = sink.clone();
    wait_for(move || s.count(Topic::ResourceUpdate) == 1).await;

    assert_eq!(sink.count(Topic::InstancesUpdated), 2);
    assert_eq!(resource.resource().await.instances.len(), 1);
    assert!(!handle.is_finished());
    assert!(!pipe.is_closed());

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_deregister_while_running() {
    let pipe = Arc::new(MessagePipe::new(8));
    let first = Arc::new(RecordingPlugin::new("first", vec![Topic::ConnectionReset]));
    let second = Arc::new(RecordingPlugin::new("second", vec![Topic::ConnectionReset]));
    let plugins: Vec<Arc<dyn Plugin>> = vec![first.clone(), second.clone()];
    pipe.register(2, plugins).await.unwrap();
    let (cancel, handle) = start(&pipe);

    pipe.process(vec![Message::empty(Topic::ConnectionReset)])
        .await
        .unwrap();
    let s = second.clone();
    wait_for(move || s.count(Topic::ConnectionReset) == 1).await;

    pipe.deregister(&["first"]).await;
    assert!(first.is_closed());
    assert_eq!(pipe.subscribers(Topic::ConnectionReset).await, vec!["second"]);

    pipe.process(vec![Message::empty(Topic::ConnectionReset)])
        .await
        .unwrap();
    let s = second.clone();
    wait_for(move || s.count(Topic::ConnectionReset) == 2).await;
    assert_eq!(first.count(Topic::ConnectionReset), 1);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_pipe_rejects_work_after_shutdown() {
    let pipe = Arc::new(MessagePipe::new(8));
    let (cancel, handle) = start(&pipe);

    cancel.cancel();
    handle.await.unwrap().unwrap();

    assert!(matches!(
        pipe.process(vec![Message::empty(Topic::EnableWatchers)]).await,
        Err(BusError::Closed)
    ));
    let late: Arc<dyn Plugin> = Arc::new(RecordingPlugin::new("late", vec![]));
    assert!(matches!(
        pipe.register(1, vec![late]).await,
        Err(BusError::Closed)
    ));
    assert!(matches!(
        pipe.run(CancellationToken::new()).await,
        Err(BusError::AlreadyRunning)
    ));
}
