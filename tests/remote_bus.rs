mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use pretty_assertions::assert_eq;

use common::{
    fast_config, init_tracing, wait_until, within, Journal, Tally, Unbound, ValueHandler, ValueSet,
};
use relaybus::{
    Broker, BusConfig, ConnectionState, EventHandler, EventRecord, HandlerError, MemoryBroker,
    Message, RemoteEventBus, ScopedChannel, StaticDiscovery, TARGET_HEADER,
};

const WAIT: Duration = Duration::from_secs(3);

async fn connect(broker: &MemoryBroker) -> RemoteEventBus {
    within(
        "connect",
        RemoteEventBus::builder(broker.clone())
            .with_config(fast_config())
            .connect(),
    )
    .await
    .expect("connect")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn published_value_is_handled_exactly_once() {
    init_tracing();
    let broker = MemoryBroker::new();
    let bus = connect(&broker).await;
    let tally = Arc::new(Tally::default());
    bus.register::<ValueSet, _>(ValueHandler(tally.clone())).await;

    bus.trigger(&ValueSet::new(123)).await.unwrap();

    assert!(wait_until(WAIT, || tally.last() == Some(123)).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(tally.calls(), 1);
    bus.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unbound_type_has_no_effect() {
    init_tracing();
    let broker = MemoryBroker::new();
    let bus = connect(&broker).await;
    let tally = Arc::new(Tally::default());
    bus.register::<ValueSet, _>(ValueHandler(tally.clone())).await;

    bus.trigger(&Unbound {
        record: EventRecord::new(),
    })
    .await
    .unwrap();
    bus.trigger(&ValueSet::new(1)).await.unwrap();

    assert!(wait_until(WAIT, || tally.calls() == 1).await);
    assert_eq!(broker.published(), 2);
    assert_eq!(bus.state(), ConnectionState::Ready);
    bus.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn every_instance_on_the_exchange_receives_the_event() {
    init_tracing();
    let broker = MemoryBroker::new();
    let publisher = connect(&broker).await;
    let listener = connect(&broker).await;
    assert_ne!(publisher.queue(), listener.queue());

    let seen_here = Arc::new(Tally::default());
    let seen_there = Arc::new(Tally::default());
    publisher
        .register::<ValueSet, _>(ValueHandler(seen_here.clone()))
        .await;
    listener
        .register::<ValueSet, _>(ValueHandler(seen_there.clone()))
        .await;

    publisher.trigger(&ValueSet::new(9)).await.unwrap();

    assert!(wait_until(WAIT, || seen_here.last() == Some(9) && seen_there.last() == Some(9)).await);
    publisher.shutdown().await;
    listener.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn consumer_survives_garbage_messages() {
    init_tracing();
    let broker = MemoryBroker::new();
    let bus = connect(&broker).await;
    let tally = Arc::new(Tally::default());
    bus.register::<ValueSet, _>(ValueHandler(tally.clone())).await;

    {
        let channel = ScopedChannel::open(&broker).await.unwrap();
        let exchange = &bus.config().exchange;
        channel
            .publish(exchange, Message::new("ValueSet", b"not json".to_vec()))
            .await
            .unwrap();
        channel
            .publish(exchange, Message::new("ValueSet", br#"{"value":1}"#.to_vec()))
            .await
            .unwrap();
    }

    bus.trigger(&ValueSet::new(77)).await.unwrap();
    assert!(wait_until(WAIT, || tally.last() == Some(77)).await);
    assert_eq!(tally.calls(), 1);
    assert_eq!(bus.state(), ConnectionState::Ready);
    bus.shutdown().await;
}

struct Tagged(&'static str, Journal);

#[async_trait]
impl EventHandler<ValueSet> for Tagged {
    async fn handle_event(&self, ev: &ValueSet) -> Result<(), HandlerError> {
        self.1.push(format!("{}:{}", self.0, ev.value));
        Ok(())
    }
}

struct Other(Journal);

#[async_trait]
impl EventHandler<ValueSet> for Other {
    async fn handle_event(&self, ev: &ValueSet) -> Result<(), HandlerError> {
        self.0.push(format!("other:{}", ev.value));
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn targeted_trigger_reaches_only_that_handler() {
    init_tracing();
    let broker = MemoryBroker::new();
    let bus = connect(&broker).await;
    let journal = Journal::default();
    let tagged = bus
        .register::<ValueSet, _>(Tagged("tagged", journal.clone()))
        .await;
    bus.register::<ValueSet, _>(Other(journal.clone())).await;

    bus.trigger_for(&tagged, &ValueSet::new(1)).await.unwrap();
    bus.trigger(&ValueSet::new(2)).await.unwrap();

    assert!(wait_until(WAIT, || journal.entries().len() == 3).await);
    assert_eq!(journal.entries(), vec!["tagged:1", "tagged:2", "other:2"]);
    bus.shutdown().await;
}

struct Lingering(Journal);

#[async_trait]
impl EventHandler<ValueSet> for Lingering {
    async fn handle_event(&self, ev: &ValueSet) -> Result<(), HandlerError> {
        self.0.push(format!("start:{}", ev.value));
        tokio::time::sleep(Duration::from_millis(40)).await;
        self.0.push(format!("end:{}", ev.value));
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn consumed_messages_are_handled_one_at_a_time() {
    init_tracing();
    let broker = MemoryBroker::new();
    let bus = connect(&broker).await;
    let journal = Journal::default();
    bus.register::<ValueSet, _>(Lingering(journal.clone())).await;

    bus.trigger(&ValueSet::new(1)).await.unwrap();
    bus.trigger(&ValueSet::new(2)).await.unwrap();

    assert!(wait_until(WAIT, || journal.entries().len() == 4).await);
    assert_eq!(
        journal.entries(),
        vec!["start:1", "end:1", "start:2", "end:2"]
    );
    bus.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn target_header_is_carried_on_the_wire() {
    init_tracing();
    let broker = MemoryBroker::new();
    let bus = connect(&broker).await;

    let channel = ScopedChannel::open(&broker).await.unwrap();
    channel.declare_queue("spy").await.unwrap();
    channel
        .bind_queue("spy", &bus.config().exchange, "ValueSet")
        .await
        .unwrap();
    let mut spy = channel.consume("spy").await.unwrap();

    let key = relaybus::HandlerKey::named("audit");
    bus.trigger_for(&key, &ValueSet::new(4)).await.unwrap();

    let message = within("spy delivery", spy.next()).await.unwrap().unwrap();
    assert_eq!(message.routing_key, "ValueSet");
    assert_eq!(message.header(TARGET_HEADER), Some("audit"));
    let decoded: ValueSet = relaybus::codec::decode(&message.body).unwrap();
    assert_eq!(decoded.value, 4);
    assert_eq!(decoded.record.event_source(), Some("tests"));
    bus.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unregister_all_stops_remote_delivery() {
    init_tracing();
    let broker = MemoryBroker::new();
    let bus = connect(&broker).await;
    let tally = Arc::new(Tally::default());
    bus.register::<ValueSet, _>(ValueHandler(tally.clone())).await;

    bus.trigger(&ValueSet::new(1)).await.unwrap();
    assert!(wait_until(WAIT, || tally.calls() == 1).await);

    let removed = bus.unregister_all::<ValueSet>().await;
    assert_eq!(removed.len(), 1);
    assert!(!bus.has_registration::<ValueSet>());

    bus.trigger(&ValueSet::new(2)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(tally.calls(), 1);
    bus.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn discovered_registrations_are_bound_on_connect() {
    init_tracing();
    let broker = MemoryBroker::new();
    let tally = Arc::new(Tally::default());
    let discovery = StaticDiscovery::new().named::<ValueSet>("discovered");

    let bus = RemoteEventBus::builder(broker.clone())
        .with_config(fast_config())
        .with_discovery(&discovery)
        .connect()
        .await
        .unwrap();
    bus.container().insert_instance::<ValueSet, _>(
        relaybus::HandlerKey::named("discovered"),
        Arc::new(ValueHandler(tally.clone())),
    );

    bus.trigger(&ValueSet::new(5)).await.unwrap();
    assert!(wait_until(WAIT, || tally.last() == Some(5)).await);
    bus.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn publish_failure_surfaces_and_faults() {
    init_tracing();
    let broker = MemoryBroker::new();
    let cfg = BusConfig {
        max_reconnect_attempts: 1,
        ..fast_config()
    };
    let bus = RemoteEventBus::builder(broker.clone())
        .with_config(cfg)
        .connect()
        .await
        .unwrap();

    broker.disconnect().await;
    let err = bus.trigger(&ValueSet::new(1)).await.unwrap_err();
    assert_eq!(err.as_label(), "transport_unavailable");

    let mut state = bus.watch_state();
    within(
        "faulted",
        state.wait_for(|s| *s == ConnectionState::Faulted),
    )
    .await
    .unwrap();
    bus.shutdown().await;
    assert_eq!(broker.open_channels(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn publish_releases_its_channel() {
    init_tracing();
    let broker = MemoryBroker::new();
    let bus = connect(&broker).await;
    let baseline = broker.open_channels();

    for i in 0..5 {
        bus.trigger(&ValueSet::new(i)).await.unwrap();
    }
    bus.register_fn(|_: &ValueSet| {}).await;
    assert_eq!(broker.open_channels(), baseline);

    bus.shutdown().await;
    assert_eq!(broker.open_channels(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reconnect_restores_delivery() {
    init_tracing();
    let broker = MemoryBroker::new();
    let bus = connect(&broker).await;
    let tally = Arc::new(Tally::default());
    bus.register::<ValueSet, _>(ValueHandler(tally.clone())).await;

    let mut state = bus.watch_state();
    broker.disconnect().await;
    within(
        "fault detected",
        state.wait_for(|s| *s != ConnectionState::Ready),
    )
    .await
    .unwrap();

    broker.restore().await;
    within("reconnected", state.wait_for(|s| s.is_connected()))
        .await
        .unwrap();

    bus.trigger(&ValueSet::new(31)).await.unwrap();
    assert!(wait_until(WAIT, || tally.last() == Some(31)).await);
    bus.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn async_trigger_publishes_in_background() {
    init_tracing();
    let broker = MemoryBroker::new();
    let bus = connect(&broker).await;
    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    bus.register_fn(move |_: &ValueSet| {
        h.fetch_add(1, Ordering::SeqCst);
    })
    .await;

    within("async publish", bus.trigger_async(ValueSet::new(1)))
        .await
        .unwrap();
    drop(bus.trigger_async(ValueSet::new(2)));

    assert!(wait_until(WAIT, || hits.load(Ordering::SeqCst) == 2).await);
    bus.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_disconnects_and_rejects_triggers() {
    init_tracing();
    let broker = MemoryBroker::new();
    let bus = connect(&broker).await;
    assert_eq!(bus.state(), ConnectionState::Ready);

    bus.shutdown().await;
    bus.shutdown().await;
    assert_eq!(bus.state(), ConnectionState::Disconnected);

    let err = bus.trigger(&ValueSet::new(1)).await.unwrap_err();
    assert_eq!(err.as_label(), "transport_channel_closed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_deletes_the_private_queue() {
    init_tracing();
    let broker = MemoryBroker::new();
    let stopped = connect(&broker).await;
    let running = connect(&broker).await;
    stopped.register_fn(|_: &ValueSet| {}).await;
    let tally = Arc::new(Tally::default());
    running
        .register::<ValueSet, _>(ValueHandler(tally.clone()))
        .await;
    assert_eq!(broker.queue_count().await, 2);

    stopped.shutdown().await;
    assert_eq!(broker.queue_count().await, 1);

    for i in 0..20 {
        running.trigger(&ValueSet::new(i)).await.unwrap();
    }
    assert!(wait_until(WAIT, || tally.calls() == 20).await);
    assert_eq!(broker.queue_count().await, 1);

    running.shutdown().await;
    assert_eq!(broker.queue_count().await, 0);
}

#[tokio::test]
async fn connect_fails_when_broker_is_down() {
    init_tracing();
    let broker = MemoryBroker::new();
    broker.disconnect().await;

    let err = RemoteEventBus::builder(broker.clone())
        .connect()
        .await
        .unwrap_err();
    assert_eq!(err.as_label(), "transport_unavailable");
    assert!(broker.open_channel().await.is_err());
}
