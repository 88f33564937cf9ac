//! Cross-thread behavior of message queues and service handles.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use service_runtime::core::block::{MessageBlock, SessionId};
use service_runtime::core::queue::MessageQueue;
use service_runtime::core::stream::Stream;
use service_runtime::error::Result;
use service_runtime::service::{Facade, FacadeEvents, Service, ServiceContext, ServiceKind};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const PRODUCERS: u64 = 4;
const PER_PRODUCER: u32 = 1000;

fn tagged(producer: u64, seq: u32) -> MessageBlock {
    MessageBlock::data(SessionId(producer), seq.to_be_bytes().to_vec())
}

fn seq_of(block: &MessageBlock) -> u32 {
    u32::from_be_bytes(block.payload().try_into().unwrap())
}

#[test]
fn queue_delivers_every_block_once_in_producer_order() {
    let queue = MessageQueue::unbounded();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let queue = queue.clone();
            thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    queue.push_back(tagged(producer, seq)).unwrap();
                }
            })
        })
        .collect();

    let consumer = {
        let queue = queue.clone();
        thread::spawn(move || {
            let total = (PRODUCERS * u64::from(PER_PRODUCER)) as usize;
            let mut next: HashMap<u64, u32> = HashMap::new();
            let mut seen = 0;
            while seen < total {
                let Some(block) = queue.try_pop_front() else {
                    thread::yield_now();
                    continue;
                };
                let expected = next.entry(block.session().0).or_insert(0);
                assert_eq!(seq_of(&block), *expected, "producer {} reordered", block.session());
                *expected += 1;
                seen += 1;
            }
            next
        })
    };

    for producer in producers {
        producer.join().unwrap();
    }
    let next = consumer.join().unwrap();

    assert_eq!(next.len(), PRODUCERS as usize);
    assert!(next.values().all(|&count| count == PER_PRODUCER));
    assert!(queue.try_pop_front().is_none());
}

#[test]
fn bounded_queue_rejects_without_blocking() {
    let queue = MessageQueue::bounded(2);
    queue.push_back(tagged(0, 0)).unwrap();
    queue.push_back(tagged(0, 1)).unwrap();

    let rejected = queue.try_push_back(tagged(0, 2)).unwrap_err();
    assert_eq!(seq_of(&rejected), 2);
    assert!(queue.push_back(tagged(0, 3)).is_err());

    assert_eq!(seq_of(&queue.try_pop_front().unwrap()), 0);
    queue.push_back(tagged(0, 4)).unwrap();
    assert_eq!(queue.len(), 2);
}

#[test]
fn drain_respects_budget() {
    let queue = MessageQueue::unbounded();
    for seq in 0..10 {
        queue.push_back(tagged(1, seq)).unwrap();
    }

    let mut batch = Vec::new();
    assert_eq!(queue.drain_into(&mut batch, 4), 4);
    assert_eq!(queue.len(), 6);
    let seqs: Vec<u32> = batch.iter().map(seq_of).collect();
    assert_eq!(seqs, vec![0, 1, 2, 3]);

    assert_eq!(queue.clear(), 6);
    assert!(queue.is_empty());
}

struct Counter {
    packets: Arc<AtomicUsize>,
}

impl Facade for Counter {
    fn events(&self) -> FacadeEvents {
        FacadeEvents::DATA_ARRIVAL
    }

    fn on_data_arrival(
        &mut self,
        _ctx: &mut ServiceContext<'_>,
        _session: SessionId,
        _opcode: u32,
        _payload: &mut Stream,
    ) -> Result<()> {
        self.packets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_handles_feed_one_service() {
    use tokio::task::JoinSet;

    let packets = Arc::new(AtomicUsize::new(0));
    let mut service = Service::create("fan-in", ServiceKind::Raw);
    service
        .register_facade(Counter {
            packets: Arc::clone(&packets),
        })
        .unwrap();
    assert!(service.start().unwrap());

    let mut tasks = JoinSet::new();
    for producer in 0..8u64 {
        let io = service.handle();
        tasks.spawn(async move {
            for seq in 0..500u32 {
                io.push_data(SessionId(producer + 1), seq.to_be_bytes().to_vec())
                    .unwrap();
                if seq % 100 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        });
    }
    while let Some(res) = tasks.join_next().await {
        res.unwrap();
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while packets.load(Ordering::SeqCst) < 4000 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    service.stop();

    assert_eq!(packets.load(Ordering::SeqCst), 4000);
    let snapshot = service.metrics().snapshot();
    assert_eq!(snapshot.blocks_received, 4000);
    assert_eq!(snapshot.packets_decoded, 4000);
}
