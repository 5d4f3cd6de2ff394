use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio::sync::Notify;
use tokio::time::timeout;
use tradewatch_core::HighWaterMark;
use tradewatch_engine::{
    start_polling, AuthError, Error, PageSource, PollEvent, PollSettings, Updates,
};

/// One scripted cycle: items to push, then the mark to return or an error.
enum Cycle {
    Emit(Vec<i64>, i64),
    Fail,
}

struct ScriptedSource {
    cycles: Mutex<VecDeque<Cycle>>,
    calls: AtomicUsize,
    seen_marks: Mutex<Vec<HighWaterMark>>,
    /// When set, every cycle waits here after its first item.
    gate: Option<Arc<Notify>>,
}

impl ScriptedSource {
    fn new(cycles: Vec<Cycle>) -> Arc<Self> {
        Arc::new(Self {
            cycles: Mutex::new(cycles.into()),
            calls: AtomicUsize::new(0),
            seen_marks: Mutex::new(Vec::new()),
            gate: None,
        })
    }

    fn gated(cycles: Vec<Cycle>, gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            cycles: Mutex::new(cycles.into()),
            calls: AtomicUsize::new(0),
            seen_marks: Mutex::new(Vec::new()),
            gate: Some(gate),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageSource for ScriptedSource {
    type Item = i64;

    async fn fetch_since(
        &self,
        mark: HighWaterMark,
        updates: &Updates<i64>,
    ) -> Result<HighWaterMark, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_marks.lock().unwrap().push(mark);
        let cycle = self.cycles.lock().unwrap().pop_front();
        match cycle {
            Some(Cycle::Emit(items, next)) => {
                for (index, item) in items.into_iter().enumerate() {
                    if !updates.push(item).await {
                        return Ok(mark);
                    }
                    if index == 0 {
                        if let Some(gate) = &self.gate {
                            gate.notified().await;
                        }
                    }
                }
                Ok(HighWaterMark::new(next))
            }
            Some(Cycle::Fail) => Err(AuthError::NotLoggedIn.into()),
            None => Ok(mark),
        }
    }
}

fn settings() -> PollSettings {
    PollSettings {
        interval: Duration::from_millis(10),
        channel_capacity: 1,
    }
}

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn items_arrive_in_order_across_cycles() {
    let source = ScriptedSource::new(vec![
        Cycle::Emit(vec![50, 48], 50),
        Cycle::Emit(vec![], 50),
        Cycle::Emit(vec![53, 52, 51], 53),
    ]);
    let mut handle = start_polling(source.clone(), HighWaterMark::new(45), &settings());

    let mut received = Vec::new();
    while received.len() < 5 {
        let item = timeout(WAIT, handle.next_item()).await.unwrap().unwrap();
        received.push(item);
    }
    assert_eq!(received, vec![50, 48, 53, 52, 51]);

    let mut marks = handle.mark_updates();
    timeout(WAIT, marks.wait_for(|mark| mark.get() == 53))
        .await
        .unwrap()
        .unwrap();
    let final_mark = handle.shutdown().await;
    assert_eq!(final_mark, HighWaterMark::new(53));
}

#[tokio::test]
async fn each_cycle_starts_from_the_previous_mark() {
    let source = ScriptedSource::new(vec![
        Cycle::Emit(vec![], 10),
        Cycle::Emit(vec![], 20),
        Cycle::Emit(vec![], 30),
    ]);
    let handle = start_polling(source.clone(), HighWaterMark::UNINITIALIZED, &settings());

    let mut marks = handle.mark_updates();
    timeout(WAIT, marks.wait_for(|mark| mark.get() == 30))
        .await
        .unwrap()
        .unwrap();
    handle.shutdown().await;

    let seen = source.seen_marks.lock().unwrap().clone();
    assert_eq!(
        &seen[..3],
        &[
            HighWaterMark::UNINITIALIZED,
            HighWaterMark::new(10),
            HighWaterMark::new(20)
        ]
    );
}

#[tokio::test]
async fn mark_never_moves_backwards() {
    let source = ScriptedSource::new(vec![Cycle::Emit(vec![], 40), Cycle::Emit(vec![], 35)]);
    let handle = start_polling(source.clone(), HighWaterMark::new(30), &settings());

    let mut marks = handle.mark_updates();
    timeout(WAIT, marks.wait_for(|mark| mark.get() == 40))
        .await
        .unwrap()
        .unwrap();
    while source.calls() < 3 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(handle.current_mark(), HighWaterMark::new(40));
    handle.shutdown().await;
}

#[tokio::test]
async fn failed_cycle_is_reported_and_polling_continues() {
    let source = ScriptedSource::new(vec![
        Cycle::Emit(vec![7], 7),
        Cycle::Fail,
        Cycle::Emit(vec![9, 8], 9),
    ]);
    let mut handle = start_polling(source.clone(), HighWaterMark::new(5), &settings());

    let mut events = Vec::new();
    while events.len() < 4 {
        let event = timeout(WAIT, handle.next_event()).await.unwrap().unwrap();
        events.push(event);
    }

    let items: Vec<i64> = events
        .iter()
        .filter_map(|event| match event {
            PollEvent::Item(item) => Some(*item),
            PollEvent::Error(_) => None,
        })
        .collect();
    assert_eq!(items, vec![7, 9, 8]);

    let error = events
        .iter()
        .find_map(|event| match event {
            PollEvent::Error(error) => Some(error),
            PollEvent::Item(_) => None,
        })
        .unwrap();
    assert_eq!(error.mark, HighWaterMark::new(7));
    assert!(matches!(error.source, Error::Auth(AuthError::NotLoggedIn)));

    handle.shutdown().await;
    assert_eq!(source.seen_marks.lock().unwrap()[2], HighWaterMark::new(7));
}

#[tokio::test]
async fn unread_errors_do_not_hold_back_items() {
    let source = ScriptedSource::new(vec![
        Cycle::Fail,
        Cycle::Fail,
        Cycle::Fail,
        Cycle::Emit(vec![11], 11),
    ]);
    let mut handle = start_polling(source.clone(), HighWaterMark::new(10), &settings());

    assert_eq!(timeout(WAIT, handle.next_item()).await.unwrap(), Some(11));
    assert!(source.calls() >= 4);

    // Only the first error fits the buffer; the rest were dropped.
    let kept = timeout(WAIT, handle.next_error()).await.unwrap().unwrap();
    assert_eq!(kept.mark, HighWaterMark::new(10));
    handle.shutdown().await;
}

#[tokio::test]
async fn nothing_is_delivered_after_cancel() {
    let gate = Arc::new(Notify::new());
    let source = ScriptedSource::gated(vec![Cycle::Emit(vec![3, 2, 1], 3)], gate.clone());
    let mut handle = start_polling(source.clone(), HighWaterMark::new(0), &settings());

    let first = timeout(WAIT, handle.next_item()).await.unwrap();
    assert_eq!(first, Some(3));

    handle.cancel();
    gate.notify_one();
    assert!(handle.is_cancelled());
    assert_eq!(timeout(WAIT, handle.next_item()).await.unwrap(), None);
    assert!(timeout(WAIT, handle.next_event()).await.unwrap().is_none());
    assert!(timeout(WAIT, handle.next_error()).await.unwrap().is_none());

    // The interrupted cycle does not advance the mark.
    assert_eq!(handle.shutdown().await, HighWaterMark::new(0));
}

#[tokio::test]
async fn canceller_stops_polling_from_another_task() {
    let source = ScriptedSource::new(Vec::new());
    let mut handle = start_polling(source.clone(), HighWaterMark::new(1), &settings());

    let canceller = handle.canceller();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        canceller.cancel();
    });

    assert_eq!(timeout(WAIT, handle.next_item()).await.unwrap(), None);
    assert!(handle.is_cancelled());
}

#[tokio::test]
async fn dropping_the_handle_stops_the_source() {
    let source = ScriptedSource::new(Vec::new());
    let handle = start_polling(source.clone(), HighWaterMark::new(1), &settings());

    while source.calls() < 2 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    drop(handle);
    tokio::time::sleep(Duration::from_millis(30)).await;
    let after_drop = source.calls();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(source.calls(), after_drop);
}

#[tokio::test]
async fn first_fetch_waits_one_interval() {
    let source = ScriptedSource::new(Vec::new());
    let settings = PollSettings {
        interval: Duration::from_millis(200),
        channel_capacity: 1,
    };
    let handle = start_polling(source.clone(), HighWaterMark::new(1), &settings);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(source.calls(), 0);
    handle.shutdown().await;
}
