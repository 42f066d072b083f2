//! Row channel properties under real threads.

use hopline::channel::{ChannelError, Poll, RowChannel};
use hopline::prelude::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn schema() -> Arc<RowSchema> {
    Arc::new(RowSchema::new(vec![ValueMeta::new("n", DataType::Integer)]))
}

fn row(schema: &Arc<RowSchema>, n: i64) -> Row {
    Row::new(Arc::clone(schema), vec![Value::Integer(n)]).unwrap()
}

#[test]
fn test_no_row_lost_or_duplicated_through_small_buffer() {
    let ch = Arc::new(RowChannel::new(ChannelId::new(1), 3));
    let s = schema();

    let producer = {
        let ch = Arc::clone(&ch);
        thread::spawn(move || {
            for n in 0..5_000 {
                ch.put(row(&s, n)).unwrap();
            }
            ch.mark_producer_done();
        })
    };

    let mut got = vec![];
    while let Some(r) = ch.get().unwrap() {
        match r.value(0) {
            Some(Value::Integer(n)) => got.push(*n),
            other => panic!("unexpected value {other:?}"),
        }
        assert!(ch.len() <= 3);
    }
    producer.join().unwrap();

    assert_eq!(got, (0..5_000).collect::<Vec<_>>());
    let stats = ch.stats().snapshot();
    assert_eq!(stats.rows_put, 5_000);
    assert_eq!(stats.rows_taken, 5_000);
    assert!(stats.peak_depth <= 3);
}

#[test]
fn test_put_blocks_at_capacity_until_get() {
    let ch = Arc::new(RowChannel::new(ChannelId::new(2), 2));
    let s = schema();

    let producer = {
        let ch = Arc::clone(&ch);
        let s = Arc::clone(&s);
        thread::spawn(move || {
            for n in 0..3 {
                ch.put(row(&s, n)).unwrap();
            }
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert_eq!(ch.len(), 2);
    assert!(!producer.is_finished());

    assert!(ch.get().unwrap().is_some());
    producer.join().unwrap();
    assert_eq!(ch.len(), 2);
}

#[test]
fn test_abort_releases_blocked_put() {
    let ch = Arc::new(RowChannel::new(ChannelId::new(3), 1));
    let s = schema();
    ch.put(row(&s, 0)).unwrap();

    let producer = {
        let ch = Arc::clone(&ch);
        thread::spawn(move || ch.put(row(&s, 1)))
    };
    thread::sleep(Duration::from_millis(30));
    ch.abort();

    assert_eq!(producer.join().unwrap(), Err(ChannelError::Aborted));
    assert!(matches!(ch.get(), Err(ChannelError::Aborted)));
    assert!(matches!(ch.try_get(), Err(ChannelError::Aborted)));
}

#[test]
fn test_producer_done_releases_blocked_get() {
    let ch = Arc::new(RowChannel::new(ChannelId::new(4), 4));

    let consumer = {
        let ch = Arc::clone(&ch);
        thread::spawn(move || ch.get())
    };
    thread::sleep(Duration::from_millis(30));
    ch.mark_producer_done();
    ch.mark_producer_done();

    assert!(matches!(consumer.join().unwrap(), Ok(None)));
    assert!(matches!(ch.try_get(), Ok(Poll::EndOfStream)));
    assert!(ch.is_drained());
}

#[test]
fn test_rows_queued_before_done_are_still_delivered() {
    let ch = RowChannel::new(ChannelId::new(5), 4);
    let s = schema();
    ch.put(row(&s, 7)).unwrap();
    ch.mark_producer_done();

    assert_eq!(ch.put(row(&s, 8)), Err(ChannelError::Closed));
    assert!(matches!(ch.try_get(), Ok(Poll::Item(_))));
    assert!(matches!(ch.get(), Ok(None)));
}
