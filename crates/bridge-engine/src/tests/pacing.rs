//! Inter-write gap enforcement and priority ordering.

use super::harness::TestBridge;
use crate::dispatcher::{RawSendOptions, ReadOptions};
use qlink_protocol::SwitchAddress;
use std::time::Duration;

/// Scheduler jitter allowance.
const EPSILON: Duration = Duration::from_millis(5);

/// Consecutive controller writes are separated by at least the gap.
#[tokio::test]
async fn writes_respect_min_gap() {
    let t = TestBridge::start_with(|c| c.min_gap_ms = 100).await;

    let mut tasks = Vec::new();
    for i in 1..=4u16 {
        let bridge = t.bridge.clone();
        let addr = SwitchAddress::new(i, i, i);
        tasks.push(tokio::spawn(async move {
            bridge.switch_read(addr, ReadOptions::default()).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let received = t.controller.received_lines();
    assert_eq!(received.len(), 4);
    for pair in received.windows(2) {
        let spacing = pair[1].at.duration_since(pair[0].at);
        assert!(
            spacing + EPSILON >= Duration::from_millis(100),
            "writes {:?} and {:?} only {:?} apart",
            pair[0].line,
            pair[1].line,
            spacing
        );
    }

    t.stop();
}

/// A priority-10 write enqueued while the pumper is waiting out the gap is
/// sent before an earlier-enqueued priority-0 read.
#[tokio::test]
async fn write_beats_read_during_gap() {
    let t = TestBridge::start_with(|c| c.min_gap_ms = 200).await;

    // First read lands immediately and arms the gap.
    t.bridge
        .switch_read(SwitchAddress::new(1, 1, 1), ReadOptions::default())
        .await
        .unwrap();
    t.controller.wait_for_received(1, Duration::from_secs(1)).await;

    // During the 200 ms gap: a read goes in first, then a write.
    let bridge = t.bridge.clone();
    let read_task = tokio::spawn(async move {
        bridge
            .switch_read(SwitchAddress::new(2, 2, 2), ReadOptions::default())
            .await
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    let bridge = t.bridge.clone();
    let write_task = tokio::spawn(async move {
        bridge.switch_write(SwitchAddress::new(3, 3, 3), 1, 0).await
    });

    write_task.await.unwrap().unwrap();
    read_task.await.unwrap().unwrap();

    let received = t.controller.received_lines();
    assert_eq!(received.len(), 3);
    assert!(received[1].line.starts_with("VSW"), "write first: {:?}", received);
    assert!(received[2].line.starts_with("VGS"), "read second: {:?}", received);

    t.stop();
}

/// The full ladder: switch write (10), raw send (5), read (0).
#[tokio::test]
async fn priority_ladder_ordering() {
    let t = TestBridge::start_with(|c| c.min_gap_ms = 250).await;

    t.bridge
        .switch_read(SwitchAddress::new(1, 1, 1), ReadOptions::default())
        .await
        .unwrap();
    t.controller.wait_for_received(1, Duration::from_secs(1)).await;

    // Enqueue lowest first while the gap is pending.
    let bridge = t.bridge.clone();
    let read_task = tokio::spawn(async move {
        bridge
            .switch_read(SwitchAddress::new(2, 2, 2), ReadOptions::default())
            .await
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    let bridge = t.bridge.clone();
    let raw_task = tokio::spawn(async move {
        bridge.raw_send("VQM", RawSendOptions::default()).await
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    let bridge = t.bridge.clone();
    let write_task = tokio::spawn(async move {
        bridge.switch_write(SwitchAddress::new(3, 3, 3), 1, 0).await
    });

    write_task.await.unwrap().unwrap();
    raw_task.await.unwrap().unwrap();
    read_task.await.unwrap().unwrap();

    let lines: Vec<String> = t
        .controller
        .received_lines()
        .iter()
        .map(|r| r.line.clone())
        .collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[1].starts_with("VSW"), "order was {:?}", lines);
    assert_eq!(lines[2], "VQM", "order was {:?}", lines);
    assert!(lines[3].starts_with("VGS"), "order was {:?}", lines);

    t.stop();
}

/// Equal priorities drain oldest first.
#[tokio::test]
async fn equal_priority_is_fifo() {
    let t = TestBridge::start_with(|c| c.min_gap_ms = 150).await;

    t.bridge
        .switch_read(SwitchAddress::new(1, 1, 1), ReadOptions::default())
        .await
        .unwrap();
    t.controller.wait_for_received(1, Duration::from_secs(1)).await;

    let mut tasks = Vec::new();
    for i in 2..=4u16 {
        let bridge = t.bridge.clone();
        tasks.push(tokio::spawn(async move {
            bridge
                .switch_read(SwitchAddress::new(i, i, i), ReadOptions::default())
                .await
        }));
        tokio::time::sleep(Duration::from_millis(15)).await;
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let lines: Vec<String> = t
        .controller
        .received_lines()
        .iter()
        .map(|r| r.line.clone())
        .collect();
    assert_eq!(
        &lines[1..],
        &["VGS# 2 2 2", "VGS# 3 3 3", "VGS# 4 4 4"],
        "submission order preserved"
    );

    t.stop();
}
