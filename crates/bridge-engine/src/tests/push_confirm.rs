//! Push events becoming confirmed state.

use super::harness::TestBridge;
use crate::cache::SwitchSource;
use crate::dispatcher::{CacheState, ReadOptions};
use qlink_protocol::SwitchAddress;
use std::time::{Duration, Instant};

/// S4: a whitelisted `SW` press debounces, triggers exactly one confirm
/// read, and the confirmed value serves later reads with no further writes.
#[tokio::test]
async fn push_event_confirms_and_serves() {
    let t = TestBridge::start_with(|c| c.debounce_ms = 100).await;
    let addr = SwitchAddress::new(2, 20, 7);

    let (_, _, _, _, whitelist) = t.bridge.parts();
    whitelist.replace([addr].into_iter().collect());
    t.controller.set_switch(2, 20, 7, 1);

    t.controller.send_unsolicited("SW 2 20 7 1").await;

    // One confirm read after the debounce.
    t.controller.wait_for_received(1, Duration::from_secs(2)).await;
    assert_eq!(t.controller.received_lines()[0].line, "VGS# 2 20 7");

    // Confirmed state lands shortly after the reply.
    let deadline = Instant::now() + Duration::from_secs(1);
    let (_, _, _, push_state, _) = t.bridge.parts();
    loop {
        if let Some(state) = push_state.get(&addr) {
            assert_eq!(state.value, 1);
            break;
        }
        assert!(Instant::now() < deadline, "push state never confirmed");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // A poll inside the freshness window is served from push state.
    let reading = t
        .bridge
        .switch_read(addr, ReadOptions::default())
        .await
        .unwrap();
    assert_eq!(reading.value, 1);
    assert_eq!(reading.source, SwitchSource::PushState);
    assert_eq!(reading.cache_state, CacheState::Hit);
    assert_eq!(t.controller.received_count(), 1, "no additional write");

    t.stop();
}

/// A burst of press events collapses into a single confirm.
#[tokio::test]
async fn press_burst_confirms_once() {
    let t = TestBridge::start_with(|c| c.debounce_ms = 120).await;
    let addr = SwitchAddress::new(2, 20, 7);

    let (_, _, _, _, whitelist) = t.bridge.parts();
    whitelist.replace([addr].into_iter().collect());
    t.controller.set_switch(2, 20, 7, 1);

    for _ in 0..4 {
        t.controller.send_unsolicited("SW 2 20 7 1").await;
        tokio::time::sleep(Duration::from_millis(30)).await;
    }

    t.controller.wait_for_received(1, Duration::from_secs(2)).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(t.controller.received_count(), 1, "burst debounced to one confirm");

    t.stop();
}

/// Events for non-whitelisted addresses never reach the wire. The default
/// whitelist is empty and strict, so everything drops.
#[tokio::test]
async fn non_whitelisted_event_ignored() {
    let t = TestBridge::start_with(|c| c.debounce_ms = 50).await;

    t.controller.send_unsolicited("SW 9 9 9 1").await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(t.controller.received_count(), 0);
    assert_eq!(t.bridge.status().push_state_entries, 0);

    t.stop();
}

/// With strictness off, an empty whitelist allows everything.
#[tokio::test]
async fn permissive_empty_whitelist_allows() {
    let t = TestBridge::start_with(|c| {
        c.debounce_ms = 50;
        c.whitelist_strict = false;
    })
    .await;
    t.controller.set_switch(5, 5, 5, 1);

    t.controller.send_unsolicited("SW 5 5 5 1").await;
    t.controller.wait_for_received(1, Duration::from_secs(2)).await;
    assert_eq!(t.controller.received_lines()[0].line, "VGS# 5 5 5");

    t.stop();
}

/// A release event (v=0) confirms noticeably faster than the press debounce.
#[tokio::test]
async fn release_confirms_fast() {
    let t = TestBridge::start_with(|c| c.debounce_ms = 400).await;
    let addr = SwitchAddress::new(2, 20, 7);

    let (_, _, _, _, whitelist) = t.bridge.parts();
    whitelist.replace([addr].into_iter().collect());

    let sent_at = Instant::now();
    t.controller.send_unsolicited("SW 2 20 7 0").await;
    t.controller.wait_for_received(1, Duration::from_secs(2)).await;

    let confirm_at = t.controller.received_lines()[0].at;
    assert!(
        confirm_at.duration_since(sent_at) < Duration::from_millis(300),
        "release confirm should beat the 400 ms press debounce"
    );

    t.stop();
}
