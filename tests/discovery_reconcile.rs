mod common;

use common::{context, session_config, PageScript, ScriptedExtractor};
use cornerwatch::config::{DiscoveryConfig, SourceConfig};
use cornerwatch::coordination::Wakeup;
use cornerwatch::domain::CloseReason;
use cornerwatch::services::DiscoveryService;
use cornerwatch::WatchError;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::time::sleep;

fn ids(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test(start_paused = true)]
async fn reconcile_replaces_vanished_and_adds_new() {
    let extractor = ScriptedExtractor::new();
    extractor.script("B", PageScript::default().corners(&[&["5' 主队 角球"]]));
    let ctx = context(extractor.clone(), session_config());
    let discovery = DiscoveryService::new(
        ctx.clone(),
        DiscoveryConfig::default(),
        &SourceConfig::default(),
        Wakeup::new(),
    );

    extractor.set_listing(&["A", "B", "C"]);
    let first = discovery.run_once().await.unwrap();
    assert_eq!(first.added.len(), 3);
    sleep(Duration::from_secs(4)).await;
    let b_before = ctx.book.get("B").await.unwrap().ledger.corners.entries().to_vec();
    assert_eq!(b_before, vec!["5' 主队 角球".to_string()]);

    extractor.set_listing(&["B", "C", "D"]);
    let second = discovery.run_once().await.unwrap();
    assert_eq!(second.retired, vec!["A".to_string()]);
    assert_eq!(second.added, vec!["D".to_string()]);
    assert_eq!(second.kept, 2);
    assert_eq!(ctx.registry.ids().await, ids(&["B", "C", "D"]));
    assert_eq!(ctx.metrics.closed(CloseReason::Vanished), 1);

    let b_after = ctx.book.get("B").await.unwrap().ledger.corners.entries().to_vec();
    assert_eq!(b_before, b_after);

    // A's page went back, the rest stay open
    assert_eq!(extractor.closed(), 1);

    // same listing again: nothing moves
    let third = discovery.run_once().await.unwrap();
    assert!(third.is_noop());
    assert_eq!(ctx.registry.ids().await, ids(&["B", "C", "D"]));
}

#[tokio::test(start_paused = true)]
async fn failed_listing_keeps_every_session() {
    let extractor = ScriptedExtractor::new();
    let ctx = context(extractor.clone(), session_config());
    let discovery = DiscoveryService::new(
        ctx.clone(),
        DiscoveryConfig::default(),
        &SourceConfig::default(),
        Wakeup::new(),
    );

    extractor.set_listing(&["A", "B"]);
    discovery.run_once().await.unwrap();

    extractor.fail_listing();
    let err = discovery.run_once().await.unwrap_err();
    assert!(matches!(err, WatchError::Discovery(_)));
    assert_eq!(ctx.registry.ids().await, ids(&["A", "B"]));
    assert_eq!(extractor.closed(), 0);
}

#[tokio::test(start_paused = true)]
async fn rediscovered_match_resumes_its_ledger() {
    let extractor = ScriptedExtractor::new();
    extractor.script("A", PageScript::default().corners(&[&["10' 客队 角球"]]));
    let ctx = context(extractor.clone(), session_config());
    let discovery = DiscoveryService::new(
        ctx.clone(),
        DiscoveryConfig::default(),
        &SourceConfig::default(),
        Wakeup::new(),
    );

    extractor.set_listing(&["A"]);
    discovery.run_once().await.unwrap();
    sleep(Duration::from_secs(1)).await;

    extractor.set_listing(&[]);
    discovery.run_once().await.unwrap();
    assert!(ctx.registry.is_empty().await);

    extractor.set_listing(&["A"]);
    discovery.run_once().await.unwrap();
    sleep(Duration::from_secs(4)).await;

    let record = ctx.book.get("A").await.unwrap();
    assert_eq!(record.ledger.corners.len(), 1);
    assert_eq!(extractor.opened(), 2);
}
