mod common;

use common::{temp_path, PageScript, ScriptedExtractor};
use cornerwatch::config::AppConfig;
use cornerwatch::coordination::ShutdownSignal;
use cornerwatch::persistence::{CornerSnapshot, CornerStats, EventArchive};
use cornerwatch::CornerMonitor;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

fn config(tag: &str) -> AppConfig {
    let dir = temp_path(tag);
    let mut cfg = AppConfig::default();
    cfg.persistence.output_path = dir.join("corner_only_data.json");
    cfg.persistence.archive_path = dir.join("match_events_data.json");
    cfg.persistence.home_marker = "side-A".to_string();
    cfg.persistence.away_marker = "side-B".to_string();
    cfg
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> T {
    let body = tokio::fs::read_to_string(path).await.unwrap();
    serde_json::from_str(&body).unwrap()
}

#[tokio::test(start_paused = true)]
async fn duplicate_corner_is_dropped_and_sides_are_counted() {
    let cfg = config("e2e");
    let extractor = ScriptedExtractor::new();
    extractor.script(
        "m1",
        PageScript::default().scores(&["0:0"]).corners(&[
            &["15' side-A event"],
            &["15' side-A event"],
            &["23' side-B event"],
        ]),
    );
    extractor.script(
        "m2",
        PageScript::default().corners(&[&["40' side-B event"]]),
    );
    extractor.set_listing(&["m1", "m2"]);

    let monitor = Arc::new(CornerMonitor::new(cfg.clone(), extractor.clone()));
    let shutdown = monitor.shutdown_handle();
    let running = {
        let monitor = monitor.clone();
        tokio::spawn(async move { monitor.run().await })
    };

    // three polls at 3s, well inside the 200s zero-score limit
    sleep(Duration::from_secs(8)).await;

    let mid: CornerSnapshot = read_json(&cfg.persistence.output_path).await;
    assert_eq!(mid.total_matches, 2);

    shutdown.request_shutdown(ShutdownSignal::Graceful);
    running.await.unwrap().unwrap();

    let snapshot: CornerSnapshot = read_json(&cfg.persistence.output_path).await;
    let m1 = &snapshot.matches["m1"];
    assert_eq!(
        m1.events,
        vec!["15' side-A event".to_string(), "23' side-B event".to_string()]
    );
    assert_eq!(
        m1.stats,
        CornerStats {
            total: 2,
            home: 1,
            away: 1
        }
    );
    assert_eq!(m1.match_info.status, "in progress");
    assert_eq!(m1.match_info.score, "0:0");

    // the other match survives every flush
    assert_eq!(snapshot.matches["m2"].stats.away, 1);
    assert_eq!(snapshot.total_corners, 3);

    let archive: EventArchive = read_json(&cfg.persistence.archive_path).await;
    assert!(archive.contains_key("m1"));

    // every page released exactly once on the way out
    assert_eq!(extractor.opened(), 2);
    assert_eq!(extractor.closed(), 2);
    assert!(monitor.registry().is_empty().await);
    tokio_test::assert_ok!(tokio::fs::metadata(&cfg.persistence.output_path).await);

    if let Some(dir) = cfg.persistence.output_path.parent() {
        let _ = tokio::fs::remove_dir_all(dir).await;
    }
}
