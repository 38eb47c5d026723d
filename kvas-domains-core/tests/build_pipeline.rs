use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kvas_domains_core::aggregate::SourceHealth;
use kvas_domains_core::budget::UsageTier;
use kvas_domains_core::config::{BuildConfig, SourceSpec};
use kvas_domains_core::contract::{FetchError, Fetcher, MockFetcher, MockSnapshotStore, StoreError};
use kvas_domains_core::pipeline::{
    build, commit, load_previous, run_build, run_with_previous, Severity,
};
use kvas_domains_core::state::PreviousBuild;

const PRIMARY_URL: &str = "https://lists.test/itdog/inside-kvas.lst";

fn numbered(prefix: &str, range: std::ops::Range<usize>) -> String {
    range
        .map(|i| format!("{prefix}{i}.example.com\n"))
        .collect()
}

fn config(extras: &[&str]) -> BuildConfig {
    BuildConfig::new(
        SourceSpec::new("itdog", PRIMARY_URL),
        extras
            .iter()
            .map(|name| SourceSpec::new(*name, format!("https://lists.test/v2fly/{name}")))
            .collect(),
    )
}

fn fetcher_with(bodies: Vec<(&'static str, Result<String, FetchError>)>) -> MockFetcher {
    let mut fetcher = MockFetcher::new();
    fetcher.expect_fetch().returning(move |url: &str| {
        bodies
            .iter()
            .find(|(suffix, _)| url.ends_with(suffix))
            .map(|(_, body)| body.clone().map(String::into_bytes))
            .unwrap_or_else(|| Err(FetchError::http(404)))
    });
    fetcher
}

#[tokio::test]
async fn near_limit_scenario_is_critical_without_truncation() {
    // 1123 primary domains; extras repeat 50 of them and add 707 new ones.
    let primary = numbered("p", 0..1123);
    let extras = format!(
        "# youtube\ninclude:google\n{}{}",
        numbered("p", 0..50),
        numbered("x", 0..707)
    );
    let fetcher = fetcher_with(vec![
        ("inside-kvas.lst", Ok(primary)),
        ("/youtube", Ok(extras)),
    ]);
    let mut cfg = config(&["youtube"]);
    cfg.budget.max_lines = 1850;
    cfg.budget.near_limit_threshold = 1800;

    let report = run_build(&cfg, &fetcher, None).await;

    assert_eq!(report.merge.primary_count, 1123);
    assert_eq!(report.merge.extras_added_total, 707);
    assert_eq!(report.final_domains.len(), 1830);
    assert!(!report.budget.truncated());
    assert_eq!(report.budget.usage_pct, 98.9);
    assert_eq!(report.budget.tier, UsageTier::Critical);
    assert!(report.budget.near_limit);
    assert!(report.status.critical);
    assert!(!report.status.has_errors);

    let youtube = report.extras().next().unwrap();
    assert_eq!(youtube.valid_domains, 757);
    assert_eq!(youtube.extras_added, 707);
    assert_eq!(youtube.skipped_directives, 1);
}

#[tokio::test]
async fn http_500_source_fails_alone() {
    let fetcher = fetcher_with(vec![
        ("inside-kvas.lst", Ok("a.example.com\nb.example.com\n".into())),
        ("/discord", Err(FetchError::http(500))),
        ("/tiktok", Ok("tiktok.com\nfull:a.example.com\n".into())),
    ]);
    let cfg = config(&["discord", "tiktok"]);

    let report = run_build(&cfg, &fetcher, None).await;

    let discord = report.extras().find(|s| s.name == "discord").unwrap();
    assert!(matches!(
        discord.health,
        SourceHealth::Failed {
            http_status: Some(500),
            ..
        }
    ));
    assert_eq!(discord.valid_domains, 0);
    assert_eq!(discord.extras_added, 0);

    let tiktok = report.extras().find(|s| s.name == "tiktok").unwrap();
    assert_eq!(tiktok.extras_added, 1);
    assert_eq!(report.final_domains.len(), 3);
    assert!(report.status.has_errors);
    assert!(!report.status.failed);
    assert_eq!(report.status.severity, Severity::Error);
    assert!(report
        .status
        .warnings
        .iter()
        .any(|w| w == "extras: 1/2 categories failed to download"));
}

#[tokio::test]
async fn identical_inputs_rebuild_to_identical_hash_and_empty_diff() {
    let bodies = vec![
        ("inside-kvas.lst", Ok(numbered("p", 0..20))),
        ("/youtube", Ok(numbered("y", 0..5))),
    ];
    let cfg = config(&["youtube"]);

    let stored: Arc<Mutex<Option<PreviousBuild>>> = Arc::new(Mutex::new(None));

    let mut store = MockSnapshotStore::new();
    let reader = stored.clone();
    store
        .expect_load_previous()
        .times(2)
        .returning(move || Ok(reader.lock().unwrap().clone()));
    let writer = stored.clone();
    store
        .expect_store_current()
        .times(2)
        .returning(move |snapshot: &PreviousBuild| {
            *writer.lock().unwrap() = Some(snapshot.clone());
            Ok(())
        });

    let first = build(&cfg, &fetcher_with(bodies.clone()), &store)
        .await
        .expect("first build stores its snapshot");
    let second = build(&cfg, &fetcher_with(bodies), &store)
        .await
        .expect("second build stores its snapshot");

    assert_eq!(first.content_hash, second.content_hash);
    assert_eq!(first.output_text(), second.output_text());
    assert_eq!(first.diff.output.added.len(), 25);
    assert!(second.diff.is_empty());
    assert_eq!(second.trend.points, 2);
    assert_eq!(second.trend.delta, 0);
}

#[tokio::test]
async fn failed_build_is_not_persisted() {
    let fetcher = fetcher_with(vec![
        ("inside-kvas.lst", Err(FetchError::http(503))),
        ("/youtube", Err(FetchError::transport("dns error"))),
    ]);
    let mut store = MockSnapshotStore::new();
    store.expect_load_previous().return_once(|| Ok(None));
    store.expect_store_current().never();

    let report = build(&config(&["youtube"]), &fetcher, &store)
        .await
        .expect("failed build still yields a report");

    assert!(report.status.failed);
    assert!(report.final_domains.is_empty());
    assert_eq!(report.status.failed_sources.len(), 2);
}

#[tokio::test]
async fn unreadable_previous_snapshot_is_a_warning() {
    let fetcher = fetcher_with(vec![
        ("inside-kvas.lst", Ok("a.example.com\n".into())),
    ]);
    let mut store = MockSnapshotStore::new();
    store.expect_load_previous().return_once(|| {
        Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        )))
    });
    store.expect_store_current().times(1).returning(|_| Ok(()));

    let report = build(&config(&[]), &fetcher, &store).await.unwrap();

    assert_eq!(report.status.severity, Severity::Warning);
    assert!(report
        .status
        .warnings
        .iter()
        .any(|w| w.starts_with("state: previous snapshot unreadable")));
    assert_eq!(report.diff.output.added.len(), 1);
}

#[tokio::test]
async fn load_and_run_without_commit_leaves_store_alone() {
    let fetcher = fetcher_with(vec![("inside-kvas.lst", Ok("a.example.com\n".into()))]);
    let mut store = MockSnapshotStore::new();
    store
        .expect_load_previous()
        .return_once(|| Err(StoreError::Corrupt(serde_json::from_str::<u8>("x").unwrap_err())));
    store.expect_store_current().never();

    let previous = load_previous(&store);
    let report = run_with_previous(&config(&[]), &fetcher, &previous).await;

    assert!(previous.snapshot.is_none());
    assert_eq!(report.status.severity, Severity::Warning);
    assert!(report
        .status
        .warnings
        .iter()
        .any(|w| w.starts_with("state: previous snapshot unreadable")));
}

#[tokio::test]
async fn commit_skips_failed_builds() {
    let fetcher = fetcher_with(vec![("inside-kvas.lst", Err(FetchError::http(502)))]);
    let mut store = MockSnapshotStore::new();
    store.expect_store_current().never();

    let report = run_build(&config(&[]), &fetcher, None).await;

    assert!(!commit(&report, &store).unwrap());
}

/// Answers the primary immediately and stalls on every other URL.
struct StallingFetcher;

#[async_trait]
impl Fetcher for StallingFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        if url == PRIMARY_URL {
            return Ok(b"a.example.com\n".to_vec());
        }
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(b"never.example.com\n".to_vec())
    }
}

#[tokio::test(start_paused = true)]
async fn slow_source_times_out_without_blocking_siblings() {
    let mut cfg = config(&["slow"]);
    cfg.fetch.timeout_secs = 5;

    let report = run_build(&cfg, &StallingFetcher, None).await;

    let slow = report.extras().next().unwrap();
    assert_eq!(
        slow.health,
        SourceHealth::Failed {
            reason: "timed out after 5s".into(),
            http_status: None
        }
    );
    assert_eq!(report.final_domains.len(), 1);
}
