//! Retry queue runs against a real archive root

mod common;

use common::{article_name, init_tracing, queue_lines, test_config};
use ocr_harvest::{ChecksumAlgorithm, Error, RetryQueueManager};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A reorganized bundle directory for `paper_id` plus its marker symlink
fn reorganized_bundle(root: &Path, paper_id: &str) -> PathBuf {
    let bundle = format!("DDD_ddd_{}", paper_id);
    let dest = root.join("1921").join("1921-03-04").join(&bundle);
    std::fs::create_dir_all(&dest).unwrap();
    let tail = root.join(&paper_id[paper_id.len() - 2..]);
    std::fs::create_dir_all(&tail).unwrap();
    ocr_harvest::utils::symlink_dir(&dest, &tail.join(&bundle)).unwrap();
    dest
}

#[tokio::test]
async fn test_item_for_absent_bundle_is_left_unchanged() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let queue = dir.path().join("missing.txt");
    let line = article_name("0007");
    std::fs::write(&queue, format!("{}\n", line)).unwrap();

    let mut config = test_config(dir.path());
    config.queue.max_passes = Some(1);
    let mut manager = RetryQueueManager::new(&config).unwrap();
    let report = manager.run().await.unwrap();

    assert_eq!(report.passes, 1);
    assert_eq!(report.fetched, 0);
    assert_eq!(queue_lines(&queue), vec![line]);
}

#[tokio::test]
async fn test_queue_keeps_exactly_the_unfetched_items() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"goed".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wrong"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"anders".to_vec()))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let bundle = reorganized_bundle(root, "010000001");
    let md5 = ChecksumAlgorithm::Md5.digest_hex(b"goed");

    let fetched = format!("{} {} {}/ok", article_name("0001"), md5, server.uri());
    let kept = vec![
        format!("{} {} {}/broken", article_name("0002"), md5, server.uri()),
        format!("{} {} {}/wrong", article_name("0003"), md5, server.uri()),
        "DDD_020000002_0001_articletext.xml".to_string(),
        "not a queue line".to_string(),
        "README.txt".to_string(),
    ];
    let mut all = vec![fetched];
    all.extend(kept.iter().cloned());
    let queue = root.join("missing.txt");
    std::fs::write(&queue, all.join("\n")).unwrap();

    let mut config = test_config(root);
    config.queue.max_passes = Some(3);
    let mut manager = RetryQueueManager::new(&config).unwrap();
    let report = manager.run().await.unwrap();

    assert_eq!(report.passes, 3);
    assert_eq!(report.fetched, 1);
    assert_eq!(report.remaining, kept.len());

    // nothing invented, nothing lost
    let after: BTreeSet<String> = queue_lines(&queue).into_iter().collect();
    let expected: BTreeSet<String> = kept.into_iter().collect();
    assert_eq!(after, expected);

    assert_eq!(std::fs::read(bundle.join(article_name("0001"))).unwrap(), b"goed");
    // a mismatching download never stays on disk
    assert!(!bundle.join(article_name("0003")).exists());
}

#[tokio::test]
async fn test_interrupted_run_keeps_in_flight_and_pending_items() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"een".to_vec()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"twee".to_vec())
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/3"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"drie".to_vec()))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let bundle = reorganized_bundle(root, "010000001");
    let line = |article: &str, body: &[u8], route: &str| {
        format!(
            "{} {} {}/{}",
            article_name(article),
            ChecksumAlgorithm::Md5.digest_hex(body),
            server.uri(),
            route
        )
    };
    let lines = vec![
        line("0001", b"een", "1"),
        line("0002", b"twee", "2"),
        line("0003", b"drie", "3"),
    ];
    let queue = root.join("missing.txt");
    std::fs::write(&queue, lines.join("\n")).unwrap();

    let mut config = test_config(root);
    config.fetch.timeout = Duration::from_secs(30);
    let mut manager = RetryQueueManager::new(&config).unwrap();

    // stop the run while the second item is still downloading
    let interrupted = tokio::time::timeout(Duration::from_secs(2), manager.run()).await;
    assert!(interrupted.is_err());
    manager.persist().unwrap();

    assert_eq!(queue_lines(&queue), lines[1..].to_vec());
    assert_eq!(manager.len(), 2);
    assert_eq!(std::fs::read(bundle.join(article_name("0001"))).unwrap(), b"een");
    assert!(!bundle.join(article_name("0002")).exists());
}

#[tokio::test]
async fn test_unwritable_queue_file_fails_the_run() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let queue = dir.path().join("missing.txt");
    let line = article_name("0007");
    std::fs::write(&queue, format!("{}\n", line)).unwrap();

    let mut config = test_config(dir.path());
    config.queue.max_passes = Some(1);
    let mut manager = RetryQueueManager::new(&config).unwrap();

    // a non-empty directory cannot be replaced by the rewritten queue
    std::fs::remove_file(&queue).unwrap();
    std::fs::create_dir(&queue).unwrap();
    std::fs::write(queue.join("occupied"), "x").unwrap();

    let err = manager.run().await.unwrap_err();
    assert!(matches!(err, Error::QueuePersist { ref path, .. } if *path == queue));
    assert_eq!(manager.len(), 1);
    assert_eq!(
        manager.pending().map(|e| e.to_line()).collect::<Vec<_>>(),
        vec![line]
    );
}
