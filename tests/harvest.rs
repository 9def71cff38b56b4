//! Manifest processing end to end against a mock resource server

mod common;

use common::{
    PAPER_ID, ResourceFixture, archive_contents, article_name, dir_names, init_tracing,
    metadata_file_name, test_config, write_bundle_metadata, write_manifest,
};
use ocr_harvest::ManifestProcessor;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_manifest_with_one_failing_resource() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ocr/0001"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"<text>eerste</text>".to_vec()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ocr/0002"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let metadata = write_bundle_metadata(
        root,
        &[
            ResourceFixture::new(
                "0001",
                b"<text>eerste</text>",
                format!("{}/ocr/0001", server.uri()),
            ),
            ResourceFixture::new(
                "0002",
                b"<text>tweede</text>",
                format!("{}/ocr/0002", server.uri()),
            ),
        ],
    );
    write_manifest(root, "20240101_120000.txt", &[&metadata]);

    let processor = ManifestProcessor::new(test_config(root)).unwrap();
    let report = processor.run().await.unwrap();

    assert_eq!(report.manifests, 1);
    assert_eq!(report.totals.bundles_packaged, 1);
    assert_eq!(report.totals.resources_fetched, 1);
    assert_eq!(report.totals.resources_failed, 1);

    // archive holds the metadata and the one resource that arrived
    let archive = root.join("01").join(format!("DDD_ddd_{}.tgz", PAPER_ID));
    let contents = archive_contents(&archive);
    assert_eq!(
        contents.keys().cloned().collect::<Vec<_>>(),
        vec![metadata_file_name(), article_name("0001")]
    );
    assert_eq!(contents[&article_name("0001")], b"<text>eerste</text>");

    // the failing resource is in the bundle's error log with its cause
    let log = std::fs::read_to_string(root.join("01").join("failures.log")).unwrap();
    assert!(log.starts_with(&format!("{}\n", article_name("0002"))));
    assert!(log.contains("attempts: 3"));
    assert!(log.contains("500"));
    assert!(log.contains("kind: status"));

    // sources are gone; only the archive and the error log remain
    assert_eq!(
        dir_names(&root.join("01")),
        vec![format!("DDD_ddd_{}.tgz", PAPER_ID), "failures.log".to_string()]
    );

    assert!(dir_names(&root.join("manifests")).is_empty());
    assert!(dir_names(&root.join("in_progress")).is_empty());
    assert_eq!(
        dir_names(&root.join("ocr_complete")),
        vec!["20240101_120000.txt"]
    );
}

#[tokio::test]
async fn test_crash_after_begin_leaves_manifest_in_progress_once() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let metadata = write_bundle_metadata(root, &[]);
    write_manifest(root, "20240101_120000.txt", &[&metadata]);

    let processor = ManifestProcessor::new(test_config(root)).unwrap();
    processor.prepare_directories().await.unwrap();
    let name = processor.next_manifest().await.unwrap().unwrap();
    processor.begin(&name).await.unwrap();
    // the process dies here
    drop(processor);

    let locations: Vec<_> = ["manifests", "in_progress", "ocr_complete"]
        .iter()
        .filter(|stage| root.join(stage).join(&name).exists())
        .collect();
    assert_eq!(locations, vec![&"in_progress"]);

    // a restarted processor leaves it there and touches nothing else
    let processor = ManifestProcessor::new(test_config(root)).unwrap();
    let report = processor.run().await.unwrap();
    assert_eq!(report.manifests, 0);
    assert!(root.join("in_progress").join(&name).exists());
    assert!(metadata.exists());
}

#[tokio::test]
async fn test_rerun_of_requeued_manifest_skips_packaged_bundles() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ocr/0001"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"tekst".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let metadata = write_bundle_metadata(
        root,
        &[ResourceFixture::new(
            "0001",
            b"tekst",
            format!("{}/ocr/0001", server.uri()),
        )],
    );
    // manifest entries may be relative to the root
    let relative = metadata.strip_prefix(root).unwrap().to_path_buf();
    write_manifest(root, "a.txt", &[&relative]);

    let processor = ManifestProcessor::new(test_config(root)).unwrap();
    processor.run().await.unwrap();

    // an operator moves the finished manifest back to todo
    std::fs::rename(
        root.join("ocr_complete").join("a.txt"),
        root.join("manifests").join("a.txt"),
    )
    .unwrap();

    let report = processor.run().await.unwrap();
    assert_eq!(report.totals.bundles_packaged, 0);
    assert_eq!(report.totals.bundles_skipped, 1);
}
