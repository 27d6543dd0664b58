//! End-to-end pipeline tests over real staging trees.
//!
//! Exercises the full document -> artifact -> export -> import -> total ->
//! report flow with local workers, including deduplication across workers
//! and repeated synchronization cycles.

use std::fs;
use std::path::Path;

use tempfile::TempDir;
use wordmill::config::Config;
use wordmill::master::Master;
use wordmill::staging::Stage;
use wordmill::worker::Worker;

const PLEDGE: &str = "The pledge of allegiance to the flag.";

fn config_for(root: &Path) -> Config {
    Config::new(root.to_path_buf(), 0, None)
}

fn worker_in(root: &Path) -> Worker {
    Worker::new(&config_for(root)).unwrap()
}

fn master_over(root: &Path, worker_roots: &[&Path]) -> Master {
    let addresses: Vec<String> = worker_roots
        .iter()
        .map(|p| p.to_str().unwrap().to_string())
        .collect();
    Master::new(&config_for(root), &addresses).unwrap()
}

#[tokio::test]
async fn local_end_to_end() {
    let tmp = TempDir::new().unwrap();
    let doc = tmp.path().join("pledge.txt");
    fs::write(&doc, PLEDGE).unwrap();

    let worker_root = tmp.path().join("worker");
    let worker = worker_in(&worker_root);
    worker.ingest(doc.to_str().unwrap()).await.unwrap();
    assert_eq!(worker.process_ready().unwrap(), 1);

    let master_root = tmp.path().join("master");
    let master = master_over(&master_root, &[&worker_root]);
    assert_eq!(master.synch_all().await.unwrap(), 1);
    assert_eq!(master.merge_all().unwrap(), 1);

    assert_eq!(master.report(3), vec!["the: 2", "allegiance: 1", "flag: 1"]);
}

#[tokio::test]
async fn ingesting_identical_content_twice_exports_one_artifact() {
    let tmp = TempDir::new().unwrap();
    let first = tmp.path().join("one.txt");
    let second = tmp.path().join("two.txt");
    fs::write(&first, PLEDGE).unwrap();
    fs::write(&second, PLEDGE).unwrap();

    let worker = worker_in(&tmp.path().join("worker"));
    worker.ingest(first.to_str().unwrap()).await.unwrap();
    worker.ingest(second.to_str().unwrap()).await.unwrap();

    assert_eq!(worker.process_ready().unwrap(), 1);
    assert_eq!(worker.staging().list(Stage::Export).unwrap().len(), 1);
}

#[tokio::test]
async fn dedup_across_workers_merges_once() {
    let tmp = TempDir::new().unwrap();
    let doc_a = tmp.path().join("a.txt");
    let doc_b = tmp.path().join("b.txt");
    fs::write(&doc_a, PLEDGE).unwrap();
    fs::write(&doc_b, PLEDGE).unwrap();

    let root_a = tmp.path().join("worker-a");
    let root_b = tmp.path().join("worker-b");
    let worker_a = worker_in(&root_a);
    let worker_b = worker_in(&root_b);
    worker_a.ingest(doc_a.to_str().unwrap()).await.unwrap();
    worker_b.ingest(doc_b.to_str().unwrap()).await.unwrap();
    worker_a.process_ready().unwrap();
    worker_b.process_ready().unwrap();

    // byte-identical content yields the same artifact name on both workers
    assert_eq!(
        worker_a.staging().list(Stage::Export).unwrap(),
        worker_b.staging().list(Stage::Export).unwrap()
    );

    let master_root = tmp.path().join("master");
    let master = master_over(&master_root, &[&root_a, &root_b]);
    master.synch_all().await.unwrap();
    assert_eq!(master.merge_all().unwrap(), 1);

    // counts reflect one document, not two
    assert_eq!(master.report(1), vec!["the: 2"]);

    // a repeated cycle fetches and merges nothing new
    assert_eq!(master.synch_all().await.unwrap(), 0);
    assert_eq!(master.merge_all().unwrap(), 0);
    assert_eq!(master.report(1), vec!["the: 2"]);
}

#[tokio::test]
async fn totals_accumulate_across_distinct_documents() {
    let tmp = TempDir::new().unwrap();
    let doc_a = tmp.path().join("a.txt");
    let doc_b = tmp.path().join("b.txt");
    fs::write(&doc_a, "apple banana apple").unwrap();
    fs::write(&doc_b, "banana cherry").unwrap();

    let worker_root = tmp.path().join("worker");
    let worker = worker_in(&worker_root);
    worker.ingest(doc_a.to_str().unwrap()).await.unwrap();
    worker.ingest(doc_b.to_str().unwrap()).await.unwrap();
    assert_eq!(worker.process_ready().unwrap(), 2);

    let master_root = tmp.path().join("master");
    let master = master_over(&master_root, &[&worker_root]);
    assert_eq!(master.synch_all().await.unwrap(), 2);
    assert_eq!(master.merge_all().unwrap(), 2);

    assert_eq!(master.report(3), vec!["apple: 2", "banana: 2", "cherry: 1"]);
}

#[tokio::test]
async fn artifacts_survive_in_consumed_after_merge() {
    let tmp = TempDir::new().unwrap();
    let doc = tmp.path().join("a.txt");
    fs::write(&doc, "apple").unwrap();

    let worker_root = tmp.path().join("worker");
    let worker = worker_in(&worker_root);
    worker.ingest(doc.to_str().unwrap()).await.unwrap();
    worker.process_ready().unwrap();

    let master_root = tmp.path().join("master");
    let master = master_over(&master_root, &[&worker_root]);
    master.synch_all().await.unwrap();
    master.merge_all().unwrap();

    let consumed = master.staging().list(Stage::Consumed).unwrap();
    assert_eq!(consumed.len(), 1);
    assert!(consumed[0].ends_with(".json"));
    assert!(master.staging().list(Stage::Import).unwrap().is_empty());
}
