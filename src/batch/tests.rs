use std::time::Duration;

use chrono::{TimeDelta, Utc};
use tokio::time::Instant;

use crate::{
    content::PendingEntry,
    error::Error,
    progress::{progress_channel, ProgressReceiver, UploadProgress, UploadStatus},
    retry::RetryPolicy,
    testing::faulty_repo,
};

use super::{partition, BatchConfig, BatchProcessor, CancelFlag};

fn config(batch_size: usize) -> BatchConfig {
    BatchConfig {
        batch_size,
        inter_batch_delay: Duration::ZERO,
        max_file_size: 1024 * 1024,
        retry: RetryPolicy {
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            ..RetryPolicy::default()
        },
    }
}

fn entries(count: usize) -> Vec<PendingEntry> {
    (0..count)
        .map(|i| PendingEntry::from_memory(format!("files/{i:02}.txt"), format!("file {i}").into_bytes()))
        .collect()
}

fn drain(receiver: &ProgressReceiver) -> Vec<UploadProgress> {
    let mut snapshots = vec![];
    while let Ok(snapshot) = receiver.try_recv() {
        snapshots.push(snapshot);
    }
    snapshots
}

#[test]
fn partition_sizes() {
    for count in 0..30 {
        for batch_size in 1..12 {
            let items: Vec<usize> = (0..count).collect();
            let batches = partition(items.clone(), batch_size);

            assert_eq!(batches.len(), count.div_ceil(batch_size));
            assert!(batches.iter().all(|batch| batch.len() <= batch_size));
            assert_eq!(batches.concat(), items);
        }
    }
}

#[test]
fn partition_with_zero_size_uses_single_items() {
    let batches = partition(vec![1, 2, 3], 0);
    assert_eq!(batches, vec![vec![1], vec![2], vec![3]]);
}

#[tokio::test]
async fn uploads_in_sequential_batches() {
    let (_dir, store, repo) = faulty_repo().await;
    let (sender, receiver) = progress_channel();
    let processor = BatchProcessor::new(store.clone(), repo, config(10)).with_progress(sender);

    let report = processor.run(entries(25)).await.unwrap();

    assert_eq!(report.processed.len(), 25);
    assert_eq!(report.progress.status, UploadStatus::Completed);
    assert_eq!(report.progress.total_batches, 3);
    assert_eq!(report.progress.processed_files, 25);
    assert!(report.progress.errors.is_empty());
    assert_eq!(store.content_calls(), 25);

    let snapshots = drain(&receiver);
    let mut batch_starts = vec![];
    let mut last_batch = 0;
    for snapshot in &snapshots {
        if snapshot.current_batch != last_batch {
            batch_starts.push(snapshot.processed_files);
            last_batch = snapshot.current_batch;
        }
    }
    assert_eq!(batch_starts, vec![0, 10, 20]);

    let counts: Vec<usize> = snapshots.iter().map(|s| s.processed_files).collect();
    assert!(counts.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(snapshots.first().unwrap().status, UploadStatus::Processing);
    assert_eq!(snapshots.last().unwrap().status, UploadStatus::Completed);
}

#[tokio::test]
async fn empty_run_completes() {
    let (_dir, store, repo) = faulty_repo().await;
    let processor = BatchProcessor::new(store, repo, config(10));

    let report = processor.run(vec![]).await.unwrap();

    assert!(report.processed.is_empty());
    assert_eq!(report.progress.status, UploadStatus::Completed);
    assert_eq!(report.progress.total_batches, 0);
    assert!((report.progress.percentage() - 100.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn oversized_file_is_recorded_and_others_continue() {
    let (_dir, store, repo) = faulty_repo().await;
    let processor = BatchProcessor::new(store.clone(), repo, config(10));

    let mut pending = entries(2);
    pending.push(PendingEntry::from_memory("big.bin", vec![0; 5 * 1024 * 1024]));
    let report = processor.run(pending).await.unwrap();

    assert_eq!(report.processed.len(), 2);
    assert_eq!(report.progress.processed_files, 3);
    assert_eq!(report.progress.errors.len(), 1);

    let error = &report.progress.errors[0];
    assert_eq!(error.file_name, "big.bin");
    assert!(error.error.contains("too large"), "{}", error.error);
    assert_eq!(store.content_calls(), 2);
}

#[tokio::test]
async fn target_paths_are_sanitized() {
    let (_dir, store, repo) = faulty_repo().await;
    let processor = BatchProcessor::new(store, repo, config(10));

    let pending = vec![
        PendingEntry::from_memory("../../etc/passwd", b"root".to_vec()),
        PendingEntry::from_memory("notes/my file.txt", b"notes".to_vec()),
    ];
    let report = processor.run(pending).await.unwrap();

    let mut targets: Vec<&str> = report
        .processed
        .iter()
        .map(|entry| entry.target_path.as_str())
        .collect();
    targets.sort_unstable();
    assert_eq!(targets, vec!["etc/passwd", "notes/my_file.txt"]);
}

#[tokio::test]
async fn colliding_targets_keep_input_order() {
    let (_dir, store, repo) = faulty_repo().await;
    store.fail_content(
        b"second",
        vec![Error::RemoteTransient {
            status: Some(503),
            message: "unavailable".to_owned(),
        }],
    );
    let processor = BatchProcessor::new(store, repo, config(10));

    let pending = vec![
        PendingEntry::from_memory("a b.txt", b"first".to_vec()),
        PendingEntry::from_memory("a_b.txt", b"second".to_vec()),
    ];
    let report = processor.run(pending).await.unwrap();

    let sources: Vec<&str> = report
        .processed
        .iter()
        .map(|entry| entry.source_path.as_str())
        .collect();
    assert_eq!(sources, vec!["a b.txt", "a_b.txt"]);
    assert!(report.processed.iter().all(|entry| entry.target_path == "a_b.txt"));
}

#[tokio::test]
async fn unusable_paths_are_skipped() {
    let (_dir, store, repo) = faulty_repo().await;
    let processor = BatchProcessor::new(store.clone(), repo, config(10));

    let pending = vec![
        PendingEntry::from_memory("../..", b"nothing".to_vec()),
        PendingEntry::from_memory("kept.txt", b"kept".to_vec()),
    ];
    let report = processor.run(pending).await.unwrap();

    assert_eq!(report.processed.len(), 1);
    assert_eq!(report.progress.processed_files, 2);
    assert!(report.progress.errors.is_empty());
    assert_eq!(store.content_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn rate_limited_upload_waits_for_reset() {
    let (_dir, store, repo) = faulty_repo().await;
    let reset_at = Utc::now() + TimeDelta::try_seconds(5).unwrap();
    store.fail_content(b"limited", vec![Error::RateLimited { reset_at }]);
    let processor = BatchProcessor::new(store.clone(), repo, config(10));

    let start = Instant::now();
    let report = processor
        .run(vec![PendingEntry::from_memory("limited.txt", b"limited".to_vec())])
        .await
        .unwrap();

    assert!(start.elapsed() >= Duration::from_secs(4));
    assert_eq!(report.processed.len(), 1);
    assert!(report.progress.errors.is_empty());
    assert_eq!(store.content_calls(), 2);
}

#[tokio::test]
async fn exhausted_retries_are_recorded() {
    let (_dir, store, repo) = faulty_repo().await;
    let transient = || Error::RemoteTransient {
        status: Some(502),
        message: "bad gateway".to_owned(),
    };
    store.fail_content(b"flaky", (0..4).map(|_| transient()).collect());
    let processor = BatchProcessor::new(store.clone(), repo, config(10));

    let mut pending = entries(1);
    pending.push(PendingEntry::from_memory("flaky.txt", b"flaky".to_vec()));
    let report = processor.run(pending).await.unwrap();

    assert_eq!(report.processed.len(), 1);
    assert_eq!(report.progress.status, UploadStatus::Completed);
    assert_eq!(report.progress.errors.len(), 1);
    assert!(report.progress.errors[0].error.contains("after 4 attempt(s)"));
    assert_eq!(store.content_calls(), 5);
}

#[tokio::test]
async fn transient_failure_recovers() {
    let (_dir, store, repo) = faulty_repo().await;
    store.fail_content(
        b"flaky",
        vec![Error::RemoteTransient {
            status: None,
            message: "connection reset".to_owned(),
        }],
    );
    let processor = BatchProcessor::new(store.clone(), repo, config(10));

    let report = processor
        .run(vec![PendingEntry::from_memory("flaky.txt", b"flaky".to_vec())])
        .await
        .unwrap();

    assert_eq!(report.processed.len(), 1);
    assert!(report.progress.errors.is_empty());
    assert_eq!(store.content_calls(), 2);
}

#[tokio::test]
async fn permanent_failure_is_not_retried() {
    let (_dir, store, repo) = faulty_repo().await;
    store.fail_content(
        b"denied",
        vec![Error::RemotePermanent {
            status: 403,
            message: "Resource not accessible".to_owned(),
        }],
    );
    let processor = BatchProcessor::new(store.clone(), repo, config(10));

    let report = processor
        .run(vec![PendingEntry::from_memory("denied.txt", b"denied".to_vec())])
        .await
        .unwrap();

    assert!(report.processed.is_empty());
    assert_eq!(report.progress.errors.len(), 1);
    assert!(report.progress.errors[0].error.contains("after 1 attempt(s)"));
    assert_eq!(store.content_calls(), 1);
}

#[tokio::test]
async fn cancelled_before_first_batch() {
    let (_dir, store, repo) = faulty_repo().await;
    let cancel = CancelFlag::new();
    cancel.cancel();
    let (sender, receiver) = progress_channel();
    let processor = BatchProcessor::new(store.clone(), repo, config(10))
        .with_cancel(cancel)
        .with_progress(sender);

    let result = processor.run(entries(3)).await;

    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(store.content_calls(), 0);
    let last = drain(&receiver).pop().unwrap();
    assert_eq!(last.status, UploadStatus::Error);
}

#[tokio::test]
async fn cancel_lets_current_batch_finish() {
    let (_dir, store, repo) = faulty_repo().await;
    let cancel = CancelFlag::new();
    let (sender, receiver) = progress_channel();
    let mut batch_config = config(2);
    batch_config.inter_batch_delay = Duration::from_millis(200);
    let processor = BatchProcessor::new(store.clone(), repo, batch_config)
        .with_cancel(cancel.clone())
        .with_progress(sender);

    let watcher = tokio::spawn(async move {
        while let Ok(snapshot) = receiver.recv().await {
            if snapshot.processed_files >= 2 {
                cancel.cancel();
                break;
            }
        }
    });

    let result = processor.run(entries(6)).await;
    watcher.await.unwrap();

    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(store.content_calls(), 2);
}

#[tokio::test]
async fn panicking_task_aborts_run() {
    let (_dir, store, repo) = faulty_repo().await;
    store.panic_on_content(b"boom");
    let processor = BatchProcessor::new(store, repo, config(10));

    let mut pending = entries(1);
    pending.push(PendingEntry::from_memory("boom.txt", b"boom".to_vec()));
    let result = processor.run(pending).await;

    assert!(matches!(result, Err(Error::RunAborted(_))));
}
