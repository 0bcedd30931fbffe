use super::{progress_channel, FileError, ProgressTracker, UploadStatus};

fn file_error(path: &str) -> FileError {
    FileError {
        file_name: path.to_owned(),
        path: path.to_owned(),
        error: "boom".to_owned(),
    }
}

#[test]
fn transitions_are_guarded() {
    let tracker = ProgressTracker::new(None);
    assert!(!tracker.complete("too early"));
    assert!(!tracker.fail("too early"));
    assert_eq!(tracker.snapshot().status, UploadStatus::Idle);

    assert!(tracker.start(2, 1, "starting"));
    assert!(!tracker.start(2, 1, "again"));
    assert!(tracker.complete("done"));
    assert!(!tracker.fail("after completion"));
    assert_eq!(tracker.snapshot().status, UploadStatus::Completed);
}

#[test]
fn finished_files_are_counted() {
    let tracker = ProgressTracker::new(None);
    tracker.start(3, 1, "starting");
    tracker.file_finished(None, "a");
    tracker.file_finished(Some(file_error("b")), "b");

    let progress = tracker.snapshot();
    assert_eq!(progress.processed_files, 2);
    assert_eq!(progress.errors, vec![file_error("b")]);
    assert!((progress.percentage() - 200.0 / 3.0).abs() < 1e-9);
}

#[test]
fn empty_run_completes_at_full_percentage() {
    let tracker = ProgressTracker::new(None);
    tracker.start(0, 0, "nothing to do");
    assert_eq!(tracker.snapshot().percentage(), 0.0);
    tracker.complete("done");
    assert_eq!(tracker.snapshot().percentage(), 100.0);
}

#[tokio::test]
async fn snapshots_are_published_in_order() {
    let (sender, receiver) = progress_channel();
    let tracker = ProgressTracker::new(Some(sender));
    tracker.start(2, 1, "starting");
    tracker.begin_batch(1, "batch 1");
    tracker.file_finished(None, "a");
    tracker.file_finished(None, "b");
    tracker.complete("done");
    drop(tracker);

    let mut snapshots = vec![];
    while let Ok(snapshot) = receiver.recv().await {
        snapshots.push(snapshot);
    }

    assert_eq!(snapshots.len(), 5);
    let processed: Vec<_> = snapshots.iter().map(|s| s.processed_files).collect();
    assert_eq!(processed, vec![0, 0, 1, 2, 2]);
    assert_eq!(snapshots[1].current_batch, 1);
    assert_eq!(snapshots[4].status, UploadStatus::Completed);
    assert!(snapshots[0].start_time.is_some());
}

#[test]
fn dropped_receiver_is_ignored() {
    let (sender, receiver) = progress_channel();
    drop(receiver);
    let tracker = ProgressTracker::new(Some(sender));
    assert!(tracker.start(1, 1, "starting"));
}
