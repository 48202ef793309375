use super::test_helpers::*;
use super::*;
use crate::types::{ProgressSnapshot, TaskEvent, TaskStatus};


/// Unwrap a progression event
fn progression(event: &TaskEvent) -> &ProgressSnapshot {
    match event {
        TaskEvent::Progression(snapshot) => snapshot,
        other => panic!("expected progression, got {other:?}"),
    }
}

/// `done + remaining + failed == total` for a snapshot that is not a terminal error
fn assert_invariant(snapshot: &ProgressSnapshot) {
    assert_eq!(
        snapshot.done + snapshot.remaining + snapshot.failed,
        snapshot.total,
        "{snapshot:?}"
    );
}
