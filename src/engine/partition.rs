//! Splitting a task's item list across workers.

/// Split `items` into at most `worker_hint` contiguous slices
///
/// Lists that are no longer than the hint, or shorter than `min_batch`, stay in a single
/// slice. Otherwise every slice holds `ceil(len / worker_hint)` items except the last one,
/// which takes the rest. Order is preserved and no slice is empty. A hint of 0 counts as 1.
pub fn partition_items<T: Clone>(items: &[T], worker_hint: usize, min_batch: usize) -> Vec<Vec<T>> {
    let workers = worker_hint.max(1);

    if items.is_empty() {
        return Vec::new();
    }
    if items.len() <= workers || items.len() < min_batch {
        return vec![items.to_vec()];
    }

    let part = items.len().div_ceil(workers);
    items.chunks(part).map(<[T]>::to_vec).collect()
}
