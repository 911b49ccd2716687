use crate::tools::process::CancelToken;
use anyhow::{Context, Result};
use rayon::prelude::*;

/// 以固定寬度的區域 rayon 執行緒池平行處理所有項目
///
/// 執行緒池只存在於本函式呼叫期間；回傳時所有工作都已結束。
/// 取消後尚未開始的項目不會執行，對應位置為 `None`。
pub fn run_bounded<T, R, F>(
    width: usize,
    items: &[T],
    cancel: &CancelToken,
    task: F,
) -> Result<Vec<Option<R>>>
where
    T: Sync,
    R: Send,
    F: Fn(usize, &T) -> R + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(width.max(1))
        .thread_name(|i| format!("sub-task-{i}"))
        .build()
        .context("無法建立子工作執行緒池")?;

    Ok(pool.install(|| {
        items
            .par_iter()
            .enumerate()
            .map(|(index, item)| {
                if cancel.is_cancelled() {
                    None
                } else {
                    Some(task(index, item))
                }
            })
            .collect()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_results_keep_input_order() {
        let items: Vec<u32> = (0..20).collect();
        let results = run_bounded(4, &items, &CancelToken::new(), |_, x| x * 2).unwrap();
        let doubled: Vec<u32> = results.into_iter().flatten().collect();
        assert_eq!(doubled, (0..20).map(|x| x * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_width_bounds_concurrency() {
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let items: Vec<u32> = (0..16).collect();

        run_bounded(3, &items, &CancelToken::new(), |_, _| {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(10));
            active.fetch_sub(1, Ordering::SeqCst);
        })
        .unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn test_cancelled_items_are_skipped() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let items = vec![1, 2, 3];
        let results = run_bounded(2, &items, &cancel, |_, x| *x).unwrap();
        assert!(results.iter().all(Option::is_none));
    }
}
