use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use shared_api::{CancellationToken, TaskSummary};
use tracing::{debug, warn};

/// How the candidate query behaves as items are processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageMode {
    /// Processing removes items from the query (an exclusion tag is
    /// applied), so the loop re-fetches the first page every round.
    Shrinking,
    /// Processed items stay in the query; the loop walks pages forward.
    Stable,
}

pub struct BatchConfig {
    pub max_batch_size: usize,
    pub cooldown: Duration,
    /// Cap on items visited across all batches; `None` is unbounded.
    pub limit: Option<usize>,
    pub page_mode: PageMode,
}

/// What processing one item amounted to; the loop folds these into the
/// task summary.
#[derive(Debug, Clone, Default)]
pub struct ItemOutcome {
    pub matched: bool,
    pub created: usize,
    pub skipped: bool,
    /// Performer ids bound to the entity, for callers that aggregate
    /// across items (gallery propagation).
    pub performers: Vec<String>,
}

impl ItemOutcome {
    pub fn processed() -> Self {
        ItemOutcome::default()
    }

    pub fn skipped() -> Self {
        ItemOutcome {
            skipped: true,
            ..Default::default()
        }
    }
}

pub struct BatchRun {
    pub summary: TaskSummary,
    pub cancelled: bool,
}

/// The shared batched work loop: page-sized fetches, sequential item
/// processing, cancellation checks at item boundaries, a cancellation-aware
/// cooldown between batches, and clamped monotonic progress.
///
/// Items that error or are skipped stay in a local skip set so a shrinking
/// query cannot hand them back forever.
pub async fn run_batched<T, FetchFn, FetchFut, IdFn, ProcFn, ProcFut, ReportFn>(
    config: &BatchConfig,
    cancel: &CancellationToken,
    mut report: ReportFn,
    mut fetch: FetchFn,
    id_of: IdFn,
    mut process: ProcFn,
) -> anyhow::Result<BatchRun>
where
    FetchFn: FnMut(u64) -> FetchFut,
    FetchFut: Future<Output = anyhow::Result<(Vec<T>, usize)>>,
    IdFn: Fn(&T) -> String,
    ProcFn: FnMut(T) -> ProcFut,
    ProcFut: Future<Output = anyhow::Result<ItemOutcome>>,
    ReportFn: FnMut(f64),
{
    let mut summary = TaskSummary::default();
    let mut visited = 0usize;
    let mut seen = 0usize;
    let mut estimated_total: Option<usize> = None;
    let mut skip: HashSet<String> = HashSet::new();
    let mut page: u64 = 1;
    let mut fraction = 0.0_f64;

    loop {
        if cancel.is_cancelled() {
            report(fraction);
            return Ok(BatchRun {
                summary,
                cancelled: true,
            });
        }

        let (items, total) = fetch(page).await?;
        let estimated = *estimated_total.get_or_insert_with(|| match config.limit {
            Some(limit) => total.min(limit),
            None => total,
        });
        if items.is_empty() {
            break;
        }

        let fetched = items.len();
        let fresh: Vec<T> = items
            .into_iter()
            .filter(|item| !skip.contains(&id_of(item)))
            .collect();
        if fresh.is_empty() {
            // everything on this page already failed or was skipped
            if fetched < config.max_batch_size {
                break;
            }
            page += 1;
            continue;
        }

        for item in fresh {
            if cancel.is_cancelled() {
                report(fraction);
                return Ok(BatchRun {
                    summary,
                    cancelled: true,
                });
            }
            let id = id_of(&item);
            let mut counts_toward_limit = true;
            match process(item).await {
                Ok(outcome) => {
                    if outcome.skipped {
                        summary.skipped += 1;
                        skip.insert(id);
                        counts_toward_limit = false;
                    } else {
                        summary.processed += 1;
                        if outcome.matched {
                            summary.matched += 1;
                        }
                        summary.created += outcome.created;
                    }
                }
                Err(e) => {
                    warn!("item {} failed, continuing batch: {:#}", id, e);
                    summary.failed += 1;
                    skip.insert(id);
                }
            }
            if counts_toward_limit {
                visited += 1;
            }
            seen += 1;
            fraction = if estimated == 0 {
                1.0
            } else {
                (seen as f64 / estimated as f64).clamp(0.0, 1.0).max(fraction)
            };
            report(fraction);
            if config.limit.is_some_and(|limit| visited >= limit) {
                debug!("reached item limit of {}", limit_display(config.limit));
                return Ok(BatchRun {
                    summary,
                    cancelled: false,
                });
            }
        }

        page = match config.page_mode {
            PageMode::Shrinking => 1,
            PageMode::Stable => page + 1,
        };

        if !cancel.sleep(config.cooldown).await {
            report(fraction);
            return Ok(BatchRun {
                summary,
                cancelled: true,
            });
        }
    }

    report(1.0);
    Ok(BatchRun {
        summary,
        cancelled: false,
    })
}

fn limit_display(limit: Option<usize>) -> usize {
    limit.unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    fn config(max_batch_size: usize, limit: Option<usize>, page_mode: PageMode) -> BatchConfig {
        BatchConfig {
            max_batch_size,
            cooldown: Duration::from_secs(10),
            limit,
            page_mode,
        }
    }

    /// In-memory stand-in for a shrinking candidate query: processed items
    /// disappear, failed ones stay.
    struct ShrinkingSet {
        remaining: RefCell<Vec<String>>,
    }

    impl ShrinkingSet {
        fn new(ids: &[&str]) -> Self {
            ShrinkingSet {
                remaining: RefCell::new(ids.iter().map(|s| s.to_string()).collect()),
            }
        }

        fn fetch(&self, size: usize) -> (Vec<String>, usize) {
            let remaining = self.remaining.borrow();
            (
                remaining.iter().take(size).cloned().collect(),
                remaining.len(),
            )
        }

        fn remove(&self, id: &str) {
            self.remaining.borrow_mut().retain(|i| i != id);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn processes_all_items_across_batches() {
        let set = ShrinkingSet::new(&["a", "b", "c", "d", "e"]);
        let processed = RefCell::new(Vec::new());
        let run = run_batched(
            &config(2, None, PageMode::Shrinking),
            &CancellationToken::new(),
            |_| {},
            |_page| async { Ok(set.fetch(2)) },
            |id| id.clone(),
            |id| {
                let set = &set;
                let processed = &processed;
                async move {
                    set.remove(&id);
                    processed.borrow_mut().push(id);
                    Ok(ItemOutcome::processed())
                }
            },
        )
        .await
        .unwrap();
        assert_eq!(run.summary.processed, 5);
        assert!(!run.cancelled);
        assert_eq!(*processed.borrow(), vec!["a", "b", "c", "d", "e"]);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_items_do_not_loop_forever() {
        let set = ShrinkingSet::new(&["a", "b", "c"]);
        let run = run_batched(
            &config(2, None, PageMode::Shrinking),
            &CancellationToken::new(),
            |_| {},
            |_page| async { Ok(set.fetch(2)) },
            |id| id.clone(),
            |id| {
                let set = &set;
                async move {
                    if id == "b" {
                        anyhow::bail!("download failed");
                    }
                    set.remove(&id);
                    Ok(ItemOutcome::processed())
                }
            },
        )
        .await
        .unwrap();
        assert_eq!(run.summary.processed, 2);
        assert_eq!(run.summary.failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn limit_caps_visited_items() {
        let set = ShrinkingSet::new(&["a", "b", "c", "d"]);
        let run = run_batched(
            &config(2, Some(3), PageMode::Shrinking),
            &CancellationToken::new(),
            |_| {},
            |_page| async { Ok(set.fetch(2)) },
            |id| id.clone(),
            |id| {
                let set = &set;
                async move {
                    set.remove(&id);
                    Ok(ItemOutcome::processed())
                }
            },
        )
        .await
        .unwrap();
        assert_eq!(run.summary.processed, 3);
        assert_eq!(set.remaining.borrow().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_at_item_boundary() {
        let set = ShrinkingSet::new(&["a", "b", "c", "d", "e", "f"]);
        let cancel = CancellationToken::new();
        let reports = RefCell::new(Vec::new());
        let run = run_batched(
            &config(3, Some(10), PageMode::Shrinking),
            &cancel,
            |f| reports.borrow_mut().push(f),
            |_page| async { Ok(set.fetch(3)) },
            |id| id.clone(),
            |id| {
                let set = &set;
                let cancel = &cancel;
                async move {
                    set.remove(&id);
                    if id == "c" {
                        cancel.cancel();
                    }
                    Ok(ItemOutcome::processed())
                }
            },
        )
        .await
        .unwrap();
        assert!(run.cancelled);
        assert_eq!(run.summary.processed, 3);
        assert_eq!(set.remaining.borrow().len(), 3);
        let last = *reports.borrow().last().unwrap();
        assert!((last - 3.0 / 6.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn stable_mode_walks_pages_forward() {
        let pages = RefCell::new(VecDeque::from(vec![
            (vec!["a".to_string(), "b".to_string()], 4usize),
            (vec!["c".to_string(), "d".to_string()], 4usize),
            (vec![], 4usize),
        ]));
        let seen_pages = RefCell::new(Vec::new());
        let run = run_batched(
            &config(2, None, PageMode::Stable),
            &CancellationToken::new(),
            |_| {},
            |page| {
                seen_pages.borrow_mut().push(page);
                let next = pages.borrow_mut().pop_front().unwrap_or((vec![], 4));
                async move { Ok(next) }
            },
            |id| id.clone(),
            |_id| async { Ok(ItemOutcome::processed()) },
        )
        .await
        .unwrap();
        assert_eq!(run.summary.processed, 4);
        assert_eq!(*seen_pages.borrow(), vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_is_monotonic_and_ends_at_one() {
        let set = ShrinkingSet::new(&["a", "b", "c"]);
        let reports = RefCell::new(Vec::new());
        run_batched(
            &config(2, None, PageMode::Shrinking),
            &CancellationToken::new(),
            |f| reports.borrow_mut().push(f),
            |_page| async { Ok(set.fetch(2)) },
            |id| id.clone(),
            |id| {
                let set = &set;
                async move {
                    set.remove(&id);
                    Ok(ItemOutcome::processed())
                }
            },
        )
        .await
        .unwrap();
        let reports = reports.borrow();
        assert!(reports.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*reports.last().unwrap(), 1.0);
        assert!(reports.iter().all(|f| (0.0..=1.0).contains(f)));
    }

    #[tokio::test(start_paused = true)]
    async fn skipped_items_are_not_refetched() {
        let set = ShrinkingSet::new(&["a", "b"]);
        let attempts = RefCell::new(0usize);
        let run = run_batched(
            &config(2, None, PageMode::Shrinking),
            &CancellationToken::new(),
            |_| {},
            |_page| async { Ok(set.fetch(2)) },
            |id| id.clone(),
            |id| {
                let set = &set;
                let attempts = &attempts;
                async move {
                    *attempts.borrow_mut() += 1;
                    if id == "a" {
                        return Ok(ItemOutcome::skipped());
                    }
                    set.remove(&id);
                    Ok(ItemOutcome::processed())
                }
            },
        )
        .await
        .unwrap();
        assert_eq!(run.summary.skipped, 1);
        assert_eq!(run.summary.processed, 1);
        assert_eq!(*attempts.borrow(), 2);
    }
}
