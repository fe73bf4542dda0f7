//! Committing several units of work at once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use crate::response::ServiceResponse;
use crate::transaction::TransactionOptions;
use crate::uow::error::UnitOfWorkResult;
use crate::uow::id::UnitOfWorkId;
use crate::uow::unit::UnitOfWork;

/// Result of committing one unit in a batch.
#[derive(Debug)]
pub struct CommitOutcome {
    pub unit_id: UnitOfWorkId,
    pub result: UnitOfWorkResult<ServiceResponse<()>>,
}

impl CommitOutcome {
    /// Check if the unit committed.
    pub fn is_committed(&self) -> bool {
        matches!(&self.result, Ok(response) if response.is_data())
    }
}

/// Commit every unit using at most `options.max_degree_of_parallelism()`
/// worker threads.
///
/// Outcomes come back in input order. Nothing is aggregated: one unit
/// failing does not stop or undo the others.
pub fn commit_concurrently(
    units: &[&dyn UnitOfWork],
    options: &TransactionOptions,
) -> Vec<CommitOutcome> {
    let workers = options.max_degree_of_parallelism().min(units.len());
    if workers == 0 {
        return Vec::new();
    }

    tracing::debug!(units = units.len(), workers, "committing units concurrently");
    let next = AtomicUsize::new(0);

    let mut indexed: Vec<(usize, CommitOutcome)> = thread::scope(|s| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                s.spawn(|| {
                    let mut done = Vec::new();
                    loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some(unit) = units.get(index) else {
                            break;
                        };
                        done.push((
                            index,
                            CommitOutcome {
                                unit_id: unit.id(),
                                result: unit.commit(),
                            },
                        ));
                    }
                    done
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|handle| match handle.join() {
                Ok(done) => done,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    });

    indexed.sort_unstable_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, outcome)| outcome).collect()
}
