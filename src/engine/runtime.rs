//! Bounded worker pool for per-entity migration.
//!
//! Entities share no mutable state, so they can be migrated concurrently.
//! Each entity is still handled by exactly one worker, which keeps the steps
//! of one entity strictly sequential.

use std::thread;

use crossbeam_channel::{bounded, unbounded};
use tracing::warn;

use crate::location::EntityLocation;

struct Job {
    index: usize,
    location: EntityLocation,
}

/// Runs `migrate` for every location on up to `workers` threads.
///
/// Results come back in the order of `locations`.
///
/// # Errors
/// Fails only if no worker thread could be spawned.
pub(super) fn run_pool<F, R>(
    locations: Vec<EntityLocation>,
    workers: usize,
    queue_capacity: usize,
    migrate: F,
) -> std::io::Result<Vec<(EntityLocation, R)>>
where
    F: Fn(&EntityLocation) -> R + Sync,
    R: Send,
{
    let workers = workers.max(1).min(locations.len().max(1));
    let (job_tx, job_rx) = bounded::<Job>(queue_capacity.max(1));
    let (result_tx, result_rx) = unbounded::<(usize, EntityLocation, R)>();

    thread::scope(|scope| -> std::io::Result<()> {
        let migrate = &migrate;
        let mut spawned = 0usize;
        let mut spawn_error = None;

        for idx in 0..workers {
            let rx = job_rx.clone();
            let tx = result_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("stepledger-entity-{idx}"))
                .spawn_scoped(scope, move || {
                    for job in rx {
                        let result = migrate(&job.location);
                        if tx.send((job.index, job.location, result)).is_err() {
                            break;
                        }
                    }
                });
            match handle {
                Ok(_) => spawned += 1,
                Err(e) => {
                    warn!(worker = idx, error = %e, "failed to spawn migration worker");
                    spawn_error = Some(e);
                    break;
                }
            }
        }
        drop(job_rx);
        drop(result_tx);

        if spawned == 0 {
            if let Some(e) = spawn_error {
                return Err(e);
            }
        }

        for (index, location) in locations.into_iter().enumerate() {
            if job_tx.send(Job { index, location }).is_err() {
                break;
            }
        }
        drop(job_tx);
        Ok(())
    })?;

    let mut outcomes: Vec<(usize, EntityLocation, R)> = result_rx.iter().collect();
    outcomes.sort_by_key(|(index, _, _)| *index);
    Ok(outcomes
        .into_iter()
        .map(|(_, location, result)| (location, result))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn locations(n: usize) -> Vec<EntityLocation> {
        (0..n)
            .map(|i| EntityLocation::new(format!("e{i}"), format!("/data/e{i}")))
            .collect()
    }

    #[test]
    fn test_pool_preserves_order_and_visits_each_once() {
        let calls = AtomicUsize::new(0);
        let results = run_pool(locations(25), 4, 2, |loc| {
            calls.fetch_add(1, Ordering::SeqCst);
            loc.entity_id.to_string()
        })
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 25);
        for (location, seen) in &results {
            assert_eq!(location.entity_id.as_str(), seen);
        }
        let ids: Vec<&str> = results.iter().map(|(_, seen)| seen.as_str()).collect();
        let expected: Vec<String> = (0..25).map(|i| format!("e{i}")).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_pool_with_no_locations() {
        let results = run_pool(Vec::new(), 3, 1, |loc| loc.entity_id.clone()).unwrap();
        assert!(results.is_empty());
    }
}
