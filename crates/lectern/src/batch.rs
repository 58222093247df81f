//! # Batch scheduler
//!
//! Splits an identifier list into consecutive batches of `batch_size`. Items of
//! one batch are in flight together; batches run strictly in order with a
//! pause between them, which keeps constrained devices and the backing store
//! from being flooded.

use std::future::Future;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tracing::{debug, info};

use crate::item::ItemId;
use crate::profile::BatchProfile;

/// Outcome of one scheduler run.
#[derive(Debug)]
pub struct BatchRun<T> {
    /// Loaded values with the list position of their identifier, in completion order
    pub loaded: Vec<(usize, T)>,
    /// Identifiers that settled without a value
    pub skipped: Vec<ItemId>,
    /// Size of every batch that ran, in order
    pub batch_sizes: Vec<usize>,
    /// Number of inter-batch pauses taken
    pub pauses: usize,
}

impl<T> Default for BatchRun<T> {
    fn default() -> Self {
        Self {
            loaded: Vec::new(),
            skipped: Vec::new(),
            batch_sizes: Vec::new(),
            pauses: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BatchScheduler {
    profile: BatchProfile,
}

impl BatchScheduler {
    pub fn new(profile: BatchProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &BatchProfile {
        &self.profile
    }

    /// Number of batches `count` identifiers are split into.
    pub fn batch_count(&self, count: usize) -> usize {
        count.div_ceil(self.profile.batch_size.max(1))
    }

    /// Resolve every identifier through `per_item`; `None` means the item is
    /// skipped. `on_settle` runs once per identifier as soon as it settles.
    pub async fn run<T, F, Fut, S>(
        &self,
        ids: &[ItemId],
        mut per_item: F,
        mut on_settle: S,
    ) -> BatchRun<T>
    where
        F: FnMut(&ItemId) -> Fut,
        Fut: Future<Output = Option<T>>,
        S: FnMut(&ItemId, Option<&T>),
    {
        let mut run = BatchRun::default();
        if ids.is_empty() {
            return run;
        }

        let batch_size = self.profile.batch_size.max(1);
        let total_batches = self.batch_count(ids.len());

        for (index, batch) in ids.chunks(batch_size).enumerate() {
            if index > 0 && !self.profile.inter_batch_delay.is_zero() {
                debug!(
                    delay_ms = self.profile.inter_batch_delay.as_millis() as u64,
                    "Pausing between batches"
                );
                tokio::time::sleep(self.profile.inter_batch_delay).await;
            }
            if index > 0 {
                run.pauses += 1;
            }

            info!(
                batch = index + 1,
                total_batches,
                size = batch.len(),
                "Loading batch"
            );
            run.batch_sizes.push(batch.len());

            let offset = index * batch_size;
            let mut in_flight: FuturesUnordered<_> = batch
                .iter()
                .enumerate()
                .map(|(i, id)| {
                    let position = offset + i;
                    let pending = per_item(id);
                    async move { (position, pending.await) }
                })
                .collect();

            while let Some((position, value)) = in_flight.next().await {
                let id = &ids[position];
                on_settle(id, value.as_ref());
                match value {
                    Some(value) => run.loaded.push((position, value)),
                    None => run.skipped.push(id.clone()),
                }
            }
        }

        run
    }
}
