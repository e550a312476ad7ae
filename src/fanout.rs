//! Task-per-item fan-out joined by a counted barrier

use crate::{Result, SwarmError};
use std::future::Future;
use tokio::task::JoinSet;
use tracing::error;

/// Per-item outcome of a fan-out
#[derive(Debug, Default)]
pub struct FanOutReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, SwarmError)>,
}

impl FanOutReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn record(&mut self, name: String, outcome: Result<()>) {
        match outcome {
            Ok(()) => self.succeeded.push(name),
            Err(e) => self.failed.push((name, e)),
        }
    }

    pub fn merge(&mut self, other: FanOutReport) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
    }
}

/// Spawn one task per item, then wait for all of them
///
/// Every task is started before any is awaited. Each task names the item it
/// handled; results arrive in completion order.
pub(crate) async fn fan_out<T, F, Fut>(items: impl IntoIterator<Item = T>, op: F) -> FanOutReport
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = (String, Result<()>)> + Send + 'static,
{
    let mut join_set = JoinSet::new();
    for item in items {
        join_set.spawn(op(item));
    }

    let mut report = FanOutReport::default();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((name, outcome)) => report.record(name, outcome),
            Err(e) => {
                error!(error = %e, "Fan-out task did not complete");
                report
                    .failed
                    .push(("<unknown>".to_string(), SwarmError::Task(e.to_string())));
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_item_yields_an_outcome() {
        let names: Vec<String> = (0..6).map(|i| format!("part{}", i)).collect();
        let report = fan_out(names, |name| async move {
            let outcome = if name.ends_with('3') {
                Err(SwarmError::Validation("bad part".into()))
            } else {
                Ok(())
            };
            (name, outcome)
        })
        .await;

        assert_eq!(report.total(), 6);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "part3");
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn test_empty_input() {
        let report = fan_out(Vec::<String>::new(), |name| async move { (name, Ok(())) }).await;
        assert_eq!(report.total(), 0);
        assert!(report.is_clean());
    }
}
