use crate::{cell_affinity_shuffle, ConnectionSource, RetryConfig, StatusAggregator};
use gateway_buffer::FailoverBuffer;
use gateway_cache::TabletStatsCache;
use gateway_core::{GatewayError, Role, TabletAlias, Target};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// What an action reports back to the retry loop. The loop never
/// interprets error codes itself (spec §4.5 "Retryable classification");
/// the caller decides.
pub enum ActionOutcome<T> {
    Success(T),
    /// This tablet (or its error) should be considered invalid for the
    /// rest of this request; pick another candidate and try again.
    Retryable(GatewayError),
    /// Stop immediately; return this error to the caller.
    Fatal(GatewayError),
}

/// Runs the retry/selection loop (spec §4.5) against a generic
/// connection type `C`, obtained from an injected [`ConnectionSource`].
pub struct Retryer<C> {
    cell: String,
    config: RetryConfig,
    cache: Arc<TabletStatsCache>,
    buffer: Arc<FailoverBuffer>,
    connections: Arc<dyn ConnectionSource<C>>,
    aggregator: Arc<StatusAggregator>,
}

impl<C: Clone + Send + Sync + 'static> Retryer<C> {
    pub fn new(
        cell: impl Into<String>,
        config: RetryConfig,
        cache: Arc<TabletStatsCache>,
        buffer: Arc<FailoverBuffer>,
        connections: Arc<dyn ConnectionSource<C>>,
        aggregator: Arc<StatusAggregator>,
    ) -> Self {
        Self {
            cell: cell.into(),
            config,
            cache,
            buffer,
            connections,
            aggregator,
        }
    }

    pub fn aggregator(&self) -> &Arc<StatusAggregator> {
        &self.aggregator
    }

    /// Select a tablet, run `action`, classify the result, and retry up
    /// to `retry_count + 1` attempts (spec §4.5).
    pub async fn execute<F, Fut, T>(
        &self,
        target: &Target,
        in_transaction: bool,
        buffer_deadline: Duration,
        mut action: F,
    ) -> Result<T, GatewayError>
    where
        F: FnMut(C) -> Fut,
        Fut: Future<Output = ActionOutcome<T>>,
    {
        if !self.config.role_allowed(target.role) {
            return Err(GatewayError::RoleNotAllowed {
                role: target.role.to_string(),
            });
        }

        let mut invalid: HashSet<TabletAlias> = HashSet::new();
        let mut buffered_once = false;
        let mut last_err: Option<GatewayError> = None;
        let no_prior_failure = GatewayError::Application("no prior attempt".into());

        for _attempt in 0..=self.config.retry_count {
            if self.config.buffer_enabled
                && target.role == Role::Primary
                && !in_transaction
                && !buffered_once
            {
                let signal = last_err.as_ref().unwrap_or(&no_prior_failure);
                match self
                    .buffer
                    .wait(&target.keyspace, &target.shard, signal, buffer_deadline)
                    .await
                {
                    Ok(true) => buffered_once = true,
                    Ok(false) => {}
                    Err(err) => return Err(err.with_target(target.clone())),
                }
            }

            let mut healthy = self.cache.get_healthy(target);
            if self.config.replica_routes_to_readonly && target.role == Role::Replica {
                let read_only_target = Target::new(&target.keyspace, &target.shard, Role::ReadOnly);
                healthy.extend(self.cache.get_healthy(&read_only_target));
            }
            if healthy.is_empty() {
                return Err(GatewayError::NoHealthyTablet {
                    target: target.clone(),
                }
                .with_target(target.clone()));
            }
            cell_affinity_shuffle(&mut healthy, &self.cell);

            let mut candidate = None;
            for tablet in &healthy {
                if invalid.contains(&tablet.alias) {
                    continue;
                }
                if let Some(connection) = self.connections.get_connection(&tablet.alias).await {
                    candidate = Some((tablet.alias.clone(), connection));
                    break;
                }
                invalid.insert(tablet.alias.clone());
            }
            let Some((alias, connection)) = candidate else {
                return Err(GatewayError::NoHealthyTablet {
                    target: target.clone(),
                }
                .with_target(target.clone()));
            };

            let start = tokio::time::Instant::now();
            let outcome = action(connection).await;
            let elapsed = start.elapsed();

            match outcome {
                ActionOutcome::Success(value) => {
                    self.aggregator.record(target, elapsed, true);
                    return Ok(value);
                }
                ActionOutcome::Retryable(err) => {
                    self.aggregator.record(target, elapsed, false);
                    invalid.insert(alias);
                    last_err = Some(err);
                }
                ActionOutcome::Fatal(err) => {
                    self.aggregator.record(target, elapsed, false);
                    return Err(err.with_target(target.clone()));
                }
            }
        }

        Err(last_err
            .unwrap_or(GatewayError::NoHealthyTablet {
                target: target.clone(),
            })
            .with_target(target.clone()))
    }
}
