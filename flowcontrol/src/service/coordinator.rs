//! The barrier coordinator.

use std::sync::Arc;
use tracing::{debug, info, instrument, warn, Span};

use super::ports::{NodeStatusProvider, WaitNotifyEngine};
use crate::config::BarrierServiceConfig;
use crate::core::{BarrierPositionType, BarrierState, ParticipantState};
use crate::definition::{BarrierPositionResolver, ResolvedBarriers};
use crate::errors::{FlowControlError, Result};
use crate::events::{self, EventSink, NoOpEventSink};
use crate::model::{
    BarrierExecutionInstance, BarrierPosition, BarrierPositionInfo, BarrierResponseData,
    BarrierSetupInfo,
};
use crate::observability::{BarrierSpanAttributes, SpanTimer};
use crate::store::{BarrierFilter, BarrierStore, BarrierUpdate, PositionFilter, PositionSelector};

/// Failure message delivered when the owning plan failed.
pub const PLAN_FAILED_MESSAGE: &str = "Barrier was released because the pipeline failed";

/// Failure message delivered when a plan's barriers are torn down.
pub const TEARDOWN_MESSAGE: &str = "Barrier was removed because the pipeline execution ended";

/// Re-evaluations a tick makes when positions change under it.
const MAX_TICK_EVALUATIONS: usize = 3;

/// Coordinates barrier instances for the execution engine.
///
/// All mutations are atomic store updates; the service holds no locks and
/// may be shared across tasks freely.
#[derive(Clone)]
pub struct BarrierService {
    store: Arc<dyn BarrierStore>,
    statuses: Arc<dyn NodeStatusProvider>,
    notifier: Arc<dyn WaitNotifyEngine>,
    events: Arc<dyn EventSink>,
    resolver: BarrierPositionResolver,
    config: BarrierServiceConfig,
}

impl std::fmt::Debug for BarrierService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BarrierService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BarrierService {
    /// Creates a service with the default configuration and no event sink.
    #[must_use]
    pub fn new(
        store: Arc<dyn BarrierStore>,
        statuses: Arc<dyn NodeStatusProvider>,
        notifier: Arc<dyn WaitNotifyEngine>,
    ) -> Self {
        Self {
            store,
            statuses,
            notifier,
            events: Arc::new(NoOpEventSink),
            resolver: BarrierPositionResolver::new(),
            config: BarrierServiceConfig::default(),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: BarrierServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &BarrierServiceConfig {
        &self.config
    }

    fn emit(&self, event_type: &str, data: serde_json::Value) {
        if self.config.emit_events {
            self.events.try_emit(event_type, Some(data));
        }
    }

    // ----- persistence -----

    /// Persists an instance.
    pub async fn save(&self, instance: BarrierExecutionInstance) -> Result<BarrierExecutionInstance> {
        let saved = self.store.save(instance).await?;
        debug!(
            barrier_id = %saved.uuid,
            identifier = %saved.identifier,
            plan_execution_id = %saved.plan_execution_id,
            "Saved barrier instance"
        );
        self.emit(events::BARRIER_CREATED, events::instance_payload(&saved));
        Ok(saved)
    }

    /// Persists several instances in order.
    pub async fn save_all(
        &self,
        instances: Vec<BarrierExecutionInstance>,
    ) -> Result<Vec<BarrierExecutionInstance>> {
        let mut saved = Vec::with_capacity(instances.len());
        for instance in instances {
            saved.push(self.save(instance).await?);
        }
        Ok(saved)
    }

    /// Loads an instance by uuid.
    pub async fn get(&self, uuid: &str) -> Result<BarrierExecutionInstance> {
        self.store
            .get(uuid)
            .await?
            .ok_or_else(|| FlowControlError::not_found(uuid))
    }

    // ----- queries -----

    /// The barrier with `identifier` in a plan execution.
    pub async fn find_by_identifier_and_plan_execution_id(
        &self,
        identifier: &str,
        plan_execution_id: &str,
    ) -> Result<Option<BarrierExecutionInstance>> {
        let filter = BarrierFilter::new()
            .identifier(identifier)
            .plan_execution_id(plan_execution_id);
        Ok(self.store.find_many(&filter).await?.into_iter().next())
    }

    /// The barrier referenced by the barrier step with setup id `plan_node_id`.
    pub async fn find_by_plan_node_id_and_plan_execution_id(
        &self,
        plan_node_id: &str,
        plan_execution_id: &str,
    ) -> Result<Option<BarrierExecutionInstance>> {
        let filter = BarrierFilter::new()
            .plan_execution_id(plan_execution_id)
            .position(PositionFilter::setup(BarrierPositionType::Step, plan_node_id));
        Ok(self.store.find_many(&filter).await?.into_iter().next())
    }

    /// Barriers referenced by a stage whose state is one of `states`.
    pub async fn find_by_stage_identifier_and_plan_execution_id_and_state_in(
        &self,
        stage_identifier: &str,
        plan_execution_id: &str,
        states: &[BarrierState],
    ) -> Result<Vec<BarrierExecutionInstance>> {
        let filter = BarrierFilter::new()
            .stage_identifier(stage_identifier)
            .plan_execution_id(plan_execution_id)
            .states(states);
        Ok(self.store.find_many(&filter).await?)
    }

    /// Barriers of a plan execution whose state is one of `states`.
    ///
    /// An empty `states` slice matches every state.
    pub async fn find_by_plan_execution_id_and_state_in(
        &self,
        plan_execution_id: &str,
        states: &[BarrierState],
    ) -> Result<Vec<BarrierExecutionInstance>> {
        let mut filter = BarrierFilter::new().plan_execution_id(plan_execution_id);
        if !states.is_empty() {
            filter = filter.states(states);
        }
        Ok(self.store.find_many(&filter).await?)
    }

    /// Barriers with a position at setup id `setup_id` of level `kind`.
    pub async fn find_by_position(
        &self,
        plan_execution_id: &str,
        kind: BarrierPositionType,
        setup_id: &str,
    ) -> Result<Vec<BarrierExecutionInstance>> {
        let filter = BarrierFilter::new()
            .plan_execution_id(plan_execution_id)
            .position(PositionFilter::setup(kind, setup_id));
        Ok(self.store.find_many(&filter).await?)
    }

    /// Barriers with a position bound to `runtime_id` at level `kind`.
    pub async fn find_by_runtime_position(
        &self,
        plan_execution_id: &str,
        kind: BarrierPositionType,
        runtime_id: &str,
    ) -> Result<Vec<BarrierExecutionInstance>> {
        let filter = BarrierFilter::new()
            .plan_execution_id(plan_execution_id)
            .position(PositionFilter::runtime(kind, runtime_id));
        Ok(self.store.find_many(&filter).await?)
    }

    // ----- mutations -----

    /// Moves a `STANDING` barrier to `state`.
    ///
    /// Terminal barriers are returned unchanged. Waiters are not signalled
    /// here; the next [`update`](Self::update) tick releases them.
    pub async fn update_state(&self, uuid: &str, state: BarrierState) -> Result<BarrierExecutionInstance> {
        let filter = BarrierFilter::new().uuid(uuid).state(BarrierState::Standing);
        match self
            .store
            .find_and_modify(&filter, &BarrierUpdate::SetState(state))
            .await?
        {
            Some(moved) => {
                info!(barrier_id = %uuid, from = %BarrierState::Standing, to = %state, "Barrier state changed");
                self.emit(events::BARRIER_STATE_CHANGED, events::instance_payload(&moved));
                Ok(moved)
            }
            None => self.get(uuid).await,
        }
    }

    /// Binds a started branch's runtime id into the matching positions of
    /// every barrier of the plan.
    ///
    /// With `use_additional_filters`, only positions inside the same
    /// concrete strategy copy (matching ancestor runtime ids) are bound and
    /// strategy roots at `kind` are skipped. Returns the barriers that now
    /// have a position bound to `runtime_id`.
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip(self))]
    pub async fn update_position(
        &self,
        plan_execution_id: &str,
        kind: BarrierPositionType,
        setup_id: &str,
        runtime_id: &str,
        stage_runtime_id: Option<&str>,
        step_group_runtime_id: Option<&str>,
        use_additional_filters: bool,
    ) -> Result<Vec<BarrierExecutionInstance>> {
        let timer = SpanTimer::start("barrier.update_position");
        let selector = if use_additional_filters {
            PositionSelector::within(
                kind,
                setup_id,
                stage_runtime_id.map(str::to_string),
                step_group_runtime_id.map(str::to_string),
            )
        } else {
            PositionSelector::all(kind, setup_id)
        };
        let filter = BarrierFilter::new()
            .plan_execution_id(plan_execution_id)
            .position(PositionFilter::setup(kind, setup_id));
        let update = BarrierUpdate::BindRuntimeId {
            selector,
            runtime_id: runtime_id.to_string(),
        };

        let modified = self.store.update_many(&filter, &update).await?;
        let bound = self
            .find_by_runtime_position(plan_execution_id, kind, runtime_id)
            .await?;

        if modified > 0 {
            debug!(modified, %kind, setup_id, runtime_id, "Bound runtime id to barrier positions");
            for instance in &bound {
                let mut payload = events::instance_payload(instance);
                payload["position_type"] = serde_json::json!(kind);
                payload["runtime_id"] = serde_json::json!(runtime_id);
                self.emit(events::BARRIER_POSITION_BOUND, payload);
            }
        }
        timer.finish();
        Ok(bound)
    }

    /// Merges an instance into the one with the same plan and identifier,
    /// or inserts it if there is none.
    ///
    /// Stages and strategy ids are unioned and positions appended, so
    /// concurrent callers registering different copies all survive.
    pub async fn upsert(&self, instance: BarrierExecutionInstance) -> Result<BarrierExecutionInstance> {
        let filter = BarrierFilter::new()
            .plan_execution_id(&instance.plan_execution_id)
            .identifier(&instance.identifier);
        let update = BarrierUpdate::Merge {
            setup_info: instance.setup_info.clone(),
            positions: instance.positions().to_vec(),
        };
        let seed_uuid = instance.uuid.clone();

        let merged = self.store.find_and_upsert(&filter, &update, instance).await?;
        if merged.uuid == seed_uuid {
            self.emit(events::BARRIER_CREATED, events::instance_payload(&merged));
        }
        debug!(
            barrier_id = %merged.uuid,
            identifier = %merged.identifier,
            positions = merged.positions().len(),
            "Upserted barrier instance"
        );
        Ok(merged)
    }

    /// Upserts from setup info and positions.
    pub async fn upsert_barrier_execution_instance(
        &self,
        plan_execution_id: &str,
        setup_info: BarrierSetupInfo,
        positions: Vec<BarrierPosition>,
    ) -> Result<BarrierExecutionInstance> {
        self.upsert(BarrierExecutionInstance::new(
            plan_execution_id,
            setup_info,
            positions,
        ))
        .await
    }

    /// Writes the runtime ids of fully expanded strategy copies and
    /// records the strategy's declared concurrency.
    ///
    /// Supplied positions claim matching unbound entries; the rest are
    /// appended. Entries not named by `positions` are left alone.
    pub async fn update_barrier_position_info_list_and_strategy_concurrency(
        &self,
        identifier: &str,
        plan_execution_id: &str,
        positions: Vec<BarrierPosition>,
        strategy_id: &str,
        concurrency: u32,
    ) -> Result<BarrierExecutionInstance> {
        let filter = BarrierFilter::new()
            .identifier(identifier)
            .plan_execution_id(plan_execution_id);
        let update = BarrierUpdate::AbsorbPositions {
            positions,
            strategy_id: strategy_id.to_string(),
            concurrency,
        };

        if let Some(updated) = self.store.find_and_modify(&filter, &update).await? {
            debug!(identifier, strategy_id, concurrency, "Recorded strategy concurrency");
            return Ok(updated);
        }
        self.find_by_identifier_and_plan_execution_id(identifier, plan_execution_id)
            .await?
            .ok_or_else(|| FlowControlError::not_found(identifier))
    }

    // ----- state machine -----

    /// Evaluates the barrier against current node and plan statuses and
    /// moves it out of `STANDING` when a terminal condition holds.
    ///
    /// The transition is conditional on the position list it was evaluated
    /// against; if positions changed in the meantime the barrier is
    /// re-evaluated. Only the caller whose compare-and-set wins signals the
    /// waiters. A tick on a terminal barrier whose release never reached
    /// the wait/notify engine sends the same payload again; otherwise it is
    /// a no-op.
    #[instrument(
        skip_all,
        fields(
            barrier.uuid = %instance.uuid,
            barrier.identifier = %instance.identifier,
            barrier.plan_execution_id = %instance.plan_execution_id,
            barrier.state = tracing::field::Empty,
            barrier.duration_ms = tracing::field::Empty,
        )
    )]
    pub async fn update(&self, instance: &BarrierExecutionInstance) -> Result<BarrierExecutionInstance> {
        let timer = SpanTimer::start("barrier.update");
        let mut current = self.get(&instance.uuid).await?;

        for _ in 0..MAX_TICK_EVALUATIONS {
            if current.barrier_state.is_terminal() {
                Self::record_tick(timer, current.barrier_state);
                if current.notified {
                    return Ok(current);
                }
                let response = Self::response_for(&current);
                return self.release(current, response).await;
            }

            let Some((next, response)) = self.evaluate(&current).await? else {
                Self::record_tick(timer, current.barrier_state);
                return Ok(current);
            };

            let filter = BarrierFilter::new()
                .uuid(&current.uuid)
                .state(BarrierState::Standing)
                .position_list(current.positions());
            let transition = BarrierUpdate::Transition {
                state: next,
                message: response.error_message.clone(),
            };
            let Some(moved) = self.store.find_and_modify(&filter, &transition).await? else {
                debug!("Barrier changed while it was evaluated");
                current = self.get(&current.uuid).await?;
                continue;
            };

            info!(
                plan_execution_id = %moved.plan_execution_id,
                from = %BarrierState::Standing,
                to = %next,
                "Barrier state changed"
            );
            self.emit(events::BARRIER_STATE_CHANGED, events::instance_payload(&moved));
            if next == BarrierState::Down && self.config.validate_strategy_concurrency {
                self.warn_if_under_filled(&moved);
            }
            Self::record_tick(timer, next);
            return self.release(moved, response).await;
        }

        // Positions kept changing; the next participant event ticks again.
        debug!("Barrier still changing, leaving it standing");
        Self::record_tick(timer, current.barrier_state);
        Ok(current)
    }

    fn record_tick(timer: SpanTimer, state: BarrierState) {
        BarrierSpanAttributes::new()
            .with_state(state)
            .with_duration_ms(timer.finish())
            .record_on(&Span::current());
    }

    async fn evaluate(
        &self,
        instance: &BarrierExecutionInstance,
    ) -> Result<Option<(BarrierState, BarrierResponseData)>> {
        let plan_status = self.statuses.plan_status(&instance.plan_execution_id).await?;
        if plan_status.is_broke() {
            return Ok(Some((
                BarrierState::Endure,
                BarrierResponseData::failure(BarrierState::Endure, PLAN_FAILED_MESSAGE),
            )));
        }

        let mut participants = Vec::with_capacity(instance.positions().len());
        let mut all_bound = !instance.positions().is_empty();
        for position in instance.positions() {
            match position.participant_runtime_id() {
                Some(runtime_id) => {
                    let status = self.statuses.node_status(runtime_id).await?;
                    participants.push((runtime_id, ParticipantState::from_status(status)));
                }
                None => all_bound = false,
            }
        }

        if let Some((runtime_id, _)) = participants
            .iter()
            .find(|(_, state)| *state == ParticipantState::TimedOut)
        {
            return Ok(Some((
                BarrierState::TimedOut,
                BarrierResponseData::failure(
                    BarrierState::TimedOut,
                    format!("Barrier participant [{runtime_id}] expired before the barrier went down"),
                ),
            )));
        }
        if let Some((runtime_id, _)) = participants
            .iter()
            .find(|(_, state)| *state == ParticipantState::Abandoned)
        {
            return Ok(Some((
                BarrierState::Endure,
                BarrierResponseData::failure(
                    BarrierState::Endure,
                    format!("Barrier participant [{runtime_id}] will never reach the barrier"),
                ),
            )));
        }
        if all_bound
            && participants
                .iter()
                .all(|(_, state)| *state == ParticipantState::Arrived)
        {
            return Ok(Some((BarrierState::Down, BarrierResponseData::down())));
        }
        Ok(None)
    }

    fn response_for(instance: &BarrierExecutionInstance) -> BarrierResponseData {
        match instance.barrier_state {
            BarrierState::Down | BarrierState::Standing => BarrierResponseData::down(),
            failed => BarrierResponseData::failure(
                failed,
                instance
                    .release_message
                    .clone()
                    .unwrap_or_else(|| format!("Barrier was released with state {failed}")),
            ),
        }
    }

    fn warn_if_under_filled(&self, instance: &BarrierExecutionInstance) {
        for (strategy, bound, declared) in instance.under_filled_strategies() {
            warn!(
                barrier_id = %instance.uuid,
                identifier = %instance.identifier,
                strategy,
                bound,
                declared,
                "Barrier went down before every strategy copy checked in"
            );
        }
    }

    /// Signals waiters, then records that they were signalled.
    async fn release(
        &self,
        instance: BarrierExecutionInstance,
        response: BarrierResponseData,
    ) -> Result<BarrierExecutionInstance> {
        self.notifier.done_with(&instance.uuid, response.clone()).await?;

        let marked = self
            .store
            .find_and_modify(
                &BarrierFilter::new().uuid(&instance.uuid),
                &BarrierUpdate::MarkNotified,
            )
            .await?;
        let released = match marked {
            Some(marked) => marked,
            None => self.get(&instance.uuid).await?,
        };

        debug!(
            barrier_id = %released.uuid,
            failed = response.failed,
            "Released barrier waiters"
        );
        let mut payload = events::instance_payload(&released);
        payload["failed"] = serde_json::json!(response.failed);
        self.emit(events::BARRIER_RELEASED, payload);
        Ok(released)
    }

    // ----- teardown -----

    /// Deletes every barrier of the given plan executions.
    ///
    /// When configured, branches still parked on those barriers are
    /// released with a failure first. Unknown plan ids are ignored.
    pub async fn delete_all_for_given_plan_execution_id(
        &self,
        plan_execution_ids: &[String],
    ) -> Result<usize> {
        if plan_execution_ids.is_empty() {
            return Ok(0);
        }
        let filter = BarrierFilter::new().plan_execution_ids(plan_execution_ids);
        let doomed = self.store.find_many(&filter).await?;

        if self.config.release_waiters_on_teardown {
            for instance in doomed.iter().filter(|instance| !instance.notified) {
                let response = BarrierResponseData::failure(
                    if instance.barrier_state.is_terminal() {
                        instance.barrier_state
                    } else {
                        BarrierState::Endure
                    },
                    TEARDOWN_MESSAGE,
                );
                if let Err(err) = self.notifier.done_with(&instance.uuid, response).await {
                    warn!(barrier_id = %instance.uuid, error = %err, "Failed to release waiters on teardown");
                }
            }
        }

        let deleted = self.store.delete_many(&filter).await?;
        let correlation_ids: Vec<String> = doomed.into_iter().map(|instance| instance.uuid).collect();
        if let Err(err) = self.notifier.forget(&correlation_ids).await {
            warn!(error = %err, "Failed to clear wait/notify state on teardown");
        }
        info!(
            plan_execution_ids = ?plan_execution_ids,
            deleted,
            "Deleted barrier instances"
        );
        self.emit(
            events::BARRIER_TEARDOWN,
            serde_json::json!({
                "plan_execution_ids": plan_execution_ids,
                "deleted": deleted,
            }),
        );
        Ok(deleted)
    }

    // ----- definitions -----

    /// Scans and resolves a pipeline YAML.
    pub fn resolve_barriers(&self, yaml: &str) -> Result<ResolvedBarriers> {
        Ok(self.resolver.resolve_yaml(yaml)?)
    }

    /// Setup info of every barrier declared in a pipeline YAML.
    pub fn get_barrier_setup_info_list(&self, yaml: &str) -> Result<Vec<BarrierSetupInfo>> {
        Ok(self.resolver.barrier_setup_info_list(yaml)?)
    }

    /// Positions of every barrier declared in a pipeline YAML.
    pub fn get_barrier_position_info_list(&self, yaml: &str) -> Result<Vec<BarrierPositionInfo>> {
        Ok(self.resolver.barrier_position_info_list(yaml)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ExecutionStatus;
    use crate::service::ports::{MockNodeStatusProvider, MockWaitNotifyEngine};
    use crate::store::InMemoryBarrierStore;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn bound_instance(plan: &str, step_runtime_id: &str) -> BarrierExecutionInstance {
        BarrierExecutionInstance::new(
            plan,
            BarrierSetupInfo::new("b1", "b1").with_stage("stage1"),
            vec![BarrierPosition::step("stage1", None, "step1")
                .with_runtime_id(BarrierPositionType::Stage, "stageRun")
                .with_runtime_id(BarrierPositionType::Step, step_runtime_id)],
        )
    }

    fn service_with(
        store: Arc<InMemoryBarrierStore>,
        statuses: MockNodeStatusProvider,
        notifier: MockWaitNotifyEngine,
    ) -> BarrierService {
        BarrierService::new(store, Arc::new(statuses), Arc::new(notifier))
    }

    #[tokio::test]
    async fn test_tick_down_signals_success_once() {
        let store = Arc::new(InMemoryBarrierStore::new());
        let mut statuses = MockNodeStatusProvider::new();
        statuses
            .expect_plan_status()
            .returning(|_| Ok(ExecutionStatus::Running));
        statuses
            .expect_node_status()
            .withf(|runtime_id| runtime_id == "stepRun")
            .returning(|_| Ok(Some(ExecutionStatus::Succeeded)));
        let mut notifier = MockWaitNotifyEngine::new();
        notifier
            .expect_done_with()
            .withf(|_, response| *response == BarrierResponseData::down())
            .times(1)
            .returning(|_, _| Ok(()));

        let service = service_with(store, statuses, notifier);
        let saved = service.save(bound_instance("plan", "stepRun")).await.unwrap();

        let ticked = service.update(&saved).await.unwrap();
        assert_eq!(ticked.barrier_state, BarrierState::Down);
        assert!(ticked.notified);

        let again = service.update(&saved).await.unwrap();
        assert_eq!(again.barrier_state, BarrierState::Down);
    }

    #[tokio::test]
    async fn test_tick_plan_failure_wins_over_node_success() {
        let store = Arc::new(InMemoryBarrierStore::new());
        let mut statuses = MockNodeStatusProvider::new();
        statuses
            .expect_plan_status()
            .returning(|_| Ok(ExecutionStatus::Failed));
        statuses.expect_node_status().never();
        let mut notifier = MockWaitNotifyEngine::new();
        notifier
            .expect_done_with()
            .withf(|_, response| {
                response.failed
                    && response.barrier_state == BarrierState::Endure
                    && response.error_message.as_deref() == Some(PLAN_FAILED_MESSAGE)
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let service = service_with(store, statuses, notifier);
        let saved = service.save(bound_instance("plan", "stepRun")).await.unwrap();

        let ticked = service.update(&saved).await.unwrap();
        assert_eq!(ticked.barrier_state, BarrierState::Endure);
    }

    #[tokio::test]
    async fn test_tick_expired_participant_times_out() {
        let store = Arc::new(InMemoryBarrierStore::new());
        let mut statuses = MockNodeStatusProvider::new();
        statuses
            .expect_plan_status()
            .returning(|_| Ok(ExecutionStatus::Running));
        statuses
            .expect_node_status()
            .returning(|_| Ok(Some(ExecutionStatus::Expired)));
        let mut notifier = MockWaitNotifyEngine::new();
        notifier
            .expect_done_with()
            .withf(|_, response| response.barrier_state == BarrierState::TimedOut)
            .times(1)
            .returning(|_, _| Ok(()));

        let service = service_with(store, statuses, notifier);
        let saved = service.save(bound_instance("plan", "stepRun")).await.unwrap();

        let ticked = service.update(&saved).await.unwrap();
        assert_eq!(ticked.barrier_state, BarrierState::TimedOut);
    }

    #[tokio::test]
    async fn test_tick_unbound_position_keeps_standing() {
        let store = Arc::new(InMemoryBarrierStore::new());
        let mut statuses = MockNodeStatusProvider::new();
        statuses
            .expect_plan_status()
            .returning(|_| Ok(ExecutionStatus::Running));
        statuses
            .expect_node_status()
            .returning(|_| Ok(Some(ExecutionStatus::Succeeded)));
        let mut notifier = MockWaitNotifyEngine::new();
        notifier.expect_done_with().never();

        let service = service_with(store, statuses, notifier);
        let mut instance = bound_instance("plan", "stepRun");
        instance
            .position_info
            .barrier_position_list
            .push(BarrierPosition::step("stage2", None, "step2"));
        let saved = service.save(instance).await.unwrap();

        let ticked = service.update(&saved).await.unwrap();
        assert_eq!(ticked.barrier_state, BarrierState::Standing);
        assert!(!ticked.notified);
    }

    #[tokio::test]
    async fn test_failed_signal_is_resent_by_next_tick() {
        let store = Arc::new(InMemoryBarrierStore::new());
        let mut statuses = MockNodeStatusProvider::new();
        statuses
            .expect_plan_status()
            .returning(|_| Ok(ExecutionStatus::Running));
        statuses
            .expect_node_status()
            .returning(|_| Ok(Some(ExecutionStatus::Succeeded)));
        let mut notifier = MockWaitNotifyEngine::new();
        let mut seq = mockall::Sequence::new();
        notifier
            .expect_done_with()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|id, _| Err(FlowControlError::notify(id, "transport down")));
        notifier
            .expect_done_with()
            .withf(|_, response| !response.failed)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let service = service_with(store, statuses, notifier);
        let saved = service.save(bound_instance("plan", "stepRun")).await.unwrap();

        let err = service.update(&saved).await.unwrap_err();
        assert!(err.is_retryable());
        let stuck = service.get(&saved.uuid).await.unwrap();
        assert_eq!(stuck.barrier_state, BarrierState::Down);
        assert!(!stuck.notified);

        let retried = service.update(&saved).await.unwrap();
        assert!(retried.notified);
    }

    #[tokio::test]
    async fn test_resent_release_repeats_original_failure_message() {
        let store = Arc::new(InMemoryBarrierStore::new());
        let mut statuses = MockNodeStatusProvider::new();
        statuses
            .expect_plan_status()
            .returning(|_| Ok(ExecutionStatus::Running));
        statuses
            .expect_node_status()
            .returning(|_| Ok(Some(ExecutionStatus::Expired)));
        let expired_message = |response: &BarrierResponseData| {
            response.barrier_state == BarrierState::TimedOut
                && response
                    .error_message
                    .as_deref()
                    .is_some_and(|message| message.contains("[stepRun] expired"))
        };
        let mut notifier = MockWaitNotifyEngine::new();
        let mut seq = mockall::Sequence::new();
        notifier
            .expect_done_with()
            .withf(move |_, response| expired_message(response))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|id, _| Err(FlowControlError::notify(id, "transport down")));
        notifier
            .expect_done_with()
            .withf(move |_, response| expired_message(response))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let service = service_with(store, statuses, notifier);
        let saved = service.save(bound_instance("plan", "stepRun")).await.unwrap();

        assert!(service.update(&saved).await.is_err());
        let stuck = service.get(&saved.uuid).await.unwrap();
        assert_eq!(stuck.barrier_state, BarrierState::TimedOut);
        assert!(stuck
            .release_message
            .as_deref()
            .is_some_and(|message| message.contains("[stepRun] expired")));

        let retried = service.update(&saved).await.unwrap();
        assert!(retried.notified);
    }

    /// Appends an unbound copy of the barrier the first time a participant
    /// status is read, as a concurrent `upsert` would.
    struct CopyAppearsMidTick {
        store: Arc<InMemoryBarrierStore>,
        appended: AtomicBool,
    }

    #[async_trait::async_trait]
    impl NodeStatusProvider for CopyAppearsMidTick {
        async fn node_status(&self, _runtime_id: &str) -> Result<Option<ExecutionStatus>> {
            if !self.appended.swap(true, Ordering::SeqCst) {
                let late_copy = BarrierPosition::step("stage1", None, "step1")
                    .with_runtime_id(BarrierPositionType::Stage, "stageRun2");
                let merge = BarrierUpdate::Merge {
                    setup_info: BarrierSetupInfo::new("b1", "b1").with_stage("stage1"),
                    positions: vec![late_copy],
                };
                self.store
                    .find_and_upsert(
                        &BarrierFilter::new().identifier("b1"),
                        &merge,
                        bound_instance("plan", "unused"),
                    )
                    .await?;
            }
            Ok(Some(ExecutionStatus::Succeeded))
        }

        async fn plan_status(&self, _plan_execution_id: &str) -> Result<ExecutionStatus> {
            Ok(ExecutionStatus::Running)
        }
    }

    #[tokio::test]
    async fn test_copy_upserted_during_tick_blocks_down() {
        let store = Arc::new(InMemoryBarrierStore::new());
        let statuses = Arc::new(CopyAppearsMidTick {
            store: store.clone(),
            appended: AtomicBool::new(false),
        });
        let mut notifier = MockWaitNotifyEngine::new();
        notifier.expect_done_with().never();
        let service = BarrierService::new(store, statuses, Arc::new(notifier));
        let saved = service.save(bound_instance("plan", "stepRun")).await.unwrap();

        let ticked = service.update(&saved).await.unwrap();

        assert_eq!(ticked.barrier_state, BarrierState::Standing);
        assert_eq!(ticked.positions().len(), 2);
        let stored = service.get(&saved.uuid).await.unwrap();
        assert_eq!(stored.barrier_state, BarrierState::Standing);
    }

    #[tokio::test]
    async fn test_update_state_is_compare_and_set() {
        let store = Arc::new(InMemoryBarrierStore::new());
        let service = service_with(
            store,
            MockNodeStatusProvider::new(),
            MockWaitNotifyEngine::new(),
        );
        let saved = service.save(bound_instance("plan", "stepRun")).await.unwrap();

        let down = service.update_state(&saved.uuid, BarrierState::Down).await.unwrap();
        assert_eq!(down.barrier_state, BarrierState::Down);

        let still_down = service
            .update_state(&saved.uuid, BarrierState::Endure)
            .await
            .unwrap();
        assert_eq!(still_down.barrier_state, BarrierState::Down);

        let err = service
            .update_state("missing", BarrierState::Down)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[tokio::test]
    async fn test_concurrency_update_on_missing_barrier_is_not_found() {
        let service = service_with(
            Arc::new(InMemoryBarrierStore::new()),
            MockNodeStatusProvider::new(),
            MockWaitNotifyEngine::new(),
        );
        let err = service
            .update_barrier_position_info_list_and_strategy_concurrency("nope", "plan", vec![], "s", 2)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowControlError::NotFound { .. }));
    }
}
