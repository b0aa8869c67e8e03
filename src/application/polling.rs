use super::composer::ActionComposer;
use super::resolver::ScopeResolver;
use crate::domain::action::{Action, ActionContext, ActionType};
use crate::domain::rows::{PollResponseRow, PollStageRow};
use crate::domain::store::{ConfigRow, ConfigTable};
use crate::error::ConfigError;
use crate::settings::PollingSettings;
use indexmap::IndexMap;
use regex::Regex;
use std::collections::BTreeSet;
use tracing::debug;

/// How often and how long the client polls one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalPolicy {
    pub interval_ms: u64,
    pub max_attempts: u32,
    pub check_timeout: bool,
}

impl Default for IntervalPolicy {
    fn default() -> Self {
        Self {
            interval_ms: 3000,
            max_attempts: 0,
            check_timeout: false,
        }
    }
}

impl IntervalPolicy {
    /// Family defaults, overridden by the first flight (in sorted order) that encodes an
    /// interval in its name. Unknown families use the `generic` policy.
    pub fn select(
        polling: &PollingSettings,
        interval_flight: &Regex,
        family: &str,
        flights: &BTreeSet<String>,
    ) -> Self {
        let family_policy = polling
            .families
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(family))
            .or_else(|| polling.families.get_key_value("generic"))
            .map(|(_, policy)| policy);
        let base = family_policy
            .map(|p| Self {
                interval_ms: p.interval_ms,
                max_attempts: p.max_attempts,
                check_timeout: p.check_timeout,
            })
            .unwrap_or_default();

        match flights
            .iter()
            .find_map(|flight| interval_from_flight(interval_flight, flight))
        {
            Some(interval_ms) => Self {
                interval_ms,
                max_attempts: family_policy
                    .and_then(|p| p.flight_max_attempts)
                    .unwrap_or(base.max_attempts),
                check_timeout: family_policy
                    .and_then(|p| p.flight_check_timeout)
                    .unwrap_or(base.check_timeout),
            },
            None => base,
        }
    }
}

/// Reads the interval a flight name encodes, in milliseconds.
pub fn interval_from_flight(pattern: &Regex, flight: &str) -> Option<u64> {
    let caps = pattern.captures(flight)?;
    let value: u64 = caps.get(1)?.as_str().parse().ok()?;
    match caps.get(2).map(|unit| unit.as_str().to_ascii_lowercase()) {
        Some(unit) if unit.starts_with('s') => value.checked_mul(1000),
        _ => Some(value),
    }
}

type Stage<'a> = (u32, &'a ConfigRow<PollStageRow>, &'a ConfigRow<PollResponseRow>);

/// Resolves a poll chain into linked poll actions.
///
/// Stage `n` of chain `c` is the `poll_stages` row `c#n` with its `poll_responses` row of
/// the same id. Which stages exist is decided by scope: an index with no applicable row
/// is skipped, so flights can lengthen or shorten a chain.
pub struct PollChainBuilder<'c, 'r, 'a> {
    resolver: &'r ScopeResolver<'a>,
    composer: &'c ActionComposer<'r, 'a>,
    polling: &'r PollingSettings,
    interval_flight: &'r Regex,
}

impl<'c, 'r, 'a> PollChainBuilder<'c, 'r, 'a> {
    pub fn new(
        resolver: &'r ScopeResolver<'a>,
        composer: &'c ActionComposer<'r, 'a>,
        polling: &'r PollingSettings,
        interval_flight: &'r Regex,
    ) -> Self {
        Self {
            resolver,
            composer,
            polling,
            interval_flight,
        }
    }

    /// Builds the chain. The first stage is returned; later stages hang off `next_action`.
    pub fn build(&self, chain_id: &str) -> Result<Action, ConfigError> {
        let stages = self.stages(chain_id)?;
        if let Some((index, _, responses)) = stages.last()
            && responses
                .body
                .responses
                .iter()
                .any(|r| r.action == ActionType::MoveNextAndPoll)
        {
            return Err(ConfigError::DanglingContinuation {
                chain: chain_id.to_string(),
                stage: *index,
            });
        }

        let count = stages.len();
        let mut next: Option<Action> = None;
        for (_, stage, responses) in stages.into_iter().rev() {
            let policy = IntervalPolicy::select(
                self.polling,
                self.interval_flight,
                &stage.body.family,
                self.resolver.flights(),
            );
            let response_actions: IndexMap<String, Action> = responses
                .body
                .responses
                .iter()
                .map(|r| (r.status.clone(), Action::new(r.action)))
                .collect();
            let poll = self.composer.compose_poll(&stage.body, &policy, response_actions);
            let mut action = Action::new(ActionType::Poll).with_context(ActionContext::Poll(poll));
            action.next_action = next.map(Box::new);
            next = Some(action);
        }
        debug!(chain = chain_id, stages = count, "built poll chain");

        next.ok_or_else(|| ConfigError::NotFound {
            table: ConfigTable::PollStages,
            id: chain_id.to_string(),
        })
    }

    fn stages(&self, chain_id: &str) -> Result<Vec<Stage<'a>>, ConfigError> {
        let prefix = format!("{chain_id}#");
        let indices: BTreeSet<u32> = self
            .resolver
            .tables()
            .iter()
            .flat_map(|tables| tables.poll_stages.ids_with_prefix(&prefix))
            .filter_map(|id| id.get(prefix.len()..)?.parse().ok())
            .collect();

        let mut stages = Vec::new();
        for index in indices {
            let stage_id = format!("{chain_id}#{index}");
            let Some(stage) = self.resolver.try_resolve(&stage_id, |t| &t.poll_stages) else {
                continue;
            };
            let responses = self.resolver.resolve(&stage_id, |t| &t.poll_responses)?;
            stages.push((index, stage, responses));
        }
        Ok(stages)
    }
}
