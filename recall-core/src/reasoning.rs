//! The reasoning cache: the single mutable aggregate the ReAct loop reads
//! and writes across iterations.
//!
//! Grounded on `original_source/agent/context/reasoning_cache.py` — every
//! type and operation below has a one-to-one counterpart there
//! (`QuestionType`, `GoalStatus`, `SubGoal`, `Hypothesis`, `TriedQuery`,
//! `ReasoningState`, `ReasoningCache`) — with three deliberate additions
//! beyond what the Python source enforces, each required by this spec and
//! noted in `DESIGN.md`: dependency-cycle/unknown-dependency validation in
//! `add_sub_goal`, terminal-status irreversibility in `update_goal_status`,
//! and verified-never-reverts-to-null in `update_hypothesis`.
//!
//! Mutating an uninitialized cache is a no-op everywhere except the two
//! id-allocating methods, `add_sub_goal` and `add_hypothesis`, which raise
//! `Error::CacheUninitialized` instead — there is no id to hand back for a
//! goal or hypothesis that was never created.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::tools::ParamMap;

/// Classification of the question being answered, driving which
/// reasoning path (direct lookup vs. multi-step reasoning vs. temporal
/// ordering) the Planner/Evaluator/Summarizer take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Direct,
    Reasoning,
    TemporalReasoning,
}

impl Default for QuestionType {
    fn default() -> Self {
        QuestionType::Direct
    }
}

impl std::str::FromStr for QuestionType {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "direct" => Ok(QuestionType::Direct),
            "reasoning" => Ok(QuestionType::Reasoning),
            "temporal_reasoning" => Ok(QuestionType::TemporalReasoning),
            _ => Err(()),
        }
    }
}

/// Lifecycle status of a sub-goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl GoalStatus {
    /// Completed/Failed are terminal: once reached, a status update may
    /// not move the goal to any other status (added invariant, spec §4.1).
    pub fn is_terminal(&self) -> bool {
        matches!(self, GoalStatus::Completed | GoalStatus::Failed)
    }
}

/// A decomposed piece of the overall question, possibly depending on
/// other sub-goals completing first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubGoal {
    pub goal_id: String,
    pub description: String,
    pub status: GoalStatus,
    pub result: Option<String>,
    pub depends_on: Vec<String>,
}

/// A candidate answer the Reasoner is accumulating evidence for or
/// against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hypothesis {
    pub hypothesis_id: String,
    pub content: String,
    pub confidence: f64,
    pub evidence: Vec<String>,
    pub counter_evidence: Vec<String>,
    pub verified: Option<bool>,
}

/// A record of a previously-issued tool call, used to avoid redundant
/// re-querying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriedQuery {
    pub tool_name: String,
    pub parameters: ParamMap,
    pub iteration: u32,
    pub success: bool,
    pub result_summary: String,
}

impl TriedQuery {
    /// Subset-match: true iff `tool_name` matches and every key in
    /// `parameters` is present in this record's parameters with an equal
    /// value. `parameters` narrower than the stored call still matches —
    /// this is deliberately a subset check, not equality, matching
    /// `original_source/agent/context/reasoning_cache.py::TriedQuery.matches`.
    pub fn matches(&self, tool_name: &str, parameters: &ParamMap) -> bool {
        if self.tool_name != tool_name {
            return false;
        }
        parameters
            .iter()
            .all(|(key, value)| self.parameters.get(key) == Some(value))
    }
}

/// The full accumulated reasoning state for one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningState {
    pub question: String,
    pub question_type: QuestionType,
    pub sub_goals: Vec<SubGoal>,
    pub known_facts: HashMap<String, serde_json::Value>,
    pub entity_facts: HashMap<String, HashMap<String, serde_json::Value>>,
    pub relation_facts: HashMap<String, HashMap<String, serde_json::Value>>,
    pub hypotheses: Vec<Hypothesis>,
    pub missing_info: Vec<String>,
    pub tried_queries: Vec<TriedQuery>,
    pub failed_strategies: Vec<String>,
    pub conclusion: Option<String>,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReasoningState {
    fn new(question: String, question_type: QuestionType) -> Self {
        let now = Utc::now();
        Self {
            question,
            question_type,
            sub_goals: Vec::new(),
            known_facts: HashMap::new(),
            entity_facts: HashMap::new(),
            relation_facts: HashMap::new(),
            hypotheses: Vec::new(),
            missing_info: Vec::new(),
            tried_queries: Vec::new(),
            failed_strategies: Vec::new(),
            conclusion: None,
            confidence: 0.0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Owns the single `ReasoningState` for one in-flight query and every
/// mutation allowed against it. Only the Orchestrator holds one of these,
/// and it is never shared across concurrent queries (spec §5).
#[derive(Default)]
pub struct ReasoningCache {
    state: Option<ReasoningState>,
    goal_counter: u64,
    hypothesis_counter: u64,
}

impl ReasoningCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset state for a new query, discarding anything prior.
    pub fn init_state(&mut self, question: impl Into<String>, question_type: QuestionType) {
        self.state = Some(ReasoningState::new(question.into(), question_type));
        self.goal_counter = 0;
        self.hypothesis_counter = 0;
    }

    /// Rewrite the question's classification in place, preserving every
    /// other field — used by the Orchestrator to apply an Evaluator-
    /// proposed `question_type_adjustment` without discarding accumulated
    /// facts, hypotheses, or completed sub-goals (spec §4.5).
    /// No-op if the cache has no state yet (spec §7: mutating an
    /// uninitialized cache is a no-op; only the id-allocating methods,
    /// `add_sub_goal`/`add_hypothesis`, raise).
    pub fn set_question_type(&mut self, question_type: QuestionType) -> Result<()> {
        let Some(state) = self.state.as_mut() else { return Ok(()) };
        state.question_type = question_type;
        Self::touch(state);
        Ok(())
    }

    /// Access the current state, if initialized.
    pub fn state(&self) -> Option<&ReasoningState> {
        self.state.as_ref()
    }

    /// Used only by `add_sub_goal`/`add_hypothesis`: the two methods that
    /// allocate a new id have no sensible no-op result to return, so they
    /// alone raise on an uninitialized cache.
    fn state_mut(&mut self) -> Result<&mut ReasoningState> {
        self.state
            .as_mut()
            .ok_or(Error::CacheUninitialized("reasoning state not initialized"))
    }

    fn touch(state: &mut ReasoningState) {
        state.updated_at = Utc::now();
    }

    /// Append a new sub-goal, validating that every `depends_on` id
    /// already exists and that the addition does not create a dependency
    /// cycle (both checks are additions beyond the Python source; see
    /// module docs).
    pub fn add_sub_goal(
        &mut self,
        description: impl Into<String>,
        depends_on: Vec<String>,
    ) -> Result<String> {
        self.goal_counter += 1;
        let goal_id = format!("goal_{}", self.goal_counter);
        let state = self.state_mut()?;

        let known_ids: HashSet<&str> = state.sub_goals.iter().map(|g| g.goal_id.as_str()).collect();
        for dep in &depends_on {
            if !known_ids.contains(dep.as_str()) {
                return Err(Error::UnknownDependency(dep.clone()));
            }
        }
        if has_cycle(&state.sub_goals, &goal_id, &depends_on) {
            return Err(Error::GoalCycle { goal_id });
        }

        state.sub_goals.push(SubGoal {
            goal_id: goal_id.clone(),
            description: description.into(),
            status: GoalStatus::Pending,
            result: None,
            depends_on,
        });
        Self::touch(state);
        Ok(goal_id)
    }

    /// Update a sub-goal's status. Once a goal reaches a terminal status
    /// (`Completed`/`Failed`), further updates are rejected — an addition
    /// beyond the Python source, which allows silent reversal.
    pub fn update_goal_status(
        &mut self,
        goal_id: &str,
        status: GoalStatus,
        result: Option<String>,
    ) -> Result<()> {
        let Some(state) = self.state.as_mut() else { return Ok(()) };
        let goal = state
            .sub_goals
            .iter_mut()
            .find(|g| g.goal_id == goal_id)
            .ok_or_else(|| Error::UnknownDependency(goal_id.to_string()))?;

        if goal.status.is_terminal() {
            return Err(Error::Internal(format!(
                "sub-goal {goal_id} is already in a terminal status and cannot be updated"
            )));
        }

        goal.status = status;
        if result.is_some() {
            goal.result = result;
        }
        Self::touch(state);
        Ok(())
    }

    /// Sub-goals that are `Pending` and whose dependencies are all
    /// `Completed`.
    pub fn pending_goals(&self) -> Vec<&SubGoal> {
        let Some(state) = &self.state else {
            return Vec::new();
        };
        let completed: HashSet<&str> = state
            .sub_goals
            .iter()
            .filter(|g| g.status == GoalStatus::Completed)
            .map(|g| g.goal_id.as_str())
            .collect();
        state
            .sub_goals
            .iter()
            .filter(|g| {
                g.status == GoalStatus::Pending
                    && g.depends_on.iter().all(|d| completed.contains(d.as_str()))
            })
            .collect()
    }

    pub fn add_known_fact(&mut self, key: impl Into<String>, value: serde_json::Value) -> Result<()> {
        let Some(state) = self.state.as_mut() else { return Ok(()) };
        state.known_facts.insert(key.into(), value);
        Self::touch(state);
        Ok(())
    }

    /// Merge-not-overwrite: attributes are merged into any existing entry
    /// for `entity_id`, matching Python's `dict.update()` semantics.
    pub fn add_entity_fact(
        &mut self,
        entity_id: impl Into<String>,
        attrs: HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        let Some(state) = self.state.as_mut() else { return Ok(()) };
        state
            .entity_facts
            .entry(entity_id.into())
            .or_default()
            .extend(attrs);
        Self::touch(state);
        Ok(())
    }

    /// Merge-not-overwrite, mirroring `add_entity_fact`.
    pub fn add_relation_fact(
        &mut self,
        relation_id: impl Into<String>,
        attrs: HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        let Some(state) = self.state.as_mut() else { return Ok(()) };
        state
            .relation_facts
            .entry(relation_id.into())
            .or_default()
            .extend(attrs);
        Self::touch(state);
        Ok(())
    }

    pub fn add_hypothesis(&mut self, content: impl Into<String>, confidence: f64) -> Result<String> {
        self.hypothesis_counter += 1;
        let hypothesis_id = format!("hyp_{}", self.hypothesis_counter);
        let state = self.state_mut()?;
        state.hypotheses.push(Hypothesis {
            hypothesis_id: hypothesis_id.clone(),
            content: content.into(),
            confidence: confidence.clamp(0.0, 1.0),
            evidence: Vec::new(),
            counter_evidence: Vec::new(),
            verified: None,
        });
        Self::touch(state);
        Ok(hypothesis_id)
    }

    /// Update a hypothesis in place. `verified` only ever moves from
    /// `None` to `Some`; once set it never reverts to `None` — an
    /// explicit invariant this Rust implementation enforces beyond the
    /// Python source (see module docs).
    pub fn update_hypothesis(
        &mut self,
        hypothesis_id: &str,
        evidence: Option<String>,
        counter_evidence: Option<String>,
        confidence_delta: f64,
        verified: Option<bool>,
    ) -> Result<()> {
        let Some(state) = self.state.as_mut() else { return Ok(()) };
        let hypothesis = state
            .hypotheses
            .iter_mut()
            .find(|h| h.hypothesis_id == hypothesis_id)
            .ok_or_else(|| Error::Internal(format!("unknown hypothesis id: {hypothesis_id}")))?;

        if let Some(evidence) = evidence {
            hypothesis.evidence.push(evidence);
        }
        if let Some(counter_evidence) = counter_evidence {
            hypothesis.counter_evidence.push(counter_evidence);
        }
        hypothesis.confidence = (hypothesis.confidence + confidence_delta).clamp(0.0, 1.0);
        if let Some(verified) = verified {
            hypothesis.verified = Some(verified);
        }
        Self::touch(state);
        Ok(())
    }

    pub fn add_missing_info(&mut self, info: impl Into<String>) -> Result<()> {
        let Some(state) = self.state.as_mut() else { return Ok(()) };
        let info = info.into();
        if !state.missing_info.contains(&info) {
            state.missing_info.push(info);
        }
        Self::touch(state);
        Ok(())
    }

    pub fn remove_missing_info(&mut self, info: &str) -> Result<()> {
        let Some(state) = self.state.as_mut() else { return Ok(()) };
        state.missing_info.retain(|i| i != info);
        Self::touch(state);
        Ok(())
    }

    /// Always appends a fresh record (history, not a set).
    pub fn record_query(
        &mut self,
        tool_name: impl Into<String>,
        parameters: ParamMap,
        iteration: u32,
        success: bool,
        result_summary: impl Into<String>,
    ) -> Result<()> {
        let Some(state) = self.state.as_mut() else { return Ok(()) };
        state.tried_queries.push(TriedQuery {
            tool_name: tool_name.into(),
            parameters,
            iteration,
            success,
            result_summary: result_summary.into(),
        });
        Self::touch(state);
        Ok(())
    }

    pub fn has_tried_query(&self, tool_name: &str, parameters: &ParamMap) -> bool {
        let Some(state) = &self.state else {
            return false;
        };
        state
            .tried_queries
            .iter()
            .any(|q| q.matches(tool_name, parameters))
    }

    pub fn add_failed_strategy(&mut self, strategy: impl Into<String>) -> Result<()> {
        let Some(state) = self.state.as_mut() else { return Ok(()) };
        let strategy = strategy.into();
        if !state.failed_strategies.contains(&strategy) {
            state.failed_strategies.push(strategy);
        }
        Self::touch(state);
        Ok(())
    }

    pub fn set_conclusion(&mut self, conclusion: impl Into<String>, confidence: f64) -> Result<()> {
        let Some(state) = self.state.as_mut() else { return Ok(()) };
        state.conclusion = Some(conclusion.into());
        state.confidence = confidence.clamp(0.0, 1.0);
        Self::touch(state);
        Ok(())
    }

    /// True once the reasoning process has a definite stopping point:
    /// a conclusion is set, or all sub-goals are completed (only checked
    /// when sub-goals exist), or there's no missing info and nothing left
    /// pending.
    pub fn is_reasoning_complete(&self) -> bool {
        let Some(state) = &self.state else {
            return false;
        };
        if state.conclusion.is_some() {
            return true;
        }
        if !state.sub_goals.is_empty()
            && state.sub_goals.iter().all(|g| g.status == GoalStatus::Completed)
        {
            return true;
        }
        state.missing_info.is_empty() && self.pending_goals().is_empty()
    }

    /// Multi-section text digest of the current state: the sole
    /// Planner-visible interface into the cache (spec §4.1/§4.3).
    pub fn state_summary(&self) -> String {
        let Some(state) = &self.state else {
            return String::from("(no reasoning state)");
        };

        let mut out = String::new();
        out.push_str(&format!("Question type: {:?}\n", state.question_type));

        if !state.sub_goals.is_empty() {
            out.push_str("\nSub-goals:\n");
            for goal in &state.sub_goals {
                let icon = match goal.status {
                    GoalStatus::Pending => "pending",
                    GoalStatus::InProgress => "in_progress",
                    GoalStatus::Completed => "done",
                    GoalStatus::Failed => "failed",
                };
                let preview = goal
                    .result
                    .as_deref()
                    .map(|r| truncate(r, 80))
                    .unwrap_or_default();
                out.push_str(&format!("  [{icon}] {}: {}\n", goal.goal_id, goal.description));
                if !preview.is_empty() {
                    out.push_str(&format!("      -> {preview}\n"));
                }
            }
        }

        if !state.known_facts.is_empty() || !state.entity_facts.is_empty() {
            out.push_str("\nKnown facts:\n");
            for (key, value) in &state.known_facts {
                out.push_str(&format!("  {key}: {value}\n"));
            }
            for (entity_id, attrs) in &state.entity_facts {
                let content = attrs.get("content").map(|v| v.to_string()).unwrap_or_default();
                out.push_str(&format!("  entity {entity_id}: {content}\n"));
            }
        }

        let active_hypotheses: Vec<&Hypothesis> =
            state.hypotheses.iter().filter(|h| h.verified.is_none()).collect();
        if !active_hypotheses.is_empty() {
            out.push_str("\nActive hypotheses:\n");
            for h in active_hypotheses {
                out.push_str(&format!(
                    "  {} ({:.0}%): {}\n",
                    h.hypothesis_id,
                    h.confidence * 100.0,
                    h.content
                ));
            }
        }

        if !state.missing_info.is_empty() {
            out.push_str("\nMissing info:\n");
            for info in &state.missing_info {
                out.push_str(&format!("  - {info}\n"));
            }
        }

        if !state.failed_strategies.is_empty() {
            out.push_str("\nRecently failed strategies:\n");
            for strategy in state.failed_strategies.iter().rev().take(5) {
                out.push_str(&format!("  - {strategy}\n"));
            }
        }

        let success_count = state.tried_queries.iter().filter(|q| q.success).count();
        out.push_str(&format!(
            "\nQueries tried: {} ({} succeeded)\n",
            state.tried_queries.len(),
            success_count
        ));

        out
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..max])
    }
}

/// Depth-first search for a cycle that would be introduced by adding
/// `new_id` with edges `new_id -> dep` for each `new_depends_on` entry.
fn has_cycle(existing: &[SubGoal], new_id: &str, new_depends_on: &[String]) -> bool {
    let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
    for goal in existing {
        edges
            .entry(goal.goal_id.as_str())
            .or_default()
            .extend(goal.depends_on.iter().map(|d| d.as_str()));
    }
    edges.insert(new_id, new_depends_on.iter().map(|d| d.as_str()).collect());

    let mut visiting: HashSet<&str> = HashSet::new();
    let mut visited: HashSet<&str> = HashSet::new();

    fn visit<'a>(
        node: &'a str,
        edges: &HashMap<&'a str, Vec<&'a str>>,
        visiting: &mut HashSet<&'a str>,
        visited: &mut HashSet<&'a str>,
    ) -> bool {
        if visiting.contains(node) {
            return true;
        }
        if visited.contains(node) {
            return false;
        }
        visiting.insert(node);
        if let Some(deps) = edges.get(node) {
            for dep in deps {
                if visit(dep, edges, visiting, visited) {
                    return true;
                }
            }
        }
        visiting.remove(node);
        visited.insert(node);
        false
    }

    visit(new_id, &edges, &mut visiting, &mut visited)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uninitialized_cache_rejects_mutation() {
        let mut cache = ReasoningCache::new();
        let err = cache.add_sub_goal("find entity", vec![]).unwrap_err();
        assert!(matches!(err, Error::CacheUninitialized(_)));
    }

    #[test]
    fn mutating_an_uninitialized_cache_is_a_no_op_for_non_allocators() {
        let mut cache = ReasoningCache::new();
        cache.add_known_fact("k", serde_json::json!("v")).unwrap();
        cache.add_missing_info("entity id").unwrap();
        cache
            .record_query("search_entity", ParamMap::new(), 1, true, "ok")
            .unwrap();
        cache.set_conclusion("done", 0.9).unwrap();
        assert!(cache.state().is_none());
    }

    #[test]
    fn goal_ids_are_monotonic_per_query() {
        let mut cache = ReasoningCache::new();
        cache.init_state("q", QuestionType::Direct);
        let g1 = cache.add_sub_goal("first", vec![]).unwrap();
        let g2 = cache.add_sub_goal("second", vec![]).unwrap();
        assert_eq!(g1, "goal_1");
        assert_eq!(g2, "goal_2");
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let mut cache = ReasoningCache::new();
        cache.init_state("q", QuestionType::Direct);
        let err = cache
            .add_sub_goal("dangling", vec!["goal_99".to_string()])
            .unwrap_err();
        assert!(matches!(err, Error::UnknownDependency(_)));
    }

    #[test]
    fn self_dependency_is_rejected_as_unknown() {
        // depends_on can only reference already-existing goal ids, so a
        // new goal can never name itself or a later goal — has_cycle is
        // a defensive second line, exercised directly below.
        let mut cache = ReasoningCache::new();
        cache.init_state("q", QuestionType::Direct);
        let err = cache
            .add_sub_goal("c", vec!["goal_1".to_string()])
            .unwrap_err();
        assert!(matches!(err, Error::UnknownDependency(_)));
    }

    #[test]
    fn has_cycle_detects_a_direct_cycle_among_existing_goals() {
        let existing = vec![
            SubGoal {
                goal_id: "goal_1".to_string(),
                description: "a".to_string(),
                status: GoalStatus::Pending,
                result: None,
                depends_on: vec!["goal_2".to_string()],
            },
        ];
        assert!(has_cycle(&existing, "goal_2", &["goal_1".to_string()]));
        assert!(!has_cycle(&existing, "goal_3", &["goal_1".to_string()]));
    }

    #[test]
    fn terminal_goal_status_is_irreversible() {
        let mut cache = ReasoningCache::new();
        cache.init_state("q", QuestionType::Direct);
        let g1 = cache.add_sub_goal("a", vec![]).unwrap();
        cache
            .update_goal_status(&g1, GoalStatus::Completed, None)
            .unwrap();
        let err = cache
            .update_goal_status(&g1, GoalStatus::Pending, None)
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[test]
    fn pending_goals_respect_dependencies() {
        let mut cache = ReasoningCache::new();
        cache.init_state("q", QuestionType::Direct);
        let g1 = cache.add_sub_goal("a", vec![]).unwrap();
        let g2 = cache.add_sub_goal("b", vec![g1.clone()]).unwrap();
        assert_eq!(cache.pending_goals().len(), 1);
        assert_eq!(cache.pending_goals()[0].goal_id, g1);
        cache
            .update_goal_status(&g1, GoalStatus::Completed, None)
            .unwrap();
        assert_eq!(cache.pending_goals()[0].goal_id, g2);
    }

    #[test]
    fn entity_facts_merge_not_overwrite() {
        let mut cache = ReasoningCache::new();
        cache.init_state("q", QuestionType::Direct);
        let mut attrs1 = HashMap::new();
        attrs1.insert("name".to_string(), serde_json::json!("Alice"));
        cache.add_entity_fact("e1", attrs1).unwrap();

        let mut attrs2 = HashMap::new();
        attrs2.insert("content".to_string(), serde_json::json!("a person"));
        cache.add_entity_fact("e1", attrs2).unwrap();

        let facts = &cache.state().unwrap().entity_facts["e1"];
        assert_eq!(facts["name"], serde_json::json!("Alice"));
        assert_eq!(facts["content"], serde_json::json!("a person"));
    }

    #[test]
    fn hypothesis_confidence_clamps_and_verified_never_reverts() {
        let mut cache = ReasoningCache::new();
        cache.init_state("q", QuestionType::Direct);
        let h = cache.add_hypothesis("maybe X", 0.9).unwrap();
        cache
            .update_hypothesis(&h, None, None, 0.5, Some(true))
            .unwrap();
        assert_eq!(cache.state().unwrap().hypotheses[0].confidence, 1.0);
        assert_eq!(cache.state().unwrap().hypotheses[0].verified, Some(true));

        cache.update_hypothesis(&h, None, None, -10.0, None).unwrap();
        assert_eq!(cache.state().unwrap().hypotheses[0].confidence, 0.0);
        // verified stays Some(true): passing None leaves it untouched,
        // never reverting to null.
        assert_eq!(cache.state().unwrap().hypotheses[0].verified, Some(true));
    }

    #[test]
    fn tried_query_subset_match() {
        let mut params = ParamMap::new();
        params.insert("name".to_string(), crate::tools::ParamValue::String("Alice".to_string()));
        params.insert("kind".to_string(), crate::tools::ParamValue::String("person".to_string()));
        let tried = TriedQuery {
            tool_name: "search_entity".to_string(),
            parameters: params,
            iteration: 1,
            success: true,
            result_summary: "found".to_string(),
        };

        let mut narrower = ParamMap::new();
        narrower.insert("name".to_string(), crate::tools::ParamValue::String("Alice".to_string()));
        assert!(tried.matches("search_entity", &narrower));

        let mut mismatched = ParamMap::new();
        mismatched.insert("name".to_string(), crate::tools::ParamValue::String("Bob".to_string()));
        assert!(!tried.matches("search_entity", &mismatched));
    }

    #[test]
    fn is_reasoning_complete_with_no_goals_and_no_missing_info() {
        let mut cache = ReasoningCache::new();
        cache.init_state("q", QuestionType::Direct);
        assert!(cache.is_reasoning_complete());
        cache.add_missing_info("entity id").unwrap();
        assert!(!cache.is_reasoning_complete());
    }
}
