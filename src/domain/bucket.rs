use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Biggest single prompt seen in a bucket, with attribution — used by the
/// `prompts` insight and the model bucket's cross-agent ranking.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BiggestPrompt {
    pub tokens_in: i64,
    pub agent_id: Option<String>,
    pub model: Option<String>,
    pub call_name: Option<String>,
    pub preview: Option<String>,
    pub at: Option<DateTime<Utc>>,
}

impl BiggestPrompt {
    fn consider(
        &mut self,
        tokens_in: i64,
        agent_id: Option<&str>,
        model: Option<&str>,
        call_name: Option<&str>,
        preview: Option<&str>,
        at: DateTime<Utc>,
    ) {
        if tokens_in > self.tokens_in {
            self.tokens_in = tokens_in;
            self.agent_id = agent_id.map(str::to_owned);
            self.model = model.map(str::to_owned);
            self.call_name = call_name.map(str::to_owned);
            self.preview = preview.map(str::to_owned);
            self.at = Some(at);
        }
    }
}

/// One row per `(tenant_id, agent_id, hour)`. All counters are
/// monotonically incremented at ingest time and survive raw event pruning
/// during retention.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HourlyAgentBucket {
    pub tenant_id: String,
    pub agent_id: String,
    pub hour: DateTime<Utc>,

    pub tasks_started: i64,
    pub tasks_completed: i64,
    pub tasks_failed: i64,
    pub task_duration_sum_ms: i64,

    pub actions_started: i64,
    pub actions_completed: i64,
    pub actions_failed: i64,
    pub actions_by_name: HashMap<String, i64>,

    pub llm_calls: i64,
    pub llm_tokens_in: i64,
    pub llm_tokens_out: i64,
    pub llm_cost_usd: f64,
    pub llm_calls_by_model: HashMap<String, i64>,
    pub llm_cost_by_model: HashMap<String, f64>,
    pub llm_calls_by_name: HashMap<String, i64>,
    pub biggest_prompt: BiggestPrompt,

    pub retries: i64,
    pub escalations: i64,
    pub approvals_requested: i64,
    pub approvals_received: i64,
    pub issues_reported: i64,
    pub issues_resolved: i64,

    pub errors_by_type: HashMap<String, i64>,
    pub errors_by_category: HashMap<String, i64>,

    pub last_updated: DateTime<Utc>,
}

impl HourlyAgentBucket {
    pub fn new(tenant_id: String, agent_id: String, hour: DateTime<Utc>) -> Self {
        Self {
            tenant_id,
            agent_id,
            hour,
            last_updated: hour,
            ..Default::default()
        }
    }

    pub fn record_llm_call(
        &mut self,
        model: &str,
        call_name: Option<&str>,
        tokens_in: Option<i64>,
        tokens_out: Option<i64>,
        cost: Option<f64>,
        prompt_preview: Option<&str>,
        at: DateTime<Utc>,
    ) {
        self.llm_calls += 1;
        self.llm_tokens_in += tokens_in.unwrap_or(0);
        self.llm_tokens_out += tokens_out.unwrap_or(0);
        self.llm_cost_usd += cost.unwrap_or(0.0);
        *self.llm_calls_by_model.entry(model.to_string()).or_insert(0) += 1;
        *self.llm_cost_by_model.entry(model.to_string()).or_insert(0.0) += cost.unwrap_or(0.0);
        if let Some(name) = call_name {
            *self.llm_calls_by_name.entry(name.to_string()).or_insert(0) += 1;
        }
        self.biggest_prompt.consider(
            tokens_in.unwrap_or(0),
            Some(&self.agent_id),
            Some(model),
            call_name,
            prompt_preview,
            at,
        );
    }
}

/// `(tenant_id, model, hour)` — the cross-agent counterpart to
/// `HourlyAgentBucket`, updated whenever an `llm_call` event lands.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HourlyModelBucket {
    pub tenant_id: String,
    pub model: String,
    pub hour: DateTime<Utc>,

    pub call_count: i64,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub max_tokens_in: i64,
    pub cost_usd: f64,
    pub duration_sum_ms: i64,

    pub calls_by_agent: HashMap<String, i64>,
    pub calls_by_name: HashMap<String, i64>,
    pub biggest_prompt: BiggestPrompt,

    pub last_updated: DateTime<Utc>,
}

impl HourlyModelBucket {
    pub fn new(tenant_id: String, model: String, hour: DateTime<Utc>) -> Self {
        Self {
            tenant_id,
            model,
            hour,
            last_updated: hour,
            ..Default::default()
        }
    }

    pub fn record_call(
        &mut self,
        agent_id: &str,
        call_name: Option<&str>,
        tokens_in: Option<i64>,
        tokens_out: Option<i64>,
        cost: Option<f64>,
        duration_ms: Option<i64>,
        prompt_preview: Option<&str>,
        at: DateTime<Utc>,
    ) {
        self.call_count += 1;
        let tin = tokens_in.unwrap_or(0);
        self.tokens_in += tin;
        self.tokens_out += tokens_out.unwrap_or(0);
        self.max_tokens_in = self.max_tokens_in.max(tin);
        self.cost_usd += cost.unwrap_or(0.0);
        self.duration_sum_ms += duration_ms.unwrap_or(0);
        *self.calls_by_agent.entry(agent_id.to_string()).or_insert(0) += 1;
        if let Some(name) = call_name {
            *self.calls_by_name.entry(name.to_string()).or_insert(0) += 1;
        }
        self.biggest_prompt.consider(
            tin,
            Some(agent_id),
            Some(&self.model),
            call_name,
            prompt_preview,
            at,
        );
    }
}
