pub mod admin;
pub mod agents;
pub mod alerts;
pub mod auth_routes;
pub mod events;
pub mod helpers;
pub mod ingest;
pub mod keys;
pub mod metrics;
pub mod projects;
pub mod tasks;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::Router;

use crate::auth::middleware::{authenticate, rate_limit_ingest, rate_limit_query};
use crate::state::AppState;
use crate::ws;

/// Assembles the full HTTP + WebSocket surface. Public routes
/// (registration, login, the WS upgrade) carry no bearer auth; everything
/// else runs behind `authenticate` plus one of the two rate-limit buckets.
pub fn router(state: Arc<AppState>) -> Router {
    let public = Router::new()
        .route("/v1/auth/register", post(auth_routes::register))
        .route("/v1/auth/login", post(auth_routes::login))
        .route("/v1/auth/check-slug", get(auth_routes::check_slug))
        .route("/v1/auth/accept-invite", post(auth_routes::accept_invite))
        .route("/v1/stream", get(ws::stream));

    let ingest_routes = Router::new()
        .route("/v1/ingest", post(ingest::ingest))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit_ingest));

    let query_routes = Router::new()
        .route("/v1/auth/invite", post(auth_routes::invite))
        .route("/v1/invites", get(auth_routes::list_invites))
        .route("/v1/invites/:invite_id", delete(auth_routes::delete_invite))
        .route("/v1/api-keys", post(keys::create_key).get(keys::list_keys))
        .route("/v1/api-keys/:key_id", delete(keys::revoke_key))
        .route("/v1/projects", get(projects::list_projects).post(projects::create_project))
        .route("/v1/projects/:project_id", get(projects::get_project).put(projects::update_project).delete(projects::delete_project))
        .route("/v1/projects/:project_id/archive", post(projects::archive_project))
        .route("/v1/projects/:project_id/unarchive", post(projects::unarchive_project))
        .route("/v1/projects/merge", post(projects::merge_project))
        .route("/v1/agents", get(agents::list_agents))
        .route("/v1/agents/:agent_id", get(agents::get_agent))
        .route("/v1/agents/:agent_id/pipeline", get(agents::agent_pipeline))
        .route("/v1/tasks", get(tasks::list_tasks))
        .route("/v1/tasks/:task_id/timeline", get(tasks::get_task_timeline))
        .route("/v1/events", get(events::list_events))
        .route("/v1/events/:event_id", get(events::get_event))
        .route("/v1/metrics", get(metrics::get_metrics))
        .route("/v1/cost", get(metrics::get_cost))
        .route("/v1/cost/calls", get(metrics::list_llm_calls))
        .route("/v1/cost/timeseries", get(metrics::get_cost_timeseries))
        .route("/v1/llm-calls", get(metrics::list_llm_calls))
        .route("/v1/pipeline", get(metrics::fleet_pipeline))
        .route("/v1/insights/agents", get(metrics::insights_agents))
        .route("/v1/insights/models", get(metrics::insights_models))
        .route("/v1/insights/timeseries", get(metrics::insights_timeseries))
        .route("/v1/insights/errors", get(metrics::insights_errors))
        .route("/v1/insights/prompts", get(metrics::insights_prompts))
        .route("/v1/insights/actions", get(metrics::insights_actions))
        .route("/v1/alerts/rules", get(alerts::list_rules).post(alerts::create_rule))
        .route("/v1/alerts/rules/:rule_id", put(alerts::update_rule).delete(alerts::delete_rule))
        .route("/v1/alerts/history", get(alerts::list_history))
        .route("/v1/admin/retention/run", post(admin::run_retention))
        .route("/v1/admin/aggregates/rebuild", post(admin::rebuild_aggregates))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit_query));

    let protected = ingest_routes
        .merge(query_routes)
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate));

    public.merge(protected).with_state(state)
}
