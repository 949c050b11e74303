use crate::db::{agents, evaluations, forms};
use crate::domain::models::AdminGeneralStats;
use crate::domain::scoring::completion_pct;
use crate::state::SharedState;
use crate::web::error::ApiResult;
use crate::web::session::AdminSession;
use axum::{extract::State, routing::get, Json, Router};

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/admin/stats", get(general_stats))
        .with_state(state)
}

fn general(total_agents: i64, total_campaigns: i64, totals: (i64, i64)) -> AdminGeneralStats {
    let (all, submitted) = totals;
    AdminGeneralStats {
        total_agents,
        total_campaigns,
        total_completed: submitted,
        overall_completion: completion_pct(submitted, all),
    }
}

async fn general_stats(
    AdminSession(_): AdminSession,
    State(state): State<SharedState>,
) -> ApiResult<Json<AdminGeneralStats>> {
    let (total_agents, total_campaigns, totals) = tokio::try_join!(
        agents::count_active_agents(&state.pool),
        forms::count_forms(&state.pool),
        evaluations::evaluation_totals(&state.pool),
    )?;
    Ok(Json(general(total_agents, total_campaigns, totals)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overall_completion() {
        let stats = general(12, 3, (40, 30));
        assert_eq!(stats.total_completed, 30);
        assert_eq!(stats.overall_completion, 75);
        assert_eq!(general(0, 0, (0, 0)).overall_completion, 0);
    }
}
