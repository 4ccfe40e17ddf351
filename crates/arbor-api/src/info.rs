use axum::extract::State;

use crate::error::ApiResult;
use crate::{AppState, run_blocking};

/// GET /info — plain-text record count and server time.
pub async fn info(State(state): State<AppState>) -> ApiResult<String> {
    let db = state.clone();
    let count = run_blocking(move || db.db.count_trees()).await?;

    Ok(format!(
        "The tree database has info for {} trees\n{}",
        count,
        chrono::Utc::now().to_rfc2822()
    ))
}
