use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use arbor_db::models::TreeUpdateRow;
use arbor_types::models::{Image, TreeUpdate};

use crate::error::{ApiError, ApiResult};
use crate::extract::{MultipartForm, PathParam};
use crate::trees::DEFAULT_USER;
use crate::uploads::UploadForm;
use crate::{AppState, now_timestamp, parse_id, run_blocking, stored_timestamp, stored_uuid};

/// POST /api/trees/{id}/update — multipart form with `user`, `text` and an `image` file.
///
/// The parent tree is not looked up; updates reference it by id only.
pub async fn create_update(
    State(state): State<AppState>,
    PathParam(tree_id): PathParam<String>,
    MultipartForm(multipart): MultipartForm,
) -> ApiResult<impl IntoResponse> {
    let tree_id = parse_id(&tree_id)?;
    let form = UploadForm::read(multipart).await?;

    let user = form.text("user").unwrap_or(DEFAULT_USER).to_string();
    let text = form.text("text").unwrap_or_default().to_string();

    let Some(part) = form.image else {
        return Err(ApiError::bad_request("image missing"));
    };
    let image = state.uploads.store_image(part).await?;

    let ts = now_timestamp();
    let row = TreeUpdateRow {
        id: Uuid::new_v4().to_string(),
        tree_id: tree_id.to_string(),
        user,
        text,
        image_data: image.data,
        image_content_type: image.content_type,
        created_at: ts.clone(),
        updated_at: ts,
    };

    let db = state.clone();
    let stored = row.clone();
    run_blocking(move || db.db.insert_tree_update(&stored)).await?;

    info!("Update posted for tree {}", tree_id);
    Ok((StatusCode::CREATED, Json(update_from_row(row))))
}

/// GET /api/trees/getupdates/{tree_id}
pub async fn list_updates(
    State(state): State<AppState>,
    PathParam(tree_id): PathParam<String>,
) -> ApiResult<Json<Vec<TreeUpdate>>> {
    let tree_id = parse_id(&tree_id)?.to_string();

    let db = state.clone();
    let rows = run_blocking(move || db.db.get_tree_updates(&tree_id)).await?;

    Ok(Json(rows.into_iter().map(update_from_row).collect()))
}

fn update_from_row(row: TreeUpdateRow) -> TreeUpdate {
    TreeUpdate {
        id: stored_uuid(&row.id, "update id"),
        tree_id: stored_uuid(&row.tree_id, "update tree_id"),
        created_at: stored_timestamp(&row.created_at, "update created_at"),
        updated_at: stored_timestamp(&row.updated_at, "update updated_at"),
        user: row.user,
        text: row.text,
        image: Image {
            data: row.image_data,
            content_type: row.image_content_type,
        },
    }
}
