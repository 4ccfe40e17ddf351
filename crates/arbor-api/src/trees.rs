use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use arbor_db::models::TreeRow;
use arbor_types::api::UpdateTreeRequest;
use arbor_types::models::{Image, Location, Tree};

use crate::error::{ApiError, ApiResult};
use crate::extract::{JsonBody, MultipartForm, PathParam};
use crate::uploads::UploadForm;
use crate::{AppState, now_timestamp, parse_id, run_blocking, stored_timestamp, stored_uuid};

pub const DEFAULT_USER: &str = "unnamed";
const MIN_NAME_LEN: usize = 3;

/// GET /api/trees
pub async fn list_trees(State(state): State<AppState>) -> ApiResult<Json<Vec<Tree>>> {
    let db = state.clone();
    let rows = run_blocking(move || db.db.list_trees()).await?;
    Ok(Json(rows.into_iter().map(tree_from_row).collect()))
}

/// GET /api/trees/{id}
pub async fn get_tree(
    State(state): State<AppState>,
    PathParam(id): PathParam<String>,
) -> ApiResult<Json<Tree>> {
    let id = parse_id(&id)?;

    let db = state.clone();
    let row = run_blocking(move || db.db.get_tree(&id.to_string()))
        .await?
        .ok_or_else(|| ApiError::NotFound("tree not found".into()))?;

    Ok(Json(tree_from_row(row)))
}

/// POST /api/trees — multipart form with the tree fields and an `image` file.
pub async fn create_tree(
    State(state): State<AppState>,
    MultipartForm(multipart): MultipartForm,
) -> ApiResult<impl IntoResponse> {
    let form = UploadForm::read(multipart).await?;

    let name = form
        .text("name")
        .ok_or_else(|| ApiError::bad_request("name missing"))?
        .to_string();
    let number_planted = form
        .text("numberPlanted")
        .ok_or_else(|| ApiError::bad_request("number planted missing"))?;

    validate_name(&name)?;
    let number_planted = parse_number_planted(number_planted)?;
    let location = Location {
        latitude: parse_coordinate(&form, "latitude")?,
        longitude: parse_coordinate(&form, "longitude")?,
    };
    let user = form.text("user").unwrap_or(DEFAULT_USER).to_string();

    let Some(part) = form.image else {
        return Err(ApiError::bad_request("image missing"));
    };
    let image = state.uploads.store_image(part).await?;

    let ts = now_timestamp();
    let row = TreeRow {
        id: Uuid::new_v4().to_string(),
        name,
        user,
        number_planted,
        latitude: location.latitude,
        longitude: location.longitude,
        image_data: image.data,
        image_content_type: image.content_type,
        created_at: ts.clone(),
        updated_at: ts,
    };

    let db = state.clone();
    let stored = row.clone();
    run_blocking(move || db.db.insert_tree(&stored)).await?;

    info!("Tree '{}' created ({} planted)", row.name, row.number_planted);
    Ok((StatusCode::CREATED, Json(tree_from_row(row))))
}

/// PUT /api/trees/{id} — JSON partial update; the image is not editable.
pub async fn update_tree(
    State(state): State<AppState>,
    PathParam(id): PathParam<String>,
    JsonBody(req): JsonBody<UpdateTreeRequest>,
) -> ApiResult<Json<Tree>> {
    let id = parse_id(&id)?.to_string();

    let db = state.clone();
    let lookup = id.clone();
    let mut row = run_blocking(move || db.db.get_tree(&lookup))
        .await?
        .ok_or_else(|| ApiError::NotFound("tree not found".into()))?;

    if let Some(name) = req.name {
        let name = name.trim().to_string();
        validate_name(&name)?;
        row.name = name;
    }
    if let Some(user) = req.user {
        let user = user.trim();
        row.user = if user.is_empty() { DEFAULT_USER.to_string() } else { user.to_string() };
    }
    if let Some(number_planted) = req.number_planted {
        row.number_planted = check_number_planted(number_planted)?;
    }
    if let Some(location) = req.location {
        row.latitude = location.latitude;
        row.longitude = location.longitude;
    }
    row.updated_at = now_timestamp();

    let db = state.clone();
    let stored = row.clone();
    let updated = run_blocking(move || db.db.update_tree(&stored)).await?;
    if !updated {
        // deleted between the read and the write
        return Err(ApiError::NotFound("tree not found".into()));
    }

    Ok(Json(tree_from_row(row)))
}

/// DELETE /api/trees/{id} — 204 whether or not the tree existed.
pub async fn delete_tree(
    State(state): State<AppState>,
    PathParam(id): PathParam<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id)?.to_string();

    let db = state.clone();
    let lookup = id.clone();
    let removed = run_blocking(move || db.db.delete_tree(&lookup)).await?;
    if removed {
        info!("Tree {} deleted", id);
    }

    Ok(StatusCode::NO_CONTENT)
}

fn validate_name(name: &str) -> ApiResult<()> {
    if name.chars().count() < MIN_NAME_LEN {
        warn!("Rejected tree name '{}'", name);
        return Err(ApiError::bad_request(format!(
            "name must be at least {} characters",
            MIN_NAME_LEN
        )));
    }
    Ok(())
}

fn parse_number_planted(raw: &str) -> ApiResult<i64> {
    let value = raw.parse::<i64>().map_err(|_| number_planted_error())?;
    check_number_planted(value)
}

fn check_number_planted(value: i64) -> ApiResult<i64> {
    if value < 1 {
        return Err(number_planted_error());
    }
    Ok(value)
}

fn number_planted_error() -> ApiError {
    ApiError::bad_request("The amount planted has to be positive whole numbers")
}

fn parse_coordinate(form: &UploadForm, field: &str) -> ApiResult<Option<f64>> {
    form.text(field)
        .map(|raw| {
            raw.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| ApiError::bad_request(format!("{} must be a number", field)))
        })
        .transpose()
}

pub(crate) fn tree_from_row(row: TreeRow) -> Tree {
    Tree {
        id: stored_uuid(&row.id, "tree id"),
        created_at: stored_timestamp(&row.created_at, "tree created_at"),
        updated_at: stored_timestamp(&row.updated_at, "tree updated_at"),
        name: row.name,
        user: row.user,
        number_planted: row.number_planted,
        location: Location {
            latitude: row.latitude,
            longitude: row.longitude,
        },
        image: Image {
            data: row.image_data,
            content_type: row.image_content_type,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_planted_must_be_positive_whole() {
        assert_eq!(parse_number_planted("12").unwrap(), 12);
        assert!(parse_number_planted("0").is_err());
        assert!(parse_number_planted("-3").is_err());
        assert!(parse_number_planted("2.5").is_err());
        assert!(parse_number_planted("many").is_err());
    }

    #[test]
    fn short_names_are_rejected() {
        assert!(validate_name("Oak").is_ok());
        assert!(validate_name("Ek").is_err());
        // counted in characters, not bytes
        assert!(validate_name("Äö").is_err());
    }

    #[test]
    fn coordinates_are_optional_but_numeric() {
        let mut form = UploadForm::default();
        assert_eq!(parse_coordinate(&form, "latitude").unwrap(), None);

        form.fields.insert("latitude".into(), "61.5".into());
        assert_eq!(parse_coordinate(&form, "latitude").unwrap(), Some(61.5));

        form.fields.insert("longitude".into(), "east".into());
        assert!(parse_coordinate(&form, "longitude").is_err());

        form.fields.insert("longitude".into(), "NaN".into());
        assert!(parse_coordinate(&form, "longitude").is_err());
    }

    #[test]
    fn corrupt_rows_still_render() {
        let row = TreeRow {
            id: "not-a-uuid".into(),
            name: "Oak".into(),
            user: DEFAULT_USER.into(),
            number_planted: 1,
            latitude: None,
            longitude: None,
            image_data: vec![],
            image_content_type: "image/png".into(),
            created_at: "yesterday".into(),
            updated_at: "2024-05-01T10:00:00+00:00".into(),
        };
        let tree = tree_from_row(row);
        assert_eq!(tree.id, Uuid::nil());
        assert_eq!(tree.updated_at.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }
}
