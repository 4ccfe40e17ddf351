use serde::{Deserialize, Serialize};

use crate::models::Location;

// -- Errors --

/// Body of every non-2xx JSON response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// -- Users --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RegisterRequest {
    pub user_name: String,
    pub user_email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoginRequest {
    pub user_email: String,
    pub password: String,
}

// -- Trees --

/// Partial edit of a tree. Absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateTreeRequest {
    pub name: Option<String>,
    pub user: Option<String>,
    pub number_planted: Option<i64>,
    pub location: Option<Location>,
}
