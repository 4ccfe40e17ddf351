/// Database row types — these map directly to SQLite rows.
/// Distinct from arbor-types API models to keep the DB layer independent.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub user_name: String,
    pub user_email: String,
    pub password_hash: String,
    pub salt: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct TreeRow {
    pub id: String,
    pub name: String,
    pub user: String,
    pub number_planted: i64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub image_data: Vec<u8>,
    pub image_content_type: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct TreeUpdateRow {
    pub id: String,
    pub tree_id: String,
    pub user: String,
    pub text: String,
    pub image_data: Vec<u8>,
    pub image_content_type: String,
    pub created_at: String,
    pub updated_at: String,
}
