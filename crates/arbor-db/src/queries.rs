use crate::Database;
use crate::models::{TreeRow, TreeUpdateRow, UserRow};
use anyhow::Result;
use rusqlite::{Connection, Row};

const TREE_COLUMNS: &str = "id, name, user, number_planted, latitude, longitude, \
     image_data, image_content_type, created_at, updated_at";

const UPDATE_COLUMNS: &str =
    "id, tree_id, user, text, image_data, image_content_type, created_at, updated_at";

impl Database {
    // -- Users --

    /// Returns false when the email is already registered.
    pub fn create_user(&self, user: &UserRow) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, user_name, user_email, password_hash, salt, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(user_email) DO NOTHING",
                rusqlite::params![
                    user.id,
                    user.user_name,
                    user.user_email,
                    user.password_hash,
                    user.salt,
                    user.created_at
                ],
            )?;
            Ok(inserted > 0)
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_email(conn, email))
    }

    // -- Trees --

    pub fn insert_tree(&self, tree: &TreeRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                &format!("INSERT INTO trees ({TREE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
                rusqlite::params![
                    tree.id,
                    tree.name,
                    tree.user,
                    tree.number_planted,
                    tree.latitude,
                    tree.longitude,
                    tree.image_data,
                    tree.image_content_type,
                    tree.created_at,
                    tree.updated_at
                ],
            )?;
            Ok(())
        })
    }

    /// All trees in insertion order.
    pub fn list_trees(&self) -> Result<Vec<TreeRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {TREE_COLUMNS} FROM trees ORDER BY rowid"))?;
            let rows = stmt
                .query_map([], tree_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_tree(&self, id: &str) -> Result<Option<TreeRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {TREE_COLUMNS} FROM trees WHERE id = ?1"))?;
            stmt.query_row([id], tree_from_row).optional()
        })
    }

    /// Overwrite the editable columns of an existing tree.
    /// Returns false when no tree has that id.
    pub fn update_tree(&self, tree: &TreeRow) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE trees
                 SET name = ?2, user = ?3, number_planted = ?4, latitude = ?5, longitude = ?6, updated_at = ?7
                 WHERE id = ?1",
                rusqlite::params![
                    tree.id,
                    tree.name,
                    tree.user,
                    tree.number_planted,
                    tree.latitude,
                    tree.longitude,
                    tree.updated_at
                ],
            )?;
            Ok(changed > 0)
        })
    }

    /// Returns whether a row was actually removed.
    pub fn delete_tree(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM trees WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    pub fn count_trees(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM trees", [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }

    // -- Tree updates --

    pub fn insert_tree_update(&self, update: &TreeUpdateRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                &format!("INSERT INTO tree_updates ({UPDATE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
                rusqlite::params![
                    update.id,
                    update.tree_id,
                    update.user,
                    update.text,
                    update.image_data,
                    update.image_content_type,
                    update.created_at,
                    update.updated_at
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_tree_updates(&self, tree_id: &str) -> Result<Vec<TreeUpdateRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {UPDATE_COLUMNS} FROM tree_updates WHERE tree_id = ?1 ORDER BY rowid"
            ))?;
            let rows = stmt
                .query_map([tree_id], tree_update_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user_by_email(conn: &Connection, email: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_name, user_email, password_hash, salt, created_at
         FROM users WHERE user_email = ?1",
    )?;

    stmt.query_row([email], |row| {
        Ok(UserRow {
            id: row.get(0)?,
            user_name: row.get(1)?,
            user_email: row.get(2)?,
            password_hash: row.get(3)?,
            salt: row.get(4)?,
            created_at: row.get(5)?,
        })
    })
    .optional()
}

fn tree_from_row(row: &Row<'_>) -> rusqlite::Result<TreeRow> {
    Ok(TreeRow {
        id: row.get(0)?,
        name: row.get(1)?,
        user: row.get(2)?,
        number_planted: row.get(3)?,
        latitude: row.get(4)?,
        longitude: row.get(5)?,
        image_data: row.get(6)?,
        image_content_type: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn tree_update_from_row(row: &Row<'_>) -> rusqlite::Result<TreeUpdateRow> {
    Ok(TreeUpdateRow {
        id: row.get(0)?,
        tree_id: row.get(1)?,
        user: row.get(2)?,
        text: row.get(3)?,
        image_data: row.get(4)?,
        image_content_type: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
