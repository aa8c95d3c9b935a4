use crate::Database;
use crate::models::UserRow;
use anyhow::Result;
use chrono::Utc;
use rusqlite::types::{ToSql, Type};
use rusqlite::{Connection, Row};
use tether_types::models::Profile;

impl Database {
    // -- Users --

    pub fn create_user(&self, email: &str, password_hash: &str, nickname: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (email, password_hash, nickname, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![email, password_hash, nickname, Utc::now()],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email = ?1", &email))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", &id))
    }

    /// Batch-fetch public profiles. Unknown ids are skipped.
    pub fn get_profiles(&self, ids: &[i64]) -> Result<Vec<Profile>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT id, nickname, avatar FROM users WHERE id IN ({})",
                placeholders(ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(ids), |row| {
                    Ok(Profile {
                        id: row.get(0)?,
                        nickname: row.get(1)?,
                        avatar: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns the subset of `ids` that belong to registered users.
    pub fn existing_user_ids(&self, ids: &[i64]) -> Result<Vec<i64>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!("SELECT id FROM users WHERE id IN ({})", placeholders(ids.len()));
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(ids), |row| row.get(0))?
                .collect::<std::result::Result<Vec<i64>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, filter: &str, value: &dyn ToSql) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, email, password_hash, nickname, avatar, created_at FROM users WHERE {filter}"
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                email: row.get(1)?,
                password_hash: row.get(2)?,
                nickname: row.get(3)?,
                avatar: row.get(4)?,
                created_at: row.get(5)?,
            })
        })
        .optional()?;

    Ok(row)
}

/// `?1, ?2, ... ?n`
pub(crate) fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
}

/// Parse a TEXT column into an enum, reporting failures as a column
/// conversion error.
pub(crate) fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
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
