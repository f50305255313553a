//! Read access to user records, plus the upsert used by the account sync.
//!
//! This service never creates accounts. The `users` table is filled by the
//! account service (through [`Database::upsert_user`] when both share the
//! database file), so a freshly created database lists no partners.

use chrono::{DateTime, Utc};
use rusqlite::params;

use alumnet_shared::types::{Partner, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::User;

impl Database {
    /// Insert or replace a user record. Called by the account sync, never
    /// by the HTTP surface of this service.
    pub fn upsert_user(&self, user: &User) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (id, full_name, email, profile_pic, password_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                full_name = excluded.full_name,
                email = excluded.email,
                profile_pic = excluded.profile_pic,
                password_hash = excluded.password_hash",
            params![
                user.id.as_str(),
                user.full_name,
                user.email,
                user.profile_pic,
                user.password_hash,
                user.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_user(&self, id: &UserId) -> Result<User> {
        self.conn()
            .query_row(
                "SELECT id, full_name, email, profile_pic, password_hash, created_at
                 FROM users WHERE id = ?1",
                params![id.as_str()],
                row_to_user,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Everyone the viewer can message: all users but the viewer, sorted by
    /// name. Credentials are not selected.
    pub fn list_partners(&self, viewer: &UserId) -> Result<Vec<Partner>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, full_name, email, profile_pic
             FROM users
             WHERE id != ?1
             ORDER BY full_name COLLATE NOCASE ASC",
        )?;

        let rows = stmt.query_map(params![viewer.as_str()], |row| {
            Ok(Partner {
                id: UserId(row.get(0)?),
                full_name: row.get(1)?,
                email: row.get(2)?,
                profile_pic: row.get(3)?,
            })
        })?;

        let mut partners = Vec::new();
        for row in rows {
            partners.push(row?);
        }
        Ok(partners)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let ts_str: String = row.get(5)?;
    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(User {
        id: UserId(row.get(0)?),
        full_name: row.get(1)?,
        email: row.get(2)?,
        profile_pic: row.get(3)?,
        password_hash: row.get(4)?,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, name: &str) -> User {
        User {
            id: UserId::from(id),
            full_name: name.to_string(),
            email: Some(format!("{id}@alumni.example")),
            profile_pic: None,
            password_hash: Some("$2b$10$secret".to_string()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn partners_exclude_viewer_and_sort_by_name() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_user(&user("u1", "Zed")).unwrap();
        db.upsert_user(&user("u2", "amy")).unwrap();
        db.upsert_user(&user("u3", "Bob")).unwrap();

        let partners = db.list_partners(&UserId::from("u1")).unwrap();
        let names: Vec<_> = partners.iter().map(|p| p.full_name.as_str()).collect();
        assert_eq!(names, vec!["amy", "Bob"]);
    }

    #[test]
    fn upsert_replaces_profile_fields() {
        let db = Database::open_in_memory().unwrap();
        let mut u = user("u1", "Old Name");
        db.upsert_user(&u).unwrap();

        u.full_name = "New Name".into();
        db.upsert_user(&u).unwrap();

        assert_eq!(db.get_user(&u.id).unwrap().full_name, "New Name");
    }

    #[test]
    fn partner_view_has_no_credentials() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_user(&user("u1", "Ada")).unwrap();

        let partners = db.list_partners(&UserId::from("viewer")).unwrap();
        let json = serde_json::to_value(&partners[0]).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["fullName"], "Ada");
    }

    #[test]
    fn fresh_database_lists_no_partners() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.list_partners(&UserId::from("anyone")).unwrap().is_empty());
    }
}
