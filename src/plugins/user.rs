use crate::core::broker::DbBroker;
use crate::core::error::TidelogError;
use crate::interp::InterpContext;
use crate::interp::bus::{PublishReport, publish_fact};
use crate::interp::fact::{Fact, FactKind};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: String,
    pub name: String,
    pub created_at: String,
}

pub fn add_user(cx: &InterpContext, name: &str) -> Result<(User, PublishReport), TidelogError> {
    if name.trim().is_empty() {
        return Err(TidelogError::ValidationError(
            "user name must not be empty".to_string(),
        ));
    }

    let id = format!("U_{}", Ulid::new());
    let at = cx.clock.stamp();
    let broker = DbBroker::new(&cx.store.root);
    let user = broker.with_conn(&cx.store.db_path(), &cx.config.actor, "user.add", |conn| {
        conn.execute(
            "INSERT INTO users(id, name, created_at) VALUES(?1, ?2, ?3)",
            params![id, name, at],
        )?;
        Ok(User {
            id: id.clone(),
            name: name.to_string(),
            created_at: at.clone(),
        })
    })?;

    let fact = Fact::new(
        &user.id,
        &cx.clock,
        FactKind::UserCreated {
            name: user.name.clone(),
        },
    );
    let report = publish_fact(cx, &fact);
    Ok((user, report))
}

pub fn get_user(conn: &Connection, user_id: &str) -> Result<Option<User>, TidelogError> {
    let user = conn
        .query_row(
            "SELECT id, name, created_at FROM users WHERE id = ?1",
            [user_id],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(user)
}

pub fn require_user(conn: &Connection, user_id: &str) -> Result<User, TidelogError> {
    get_user(conn, user_id)?.ok_or_else(|| TidelogError::NotFound(format!("user {}", user_id)))
}

pub fn list_users(cx: &InterpContext) -> Result<Vec<User>, TidelogError> {
    let broker = DbBroker::new(&cx.store.root);
    broker.with_conn(&cx.store.db_path(), &cx.config.actor, "user.list", |conn| {
        let mut stmt = conn.prepare("SELECT id, name, created_at FROM users ORDER BY created_at")?;
        let rows = stmt.query_map([], |row| {
            Ok(User {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?;
        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    })
}
