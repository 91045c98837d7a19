//! Postgres-backed repository implementations.

mod comments;
mod follows;
mod groups;
mod posts;
mod types;
mod users;

use std::sync::Arc;

use sqlx::{
    Postgres, QueryBuilder, Transaction,
    postgres::{PgPool, PgPoolOptions},
    query,
};

use crate::application::pagination::LimitOffset;
use crate::application::repos::{FeedScope, RepoError};

const POST_SELECT: &str = "SELECT p.id, p.text, p.created_at, p.image, \
     u.id AS author_id, u.username AS author_username, u.display_name AS author_display_name, \
     g.id AS group_id, g.slug AS group_slug, g.title AS group_title \
     FROM posts p \
     INNER JOIN users u ON u.id = p.author_id \
     LEFT JOIN groups g ON g.id = p.group_id \
     WHERE 1=1 ";

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<Transaction<'_, Postgres>, sqlx::Error> {
        self.pool.begin().await
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(pool).await
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }

    fn apply_scope<'q>(qb: &mut QueryBuilder<'q, Postgres>, scope: FeedScope) {
        match scope {
            FeedScope::All => {}
            FeedScope::Group(group_id) => {
                qb.push(" AND p.group_id = ");
                qb.push_bind(group_id);
            }
            FeedScope::Author(author_id) => {
                qb.push(" AND p.author_id = ");
                qb.push_bind(author_id);
            }
            FeedScope::FollowedBy(follower_id) => {
                qb.push(
                    " AND EXISTS (SELECT 1 FROM follows f WHERE f.author_id = p.author_id AND f.follower_id = ",
                );
                qb.push_bind(follower_id);
                qb.push(")");
            }
        }
    }

    fn convert_count(value: i64) -> Result<u64, RepoError> {
        value
            .try_into()
            .map_err(|_| RepoError::from_persistence("count exceeds supported range"))
    }

    /// `LIMIT`/`OFFSET` binds, or `None` when the window lies beyond any
    /// row Postgres can address.
    fn sql_window(window: LimitOffset) -> Option<(i64, i64)> {
        let limit = i64::try_from(window.limit).ok()?;
        let offset = i64::try_from(window.offset).ok()?;
        Some((limit, offset))
    }
}

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        sqlx::Error::Database(db) if db.message().contains("duplicate key") => {
            RepoError::Duplicate {
                constraint: db.constraint().unwrap_or("unknown").to_string(),
            }
        }
        sqlx::Error::Database(db)
            if db.message().contains("violates foreign key constraint")
                || db.message().contains("invalid input syntax") =>
        {
            RepoError::InvalidInput {
                message: db.message().to_string(),
            }
        }
        sqlx::Error::Database(db) if db.message().contains("violates") => RepoError::Integrity {
            message: db.message().to_string(),
        },
        sqlx::Error::Database(db)
            if db
                .message()
                .contains("canceling statement due to user request") =>
        {
            RepoError::Timeout
        }
        other => RepoError::from_persistence(other),
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn follow_scope_joins_follow_edges() {
        let mut qb = QueryBuilder::<Postgres>::new(POST_SELECT);
        PostgresRepositories::apply_scope(&mut qb, FeedScope::FollowedBy(Uuid::nil()));
        let sql = qb.sql();
        assert!(sql.contains("FROM follows f WHERE f.author_id = p.author_id"));
        assert!(sql.contains("f.follower_id = $1"));
    }

    #[test]
    fn global_scope_adds_no_filter() {
        let mut qb = QueryBuilder::<Postgres>::new(POST_SELECT);
        PostgresRepositories::apply_scope(&mut qb, FeedScope::All);
        assert_eq!(qb.sql(), POST_SELECT);
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            RepoError::NotFound
        ));
    }

    #[test]
    fn negative_counts_are_rejected() {
        assert!(PostgresRepositories::convert_count(-1).is_err());
        assert_eq!(PostgresRepositories::convert_count(13).unwrap(), 13);
    }

    #[test]
    fn windows_past_signed_range_have_no_binds() {
        let huge = LimitOffset {
            limit: 10,
            offset: 9_999_999_999_999_999_990,
        };
        assert_eq!(PostgresRepositories::sql_window(huge), None);

        let ordinary = LimitOffset {
            limit: 10,
            offset: 20,
        };
        assert_eq!(PostgresRepositories::sql_window(ordinary), Some((10, 20)));
    }
}
