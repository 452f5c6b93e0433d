//! User repository for database operations.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use mercato_core::UserId;

use super::RepositoryError;
use crate::models::{DeliveryDetails, User};

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i32,
    username: String,
    email: String,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId::new(row.id),
            username: row.username,
            email: row.email,
            created_at: row.created_at,
        }
    }
}

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a user by username.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, email, created_at FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Store `details` as the user's default delivery information, creating
    /// the profile row if needed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn save_default_delivery(
        &self,
        user_id: UserId,
        details: &DeliveryDetails,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO user_profiles (
                user_id, default_phone_number, default_country, default_postcode,
                default_town_or_city, default_street_address1, default_street_address2,
                default_county
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id) DO UPDATE SET
                default_phone_number = EXCLUDED.default_phone_number,
                default_country = EXCLUDED.default_country,
                default_postcode = EXCLUDED.default_postcode,
                default_town_or_city = EXCLUDED.default_town_or_city,
                default_street_address1 = EXCLUDED.default_street_address1,
                default_street_address2 = EXCLUDED.default_street_address2,
                default_county = EXCLUDED.default_county,
                updated_at = NOW()
            ",
        )
        .bind(user_id.as_i32())
        .bind(&details.phone_number)
        .bind(&details.country)
        .bind(&details.postcode)
        .bind(&details.town_or_city)
        .bind(&details.street_address1)
        .bind(&details.street_address2)
        .bind(&details.county)
        .execute(self.pool)
        .await?;
        Ok(())
    }
}
