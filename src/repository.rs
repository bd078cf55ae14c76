use crate::error::RepositoryError;
use crate::models::{
    Geometry, ImageRef, Listing, ListingDetails, ListingFields, ListingId, NewListing, NewUser,
    Review, ReviewDetails, ReviewFields, ReviewId, User, UserId, UserRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::sync::Arc;
use uuid::Uuid;

/// Repository Trait
///
/// Defines the abstract contract for all persistence operations, allowing the handlers and
/// gates to interact with the entity store without knowing the implementation (Postgres in
/// production, an in-memory map in tests).
///
/// **Send + Sync + async_trait** are required to make the trait object (`Arc<dyn Repository>`)
/// safely shareable across Axum's asynchronous task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Listings ---
    // Every listing, newest first.
    async fn list_listings(&self) -> Result<Vec<Listing>, RepositoryError>;
    async fn get_listing(&self, id: ListingId) -> Result<Option<Listing>, RepositoryError>;
    // The listing with its owner and every review's author resolved.
    async fn get_listing_details(
        &self,
        id: ListingId,
    ) -> Result<Option<ListingDetails>, RepositoryError>;
    async fn create_listing(&self, listing: NewListing) -> Result<Listing, RepositoryError>;
    // Full-field overwrite. The owner is never touched. `None` when the listing is gone.
    async fn update_listing(
        &self,
        id: ListingId,
        fields: ListingFields,
        geometry: Geometry,
    ) -> Result<Option<Listing>, RepositoryError>;
    // Removes the listing and every review attached to it.
    async fn delete_listing(&self, id: ListingId) -> Result<bool, RepositoryError>;

    // --- Reviews ---
    async fn get_review(&self, id: ReviewId) -> Result<Option<Review>, RepositoryError>;
    // Appends a review to the listing. `None` when the listing does not exist.
    async fn add_review(
        &self,
        listing_id: ListingId,
        author: UserId,
        fields: ReviewFields,
    ) -> Result<Option<Review>, RepositoryError>;
    // Detaches the review from the listing and deletes it.
    async fn remove_review(
        &self,
        listing_id: ListingId,
        review_id: ReviewId,
    ) -> Result<bool, RepositoryError>;

    // --- Users ---
    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, RepositoryError>;
    // `RepositoryError::Conflict` when the username is taken.
    async fn create_user(&self, user: NewUser) -> Result<User, RepositoryError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer access across the application state.
pub type RepositoryState = Arc<dyn Repository>;

// --- Row Mapping ---

const LISTING_COLUMNS: &str = r#"
    l.id, l.title, l.description, l.image_url, l.image_filename, l.price,
    l.country, l.location, l.geometry_type, l.longitude, l.latitude,
    l.owner_id, l.created_at,
    COALESCE(
        ARRAY(SELECT r.id FROM reviews r WHERE r.listing_id = l.id ORDER BY r.created_at, r.id),
        '{}'
    ) AS review_ids
"#;

const REVIEW_COLUMNS: &str = "id, listing_id, rating, comment, author_id, created_at";

const USER_COLUMNS: &str = "id, username, email, created_at";

/// Flat `listings` row; the image and geometry are split across columns.
#[derive(FromRow)]
struct ListingRow {
    id: ListingId,
    title: String,
    description: String,
    image_url: String,
    image_filename: Option<String>,
    price: f64,
    country: String,
    location: String,
    geometry_type: String,
    longitude: f64,
    latitude: f64,
    owner_id: UserId,
    created_at: DateTime<Utc>,
    review_ids: Vec<Uuid>,
}

impl From<ListingRow> for Listing {
    fn from(row: ListingRow) -> Self {
        Listing {
            id: row.id,
            title: row.title,
            description: row.description,
            image: ImageRef {
                url: row.image_url,
                filename: row.image_filename,
            },
            price: row.price,
            country: row.country,
            location: row.location,
            geometry: Geometry {
                kind: row.geometry_type,
                coordinates: vec![row.longitude, row.latitude],
            },
            owner: row.owner_id,
            reviews: row.review_ids.into_iter().map(ReviewId::from).collect(),
            created_at: row.created_at,
        }
    }
}

/// A review joined with its (possibly missing) author.
#[derive(FromRow)]
struct ReviewAuthorRow {
    #[sqlx(flatten)]
    review: Review,
    username: Option<String>,
    email: Option<String>,
    user_created_at: Option<DateTime<Utc>>,
}

impl From<ReviewAuthorRow> for ReviewDetails {
    fn from(row: ReviewAuthorRow) -> Self {
        let author = match (row.username, row.email, row.user_created_at) {
            (Some(username), Some(email), Some(created_at)) => Some(User {
                id: row.review.author,
                username,
                email,
                created_at,
            }),
            _ => None,
        };
        ReviewDetails {
            review: row.review,
            author,
        }
    }
}

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    /// list_listings
    ///
    /// Every listing, newest first, with its review ids aggregated in creation order.
    async fn list_listings(&self) -> Result<Vec<Listing>, RepositoryError> {
        let query = format!("SELECT {LISTING_COLUMNS} FROM listings l ORDER BY l.created_at DESC");
        let rows = sqlx::query_as::<_, ListingRow>(&query)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Listing::from).collect())
    }

    async fn get_listing(&self, id: ListingId) -> Result<Option<Listing>, RepositoryError> {
        let query = format!("SELECT {LISTING_COLUMNS} FROM listings l WHERE l.id = $1");
        let row = sqlx::query_as::<_, ListingRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Listing::from))
    }

    /// get_listing_details
    ///
    /// Populates the owner and each review's author. LEFT JOINs keep reviews whose author row
    /// is gone; those come back with `author: None`.
    async fn get_listing_details(
        &self,
        id: ListingId,
    ) -> Result<Option<ListingDetails>, RepositoryError> {
        let Some(listing) = self.get_listing(id).await? else {
            return Ok(None);
        };
        let owner = self.get_user(listing.owner).await?;

        let reviews = sqlx::query_as::<_, ReviewAuthorRow>(
            r#"
            SELECT r.id, r.listing_id, r.rating, r.comment, r.author_id, r.created_at,
                   u.username, u.email, u.created_at AS user_created_at
            FROM reviews r
            LEFT JOIN users u ON u.id = r.author_id
            WHERE r.listing_id = $1
            ORDER BY r.created_at, r.id
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(ListingDetails {
            listing,
            owner,
            reviews: reviews.into_iter().map(ReviewDetails::from).collect(),
        }))
    }

    async fn create_listing(&self, new: NewListing) -> Result<Listing, RepositoryError> {
        let id = ListingId::generate();
        let fields = new.fields;
        sqlx::query(
            r#"
            INSERT INTO listings
                (id, title, description, image_url, image_filename, price, country, location,
                 geometry_type, longitude, latitude, owner_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW())
            "#,
        )
        .bind(id)
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(&fields.image.url)
        .bind(&fields.image.filename)
        .bind(fields.price)
        .bind(&fields.country)
        .bind(&fields.location)
        .bind(&new.geometry.kind)
        .bind(new.geometry.longitude())
        .bind(new.geometry.latitude())
        .bind(new.owner)
        .execute(&self.pool)
        .await?;

        self.get_listing(id)
            .await?
            .ok_or(RepositoryError::Database(sqlx::Error::RowNotFound))
    }

    async fn update_listing(
        &self,
        id: ListingId,
        fields: ListingFields,
        geometry: Geometry,
    ) -> Result<Option<Listing>, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE listings
            SET title = $2, description = $3, image_url = $4, image_filename = $5,
                price = $6, country = $7, location = $8,
                geometry_type = $9, longitude = $10, latitude = $11
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(&fields.image.url)
        .bind(&fields.image.filename)
        .bind(fields.price)
        .bind(&fields.country)
        .bind(&fields.location)
        .bind(&geometry.kind)
        .bind(geometry.longitude())
        .bind(geometry.latitude())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_listing(id).await
    }

    /// delete_listing
    ///
    /// The `reviews.listing_id` foreign key cascades, so one statement removes the reviews too.
    async fn delete_listing(&self, id: ListingId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM listings WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_review(&self, id: ReviewId) -> Result<Option<Review>, RepositoryError> {
        let query = format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1");
        Ok(sqlx::query_as::<_, Review>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// add_review
    ///
    /// Inserts only while the parent listing exists, so a concurrent delete cannot leave an
    /// orphaned review behind.
    async fn add_review(
        &self,
        listing_id: ListingId,
        author: UserId,
        fields: ReviewFields,
    ) -> Result<Option<Review>, RepositoryError> {
        let query = format!(
            r#"
            INSERT INTO reviews (id, listing_id, rating, comment, author_id, created_at)
            SELECT $1, l.id, $3, $4, $5, NOW() FROM listings l WHERE l.id = $2
            RETURNING {REVIEW_COLUMNS}
            "#
        );
        Ok(sqlx::query_as::<_, Review>(&query)
            .bind(ReviewId::generate())
            .bind(listing_id)
            .bind(fields.rating)
            .bind(&fields.comment)
            .bind(author)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn remove_review(
        &self,
        listing_id: ListingId,
        review_id: ReviewId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = $1 AND listing_id = $2")
            .bind(review_id)
            .bind(listing_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, RepositoryError> {
        let query = format!("SELECT {USER_COLUMNS}, password_hash FROM users WHERE username = $1");
        Ok(sqlx::query_as::<_, UserRecord>(&query)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// create_user
    ///
    /// Maps the `users.username` unique violation to `RepositoryError::Conflict`.
    async fn create_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        let query = format!(
            "INSERT INTO users (id, username, email, password_hash, created_at) \
             VALUES ($1, $2, $3, $4, NOW()) RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(UserId::generate())
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    RepositoryError::Conflict(format!("username {} is taken", user.username))
                }
                other => RepositoryError::Database(other),
            })
    }
}
