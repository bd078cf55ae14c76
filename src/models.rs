use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

// --- Identifiers ---

/// define_id
///
/// Declares an opaque, copyable identifier wrapping a UUID. The wrapper is transparent in
/// JSON and in SQL, so it round-trips through path parameters, sessions and Postgres unchanged,
/// while keeping listing, review and user keys from being mixed up at compile time.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Default,
            Serialize, Deserialize, sqlx::Type, TS, ToSchema,
        )]
        #[serde(transparent)]
        #[sqlx(transparent)]
        #[ts(export)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a fresh random identifier.
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

define_id!(
    /// The principal key. Ownership and authorship checks compare these and nothing else.
    UserId
);
define_id!(ListingId);
define_id!(ReviewId);

// --- Core Entities (Mapped to Database) ---

/// User
///
/// The public view of an account: what other users see as a listing owner or review author,
/// and what the session resolves the principal to.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// UserRecord
///
/// Internal row used only by the credential check. Never serialized.
#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    #[sqlx(flatten)]
    pub user: User,
    pub password_hash: String,
}

/// NewUser
///
/// Insert payload produced by `auth::register` after hashing the password.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// ImageRef
///
/// Location of a listing photo in object storage. `filename` is the storage key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ImageRef {
    pub url: String,
    pub filename: Option<String>,
}

/// Geometry
///
/// GeoJSON point as returned by forward geocoding: `coordinates` is `[longitude, latitude]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Vec<f64>,
}

impl Geometry {
    pub fn point(longitude: f64, latitude: f64) -> Self {
        Self {
            kind: "Point".to_string(),
            coordinates: vec![longitude, latitude],
        }
    }

    pub fn longitude(&self) -> f64 {
        self.coordinates.first().copied().unwrap_or_default()
    }

    pub fn latitude(&self) -> f64 {
        self.coordinates.get(1).copied().unwrap_or_default()
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::point(0.0, 0.0)
    }
}

/// Listing
///
/// A stay offered on the marketplace. `owner` is fixed at creation; `reviews` holds the
/// attached review keys in creation order.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Listing {
    pub id: ListingId,
    pub title: String,
    pub description: String,
    pub image: ImageRef,
    pub price: f64,
    pub country: String,
    pub location: String,
    pub geometry: Geometry,
    pub owner: UserId,
    pub reviews: Vec<ReviewId>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// Review
///
/// A rating left on a listing. `author` is fixed at creation.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Review {
    pub id: ReviewId,
    pub listing_id: ListingId,
    pub rating: i32,
    pub comment: String,
    #[sqlx(rename = "author_id")]
    pub author: UserId,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

// --- Populated Views ---

/// ReviewDetails
///
/// A review with its author resolved. The author is `None` when the reference is stale.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ReviewDetails {
    pub review: Review,
    pub author: Option<User>,
}

/// ListingDetails
///
/// The detail view: the listing, its owner and every review with its author.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ListingDetails {
    pub listing: Listing,
    pub owner: Option<User>,
    pub reviews: Vec<ReviewDetails>,
}

// --- Request Payloads (Input Schemas) ---

/// ImagePayload
///
/// The `listing[image]` sub-object of a listing submission.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, TS, ToSchema, Default)]
#[ts(export)]
pub struct ImagePayload {
    #[validate(
        required(message = "\"listing.image.url\" is required"),
        url(message = "\"listing.image.url\" must be a valid uri")
    )]
    pub url: Option<String>,

    #[validate(length(
        min = 1,
        message = "\"listing.image.filename\" is not allowed to be empty"
    ))]
    pub filename: Option<String>,
}

/// ListingPayload
///
/// A listing submission exactly as the client sent it. Every field is optional at the type
/// level so that presence is reported by the Validation Gate rather than by deserialization;
/// `price` stays textual for the same reason.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, TS, ToSchema, Default)]
#[ts(export)]
pub struct ListingPayload {
    #[validate(
        required(message = "Title is required"),
        length(min = 1, message = "Title cannot be empty")
    )]
    pub title: Option<String>,

    #[validate(
        required(message = "\"listing.description\" is required"),
        length(min = 1, message = "\"listing.description\" is not allowed to be empty")
    )]
    pub description: Option<String>,

    #[validate(required(message = "\"listing.image\" is required"), nested)]
    pub image: Option<ImagePayload>,

    #[validate(
        required(message = "\"listing.price\" is required"),
        custom(function = "crate::validation::check_price")
    )]
    pub price: Option<String>,

    #[validate(
        required(message = "\"listing.country\" is required"),
        length(min = 1, message = "\"listing.country\" is not allowed to be empty")
    )]
    pub country: Option<String>,

    #[validate(
        required(message = "\"listing.location\" is required"),
        length(min = 1, message = "\"listing.location\" is not allowed to be empty")
    )]
    pub location: Option<String>,
}

/// ReviewPayload
///
/// A review submission as sent by the client. `rating` is textual until validated.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, TS, ToSchema, Default)]
#[ts(export)]
pub struct ReviewPayload {
    #[validate(
        required(message = "\"review.rating\" is required"),
        custom(function = "crate::validation::check_rating")
    )]
    pub rating: Option<String>,

    #[validate(
        required(message = "\"review.comment\" is required"),
        length(min = 1, message = "\"review.comment\" is not allowed to be empty")
    )]
    pub comment: Option<String>,
}

/// ListingFields
///
/// The typed product of a successful listing validation. This is what the store receives.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingFields {
    pub title: String,
    pub description: String,
    pub image: ImageRef,
    pub price: f64,
    pub country: String,
    pub location: String,
}

/// ReviewFields
///
/// The typed product of a successful review validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewFields {
    pub rating: i32,
    pub comment: String,
}

/// NewListing
///
/// Everything the store needs to create a listing: validated fields plus the derived
/// owner and coordinates.
#[derive(Debug, Clone)]
pub struct NewListing {
    pub owner: UserId,
    pub fields: ListingFields,
    pub geometry: Geometry,
}

/// Credentials
///
/// Body of POST /signup and POST /login (urlencoded). `email` is only read on signup.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

// --- Page Schemas (Output) ---

/// Notices
///
/// One-shot messages queued for the next page the client renders.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct Notices {
    pub success: Vec<String>,
    pub error: Vec<String>,
}

/// Page
///
/// The view model every page-style GET returns: the consumed notices, the signed-in user
/// (if any) and the page data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub success: Vec<String>,
    pub error: Vec<String>,
    pub current_user: Option<User>,
    pub data: T,
}

impl<T> Page<T> {
    pub fn new(notices: Notices, current_user: Option<User>, data: T) -> Self {
        Self {
            success: notices.success,
            error: notices.error,
            current_user,
            data,
        }
    }
}

/// LoginPage
///
/// Data for GET /login. `pending_redirect` is where a successful login will land.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LoginPage {
    pub pending_redirect: Option<String>,
}
