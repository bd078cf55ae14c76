#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{Body, to_bytes},
    http::{HeaderValue, Request, Response, StatusCode, header},
};
use chrono::Utc;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tower::util::ServiceExt;
use tower_sessions::MemoryStore;
use wanderlust::{
    App, AppConfig, AppState, create_app, create_router,
    error::RepositoryError,
    geocoding::{GeocoderState, MockGeocoder},
    models::{
        Geometry, Listing, ListingDetails, ListingFields, ListingId, NewListing, NewUser, Review,
        ReviewDetails, ReviewFields, ReviewId, User, UserId, UserRecord,
    },
    repository::{Repository, RepositoryState},
    session::session_layer,
    storage::{MockStorageService, StorageState},
};

// --- IN-MEMORY REPOSITORY ---

#[derive(Default)]
struct Tables {
    users: Vec<UserRecord>,
    listings: Vec<Listing>,
    reviews: Vec<Review>,
}

/// Repository backed by plain vectors. Behaves like the Postgres schema: unique usernames,
/// reviews cascade with their listing, reviews need an existing listing.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
}

impl InMemoryRepository {
    pub fn listing_count(&self) -> usize {
        self.tables.lock().unwrap().listings.len()
    }

    pub fn review_count(&self) -> usize {
        self.tables.lock().unwrap().reviews.len()
    }

    pub fn user_id(&self, username: &str) -> UserId {
        self.tables
            .lock()
            .unwrap()
            .users
            .iter()
            .find(|record| record.user.username == username)
            .map(|record| record.user.id)
            .expect("user exists")
    }

    /// Inserts a listing directly, bypassing the HTTP surface.
    pub fn seed_listing(&self, owner: UserId, title: &str) -> ListingId {
        let listing = Listing {
            id: ListingId::generate(),
            title: title.to_string(),
            description: "Seeded".to_string(),
            image: wanderlust::models::ImageRef {
                url: "https://example.com/seed.png".to_string(),
                filename: Some("wanderlust/seed.png".to_string()),
            },
            price: 80.0,
            country: "US".to_string(),
            location: "Boulder".to_string(),
            geometry: Geometry::point(-105.27, 40.01),
            owner,
            reviews: vec![],
            created_at: Utc::now(),
        };
        let id = listing.id;
        self.tables.lock().unwrap().listings.push(listing);
        id
    }

    pub fn seed_review(&self, listing_id: ListingId, author: UserId) -> ReviewId {
        let review = Review {
            id: ReviewId::generate(),
            listing_id,
            rating: 4,
            comment: "Lovely".to_string(),
            author,
            created_at: Utc::now(),
        };
        let id = review.id;
        let mut tables = self.tables.lock().unwrap();
        if let Some(listing) = tables.listings.iter_mut().find(|l| l.id == listing_id) {
            listing.reviews.push(id);
        }
        tables.reviews.push(review);
        id
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn list_listings(&self) -> Result<Vec<Listing>, RepositoryError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.listings.iter().rev().cloned().collect())
    }

    async fn get_listing(&self, id: ListingId) -> Result<Option<Listing>, RepositoryError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.listings.iter().find(|l| l.id == id).cloned())
    }

    async fn get_listing_details(
        &self,
        id: ListingId,
    ) -> Result<Option<ListingDetails>, RepositoryError> {
        let tables = self.tables.lock().unwrap();
        let Some(listing) = tables.listings.iter().find(|l| l.id == id).cloned() else {
            return Ok(None);
        };
        let user = |id: UserId| {
            tables
                .users
                .iter()
                .find(|record| record.user.id == id)
                .map(|record| record.user.clone())
        };
        let reviews = listing
            .reviews
            .iter()
            .filter_map(|review_id| tables.reviews.iter().find(|r| r.id == *review_id))
            .map(|review| ReviewDetails {
                review: review.clone(),
                author: user(review.author),
            })
            .collect();
        Ok(Some(ListingDetails {
            owner: user(listing.owner),
            listing,
            reviews,
        }))
    }

    async fn create_listing(&self, new: NewListing) -> Result<Listing, RepositoryError> {
        let fields = new.fields;
        let listing = Listing {
            id: ListingId::generate(),
            title: fields.title,
            description: fields.description,
            image: fields.image,
            price: fields.price,
            country: fields.country,
            location: fields.location,
            geometry: new.geometry,
            owner: new.owner,
            reviews: vec![],
            created_at: Utc::now(),
        };
        self.tables.lock().unwrap().listings.push(listing.clone());
        Ok(listing)
    }

    async fn update_listing(
        &self,
        id: ListingId,
        fields: ListingFields,
        geometry: Geometry,
    ) -> Result<Option<Listing>, RepositoryError> {
        let mut tables = self.tables.lock().unwrap();
        let Some(listing) = tables.listings.iter_mut().find(|l| l.id == id) else {
            return Ok(None);
        };
        listing.title = fields.title;
        listing.description = fields.description;
        listing.image = fields.image;
        listing.price = fields.price;
        listing.country = fields.country;
        listing.location = fields.location;
        listing.geometry = geometry;
        Ok(Some(listing.clone()))
    }

    async fn delete_listing(&self, id: ListingId) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.listings.len();
        tables.listings.retain(|l| l.id != id);
        let removed = tables.listings.len() != before;
        if removed {
            tables.reviews.retain(|r| r.listing_id != id);
        }
        Ok(removed)
    }

    async fn get_review(&self, id: ReviewId) -> Result<Option<Review>, RepositoryError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.reviews.iter().find(|r| r.id == id).cloned())
    }

    async fn add_review(
        &self,
        listing_id: ListingId,
        author: UserId,
        fields: ReviewFields,
    ) -> Result<Option<Review>, RepositoryError> {
        let mut tables = self.tables.lock().unwrap();
        let Some(listing) = tables.listings.iter_mut().find(|l| l.id == listing_id) else {
            return Ok(None);
        };
        let review = Review {
            id: ReviewId::generate(),
            listing_id,
            rating: fields.rating,
            comment: fields.comment,
            author,
            created_at: Utc::now(),
        };
        listing.reviews.push(review.id);
        tables.reviews.push(review.clone());
        Ok(Some(review))
    }

    async fn remove_review(
        &self,
        listing_id: ListingId,
        review_id: ReviewId,
    ) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(listing) = tables.listings.iter_mut().find(|l| l.id == listing_id) {
            listing.reviews.retain(|id| *id != review_id);
        }
        let before = tables.reviews.len();
        tables
            .reviews
            .retain(|r| !(r.id == review_id && r.listing_id == listing_id));
        Ok(tables.reviews.len() != before)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .users
            .iter()
            .find(|record| record.user.id == id)
            .map(|record| record.user.clone()))
    }

    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, RepositoryError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .users
            .iter()
            .find(|record| record.user.username == username)
            .cloned())
    }

    async fn create_user(&self, new: NewUser) -> Result<User, RepositoryError> {
        let mut tables = self.tables.lock().unwrap();
        if tables.users.iter().any(|r| r.user.username == new.username) {
            return Err(RepositoryError::Conflict(new.username));
        }
        let user = User {
            id: UserId::generate(),
            username: new.username,
            email: new.email,
            created_at: Utc::now(),
        };
        tables.users.push(UserRecord {
            user: user.clone(),
            password_hash: new.password_hash,
        });
        Ok(user)
    }
}

// --- APP FIXTURE ---

pub struct TestApp {
    pub app: App,
    pub repo: Arc<InMemoryRepository>,
    pub storage: MockStorageService,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_services(MockStorageService::new(), MockGeocoder::new())
    }

    pub fn with_services(storage: MockStorageService, geocoder: MockGeocoder) -> Self {
        let repo = Arc::new(InMemoryRepository::default());
        let state = AppState {
            repo: repo.clone() as RepositoryState,
            storage: Arc::new(storage.clone()) as StorageState,
            geocoder: Arc::new(geocoder) as GeocoderState,
            config: AppConfig::default(),
        };
        let sessions = session_layer(MemoryStore::default(), false);
        Self {
            app: create_app(create_router(state, sessions)),
            repo,
            storage,
        }
    }

    /// A fresh browser: its own cookie jar, same server.
    pub fn client(&self) -> TestClient {
        TestClient {
            app: self.app.clone(),
            cookie: None,
        }
    }

    /// A browser already signed up (and therefore logged in) as `username`, with the
    /// welcome notice already consumed.
    pub async fn logged_in(&self, username: &str) -> TestClient {
        let mut client = self.client();
        let response = client.signup(username, "s3cret-pass").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/listings");
        client.page("/listings").await;
        client
    }
}

// --- TEST CLIENT ---

/// Sends requests through the full service and carries the session cookie between them.
pub struct TestClient {
    app: App,
    cookie: Option<String>,
}

impl TestClient {
    pub async fn send(&mut self, mut request: Request<Body>) -> Response<Body> {
        if let Some(cookie) = &self.cookie {
            request
                .headers_mut()
                .insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        }

        let response = self.app.clone().oneshot(request).await.unwrap();

        if let Some(set_cookie) = response.headers().get(header::SET_COOKIE) {
            let pair = set_cookie
                .to_str()
                .unwrap()
                .split(';')
                .next()
                .unwrap()
                .to_string();
            let has_value = pair.split_once('=').is_some_and(|(_, v)| !v.is_empty());
            self.cookie = has_value.then_some(pair);
        }
        response
    }

    pub async fn get(&mut self, uri: &str) -> Response<Body> {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_form(&mut self, uri: &str, body: &str) -> Response<Body> {
        self.send(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn post_multipart(&mut self, uri: &str, form: MultipartForm) -> Response<Body> {
        let (content_type, body) = form.finish();
        self.send(
            Request::post(uri)
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }

    /// DELETE the way an HTML form does it: POST with `?_method=DELETE`.
    pub async fn delete(&mut self, uri: &str) -> Response<Body> {
        self.send(
            Request::post(format!("{uri}?_method=DELETE"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn signup(&mut self, username: &str, password: &str) -> Response<Body> {
        self.post_form(
            "/signup",
            &format!("username={username}&email={username}%40example.com&password={password}"),
        )
        .await
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Response<Body> {
        self.post_form(
            "/login",
            &format!("username={username}&password={password}"),
        )
        .await
    }

    /// GETs a page and returns its JSON view model.
    pub async fn page(&mut self, uri: &str) -> Value {
        let response = self.get(uri).await;
        assert_eq!(response.status(), StatusCode::OK, "GET {uri}");
        json_body(response).await
    }
}

pub fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .map(|value| value.to_str().unwrap().to_string())
        .unwrap_or_default()
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// --- MULTIPART ---

const BOUNDARY: &str = "wanderlust-test-boundary";

/// Hand-built `multipart/form-data` body.
#[derive(Default)]
pub struct MultipartForm {
    body: Vec<u8>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, filename: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    fn finish(mut self) -> (String, Vec<u8>) {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        (format!("multipart/form-data; boundary={BOUNDARY}"), self.body)
    }
}

/// The cabin from the create scenario, with a PNG attached.
pub fn cabin_form() -> MultipartForm {
    MultipartForm::new()
        .text("listing[title]", "Cabin")
        .text("listing[description]", "Cozy")
        .text("listing[price]", "100")
        .text("listing[country]", "US")
        .text("listing[location]", "Denver")
        .file("image", "cabin.png", "image/png", b"\x89PNG fake image bytes")
}
