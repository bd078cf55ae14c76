use crate::{
    AppState,
    auth::{self, AuthUser},
    error::{AppError, AppResult},
    gates::{self, Halt, LISTING_NOT_FOUND},
    models::{
        Credentials, ImagePayload, ImageRef, Listing, ListingDetails, ListingId, ListingPayload,
        LoginPage, NewListing, Page, ReviewId, ReviewPayload,
    },
    session::{LoginState, SessionContext},
    storage::StorageState,
    validation::{image_extension, validate_listing_upload, validate_review},
};
use axum::{
    Form, Json,
    body::Bytes,
    extract::{Multipart, Path, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// Object-storage folder listing photos are uploaded under.
pub const IMAGE_FOLDER: &str = "wanderlust";

/// Largest listing form (fields plus photo) accepted on create and update. Full-resolution
/// phone photos run to several megabytes, well past axum's 2 MB default.
pub const MAX_LISTING_FORM_BYTES: usize = 20 * 1024 * 1024;

pub const LISTING_MISSING: &str = "Listing you requested does not exist";

// --- Form Structs ---

/// ReviewForm
///
/// Urlencoded body of POST /listings/{id}/reviews, keyed the way the HTML form nests it.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ReviewForm {
    #[serde(rename = "review[rating]")]
    pub rating: Option<String>,
    #[serde(rename = "review[comment]")]
    pub comment: Option<String>,
}

impl From<ReviewForm> for ReviewPayload {
    fn from(form: ReviewForm) -> Self {
        ReviewPayload {
            rating: form.rating,
            comment: form.comment,
        }
    }
}

/// A chosen file from the `image` part of a listing form.
struct Photo {
    file_name: String,
    content_type: String,
    bytes: Bytes,
}

/// ListingSubmission
///
/// A decoded `multipart/form-data` listing body: the textual fields plus the optional photo.
struct ListingSubmission {
    payload: ListingPayload,
    photo: Option<Photo>,
}

/// read_listing_form
///
/// Decodes the multipart body field by field. Unknown fields are ignored and an empty file
/// part (no file chosen in the browser) counts as no photo.
async fn read_listing_form(mut multipart: Multipart) -> AppResult<ListingSubmission> {
    let mut payload = ListingPayload::default();
    let mut photo = None;

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == "image" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field.bytes().await?;
            if !file_name.is_empty() && !bytes.is_empty() {
                photo = Some(Photo {
                    file_name,
                    content_type,
                    bytes,
                });
            }
            continue;
        }

        let value = field.text().await?;
        match name.as_str() {
            "listing[title]" => payload.title = Some(value),
            "listing[description]" => payload.description = Some(value),
            "listing[price]" => payload.price = Some(value),
            "listing[country]" => payload.country = Some(value),
            "listing[location]" => payload.location = Some(value),
            "listing[image][url]" => {
                payload.image.get_or_insert_with(ImagePayload::default).url = Some(value)
            }
            "listing[image][filename]" => {
                payload
                    .image
                    .get_or_insert_with(ImagePayload::default)
                    .filename = Some(value)
            }
            other => tracing::debug!(field = %other, "ignoring unknown listing field"),
        }
    }

    Ok(ListingSubmission { payload, photo })
}

/// stage_photo
///
/// Picks the storage key for a chosen photo and points the payload's image at the URL it will
/// be served from, so the Validation Gate sees the final image reference. Nothing is uploaded,
/// and a key staged for a rejected file type is never used.
fn stage_photo(storage: &StorageState, payload: &mut ListingPayload, photo: &Photo) -> String {
    let extension = image_extension(&photo.file_name).unwrap_or_default();
    let key = format!("{IMAGE_FOLDER}/{}.{extension}", Uuid::new_v4());
    payload.image = Some(ImagePayload {
        url: Some(storage.object_url(&key)),
        filename: Some(key.clone()),
    });
    key
}

async fn upload_photo(storage: &StorageState, key: &str, photo: Photo) -> AppResult<ImageRef> {
    storage
        .upload_object(key, &photo.content_type, photo.bytes)
        .await
        .map_err(AppError::Storage)
}

// --- Listing Handlers ---

/// list_listings
///
/// [Public Route] The listing collection, newest first.
#[utoipa::path(
    get,
    path = "/listings",
    responses((status = 200, description = "Listings page"))
)]
pub async fn list_listings(
    ctx: SessionContext,
    State(state): State<AppState>,
) -> AppResult<Json<Page<Vec<Listing>>>> {
    let listings = state.repo.list_listings().await?;
    Ok(Json(ctx.page(&state.repo, listings).await?))
}

/// new_listing_form
///
/// [Authenticated Route] The page a new listing is submitted from.
#[utoipa::path(
    get,
    path = "/listings/new",
    responses(
        (status = 200, description = "New listing page"),
        (status = 303, description = "Not logged in, redirected to /login")
    )
)]
pub async fn new_listing_form(
    _user: AuthUser,
    ctx: SessionContext,
    State(state): State<AppState>,
) -> AppResult<Json<Page<()>>> {
    Ok(Json(ctx.page(&state.repo, ()).await?))
}

/// show_listing
///
/// [Public Route] A listing with its owner and reviews (authors populated).
#[utoipa::path(
    get,
    path = "/listings/{id}",
    params(("id" = ListingId, Path, description = "Listing id")),
    responses(
        (status = 200, description = "Listing page", body = ListingDetails),
        (status = 303, description = "Listing missing, redirected to /listings")
    )
)]
pub async fn show_listing(
    ctx: SessionContext,
    State(state): State<AppState>,
    Path(id): Path<ListingId>,
) -> AppResult<Response> {
    match state.repo.get_listing_details(id).await? {
        Some(details) => Ok(Json(ctx.page(&state.repo, details).await?).into_response()),
        None => {
            ctx.flash_error(LISTING_MISSING).await?;
            Ok(Redirect::to("/listings").into_response())
        }
    }
}

/// create_listing
///
/// [Authenticated Route] Identity, then validation, then: geocode the location, upload the
/// photo, store the listing with the principal as owner.
#[utoipa::path(
    post,
    path = "/listings",
    request_body(content = ListingPayload, content_type = "multipart/form-data"),
    responses(
        (status = 303, description = "Created, redirected to the new listing"),
        (status = 400, description = "Validation failed"),
        (status = 413, description = "Form larger than MAX_LISTING_FORM_BYTES")
    )
)]
pub async fn create_listing(
    user: AuthUser,
    ctx: SessionContext,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Redirect, Halt> {
    let ListingSubmission { mut payload, photo } = read_listing_form(multipart).await?;

    let staged = photo
        .as_ref()
        .map(|photo| stage_photo(&state.storage, &mut payload, photo));
    let photo_name = photo.as_ref().map(|photo| photo.file_name.as_str());
    let mut fields = validate_listing_upload(&payload, photo_name)?;

    let geometry = state
        .geocoder
        .forward(&fields.location)
        .await
        .map_err(AppError::from)?;

    if let (Some(key), Some(photo)) = (staged, photo) {
        fields.image = upload_photo(&state.storage, &key, photo).await?;
    }

    let listing = state
        .repo
        .create_listing(NewListing {
            owner: user.id,
            fields,
            geometry,
        })
        .await?;

    tracing::info!(listing_id = %listing.id, owner = %user.id, "listing created");
    ctx.flash_success("New listing created").await?;
    Ok(Redirect::to(&gates::listing_path(listing.id)))
}

/// edit_listing_form
///
/// [Authenticated Route] Identity, then ownership. Returns the listing to prefill the form.
#[utoipa::path(
    get,
    path = "/listings/{id}/edit",
    params(("id" = ListingId, Path, description = "Listing id")),
    responses(
        (status = 200, description = "Edit page", body = Listing),
        (status = 303, description = "Not logged in, missing or not the owner")
    )
)]
pub async fn edit_listing_form(
    user: AuthUser,
    ctx: SessionContext,
    State(state): State<AppState>,
    Path(id): Path<ListingId>,
) -> Result<Json<Page<Listing>>, Halt> {
    let listing = gates::require_listing_owner(&state.repo, &ctx, &user, id).await?;
    Ok(Json(ctx.page(&state.repo, listing).await?))
}

/// update_listing
///
/// [Authenticated Route] Identity, ownership, validation; then a full overwrite.
///
/// Without a new photo the current image is kept unless the form sends one explicitly.
/// The location is only re-geocoded when it changed.
#[utoipa::path(
    put,
    path = "/listings/{id}",
    params(("id" = ListingId, Path, description = "Listing id")),
    request_body(content = ListingPayload, content_type = "multipart/form-data"),
    responses(
        (status = 303, description = "Updated, or rejected by a gate"),
        (status = 400, description = "Validation failed"),
        (status = 413, description = "Form larger than MAX_LISTING_FORM_BYTES")
    )
)]
pub async fn update_listing(
    user: AuthUser,
    ctx: SessionContext,
    State(state): State<AppState>,
    Path(id): Path<ListingId>,
    multipart: Multipart,
) -> Result<Redirect, Halt> {
    let current = gates::require_listing_owner(&state.repo, &ctx, &user, id).await?;
    let ListingSubmission { mut payload, photo } = read_listing_form(multipart).await?;

    let staged = photo
        .as_ref()
        .map(|photo| stage_photo(&state.storage, &mut payload, photo));
    if payload.image.is_none() {
        payload.image = Some(ImagePayload {
            url: Some(current.image.url.clone()),
            filename: current.image.filename.clone(),
        });
    }
    let photo_name = photo.as_ref().map(|photo| photo.file_name.as_str());
    let mut fields = validate_listing_upload(&payload, photo_name)?;

    let geometry = if fields.location == current.location {
        current.geometry.clone()
    } else {
        state
            .geocoder
            .forward(&fields.location)
            .await
            .map_err(AppError::from)?
    };

    if let (Some(key), Some(photo)) = (staged, photo) {
        fields.image = upload_photo(&state.storage, &key, photo).await?;
    }

    if state.repo.update_listing(id, fields, geometry).await?.is_none() {
        ctx.flash_error(LISTING_NOT_FOUND).await?;
        return Err(Halt::to("/listings"));
    }

    tracing::info!(listing_id = %id, "listing updated");
    ctx.flash_success("Listing updated").await?;
    Ok(Redirect::to(&gates::listing_path(id)))
}

/// delete_listing
///
/// [Authenticated Route] Identity, then ownership. Removes the listing and its reviews.
#[utoipa::path(
    delete,
    path = "/listings/{id}",
    params(("id" = ListingId, Path, description = "Listing id")),
    responses((status = 303, description = "Deleted, or rejected by a gate"))
)]
pub async fn delete_listing(
    user: AuthUser,
    ctx: SessionContext,
    State(state): State<AppState>,
    Path(id): Path<ListingId>,
) -> Result<Redirect, Halt> {
    gates::require_listing_owner(&state.repo, &ctx, &user, id).await?;

    if state.repo.delete_listing(id).await? {
        tracing::info!(listing_id = %id, "listing deleted");
        ctx.flash_success("Listing deleted").await?;
    }
    Ok(Redirect::to("/listings"))
}

// --- Review Handlers ---

/// create_review
///
/// [Authenticated Route] Identity, then validation. Appends the review with the principal as
/// author.
#[utoipa::path(
    post,
    path = "/listings/{id}/reviews",
    params(("id" = ListingId, Path, description = "Listing id")),
    request_body(content = ReviewForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Created, redirected to the listing"),
        (status = 400, description = "Validation failed")
    )
)]
pub async fn create_review(
    user: AuthUser,
    ctx: SessionContext,
    State(state): State<AppState>,
    Path(id): Path<ListingId>,
    Form(form): Form<ReviewForm>,
) -> Result<Redirect, Halt> {
    let payload: ReviewPayload = form.into();
    let fields = validate_review(&payload)?;

    let Some(review) = state.repo.add_review(id, user.id, fields).await? else {
        ctx.flash_error(LISTING_NOT_FOUND).await?;
        return Err(Halt::to("/listings"));
    };

    tracing::info!(listing_id = %id, review_id = %review.id, "review created");
    ctx.flash_success("New review created").await?;
    Ok(Redirect::to(&gates::listing_path(id)))
}

/// delete_review
///
/// [Authenticated Route] Identity, then authorship. Detaches and deletes the review.
#[utoipa::path(
    delete,
    path = "/listings/{id}/reviews/{review_id}",
    params(
        ("id" = ListingId, Path, description = "Listing id"),
        ("review_id" = ReviewId, Path, description = "Review id")
    ),
    responses((status = 303, description = "Deleted, or rejected by a gate"))
)]
pub async fn delete_review(
    user: AuthUser,
    ctx: SessionContext,
    State(state): State<AppState>,
    Path((id, review_id)): Path<(ListingId, ReviewId)>,
) -> Result<Redirect, Halt> {
    gates::require_review_author(&state.repo, &ctx, &user, id, review_id).await?;

    if state.repo.remove_review(id, review_id).await? {
        tracing::info!(listing_id = %id, %review_id, "review deleted");
        ctx.flash_success("Review deleted").await?;
    }
    Ok(Redirect::to(&gates::listing_path(id)))
}

// --- Account Handlers ---

#[utoipa::path(
    get,
    path = "/signup",
    responses((status = 200, description = "Signup page"))
)]
pub async fn signup_form(
    ctx: SessionContext,
    State(state): State<AppState>,
) -> AppResult<Json<Page<()>>> {
    Ok(Json(ctx.page(&state.repo, ()).await?))
}

/// signup
///
/// [Public Route] Registers the account and logs it in. Failures come back to the signup
/// page as a notice.
#[utoipa::path(
    post,
    path = "/signup",
    request_body(content = Credentials, content_type = "application/x-www-form-urlencoded"),
    responses((status = 303, description = "Registered (to /listings) or rejected (to /signup)"))
)]
pub async fn signup(
    ctx: SessionContext,
    State(state): State<AppState>,
    Form(credentials): Form<Credentials>,
) -> AppResult<Redirect> {
    match auth::register(&state.repo, credentials).await {
        Ok(user) => {
            ctx.log_in(&user).await?;
            ctx.flash_success("Welcome to Wanderlust!").await?;
            Ok(Redirect::to(crate::session::DEFAULT_LANDING))
        }
        Err(e) if e.is_user_facing() => {
            ctx.flash_error(e.to_string()).await?;
            Ok(Redirect::to("/signup"))
        }
        Err(e) => Err(e.into()),
    }
}

/// login_form
///
/// [Public Route] The login page. Reports where a successful login will land when a gate
/// sent the client here.
#[utoipa::path(
    get,
    path = "/login",
    responses((status = 200, description = "Login page", body = LoginPage))
)]
pub async fn login_form(
    ctx: SessionContext,
    State(state): State<AppState>,
) -> AppResult<Json<Page<LoginPage>>> {
    let pending_redirect = match ctx.login_state().await? {
        LoginState::PendingRedirect(path) => Some(path),
        LoginState::Unauthenticated | LoginState::Authenticated(_) => None,
    };
    Ok(Json(ctx.page(&state.repo, LoginPage { pending_redirect }).await?))
}

/// login
///
/// [Public Route] Verifies the credentials and replays the remembered path, if any.
#[utoipa::path(
    post,
    path = "/login",
    request_body(content = Credentials, content_type = "application/x-www-form-urlencoded"),
    responses((status = 303, description = "Logged in (to the remembered path) or rejected (to /login)"))
)]
pub async fn login(
    ctx: SessionContext,
    State(state): State<AppState>,
    Form(credentials): Form<Credentials>,
) -> AppResult<Redirect> {
    match auth::authenticate(&state.repo, &credentials.username, &credentials.password).await {
        Ok(user) => {
            let target = ctx.log_in(&user).await?;
            ctx.flash_success("Welcome back to Wanderlust!").await?;
            Ok(Redirect::to(&target))
        }
        Err(e) if e.is_user_facing() => {
            ctx.flash_error(auth::AuthError::IncorrectCredentials.to_string())
                .await?;
            Ok(Redirect::to("/login"))
        }
        Err(e) => Err(e.into()),
    }
}

#[utoipa::path(
    get,
    path = "/logout",
    responses((status = 303, description = "Logged out, redirected to /listings"))
)]
pub async fn logout(ctx: SessionContext) -> AppResult<Redirect> {
    ctx.log_out().await?;
    ctx.flash_success("You are logged out!").await?;
    Ok(Redirect::to(crate::session::DEFAULT_LANDING))
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = String))
)]
pub async fn health() -> &'static str {
    "ok"
}
