use axum::response::{IntoResponse, Redirect, Response};

use crate::{
    auth::AuthUser,
    error::{AppError, RepositoryError},
    models::{Listing, ListingId, Review, ReviewId},
    repository::RepositoryState,
    session::SessionContext,
};

pub const LISTING_NOT_FOUND: &str = "Listing not found!";
pub const NOT_LISTING_OWNER: &str = "You don't have permission to edit this listing.";
pub const NOT_REVIEW_AUTHOR: &str = "You don't have permission to do that.";
pub const REVIEW_NOT_FOUND: &str = "Review not found!";

/// Halt
///
/// The terminal outcome of a gate. `Redirect` is an ordinary rejection (the notice has already
/// been queued on the session); `Fault` is a store or session failure that ends the request
/// with a 500.
#[derive(Debug)]
pub enum Halt {
    Redirect(Redirect),
    Fault(AppError),
}

impl Halt {
    pub fn to(path: &str) -> Self {
        Halt::Redirect(Redirect::to(path))
    }
}

impl IntoResponse for Halt {
    fn into_response(self) -> Response {
        match self {
            Halt::Redirect(redirect) => redirect.into_response(),
            Halt::Fault(error) => error.into_response(),
        }
    }
}

impl From<AppError> for Halt {
    fn from(error: AppError) -> Self {
        Halt::Fault(error)
    }
}

impl From<RepositoryError> for Halt {
    fn from(error: RepositoryError) -> Self {
        Halt::Fault(error.into())
    }
}

impl From<tower_sessions::session::Error> for Halt {
    fn from(error: tower_sessions::session::Error) -> Self {
        Halt::Fault(error.into())
    }
}

pub fn listing_path(id: ListingId) -> String {
    format!("/listings/{id}")
}

/// require_listing_owner
///
/// Ownership Gate. Passes the loaded listing through when `user` owns it.
///
/// - missing listing: `Listing not found!`, redirect to `/listings`
/// - foreign owner: `You don't have permission to edit this listing.`, redirect to the listing
pub async fn require_listing_owner(
    repo: &RepositoryState,
    ctx: &SessionContext,
    user: &AuthUser,
    listing_id: ListingId,
) -> Result<Listing, Halt> {
    let Some(listing) = repo.get_listing(listing_id).await? else {
        tracing::debug!(%listing_id, "ownership gate: listing not found");
        ctx.flash_error(LISTING_NOT_FOUND).await?;
        return Err(Halt::to("/listings"));
    };

    if listing.owner != user.id {
        tracing::info!(%listing_id, user_id = %user.id, "ownership gate: not the owner");
        ctx.flash_error(NOT_LISTING_OWNER).await?;
        return Err(Halt::to(&listing_path(listing_id)));
    }

    Ok(listing)
}

/// require_review_author
///
/// Authorship Gate. Passes the loaded review through when `user` wrote it; every rejection
/// lands on the parent listing.
///
/// A missing review (or one attached to a different listing) is turned away with
/// `Review not found!` instead of faulting the request.
pub async fn require_review_author(
    repo: &RepositoryState,
    ctx: &SessionContext,
    user: &AuthUser,
    listing_id: ListingId,
    review_id: ReviewId,
) -> Result<Review, Halt> {
    let review = repo
        .get_review(review_id)
        .await?
        .filter(|review| review.listing_id == listing_id);

    let Some(review) = review else {
        tracing::debug!(%listing_id, %review_id, "authorship gate: review not found");
        ctx.flash_error(REVIEW_NOT_FOUND).await?;
        return Err(Halt::to(&listing_path(listing_id)));
    };

    if review.author != user.id {
        tracing::info!(%review_id, user_id = %user.id, "authorship gate: not the author");
        ctx.flash_error(NOT_REVIEW_AUTHOR).await?;
        return Err(Halt::to(&listing_path(listing_id)));
    }

    Ok(review)
}
