use std::borrow::Cow;

use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

use crate::{
    error::{AppError, AppResult},
    models::{ImageRef, ListingFields, ListingPayload, ReviewFields, ReviewPayload},
};

// Declaration order of the payload fields; violations are reported in this order.
const LISTING_FIELD_ORDER: &[&str] = &[
    "title",
    "description",
    "image",
    "image.url",
    "image.filename",
    "price",
    "country",
    "location",
];
const REVIEW_FIELD_ORDER: &[&str] = &["rating", "comment"];

/// Image extensions accepted for listing photos.
pub const ALLOWED_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// validate_listing
///
/// Validation Gate for listing submissions. Checks every field, and on failure returns a single
/// `AppError::Validation` whose message joins all violations with `", "`. On success the
/// payload is converted into typed `ListingFields`, so callers never handle raw text again.
pub fn validate_listing(payload: &ListingPayload) -> AppResult<ListingFields> {
    validate_listing_upload(payload, None)
}

/// validate_listing_upload
///
/// `validate_listing` for a form that may carry a photo. A file name outside the accepted
/// image types is reported together with the field violations, in the `image` position.
pub fn validate_listing_upload(
    payload: &ListingPayload,
    photo_name: Option<&str>,
) -> AppResult<ListingFields> {
    let mut violations = match payload.validate() {
        Ok(()) => Vec::new(),
        Err(errors) => collect_violations(&errors, "listing"),
    };
    if let Some(Err(error)) = photo_name.map(image_extension) {
        violations.push(("image".to_string(), error.to_string()));
    }
    if !violations.is_empty() {
        return Err(rejection(violations, LISTING_FIELD_ORDER));
    }

    listing_fields(payload)
        .ok_or_else(|| AppError::Validation("\"listing\" is incomplete".to_string()))
}

/// validate_review
///
/// Validation Gate for review submissions. Same contract as `validate_listing`.
pub fn validate_review(payload: &ReviewPayload) -> AppResult<ReviewFields> {
    payload.validate().map_err(|errors| {
        rejection(collect_violations(&errors, "review"), REVIEW_FIELD_ORDER)
    })?;

    let rating = payload.rating.as_deref().and_then(parse_rating);
    match (rating, &payload.comment) {
        (Some(rating), Some(comment)) => Ok(ReviewFields {
            rating,
            comment: comment.clone(),
        }),
        _ => Err(AppError::Validation("\"review\" is incomplete".to_string())),
    }
}

/// image_extension
///
/// Returns the lower-cased extension of an uploaded file name if it is an accepted image type.
pub fn image_extension(filename: &str) -> AppResult<String> {
    std::path::Path::new(filename)
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .map(str::to_ascii_lowercase)
        .filter(|ext| ALLOWED_IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .ok_or_else(|| {
            AppError::Validation(format!(
                "\"image\" must be one of [{}]",
                ALLOWED_IMAGE_EXTENSIONS.join(", ")
            ))
        })
}

// --- Custom field checks (called by the `validator` derive) ---

pub fn check_price(value: &str) -> Result<(), ValidationError> {
    let price = parse_number(value)
        .ok_or_else(|| violation("number", "\"listing.price\" must be a number"))?;
    if price < 0.0 {
        return Err(violation(
            "range",
            "\"listing.price\" must be greater than or equal to 0",
        ));
    }
    Ok(())
}

pub fn check_rating(value: &str) -> Result<(), ValidationError> {
    let rating = parse_number(value)
        .ok_or_else(|| violation("number", "\"review.rating\" must be a number"))?;
    if rating.fract() != 0.0 {
        return Err(violation("integer", "\"review.rating\" must be an integer"));
    }
    if rating < 1.0 {
        return Err(violation(
            "range",
            "\"review.rating\" must be greater than or equal to 1",
        ));
    }
    if rating > 5.0 {
        return Err(violation(
            "range",
            "\"review.rating\" must be less than or equal to 5",
        ));
    }
    Ok(())
}

// --- Internals ---

fn violation(code: &'static str, message: &'static str) -> ValidationError {
    ValidationError::new(code).with_message(Cow::Borrowed(message))
}

fn parse_number(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite())
}

fn parse_rating(value: &str) -> Option<i32> {
    parse_number(value)
        .filter(|rating| rating.fract() == 0.0 && (1.0..=5.0).contains(rating))
        .map(|rating| rating as i32)
}

fn listing_fields(payload: &ListingPayload) -> Option<ListingFields> {
    let image = payload.image.as_ref()?;
    Some(ListingFields {
        title: payload.title.clone()?,
        description: payload.description.clone()?,
        image: ImageRef {
            url: image.url.clone()?,
            filename: image.filename.clone(),
        },
        price: payload.price.as_deref().and_then(parse_number)?,
        country: payload.country.clone()?,
        location: payload.location.clone()?,
    })
}

fn collect_violations(errors: &ValidationErrors, scope: &str) -> Vec<(String, String)> {
    let mut violations = Vec::new();
    collect(errors, "", scope, &mut violations);
    violations
}

/// rejection
///
/// Orders `(path, message)` violations by field declaration and joins the messages into one
/// client error.
fn rejection(mut violations: Vec<(String, String)>, order: &[&str]) -> AppError {
    violations.sort_by_key(|(path, _)| {
        order
            .iter()
            .position(|field| field == path)
            .unwrap_or(order.len())
    });

    let message = violations
        .into_iter()
        .map(|(_, message)| message)
        .collect::<Vec<_>>()
        .join(", ");
    AppError::Validation(message)
}

fn collect(
    errors: &ValidationErrors,
    prefix: &str,
    scope: &str,
    out: &mut Vec<(String, String)>,
) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for error in field_errors {
                    let message = error
                        .message
                        .as_ref()
                        .map(|message| message.to_string())
                        .unwrap_or_else(|| format!("\"{scope}.{path}\" is invalid"));
                    out.push((path.clone(), message));
                }
            }
            ValidationErrorsKind::Struct(inner) => collect(inner, &path, scope, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    collect(inner, &format!("{path}.{index}"), scope, out);
                }
            }
        }
    }
}
