use axum::{
    Router,
    extract::{FromRef, Query, Request},
    http::{HeaderName, Method},
    middleware::{self, Next},
    response::Response,
};
use serde::Deserialize;
use tower::{ServiceBuilder, util::MapRequest};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tower_sessions::{SessionManagerLayer, SessionStore};
use tracing::{Level, Span};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod gates;
pub mod geocoding;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod session;
pub mod storage;
pub mod validation;

// Routing split by the first gate (public vs. identity-gated).
pub mod routes;
use auth::AuthUser;
use routes::{authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use geocoding::{GeocoderState, MapboxGeocoder, MockGeocoder};
pub use repository::{PostgresRepository, RepositoryState};
pub use storage::{MockStorageService, S3StorageClient, StorageState};

/// ApiDoc
///
/// Aggregates every `#[utoipa::path]` handler and the shared schemas into the OpenAPI document
/// served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::list_listings, handlers::new_listing_form, handlers::show_listing,
        handlers::create_listing, handlers::edit_listing_form, handlers::update_listing,
        handlers::delete_listing, handlers::create_review, handlers::delete_review,
        handlers::signup_form, handlers::signup, handlers::login_form, handlers::login,
        handlers::logout, handlers::health
    ),
    components(
        schemas(
            models::User, models::Listing, models::Review, models::ImageRef, models::Geometry,
            models::ListingDetails, models::ReviewDetails, models::ListingPayload,
            models::ImagePayload, models::ReviewPayload, models::Credentials, models::Notices,
            models::LoginPage, handlers::ReviewForm,
        )
    ),
    tags(
        (name = "wanderlust", description = "Wanderlust listings marketplace")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// The single container of shared services handed to every handler. Cheap to clone: every
/// service sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Entity store (Postgres in production).
    pub repo: RepositoryState,
    /// Object storage for listing photos.
    pub storage: StorageState,
    /// Forward geocoding of listing locations.
    pub geocoder: GeocoderState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for GeocoderState {
    fn from_ref(app_state: &AppState) -> GeocoderState {
        app_state.geocoder.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// require_login
///
/// Identity Gate for the whole authenticated router. Extracting `AuthUser` is the check: a
/// request without a principal is turned into a redirect to `/login` before routing reaches
/// the handler.
async fn require_login(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the routes, the Identity Gate, the session layer and the observability stack.
/// The session layer is passed in so production can back it with Postgres and tests with
/// memory.
pub fn create_router<Store>(state: AppState, sessions: SessionManagerLayer<Store>) -> Router
where
    Store: SessionStore + Clone,
{
    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                require_login,
            )),
        )
        .with_state(state);

    base_router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(trace_span_logger)
                    .on_response(
                        DefaultOnResponse::new()
                            .level(Level::INFO)
                            .latency_unit(tower_http::LatencyUnit::Millis),
                    ),
            )
            .layer(PropagateRequestIdLayer::new(x_request_id))
            .layer(sessions),
    )
}

/// App
///
/// The router behind the method-override rewrite. This is the service the server runs.
pub type App = MapRequest<Router, fn(Request) -> Request>;

/// create_app
///
/// Wraps the router so `_method` overrides are applied before routing; a middleware inside
/// the router would run after the route has already been matched.
pub fn create_app(router: Router) -> App {
    MapRequest::new(router, method_override as fn(Request) -> Request)
}

#[derive(Deserialize)]
struct MethodOverride {
    #[serde(rename = "_method")]
    method: Option<String>,
}

/// method_override
///
/// Lets HTML forms reach PUT/PATCH/DELETE routes: a POST carrying `?_method=<verb>` is
/// re-issued with that verb. Any other request passes through untouched.
pub fn method_override(mut request: Request) -> Request {
    if request.method() != Method::POST {
        return request;
    }
    let Ok(Query(MethodOverride {
        method: Some(method),
    })) = Query::<MethodOverride>::try_from_uri(request.uri())
    else {
        return request;
    };

    let verb = match method.to_ascii_uppercase().as_str() {
        "PUT" => Method::PUT,
        "PATCH" => Method::PATCH,
        "DELETE" => Method::DELETE,
        _ => return request,
    };
    tracing::debug!(uri = %request.uri(), %verb, "method override");
    *request.method_mut() = verb;
    request
}

/// trace_span_logger
///
/// Builds the per-request span: method, URI and the `x-request-id` set by `SetRequestIdLayer`,
/// so every log line for one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
