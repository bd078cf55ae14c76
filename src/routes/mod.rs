/// Router Module Index
///
/// Splits the HTTP surface by its first gate. `authenticated` is wrapped in the Identity Gate as
/// a route layer in `create_router`; `public` carries no gate at all.

/// Browsing, account pages and health. Anonymous clients are welcome.
pub mod public;

/// Every route that mutates listings or reviews, plus the new-listing page.
pub mod authenticated;
