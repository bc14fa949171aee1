//! CORS for the private routes.

use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::CorsLayer;

use crate::config::MiddlewareConfig;

/// Build the CORS layer, or `None` when CORS is switched off.
///
/// Entries that do not parse are skipped with a warning; validation rejects
/// them before a configuration is ever used, so this only matters for
/// embedders that bypass it.
pub fn cors_layer(config: &MiddlewareConfig) -> Option<CorsLayer> {
    if !config.cors {
        return None;
    }

    let origins: Vec<HeaderValue> = parse_all(&config.cors_origins, "origin", |s| {
        HeaderValue::from_str(s).map_err(|e| e.to_string())
    });
    let methods: Vec<Method> = parse_all(&config.cors_methods, "method", |s| {
        Method::from_bytes(s.as_bytes()).map_err(|e| e.to_string())
    });
    let headers: Vec<HeaderName> = parse_all(&config.cors_headers, "header", |s| {
        HeaderName::from_bytes(s.as_bytes()).map_err(|e| e.to_string())
    });

    Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(headers),
    )
}

fn parse_all<T>(
    values: &[String],
    kind: &'static str,
    parse: impl Fn(&str) -> Result<T, String>,
) -> Vec<T> {
    values
        .iter()
        .filter_map(|value| match parse(value) {
            Ok(parsed) => Some(parsed),
            Err(error) => {
                tracing::warn!(kind, value = %value, %error, "Ignoring invalid CORS entry");
                None
            }
        })
        .collect()
}
