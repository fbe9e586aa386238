use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    components(
        schemas(axum_helpers::ErrorResponse)
    ),
    info(
        title = "Linked Events API",
        version = "1.0.0",
        description = "JSON-LD API for events, places, keywords and languages"
    ),
    nest(
        (path = "/v1", api = domain_linked_events::ApiDoc)
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_versioned() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/v1/event/"));
        assert!(doc.paths.paths.contains_key("/v1/event/{id}/"));
        assert!(doc.paths.paths.contains_key("/v1/search/"));
    }
}
