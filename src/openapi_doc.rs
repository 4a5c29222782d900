//! Fetches and validates the upstream OpenAPI document that drives tool
//! compilation.

use openapiv3::OpenAPI;

use crate::error::AirflowMcpError;

/// Fetches `<base_url>/openapi.json` and parses + sanity-checks it.
///
/// Any transport failure or non-2xx response is fatal per §4.6 ("aborts
/// with a fatal `UpstreamUnavailable`"): there is no partially-configured
/// server to fall back to.
pub async fn fetch_document(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
) -> Result<OpenAPI, AirflowMcpError> {
    let url = format!("{}/openapi.json", base_url.trim_end_matches('/'));

    let response = client
        .get(&url)
        .bearer_auth(token)
        .send()
        .await
        .map_err(|e| AirflowMcpError::UpstreamUnavailable(e.to_string()))?;

    if !response.status().is_success() {
        return Err(AirflowMcpError::UpstreamUnavailable(format!(
            "GET {url} returned {}",
            response.status()
        )));
    }

    let body = response
        .text()
        .await
        .map_err(|e| AirflowMcpError::UpstreamUnavailable(e.to_string()))?;

    parse_document(&body)
}

/// Parses and validates a raw OpenAPI JSON document, independent of how it
/// was retrieved (split out so tests don't need a live HTTP round trip).
pub fn parse_document(body: &str) -> Result<OpenAPI, AirflowMcpError> {
    let doc: OpenAPI =
        serde_json::from_str(body).map_err(|e| AirflowMcpError::SpecInvalid(e.to_string()))?;

    if doc.openapi.is_empty() {
        return Err(AirflowMcpError::SpecInvalid(
            "document is missing the 'openapi' version field".to_string(),
        ));
    }
    if doc.info.title.is_empty() {
        return Err(AirflowMcpError::SpecInvalid(
            "document is missing 'info.title'".to_string(),
        ));
    }
    if doc.paths.paths.is_empty() {
        return Err(AirflowMcpError::SpecInvalid(
            "document declares no paths".to_string(),
        ));
    }

    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_document_with_no_paths() {
        let body = r#"{"openapi":"3.0.0","info":{"title":"t","version":"1"},"paths":{}}"#;
        let err = parse_document(body).unwrap_err();
        assert!(matches!(err, AirflowMcpError::SpecInvalid(_)));
    }

    #[test]
    fn accepts_minimal_valid_document() {
        let body = r#"{
            "openapi": "3.0.0",
            "info": {"title": "Airflow API", "version": "1"},
            "paths": {"/dags": {"get": {"operationId": "get_dags", "responses": {"200": {"description": "ok"}}}}}
        }"#;
        let doc = parse_document(body).unwrap();
        assert_eq!(doc.paths.paths.len(), 1);
    }
}
