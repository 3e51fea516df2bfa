use thiserror::Error;

/// Errors returned by the Airtable record-store client.
#[derive(Debug, Error)]
pub enum AirtableError {
    /// Network or TLS failure, or a non-2xx HTTP status from the store.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A request URL could not be built (bad base URL or table path).
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The response body could not be deserialized into the expected shape.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}
