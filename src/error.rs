use thiserror::Error;

#[derive(Error, Debug)]
pub enum IntuneError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Graph API error (HTTP {status}): {message}")]
    GraphApiError { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Probe failed: {0}")]
    ProbeError(String),

    #[error("{failed} of {total} operations failed")]
    PartialFailure { failed: usize, total: usize },

    #[error("Token not found. Run 'intunectl login' or pass --graph-token")]
    TokenNotFound,

    #[error("Tenant '{0}' not found")]
    TenantNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, IntuneError>;

pub use IntuneError as Error;

impl IntuneError {
    /// Graph status code, when the error came back from Graph
    pub fn status(&self) -> Option<u16> {
        match self {
            IntuneError::GraphApiError { status, .. } => Some(*status),
            IntuneError::HttpError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Parse Graph API error response and provide helpful context
pub fn enhance_graph_error(error_response: &str) -> String {
    if let Ok(error_json) = serde_json::from_str::<serde_json::Value>(error_response) {
        if let Some(error_obj) = error_json.get("error") {
            let code = error_obj
                .get("code")
                .and_then(|c| c.as_str())
                .unwrap_or("Unknown");
            let message = error_obj
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("No message");

            let hint = match code {
                "Unauthorized" | "InvalidAuthenticationToken" => {
                    "\nHint: the bearer token may have expired. Run 'intunectl login' again or refresh --graph-token."
                }
                "Forbidden" | "InsufficientPrivileges" | "Authorization_RequestDenied" => {
                    "\nHint: check that the app registration has the DeviceManagement* permissions with admin consent."
                }
                "BadRequest" => {
                    if message.contains("Resource not found for the segment") {
                        "\nHint: this resource is only exposed on the beta endpoint."
                    } else {
                        "\nHint: the request body may not match the resource schema."
                    }
                }
                "NotFound" | "ResourceNotFound" | "Request_ResourceNotFound" => {
                    "\nHint: the requested object does not exist. Check the ID or display name."
                }
                "TooManyRequests" => "\nHint: Graph throttled the request. Wait and retry.",
                _ => "",
            };

            return format!("{}: {}{}", code, message, hint);
        }
    }

    error_response.to_string()
}
