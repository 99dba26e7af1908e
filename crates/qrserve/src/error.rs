use std::path::PathBuf;

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::handlers::escape_html;

/// Fatal errors from binding or running the listener.
#[derive(Error, Debug)]
pub enum ServeError {
    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors while building the connection banner.
#[derive(Error, Debug)]
pub enum AnnounceError {
    #[error("could not encode {url} as a QR code: {source}")]
    Encode {
        url: String,
        #[source]
        source: qrcode::types::QrError,
    },
}

/// Errors while loading or validating the server configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("root directory does not exist: {0}")]
    RootMissing(PathBuf),

    #[error("root path is not a directory: {0}")]
    RootNotADirectory(PathBuf),
}

/// Per-request failures, turned into HTTP responses.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("File not found")]
    NotFound,

    #[error("Path is outside root directory")]
    PathTraversal,

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RequestError {
    pub fn status(&self) -> StatusCode {
        match self {
            RequestError::NotFound => StatusCode::NOT_FOUND,
            RequestError::PathTraversal => StatusCode::FORBIDDEN,
            RequestError::InvalidPath(_) => StatusCode::BAD_REQUEST,
            RequestError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = escape_html(&self.to_string());

        let body = format!(
            "<!DOCTYPE HTML>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
             <title>Error response</title>\n</head>\n<body>\n<h1>Error response</h1>\n\
             <p>Error code: {}</p>\n<p>Message: {}.</p>\n</body>\n</html>\n",
            status.as_u16(),
            message
        );

        (
            status,
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            body,
        )
            .into_response()
    }
}
