use derive_more::Display;
use serde::Deserialize;

use crate::error::FieldError;

pub const FALLBACK_TOAST: &str = "Something went wrong";

#[derive(Debug, Display)]
pub enum ClientError {
    #[display(fmt = "request failed: {}", _0)]
    Http(reqwest::Error),
    #[display(fmt = "{} ({})", message, status)]
    Api {
        status: u16,
        message: String,
        errors: Vec<FieldError>,
    },
    #[display(fmt = "failed to decode response: {}", _0)]
    Decode(String),
    #[display(fmt = "invalid url: {}", _0)]
    InvalidUrl(url::ParseError),
}

impl std::error::Error for ClientError {}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Http(err)
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    errors: Vec<FieldError>,
}

impl ClientError {
    /// Builds the error for a non-success response from its status and body.
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        match serde_json::from_slice::<ErrorBody>(body) {
            Ok(body) => ClientError::Api {
                status,
                message: body.message,
                errors: body.errors,
            },
            Err(_) => ClientError::Api {
                status,
                message: String::new(),
                errors: Vec::new(),
            },
        }
    }

    /// Text for the user-facing notification.
    ///
    /// Field errors are joined into one line; anything without a server message
    /// falls back to a generic one.
    pub fn toast_message(&self) -> String {
        match self {
            ClientError::Api { errors, .. } if !errors.is_empty() => errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            ClientError::Api { message, .. } if !message.trim().is_empty() => message.clone(),
            _ => FALLBACK_TOAST.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_message_becomes_toast() {
        let err = ClientError::from_response(409, br#"{"message":"Leave request not found or already processed"}"#);
        assert_eq!(err.status(), Some(409));
        assert_eq!(err.toast_message(), "Leave request not found or already processed");
    }

    #[test]
    fn validation_errors_are_joined() {
        let err = ClientError::from_response(
            400,
            br#"{"message":"Validation failed","errors":[
                {"field":"end_date","message":"end date must not be before start date"},
                {"field":"reason","message":"reason is required"}
            ]}"#,
        );
        assert_eq!(
            err.toast_message(),
            "end date must not be before start date, reason is required"
        );
    }

    #[test]
    fn unreadable_body_falls_back() {
        let err = ClientError::from_response(502, b"<html>Bad Gateway</html>");
        assert_eq!(err.toast_message(), FALLBACK_TOAST);
        assert_eq!(ClientError::Decode("eof".into()).toast_message(), FALLBACK_TOAST);
    }
}
