//! Terminal states of the dispatch pipeline.

use crate::config::StatusCodes;
use crate::engine::EngineError;
use crate::history::{Context, MockType, Request};
use crate::mock::{Mock, MockResponse};
use crate::redirect::RedirectError;
use serde::Serialize;
use serde_json::Value;

pub const MESSAGE_NOT_FOUND: &str = "No mock found matching the request";
pub const MESSAGE_EXCEEDED: &str = "Matching mock found but was exceeded";
pub const MESSAGE_ENGINE_ERROR: &str = "Error during template engine execution";
pub const MESSAGE_PROXY_ERROR: &str = "Error during request redirection";
pub const MESSAGE_INTERNAL_ERROR: &str = "Internal server error";

/// How a request ended.
#[derive(Debug)]
pub enum Outcome {
    /// A mock produced a response.
    Served {
        mock_id: String,
        mock_type: MockType,
        response: MockResponse,
    },
    /// No mock matched.
    NotFound,
    /// Mocks matched but all of them were used up; holds them, counters included.
    Exceeded(Vec<Mock>),
    EngineFailed { mock_id: String, error: EngineError },
    ProxyFailed { mock_id: String, error: RedirectError },
    Internal(String),
}

#[derive(Serialize)]
struct Payload<'a> {
    message: String,
    request: &'a Request,
    #[serde(skip_serializing_if = "Option::is_none")]
    nearest: Option<&'a [Mock]>,
}

impl Outcome {
    pub fn status(&self, codes: &StatusCodes) -> u16 {
        match self {
            Outcome::Served { response, .. } => response.effective_status(),
            Outcome::NotFound => codes.not_found,
            Outcome::Exceeded(_) => codes.exceeded,
            Outcome::EngineFailed { .. } => codes.engine_error,
            Outcome::ProxyFailed { .. } => codes.proxy_error,
            Outcome::Internal(_) => codes.internal_error,
        }
    }

    /// History context; the delay is filled in once it has been applied.
    pub fn context(&self) -> Context {
        match self {
            Outcome::Served {
                mock_id, mock_type, ..
            } => Context {
                mock_id: Some(mock_id.clone()),
                mock_type: Some(*mock_type),
                delay: None,
            },
            Outcome::EngineFailed { mock_id, .. } => Context {
                mock_id: Some(mock_id.clone()),
                mock_type: Some(MockType::Dynamic),
                delay: None,
            },
            Outcome::ProxyFailed { mock_id, .. } => Context {
                mock_id: Some(mock_id.clone()),
                mock_type: Some(MockType::Proxy),
                delay: None,
            },
            _ => Context::default(),
        }
    }

    /// JSON payload of a non-served outcome, echoing the request.
    pub fn payload(&self, request: &Request) -> Option<Value> {
        let (message, nearest) = match self {
            Outcome::Served { .. } => return None,
            Outcome::NotFound => (MESSAGE_NOT_FOUND.to_string(), None),
            Outcome::Exceeded(mocks) => (MESSAGE_EXCEEDED.to_string(), Some(mocks.as_slice())),
            Outcome::EngineFailed { error, .. } => {
                (format!("{MESSAGE_ENGINE_ERROR}: {error}"), None)
            }
            Outcome::ProxyFailed { error, .. } => (format!("{MESSAGE_PROXY_ERROR}: {error}"), None),
            Outcome::Internal(error) => (format!("{MESSAGE_INTERNAL_ERROR}: {error}"), None),
        };
        serde_json::to_value(Payload {
            message,
            request,
            nearest,
        })
        .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::AssertionRegistry;
    use crate::mock::MockDefinition;

    fn mock() -> Mock {
        serde_yaml::from_str::<MockDefinition>("request: {path: /a}\nresponse: {status: 204}")
            .unwrap()
            .validate(&AssertionRegistry::standard())
            .unwrap()
    }

    #[test]
    fn test_status_codes() {
        let codes = StatusCodes::default();
        let served = Outcome::Served {
            mock_id: "m".into(),
            mock_type: MockType::Static,
            response: MockResponse::default(),
        };
        assert_eq!(served.status(&codes), 200);
        assert_eq!(Outcome::NotFound.status(&codes), 666);
        assert_eq!(Outcome::Exceeded(vec![]).status(&codes), 667);
        assert_eq!(Outcome::Internal("x".into()).status(&codes), 600);
        let failed = Outcome::EngineFailed {
            mock_id: "m".into(),
            error: EngineError::Script("boom".into()),
        };
        assert_eq!(failed.status(&codes), 601);
        assert_eq!(failed.context().mock_type, Some(MockType::Dynamic));
    }

    #[test]
    fn test_payloads() {
        let request = Request {
            path: "/a".into(),
            method: "GET".into(),
            ..Request::default()
        };

        let payload = Outcome::NotFound.payload(&request).unwrap();
        assert_eq!(payload["message"], MESSAGE_NOT_FOUND);
        assert_eq!(payload["request"]["path"], "/a");
        assert!(payload.get("nearest").is_none());

        let payload = Outcome::Exceeded(vec![mock()]).payload(&request).unwrap();
        assert_eq!(payload["message"], MESSAGE_EXCEEDED);
        assert_eq!(payload["nearest"].as_array().unwrap().len(), 1);

        let payload = Outcome::ProxyFailed {
            mock_id: "m".into(),
            error: RedirectError::TooManyRedirects(10),
        }
        .payload(&request)
        .unwrap();
        assert_eq!(
            payload["message"],
            "Error during request redirection: stopped after 10 redirects"
        );
    }
}
