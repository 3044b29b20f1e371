//! Request dispatch: match, resolve, delay, write, record.

use super::outcome::Outcome;
use super::writer::{build_response, json_body};
use crate::config::{Config, StatusCodes};
use crate::engine::Engines;
use crate::history::{self, Entry, MockType, Request};
use crate::mock::{Mock, ResponseKind};
use crate::redirect::Redirector;
use crate::store::{Consumption, MockStore, Reservation};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::Response;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Everything a request needs to be answered.
pub struct Dispatcher {
    store: Arc<dyn MockStore>,
    engines: Engines,
    redirector: Redirector,
    codes: StatusCodes,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn MockStore>,
        engines: Engines,
        redirector: Redirector,
        codes: StatusCodes,
    ) -> Self {
        Self {
            store,
            engines,
            redirector,
            codes,
        }
    }

    pub fn from_config(config: &Config, store: Arc<dyn MockStore>) -> Self {
        Self::new(
            store,
            Engines::new(&config.scripting),
            Redirector::new(&config.proxy),
            config.status_codes,
        )
    }

    pub fn store(&self) -> &Arc<dyn MockStore> {
        &self.store
    }

    pub fn status_codes(&self) -> &StatusCodes {
        &self.codes
    }

    /// Find the first matching mock with budget left and produce its response.
    ///
    /// The returned reservation keeps the call counted and must be committed
    /// once the response is written; it is only present for served outcomes.
    pub async fn resolve(
        &self,
        session_id: &str,
        request: &Arc<Request>,
    ) -> (Outcome, Option<Reservation>) {
        let mocks = match self.store.get_mocks(session_id) {
            Ok(mocks) => mocks,
            Err(e) => return (Outcome::Internal(e.to_string()), None),
        };

        let mut exceeded = Vec::new();
        for mock in mocks {
            if !mock.matches(request) {
                trace!(mock_id = mock.id(), "Skipping mock");
                continue;
            }
            match self.store.try_consume(session_id, mock.id()) {
                Ok(Consumption::Granted(times_count)) => {
                    debug!(mock_id = mock.id(), times_count, "Matching mock");
                    let reservation = Reservation::new(self.store.clone(), session_id, mock.id());
                    let outcome = self.respond(&mock, request).await;
                    let reservation =
                        matches!(outcome, Outcome::Served { .. }).then_some(reservation);
                    return (outcome, reservation);
                }
                Ok(Consumption::Exhausted(current)) => {
                    trace!(mock_id = mock.id(), "Times exceeded, skipping mock");
                    exceeded.push(current);
                }
                Err(e) => debug!(mock_id = mock.id(), "Mock removed while matching: {}", e),
            }
        }

        if exceeded.is_empty() {
            return (Outcome::NotFound, None);
        }
        for mock in &mut exceeded {
            match self.store.increment_times_count(session_id, mock.id()) {
                Ok(times_count) => mock.state.times_count = times_count,
                Err(e) => debug!(mock_id = mock.id(), "Failed to count exceeded call: {}", e),
            }
        }
        (Outcome::Exceeded(exceeded), None)
    }

    async fn respond(&self, mock: &Mock, request: &Arc<Request>) -> Outcome {
        let mock_id = mock.id().to_string();
        match &mock.response {
            ResponseKind::Static(response) => Outcome::Served {
                mock_id,
                mock_type: MockType::Static,
                response: response.clone(),
            },
            ResponseKind::Dynamic(dynamic) => {
                match self
                    .engines
                    .execute(dynamic.engine, request.clone(), dynamic.script.clone())
                    .await
                {
                    Ok(response) => Outcome::Served {
                        mock_id,
                        mock_type: MockType::Dynamic,
                        response,
                    },
                    Err(error) => {
                        warn!(%mock_id, engine = %dynamic.engine, "Dynamic response failed: {}", error);
                        Outcome::EngineFailed { mock_id, error }
                    }
                }
            }
            ResponseKind::Proxy(proxy) => match self.redirector.redirect(proxy, request).await {
                Ok(response) => Outcome::Served {
                    mock_id,
                    mock_type: MockType::Proxy,
                    response,
                },
                Err(error) => {
                    warn!(%mock_id, host = %proxy.host, "Redirection failed: {}", error);
                    Outcome::ProxyFailed { mock_id, error }
                }
            },
        }
    }
}

/// Handle one request on the mock listener
pub async fn handle_request(
    req: hyper::Request<Incoming>,
    dispatcher: Arc<Dispatcher>,
    remote: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();
    let (parts, body) = req.into_parts();
    let (body, read_error) = match body.collect().await {
        Ok(collected) => (collected.to_bytes(), None),
        Err(e) => (Bytes::new(), Some(e)),
    };
    let request = Arc::new(Request::from_parts(&parts, &body, remote));
    debug!(method = %request.method, path = %request.path, "Received request");

    let session_id = dispatcher.store.last_session_id();
    let (outcome, reservation) = match read_error {
        Some(e) => (
            Outcome::Internal(format!("failed to read request body: {e}")),
            None,
        ),
        None => dispatcher.resolve(&session_id, &request).await,
    };

    // A served call counts from here on, even if the client goes away during the delay.
    if let Some(reservation) = reservation {
        reservation.commit();
    }

    let mut context = outcome.context();
    let (headers, body) = match &outcome {
        Outcome::Served { response, .. } => {
            let delay = response.delay.pick();
            if !delay.is_zero() {
                context.delay = Some(humantime::format_duration(delay).to_string());
                tokio::time::sleep(delay).await;
            }
            (response.headers.clone(), Bytes::from(response.body.clone()))
        }
        other => {
            let payload = other.payload(&request).unwrap_or_default();
            json_body(&payload)
        }
    };

    let (response, written) =
        build_response(outcome.status(&dispatcher.codes), &headers, body.clone());
    // Recorded as written: an invalid declared status goes out as 500.
    let status = response.status().as_u16();

    let entry = Entry {
        context,
        request: Request::clone(&request),
        response: history::Response::new(status, written, &body),
    };
    if let Err(e) = dispatcher.store.add_history_entry(&session_id, entry) {
        debug!(session_id = %session_id, "Failed to record history entry: {}", e);
    }

    let latency_ms = started.elapsed().as_millis() as u64;
    let (method, path, origin) = (&request.method, &request.path, &request.origin);
    match status {
        s if s < 400 => info!(%method, %path, status, %origin, latency_ms, "Handled request"),
        s if s < 500 => warn!(%method, %path, status, %origin, latency_ms, "Handled request"),
        _ => error!(%method, %path, status, %origin, latency_ms, "Handled request"),
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::AssertionRegistry;
    use crate::mock::MockDefinition;
    use crate::store::InMemoryStore;

    fn dispatcher() -> Dispatcher {
        Dispatcher::from_config(&Config::default(), Arc::new(InMemoryStore::default()))
    }

    fn add(dispatcher: &Dispatcher, yaml: &str) -> Mock {
        let mock = serde_yaml::from_str::<MockDefinition>(yaml)
            .unwrap()
            .validate(&AssertionRegistry::standard())
            .unwrap();
        let session = dispatcher.store().last_session_id();
        dispatcher.store().add_mock(&session, mock).unwrap()
    }

    fn get(path: &str) -> Arc<Request> {
        Arc::new(Request {
            path: path.into(),
            method: "GET".into(),
            ..Request::default()
        })
    }

    #[tokio::test]
    async fn test_static_match_counts_once_committed() {
        let d = dispatcher();
        let mock = add(&d, "request: {path: /a}\nresponse: {status: 201, body: ok}");
        let session = d.store().last_session_id();

        let (outcome, reservation) = d.resolve(&session, &get("/a")).await;
        assert!(matches!(outcome, Outcome::Served { mock_type: MockType::Static, .. }));
        reservation.unwrap().commit();
        let stored = d.store().get_mock_by_id(&session, mock.id()).unwrap();
        assert_eq!(stored.state.times_count, 1);

        let (outcome, reservation) = d.resolve(&session, &get("/b")).await;
        assert!(matches!(outcome, Outcome::NotFound));
        assert!(reservation.is_none());
    }

    #[tokio::test]
    async fn test_dropped_reservation_is_released() {
        let d = dispatcher();
        let mock = add(&d, "request: {path: /a}\nresponse: {}\ncontext: {times: 1}");
        let session = d.store().last_session_id();

        let (_, reservation) = d.resolve(&session, &get("/a")).await;
        drop(reservation);
        let stored = d.store().get_mock_by_id(&session, mock.id()).unwrap();
        assert_eq!(stored.state.times_count, 0);
    }

    #[tokio::test]
    async fn test_exceeded_falls_through_to_older_mock() {
        let d = dispatcher();
        let older = add(&d, "request: {path: /a}\nresponse: {status: 202}");
        let newer = add(&d, "request: {path: /a}\nresponse: {status: 201}\ncontext: {times: 1}");
        let session = d.store().last_session_id();

        let (outcome, reservation) = d.resolve(&session, &get("/a")).await;
        reservation.unwrap().commit();
        assert!(matches!(&outcome, Outcome::Served { mock_id, .. } if mock_id == newer.id()));

        let (outcome, reservation) = d.resolve(&session, &get("/a")).await;
        reservation.unwrap().commit();
        assert!(matches!(&outcome, Outcome::Served { mock_id, .. } if mock_id == older.id()));

        // The exhausted mock is not counted when another mock serves.
        let stored = d.store().get_mock_by_id(&session, newer.id()).unwrap();
        assert_eq!(stored.state.times_count, 1);
    }

    #[tokio::test]
    async fn test_exceeded_outcome_counts_nearest() {
        let d = dispatcher();
        let mock = add(&d, "request: {path: /a}\nresponse: {}\ncontext: {times: 1}");
        let session = d.store().last_session_id();

        let (_, reservation) = d.resolve(&session, &get("/a")).await;
        reservation.unwrap().commit();

        let (outcome, reservation) = d.resolve(&session, &get("/a")).await;
        assert!(reservation.is_none());
        match outcome {
            Outcome::Exceeded(nearest) => {
                assert_eq!(nearest.len(), 1);
                assert_eq!(nearest[0].id(), mock.id());
                assert_eq!(nearest[0].state.times_count, 2);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_engine_failure_releases_call() {
        let d = dispatcher();
        let mock = add(
            &d,
            "request: {path: /a}\ndynamic_response: {engine: template_json, script: 'not json'}",
        );
        let session = d.store().last_session_id();

        let (outcome, reservation) = d.resolve(&session, &get("/a")).await;
        assert!(matches!(outcome, Outcome::EngineFailed { .. }));
        assert!(reservation.is_none());
        let stored = d.store().get_mock_by_id(&session, mock.id()).unwrap();
        assert_eq!(stored.state.times_count, 0);
    }
}
