use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use serde_json::Value;

#[derive(Debug, Clone)]
pub struct StubResponse {
    pub status: u16,
    pub body: String,
    pub retry_after: Option<String>,
}

#[allow(dead_code)]
impl StubResponse {
    pub fn json(value: Value) -> Self {
        Self {
            status: 200,
            body: value.to_string(),
            retry_after: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: format!("{{\"status_code\":{status}}}"),
            retry_after: None,
        }
    }

    pub fn raw(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_owned(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, value: &str) -> Self {
        self.retry_after = Some(value.to_owned());
        self
    }
}

/// Canned catalog: genre list, discover pages (1-based) and per-id records.
///
/// Routes listed in `server_errors` answer 500 instead; discover pages are
/// keyed as `/discover/tv?page=N`, everything else by path below `/3`.
#[allow(dead_code)]
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub genres: Value,
    pub pages: Vec<Value>,
    pub details: HashMap<u64, Value>,
    pub credits: HashMap<u64, Value>,
    pub server_errors: HashSet<String>,
}

type Handler = Box<dyn FnMut(&str, &HashMap<String, String>) -> StubResponse + Send>;

pub struct TmdbStub {
    pub base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

#[allow(dead_code)]
impl TmdbStub {
    /// Serves `catalog` under `/3` like the real API; unknown ids answer 404.
    pub fn catalog(catalog: Catalog) -> Self {
        Self::spawn(Box::new(move |path: &str, query: &HashMap<String, String>| {
            let Some(route) = path.strip_prefix("/3") else {
                return StubResponse::status(404);
            };
            let key = match (route, query.get("page")) {
                ("/discover/tv", Some(page)) => format!("{route}?page={page}"),
                _ => route.to_owned(),
            };
            if catalog.server_errors.contains(&key) {
                return StubResponse::status(500);
            }
            match route {
                "/genre/tv/list" => StubResponse::json(catalog.genres.clone()),
                "/discover/tv" => {
                    let page = query
                        .get("page")
                        .and_then(|page| page.parse::<usize>().ok())
                        .unwrap_or(1);
                    match catalog.pages.get(page.saturating_sub(1)) {
                        Some(body) => StubResponse::json(body.clone()),
                        None => StubResponse::status(404),
                    }
                }
                _ => {
                    let Some(rest) = route.strip_prefix("/tv/") else {
                        return StubResponse::status(404);
                    };
                    let (id, records) = match rest.strip_suffix("/credits") {
                        Some(id) => (id, &catalog.credits),
                        None => (rest, &catalog.details),
                    };
                    match id.parse::<u64>().ok().and_then(|id| records.get(&id)) {
                        Some(body) => StubResponse::json(body.clone()),
                        None => StubResponse::status(404),
                    }
                }
            }
        }))
    }

    /// Answers requests with `responses` in order, then 500 forever.
    pub fn scripted(responses: Vec<StubResponse>) -> Self {
        let mut queue: VecDeque<StubResponse> = responses.into();
        Self::spawn(Box::new(move |_: &str, _: &HashMap<String, String>| {
            queue
                .pop_front()
                .unwrap_or_else(|| StubResponse::status(500))
        }))
    }

    fn spawn(mut handler: Handler) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start tmdb stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}/3");

        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let url = request.url().to_string();
                recorded.lock().expect("lock request log").push(url.clone());

                let parsed = url::Url::parse(&format!("http://stub{url}")).expect("parse request url");
                let query: HashMap<String, String> = parsed
                    .query_pairs()
                    .map(|(key, value)| (key.into_owned(), value.into_owned()))
                    .collect();

                let stub = handler(parsed.path(), &query);
                let mut response =
                    tiny_http::Response::from_string(stub.body).with_status_code(stub.status);
                let header =
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                        .expect("build header");
                response = response.with_header(header);
                if let Some(value) = stub.retry_after {
                    let header =
                        tiny_http::Header::from_bytes(&b"Retry-After"[..], value.as_bytes())
                            .expect("build header");
                    response = response.with_header(header);
                }
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Request targets (path and query) in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("lock request log").clone()
    }

    pub fn count_path(&self, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|target| target.split('?').next() == Some(path))
            .count()
    }
}

impl Drop for TmdbStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
