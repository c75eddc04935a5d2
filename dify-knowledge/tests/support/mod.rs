//! An in-process Dify server speaking through the `Transport` seam.
#![allow(dead_code)]

use async_trait::async_trait;
use dify_knowledge::{
    cache::{CacheStore, MemoryCache},
    client::{Client, Config, ConsoleConfig},
    error::Result,
    http::{HttpRequest, HttpResponse, PartContent, RequestBody, StatusCode, Transport},
};
use serde_json::{json, Value as JsonValue};
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

pub const BASE_URL: &str = "http://dify.test";
pub const API_KEY: &str = "dataset-test-key";
pub const EMAIL: &str = "admin@example.com";
pub const PASSWORD: &str = "correct-horse";

/// A request as the fake server saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub bearer: Option<String>,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

#[derive(Default)]
struct State {
    requests: Vec<Recorded>,
    access_tokens: HashSet<String>,
    refresh_tokens: HashSet<String>,
    logins: usize,
    refreshes: usize,
    next_id: usize,
    datasets: Vec<JsonValue>,
    documents: HashMap<String, Vec<JsonValue>>,
    segments: HashMap<String, Vec<JsonValue>>,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn issue_tokens(&mut self) -> JsonValue {
        let access = self.next_id("access");
        let refresh = self.next_id("refresh");
        self.access_tokens.insert(access.clone());
        self.refresh_tokens.insert(refresh.clone());
        json!({
            "result": "success",
            "data": { "access_token": access, "refresh_token": refresh }
        })
    }

    fn dataset_exists(&self, id: &str) -> bool {
        self.datasets.iter().any(|d| d["id"] == id)
    }
}

pub struct FakeDify {
    state: Mutex<State>,
}

fn respond(status: u16, body: JsonValue) -> HttpResponse {
    HttpResponse::new(StatusCode::from_u16(status).unwrap(), body.to_string())
}

fn error(status: u16, code: &str, message: &str) -> HttpResponse {
    respond(
        status,
        json!({ "code": code, "message": message, "status": status }),
    )
}

fn unauthorized() -> HttpResponse {
    error(401, "unauthorized", "Access token is invalid")
}

fn json_body(body: &RequestBody) -> JsonValue {
    match body {
        RequestBody::Json(value) => value.clone(),
        _ => JsonValue::Null,
    }
}

fn query_value<'a>(query: &'a [(String, String)], name: &str) -> Option<&'a str> {
    query
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

impl FakeDify {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::default()),
        })
    }

    /// Every issued access token stops being accepted.
    pub fn expire_access_tokens(&self) {
        self.state.lock().unwrap().access_tokens.clear();
    }

    /// Every issued refresh token stops being accepted.
    pub fn revoke_refresh_tokens(&self) {
        self.state.lock().unwrap().refresh_tokens.clear();
    }

    pub fn seed_datasets(&self, count: usize) {
        let mut state = self.state.lock().unwrap();
        for i in 0..count {
            let id = state.next_id("ds");
            state
                .datasets
                .push(json!({ "id": id, "name": format!("dataset {}", i) }));
        }
    }

    pub fn logins(&self) -> usize {
        self.state.lock().unwrap().logins
    }

    pub fn refreshes(&self) -> usize {
        self.state.lock().unwrap().refreshes
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Requests other than login and refresh.
    pub fn resource_requests(&self) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| !r.path.ends_with("/login") && !r.path.ends_with("/oauth/token/refresh"))
            .collect()
    }

    fn handle(&self, request: HttpRequest) -> HttpResponse {
        let path = request
            .url
            .strip_prefix(BASE_URL)
            .unwrap_or(&request.url)
            .to_string();
        let recorded = Recorded {
            method: request.method.as_str().to_string(),
            path: path.clone(),
            bearer: request.bearer_token().map(str::to_string),
            query: request.query.clone(),
            body: request.body.clone(),
        };
        let mut state = self.state.lock().unwrap();
        state.requests.push(recorded.clone());

        if let Some(rest) = path.strip_prefix("/console/api") {
            match rest {
                "/login" => return Self::login(&mut state, &recorded),
                "/oauth/token/refresh" => return Self::refresh(&mut state, &recorded),
                _ => {}
            }
            let authorized = recorded
                .bearer
                .as_ref()
                .map_or(false, |t| state.access_tokens.contains(t));
            if !authorized {
                return unauthorized();
            }
            Self::route(&mut state, &recorded, rest)
        } else if let Some(rest) = path.strip_prefix("/v1") {
            if recorded.bearer.as_deref() != Some(API_KEY) {
                return unauthorized();
            }
            Self::route(&mut state, &recorded, rest)
        } else {
            error(404, "not_found", "404 NOT FOUND")
        }
    }

    fn login(state: &mut State, req: &Recorded) -> HttpResponse {
        let body = json_body(&req.body);
        if req.bearer.is_some() {
            return error(400, "bad_request", "login must not carry a bearer token");
        }
        if body["email"] == EMAIL && body["password"] == PASSWORD && body["remember_me"] == false
        {
            state.logins += 1;
            respond(200, state.issue_tokens())
        } else {
            error(401, "unauthorized", "Invalid email or password.")
        }
    }

    fn refresh(state: &mut State, req: &Recorded) -> HttpResponse {
        let body = json_body(&req.body);
        let token = body["refresh_token"].as_str().unwrap_or_default().to_string();
        if req.bearer.is_some() || !state.refresh_tokens.remove(&token) {
            return error(401, "unauthorized", "Invalid refresh token");
        }
        state.refreshes += 1;
        respond(200, state.issue_tokens())
    }

    fn route(state: &mut State, req: &Recorded, path: &str) -> HttpResponse {
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        let body = json_body(&req.body);
        match (req.method.as_str(), segments.as_slice()) {
            ("GET", ["datasets"]) => {
                let page: usize = query_value(&req.query, "page")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1);
                let limit: usize = query_value(&req.query, "limit")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(20);
                let total = state.datasets.len();
                let data: Vec<JsonValue> = state
                    .datasets
                    .iter()
                    .skip((page - 1) * limit)
                    .take(limit)
                    .cloned()
                    .collect();
                respond(
                    200,
                    json!({
                        "data": data,
                        "has_more": page * limit < total,
                        "limit": limit,
                        "total": total,
                        "page": page,
                    }),
                )
            }
            ("POST", ["datasets"]) => {
                let name = body["name"].as_str().unwrap_or_default();
                if state.datasets.iter().any(|d| d["name"] == name) {
                    return error(409, "dataset_name_duplicate", "The dataset name already exists.");
                }
                let id = state.next_id("ds");
                let dataset = json!({
                    "id": id,
                    "name": name,
                    "description": body.get("description"),
                    "permission": body["permission"],
                    "indexing_technique": body["indexing_technique"],
                    "provider": body["provider"],
                    "document_count": 0,
                });
                state.datasets.push(dataset.clone());
                respond(200, dataset)
            }
            ("GET", ["datasets", id]) => match state.datasets.iter().find(|d| d["id"] == *id) {
                Some(dataset) => respond(200, dataset.clone()),
                None => error(404, "dataset_not_found", "Dataset not found."),
            },
            ("PATCH", ["datasets", id]) => {
                match state.datasets.iter_mut().find(|d| d["id"] == *id) {
                    Some(dataset) => {
                        if let Some(fields) = body.as_object() {
                            for (k, v) in fields {
                                dataset[k] = v.clone();
                            }
                        }
                        respond(200, dataset.clone())
                    }
                    None => error(404, "dataset_not_found", "Dataset not found."),
                }
            }
            ("DELETE", ["datasets", id]) => {
                let before = state.datasets.len();
                state.datasets.retain(|d| d["id"] != *id);
                if state.datasets.len() == before {
                    error(404, "dataset_not_found", "Dataset not found.")
                } else {
                    HttpResponse::new(StatusCode::NO_CONTENT, "")
                }
            }
            ("POST", ["datasets", id, "retrieve"]) => {
                if !state.dataset_exists(id) {
                    return error(404, "dataset_not_found", "Dataset not found.");
                }
                respond(
                    200,
                    json!({
                        "query": { "content": body["query"] },
                        "records": [{
                            "segment": { "id": "seg-hit", "content": "Dify is an LLM app platform." },
                            "score": 0.87,
                        }],
                    }),
                )
            }
            ("POST", ["datasets", id, "document", kind]) => {
                if !state.dataset_exists(id) {
                    return error(404, "dataset_not_found", "Dataset not found.");
                }
                let name = match *kind {
                    "create-by-text" => body["name"].as_str().unwrap_or_default().to_string(),
                    "create-by-file" => match Self::uploaded_file(&req.body) {
                        Some(name) => name,
                        None => return error(400, "no_file_uploaded", "Please upload your file."),
                    },
                    _ => return error(404, "not_found", "404 NOT FOUND"),
                };
                Self::create_document(state, id, &name)
            }
            ("GET", ["datasets", id, "documents"]) => {
                let docs = state.documents.get(*id).cloned().unwrap_or_default();
                let keyword = query_value(&req.query, "keyword").unwrap_or_default();
                let data: Vec<JsonValue> = docs
                    .into_iter()
                    .filter(|d| d["name"].as_str().unwrap_or_default().contains(keyword))
                    .collect();
                respond(
                    200,
                    json!({ "data": data, "has_more": false, "limit": 20, "total": data.len(), "page": 1 }),
                )
            }
            ("PATCH", ["datasets", _, "documents", "status", action, "batch"]) => {
                let ids: Vec<String> = query_value(&req.query, "document_id")
                    .unwrap_or_default()
                    .split(',')
                    .map(str::to_string)
                    .collect();
                let enabled = *action == "enable";
                for docs in state.documents.values_mut() {
                    for doc in docs.iter_mut() {
                        if ids.iter().any(|id| doc["id"] == id.as_str()) {
                            doc["enabled"] = json!(enabled);
                        }
                    }
                }
                respond(200, json!({ "result": "success" }))
            }
            ("GET", ["datasets", _, "documents", batch, "indexing-status"]) => {
                let data: Vec<JsonValue> = state
                    .documents
                    .values()
                    .flatten()
                    .filter(|d| d["batch"] == *batch)
                    .map(|d| {
                        json!({
                            "id": d["id"],
                            "indexing_status": "completed",
                            "completed_segments": 3,
                            "total_segments": 3,
                        })
                    })
                    .collect();
                respond(200, json!({ "data": data }))
            }
            ("GET", ["datasets", _, "documents", doc_id, "upload-file"]) => respond(
                200,
                json!({
                    "id": format!("file-{}", doc_id),
                    "name": "notes.txt",
                    "size": 11,
                    "extension": "txt",
                    "mime_type": "text/plain",
                }),
            ),
            ("POST", ["datasets", id, "documents", doc_id, kind]) if kind.starts_with("update-by-") => {
                let Some(doc) = state
                    .documents
                    .get_mut(*id)
                    .and_then(|docs| docs.iter_mut().find(|d| d["id"] == *doc_id))
                else {
                    return error(404, "document_not_found", "Document not found.");
                };
                if let Some(name) = body["name"].as_str() {
                    doc["name"] = json!(name);
                }
                let batch = doc["batch"].clone();
                respond(200, json!({ "document": doc.clone(), "batch": batch }))
            }
            ("GET", ["datasets", id, "documents", doc_id]) => {
                match state
                    .documents
                    .get(*id)
                    .and_then(|docs| docs.iter().find(|d| d["id"] == *doc_id))
                {
                    Some(doc) => respond(200, doc.clone()),
                    None => error(404, "document_not_found", "Document not found."),
                }
            }
            ("DELETE", ["datasets", id, "documents", doc_id]) => {
                let docs = state.documents.entry(id.to_string()).or_default();
                let before = docs.len();
                docs.retain(|d| d["id"] != *doc_id);
                if docs.len() == before {
                    error(404, "document_not_found", "Document not found.")
                } else {
                    HttpResponse::new(StatusCode::NO_CONTENT, "")
                }
            }
            ("POST", ["datasets", _, "documents", doc_id, "segments"]) => {
                let mut created = Vec::new();
                for segment in body["segments"].as_array().cloned().unwrap_or_default() {
                    let id = state.next_id("seg");
                    let mut segment = segment;
                    segment["id"] = json!(id);
                    segment["document_id"] = json!(doc_id);
                    segment["enabled"] = json!(true);
                    created.push(segment);
                }
                state
                    .segments
                    .entry(doc_id.to_string())
                    .or_default()
                    .extend(created.clone());
                respond(200, json!({ "data": created, "doc_form": "text_model" }))
            }
            ("GET", ["datasets", _, "documents", doc_id, "segments"]) => {
                let keyword = query_value(&req.query, "keyword").unwrap_or_default();
                let data: Vec<JsonValue> = state
                    .segments
                    .get(*doc_id)
                    .cloned()
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|s| s["content"].as_str().unwrap_or_default().contains(keyword))
                    .collect();
                respond(200, json!({ "data": data, "doc_form": "text_model" }))
            }
            ("POST", ["datasets", _, "documents", doc_id, "segments", seg_id]) => {
                let segment = state
                    .segments
                    .get_mut(*doc_id)
                    .and_then(|segs| segs.iter_mut().find(|s| s["id"] == *seg_id));
                match segment {
                    Some(segment) => {
                        if let Some(fields) = body["segment"].as_object() {
                            for (k, v) in fields {
                                segment[k] = v.clone();
                            }
                        }
                        respond(200, json!({ "data": segment.clone(), "doc_form": "text_model" }))
                    }
                    None => error(404, "segment_not_found", "Segment not found."),
                }
            }
            ("DELETE", ["datasets", _, "documents", doc_id, "segments", seg_id]) => {
                if let Some(segs) = state.segments.get_mut(*doc_id) {
                    segs.retain(|s| s["id"] != *seg_id);
                }
                respond(200, json!({ "result": "success" }))
            }
            _ => error(404, "not_found", "404 NOT FOUND"),
        }
    }

    fn uploaded_file(body: &RequestBody) -> Option<String> {
        let RequestBody::Multipart(parts) = body else {
            return None;
        };
        let has_data = parts.iter().any(|p| {
            p.name == "data"
                && matches!(&p.content, PartContent::Text { value, .. }
                    if serde_json::from_str::<JsonValue>(value).is_ok())
        });
        let file_name = parts.iter().find_map(|p| match &p.content {
            PartContent::File { file_name, .. } if p.name == "file" => Some(file_name.clone()),
            _ => None,
        });
        file_name.filter(|_| has_data)
    }

    fn create_document(state: &mut State, dataset_id: &str, name: &str) -> HttpResponse {
        let id = state.next_id("doc");
        let batch = state.next_id("batch");
        let document = json!({
            "id": id,
            "name": name,
            "indexing_status": "waiting",
            "enabled": true,
            "batch": batch,
        });
        state
            .documents
            .entry(dataset_id.to_string())
            .or_default()
            .push(document.clone());
        respond(200, json!({ "document": document, "batch": batch }))
    }
}

#[async_trait]
impl Transport for FakeDify {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        // Give concurrent callers a chance to interleave.
        tokio::task::yield_now().await;
        Ok(self.handle(request))
    }
}

pub fn public_client(fake: &Arc<FakeDify>) -> Client {
    let config = Config {
        base_url: format!("{}/v1", BASE_URL),
        api_key: API_KEY.into(),
        ..Config::default()
    };
    Client::with_transport(config, fake.clone(), Arc::new(MemoryCache::new()))
}

pub fn console_client(
    fake: &Arc<FakeDify>,
    password: &str,
    cache: Arc<dyn CacheStore>,
) -> Client {
    let config = Config {
        base_url: BASE_URL.into(),
        api_key: API_KEY.into(),
        console: Some(ConsoleConfig::new(EMAIL, password)),
        ..Config::default()
    };
    Client::with_transport(config, fake.clone(), cache)
}
