// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities for mocking Kubernetes API responses.
//!
//! `MockService` answers canned responses first (exact path, then prefix).
//! Requests without a canned response are served from an in-memory object
//! store keyed by API path, so create/get/list/replace/delete round-trip the
//! way they would against a real API server.

use http::{Request, Response};
use http_body_util::BodyExt;
use kube::client::Body;
use kube::Client;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

#[derive(Default)]
struct MockState {
    responses: HashMap<(String, String), (u16, String)>,
    objects: BTreeMap<String, Value>,
    requests: Vec<(String, String)>,
}

/// A mock HTTP service standing in for the Kubernetes API server.
#[derive(Clone)]
pub struct MockService {
    state: Arc<Mutex<MockState>>,
}

impl MockService {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    fn on(self, method: &str, path: &str, status: u16, body: &str) -> Self {
        self.state.lock().unwrap().responses.insert(
            (method.to_string(), path.to_string()),
            (status, body.to_string()),
        );
        self
    }

    /// Add a response for GET requests matching the path
    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.on("GET", path, status, body)
    }

    /// Add a response for POST requests matching the path
    pub fn on_post(self, path: &str, status: u16, body: &str) -> Self {
        self.on("POST", path, status, body)
    }

    /// Add a response for PATCH requests matching the path
    pub fn on_patch(self, path: &str, status: u16, body: &str) -> Self {
        self.on("PATCH", path, status, body)
    }

    /// Add a response for DELETE requests matching the path
    pub fn on_delete(self, path: &str, status: u16, body: &str) -> Self {
        self.on("DELETE", path, status, body)
    }

    /// Seed an object into the collection at `collection`
    pub fn with_object(self, collection: &str, object: Value) -> Self {
        let name = object["metadata"]["name"]
            .as_str()
            .expect("seeded object needs metadata.name")
            .to_string();
        self.state
            .lock()
            .unwrap()
            .objects
            .insert(format!("{}/{}", collection, name), object);
        self
    }

    /// Build a kube Client from this mock service
    pub fn into_client(self) -> Client {
        Client::new(self, "default")
    }

    /// Every request received so far, as (method, path)
    pub fn requests(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Requests with the given method whose path starts with `prefix`
    pub fn requests_matching(&self, method: &str, prefix: &str) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|(m, p)| m == method && p.starts_with(prefix))
            .map(|(_, p)| p)
            .collect()
    }

    /// The stored object at `path`, if any
    pub fn object(&self, path: &str) -> Option<Value> {
        self.state.lock().unwrap().objects.get(path).cloned()
    }

    /// Names of the stored objects directly under `collection`
    pub fn object_names(&self, collection: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        children(&state.objects, collection)
            .map(|(path, _)| path[collection.len() + 1..].to_string())
            .collect()
    }

    fn find_response(&self, method: &str, path: &str) -> Option<(u16, String)> {
        let state = self.state.lock().unwrap();

        // Try exact match first
        if let Some(resp) = state.responses.get(&(method.to_string(), path.to_string())) {
            return Some(resp.clone());
        }

        // Try prefix match for paths like /api/v1/namespaces/foo
        for ((m, p), resp) in state.responses.iter() {
            if m == method && path.starts_with(p) {
                return Some(resp.clone());
            }
        }

        None
    }
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

fn children<'a>(
    objects: &'a BTreeMap<String, Value>,
    collection: &'a str,
) -> impl Iterator<Item = (&'a String, &'a Value)> + 'a {
    let prefix = format!("{}/", collection);
    objects
        .iter()
        .filter(move |(path, _)| path.starts_with(&prefix) && !path[prefix.len()..].contains('/'))
}

/// Objects of a namespaced kind listed without a namespace, e.g.
/// `/apis/{group}/{version}/{plural}` also lists `.../namespaces/*/{plural}/*`
fn across_namespaces<'a>(
    objects: &'a BTreeMap<String, Value>,
    collection: &'a str,
) -> impl Iterator<Item = (&'a String, &'a Value)> + 'a {
    let (base, plural) = collection.rsplit_once('/').unwrap_or_default();
    let prefix = format!("{}/namespaces/", base);
    objects.iter().filter(move |(path, _)| {
        path.strip_prefix(&prefix).is_some_and(|rest| {
            let segments: Vec<&str> = rest.split('/').collect();
            segments.len() == 3 && segments[1] == plural
        })
    })
}

/// Collection paths: /api/v1/namespaces, /api/v1/namespaces/{ns}/{plural},
/// /apis/{group}/{version}/{plural}, /apis/{group}/{version}/namespaces/{ns}/{plural}
fn is_collection(path: &str) -> bool {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match segments.first() {
        Some(&"api") => segments.len() == 3 || segments.len() == 5,
        Some(&"apis") => segments.len() == 4 || segments.len() == 6,
        _ => false,
    }
}

fn label_selector(query: Option<&str>) -> Vec<(String, String)> {
    let Some(query) = query else {
        return vec![];
    };
    url::form_urlencoded::parse(query.as_bytes())
        .filter(|(k, _)| k == "labelSelector")
        .flat_map(|(_, v)| {
            v.split(',')
                .filter_map(|pair| pair.split_once('='))
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<Vec<_>>()
        })
        .collect()
}

fn matches_selector(object: &Value, selector: &[(String, String)]) -> bool {
    selector
        .iter()
        .all(|(k, v)| object["metadata"]["labels"][k].as_str() == Some(v.as_str()))
}

fn merge_patch(target: &mut Value, patch: &Value) {
    match (target.as_object_mut(), patch.as_object()) {
        (Some(target), Some(patch)) => {
            for (k, v) in patch {
                if v.is_null() {
                    target.remove(k);
                } else {
                    merge_patch(target.entry(k.clone()).or_insert(Value::Null), v);
                }
            }
        }
        _ => *target = patch.clone(),
    }
}

fn serve_from_store(
    state: &Mutex<MockState>,
    method: &str,
    path: &str,
    query: Option<&str>,
    body: &[u8],
) -> (u16, String) {
    let mut state = state.lock().unwrap();
    let collection = is_collection(path);

    match (method, collection) {
        ("GET", true) => {
            let selector = label_selector(query);
            let items: Vec<Value> = children(&state.objects, path)
                .chain(across_namespaces(&state.objects, path))
                .map(|(_, o)| o.clone())
                .filter(|o| matches_selector(o, &selector))
                .collect();
            (200, list_json(items))
        }
        ("GET", false) => match state.objects.get(path) {
            Some(o) => (200, o.to_string()),
            None => (404, not_found_json("object", path)),
        },
        ("POST", true) => {
            let Ok(object) = serde_json::from_slice::<Value>(body) else {
                return (400, status_json(400, "BadRequest", "invalid body"));
            };
            let name = object["metadata"]["name"].as_str().unwrap_or_default();
            let key = format!("{}/{}", path, name);
            if state.objects.contains_key(&key) {
                return (409, already_exists_json("object", name));
            }
            state.objects.insert(key, object.clone());
            (201, object.to_string())
        }
        ("PUT", false) => {
            let Ok(object) = serde_json::from_slice::<Value>(body) else {
                return (400, status_json(400, "BadRequest", "invalid body"));
            };
            if !state.objects.contains_key(path) {
                return (404, not_found_json("object", path));
            }
            state.objects.insert(path.to_string(), object.clone());
            (200, object.to_string())
        }
        ("PATCH", false) => {
            let Ok(patch) = serde_json::from_slice::<Value>(body) else {
                return (400, status_json(400, "BadRequest", "invalid body"));
            };
            match state.objects.get_mut(path) {
                Some(object) => {
                    merge_patch(object, &patch);
                    (200, object.to_string())
                }
                None => (404, not_found_json("object", path)),
            }
        }
        ("DELETE", false) => match state.objects.remove(path) {
            Some(o) => (200, o.to_string()),
            None => (404, not_found_json("object", path)),
        },
        ("DELETE", true) => {
            let selector = label_selector(query);
            let doomed: Vec<String> = children(&state.objects, path)
                .filter(|(_, o)| matches_selector(o, &selector))
                .map(|(p, _)| p.clone())
                .collect();
            for p in doomed {
                state.objects.remove(&p);
            }
            (200, success_status_json())
        }
        _ => (404, not_found_json("object", path)),
    }
}

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        let query = req.uri().query().map(|q| q.to_string());

        self.state
            .lock()
            .unwrap()
            .requests
            .push((method.clone(), path.clone()));

        let canned = self.find_response(&method, &path);
        let state = self.state.clone();

        Box::pin(async move {
            let (status, body) = match canned {
                Some(resp) => resp,
                None => {
                    let bytes = req.into_body().collect().await?.to_bytes();
                    serve_from_store(&state, &method, &path, query.as_deref(), &bytes)
                }
            };

            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(body.into_bytes()))
                .unwrap())
        })
    }
}

pub fn configmaps_path(namespace: &str) -> String {
    format!("/api/v1/namespaces/{}/configmaps", namespace)
}

pub fn secrets_path(namespace: &str) -> String {
    format!("/api/v1/namespaces/{}/secrets", namespace)
}

pub fn pods_path(namespace: &str) -> String {
    format!("/api/v1/namespaces/{}/pods", namespace)
}

pub fn namespaces_path() -> String {
    "/api/v1/namespaces".to_string()
}

pub fn network_policies_path(namespace: &str) -> String {
    format!(
        "/apis/networking.k8s.io/v1/namespaces/{}/networkpolicies",
        namespace
    )
}

pub fn cilium_policies_path(namespace: &str) -> String {
    format!("/apis/cilium.io/v2/namespaces/{}/ciliumnetworkpolicies", namespace)
}

pub fn postgres_clusters_path(namespace: &str) -> String {
    format!(
        "/apis/postgres-operator.crunchydata.com/v1beta1/namespaces/{}/postgresclusters",
        namespace
    )
}

/// Create a mock namespace JSON response
pub fn namespace_json(name: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": {
            "name": name,
            "uid": "test-uid"
        }
    })
}

pub fn configmap_json(name: &str, namespace: &str, labels: Value) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {"name": name, "namespace": namespace, "labels": labels},
        "data": {"pgbackrest.conf": "[global]\nlog-level-console=detail\n"},
    })
}

pub fn secret_json(name: &str, namespace: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {"name": name, "namespace": namespace},
        "type": "Opaque",
        "data": {"password": "c2VjcmV0MTIz"},
    })
}

/// A PostgresCluster with one S3 repository and the given pgbackrest configuration
pub fn postgres_cluster_json(name: &str, namespace: &str, configuration: Value) -> Value {
    json!({
        "apiVersion": "postgres-operator.crunchydata.com/v1beta1",
        "kind": "PostgresCluster",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "labels": {"app.kubernetes.io/managed-by": "Helm"},
        },
        "spec": {
            "postgresVersion": 15,
            "instances": [{
                "name": "pg",
                "replicas": 2,
                "dataVolumeClaimSpec": {"resources": {"requests": {"storage": "1Gi"}}},
                "affinity": {"podAntiAffinity": {}},
            }],
            "backups": {"pgbackrest": {
                "configuration": configuration,
                "repos": [{"name": "repo2", "s3": {"bucket": "backups"}, "schedules": {"full": "0 1 * * *"}}],
            }},
        },
    })
}

fn list_json(items: Vec<Value>) -> String {
    json!({
        "apiVersion": "v1",
        "kind": "List",
        "metadata": {"resourceVersion": "1"},
        "items": items,
    })
    .to_string()
}

pub fn status_json(code: u16, reason: &str, message: &str) -> String {
    json!({
        "kind": "Status",
        "apiVersion": "v1",
        "metadata": {},
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code
    })
    .to_string()
}

fn success_status_json() -> String {
    json!({
        "kind": "Status",
        "apiVersion": "v1",
        "metadata": {},
        "status": "Success",
        "message": "",
        "reason": "",
        "code": 200
    })
    .to_string()
}

/// Create a 404 not found response
pub fn not_found_json(resource: &str, name: &str) -> String {
    status_json(404, "NotFound", &format!("{} \"{}\" not found", resource, name))
}

/// Create a 409 conflict response
pub fn already_exists_json(resource: &str, name: &str) -> String {
    status_json(409, "AlreadyExists", &format!("{} \"{}\" already exists", resource, name))
}

/// Create a 500 response
pub fn internal_error_json() -> String {
    status_json(500, "InternalError", "boom")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_collection() {
        assert!(is_collection("/api/v1/namespaces"));
        assert!(!is_collection("/api/v1/namespaces/db"));
        assert!(is_collection("/api/v1/namespaces/db/configmaps"));
        assert!(!is_collection("/api/v1/namespaces/db/configmaps/cm"));
        assert!(is_collection("/apis/cilium.io/v2/namespaces/db/ciliumnetworkpolicies"));
        assert!(!is_collection("/apis/cilium.io/v2/namespaces/db/ciliumnetworkpolicies/x"));
    }

    #[test]
    fn test_across_namespaces() {
        let objects = BTreeMap::from([
            ("/apis/g/v1/namespaces/a/things/x".to_string(), json!({})),
            ("/apis/g/v1/namespaces/b/things/y".to_string(), json!({})),
            ("/apis/g/v1/namespaces/b/others/z".to_string(), json!({})),
        ]);
        let found: Vec<&String> = across_namespaces(&objects, "/apis/g/v1/things")
            .map(|(p, _)| p)
            .collect();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_label_selector() {
        assert_eq!(
            label_selector(Some("labelSelector=purpose%3Dx%2Capp%3Dy&limit=5")),
            vec![
                ("purpose".to_string(), "x".to_string()),
                ("app".to_string(), "y".to_string()),
            ]
        );
        assert!(label_selector(None).is_empty());
    }

    #[test]
    fn test_merge_patch() {
        let mut target = json!({"a": 1, "b": {"c": 2, "d": 3}});
        merge_patch(&mut target, &json!({"b": {"c": null, "e": 4}, "f": [1]}));
        assert_eq!(target, json!({"a": 1, "b": {"d": 3, "e": 4}, "f": [1]}));
    }
}
