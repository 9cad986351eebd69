// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Allow rules letting a clone reach its source cluster when network
//! policies isolate the source.
//!
//! Two dialects are handled: native `NetworkPolicy` and
//! `CiliumNetworkPolicy`. Every emitted rule carries the purpose label and
//! the name of its clone, so the rules of one clone can be bulk-deleted
//! without knowing which of them were created.

use crate::clone::metadata::clone_rule_labels;
use crate::config::Config;
use crate::constants::labels;
use crate::error::{is_not_found, CloneError, Result};
use crate::types::postgres_cluster::PostgresCluster;
use k8s_openapi::api::networking::v1::{
    NetworkPolicy, NetworkPolicyEgressRule, NetworkPolicyIngressRule, NetworkPolicyPeer,
    NetworkPolicyPort, NetworkPolicySpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{
    api::{DeleteParams, ListParams, ObjectMeta, PostParams},
    core::{ApiResource, DynamicObject},
    Api, Client, ResourceExt,
};
use serde_json::{json, Value};
use std::fmt;
use tracing::{debug, info, instrument, warn};

const CILIUM_NAMESPACE_LABEL: &str = "k8s:io.kubernetes.pod.namespace";
const DNS_PORT: i32 = 53;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDialect {
    Native,
    Cilium,
}

impl fmt::Display for PolicyDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyDialect::Native => write!(f, "NetworkPolicy"),
            PolicyDialect::Cilium => write!(f, "CiliumNetworkPolicy"),
        }
    }
}

/// A rule created by [`inject_if_needed`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRuleRef {
    pub dialect: PolicyDialect,
    pub namespace: String,
    pub name: String,
}

/// The two endpoints that must be able to talk to each other
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClonePeers {
    pub source: String,
    pub source_namespace: String,
    pub clone: String,
    pub clone_namespace: String,
}

impl ClonePeers {
    pub fn new(source: &PostgresCluster, clone: &PostgresCluster) -> Self {
        Self {
            source: source.name_any(),
            source_namespace: source.namespace().unwrap_or_default(),
            clone: clone.name_any(),
            clone_namespace: clone.namespace().unwrap_or_default(),
        }
    }

    fn ingress_rule_name(&self) -> String {
        format!("allow-incoming-from-{}", self.clone)
    }

    fn egress_rule_name(&self) -> String {
        format!("allow-outgoing-from-{}-to-source", self.clone)
    }

    fn intra_rule_name(&self) -> String {
        format!("allow-intra-{}", self.clone)
    }
}

pub fn cilium_api_resource() -> ApiResource {
    ApiResource {
        group: "cilium.io".to_string(),
        version: "v2".to_string(),
        api_version: "cilium.io/v2".to_string(),
        kind: "CiliumNetworkPolicy".to_string(),
        plural: "ciliumnetworkpolicies".to_string(),
    }
}

fn rule_metadata(name: String, namespace: &str, clone: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: Some(namespace.to_string()),
        labels: Some(clone_rule_labels(clone)),
        ..Default::default()
    }
}

fn match_labels(pairs: &[(&str, &str)]) -> LabelSelector {
    LabelSelector {
        match_labels: Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ),
        ..Default::default()
    }
}

/// True when a native selector picks the pods of `cluster`. An empty selector
/// picks every pod of the namespace.
pub fn native_selector_targets(selector: &LabelSelector, cluster: &str) -> bool {
    match selector.match_labels.as_ref() {
        Some(selected) if !selected.is_empty() => {
            selected.get(labels::CLUSTER).is_some_and(|v| v == cluster)
        }
        _ => selector
            .match_expressions
            .as_ref()
            .map_or(true, |e| e.is_empty()),
    }
}

/// Same as [`native_selector_targets`] for a Cilium `endpointSelector`,
/// which may prefix label keys with their source (`k8s:`).
pub fn cilium_selector_targets(selector: &Value, cluster: &str) -> bool {
    let prefixed = format!("k8s:{}", labels::CLUSTER);
    match selector.get("matchLabels").and_then(Value::as_object) {
        Some(selected) if !selected.is_empty() => [labels::CLUSTER, prefixed.as_str()]
            .iter()
            .any(|key| selected.get(*key).and_then(Value::as_str) == Some(cluster)),
        _ => selector
            .get("matchExpressions")
            .and_then(Value::as_array)
            .map_or(true, |e| e.is_empty()),
    }
}

fn cilium_policy_targets(policy: &DynamicObject, cluster: &str) -> bool {
    let single = policy.data.get("spec").into_iter();
    let multiple = policy
        .data
        .get("specs")
        .and_then(Value::as_array)
        .into_iter()
        .flatten();
    single.chain(multiple).any(|spec| {
        spec.get("endpointSelector")
            .is_some_and(|selector| cilium_selector_targets(selector, cluster))
    })
}

fn native_peer(cluster: &str, namespace: &str) -> NetworkPolicyPeer {
    NetworkPolicyPeer {
        pod_selector: Some(match_labels(&[(labels::CLUSTER, cluster)])),
        namespace_selector: Some(match_labels(&[(labels::NAMESPACE_NAME, namespace)])),
        ..Default::default()
    }
}

fn native_dns_egress(config: &Config) -> NetworkPolicyEgressRule {
    let (key, value) = &config.dns_selector;
    let port = |protocol: &str| NetworkPolicyPort {
        port: Some(IntOrString::Int(DNS_PORT)),
        protocol: Some(protocol.to_string()),
        ..Default::default()
    };
    NetworkPolicyEgressRule {
        to: Some(vec![NetworkPolicyPeer {
            pod_selector: Some(match_labels(&[(key.as_str(), value.as_str())])),
            namespace_selector: Some(match_labels(&[(
                labels::NAMESPACE_NAME,
                config.dns_namespace.as_str(),
            )])),
            ..Default::default()
        }]),
        ports: Some(vec![port("UDP"), port("TCP")]),
    }
}

/// Ingress on the source pods from the clone pods, in the source namespace
pub fn native_ingress_rule(peers: &ClonePeers) -> NetworkPolicy {
    NetworkPolicy {
        metadata: rule_metadata(peers.ingress_rule_name(), &peers.source_namespace, &peers.clone),
        spec: Some(NetworkPolicySpec {
            pod_selector: match_labels(&[(labels::CLUSTER, peers.source.as_str())]),
            ingress: Some(vec![NetworkPolicyIngressRule {
                from: Some(vec![native_peer(&peers.clone, &peers.clone_namespace)]),
                ..Default::default()
            }]),
            policy_types: Some(vec!["Ingress".to_string()]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Egress from the clone pods to the source pods and DNS, in the clone namespace
pub fn native_egress_rule(peers: &ClonePeers, config: &Config) -> NetworkPolicy {
    NetworkPolicy {
        metadata: rule_metadata(peers.egress_rule_name(), &peers.clone_namespace, &peers.clone),
        spec: Some(NetworkPolicySpec {
            pod_selector: match_labels(&[(labels::CLUSTER, peers.clone.as_str())]),
            egress: Some(vec![
                NetworkPolicyEgressRule {
                    to: Some(vec![native_peer(&peers.source, &peers.source_namespace)]),
                    ..Default::default()
                },
                native_dns_egress(config),
            ]),
            policy_types: Some(vec!["Egress".to_string()]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn cilium_endpoint(cluster: &str, namespace: &str) -> Value {
    json!({"matchLabels": {
        (labels::CLUSTER): cluster,
        (CILIUM_NAMESPACE_LABEL): namespace,
    }})
}

/// DNS resolution and API server egress, closed by default under Cilium
fn cilium_platform_egress(config: &Config) -> Vec<Value> {
    let (key, value) = &config.dns_selector;
    vec![
        json!({
            "toEndpoints": [{"matchLabels": {
                (CILIUM_NAMESPACE_LABEL): config.dns_namespace,
                (format!("k8s:{}", key)): value,
            }}],
            "toPorts": [{
                "ports": [{"port": DNS_PORT.to_string(), "protocol": "ANY"}],
                "rules": {"dns": [{"matchPattern": "*"}]},
            }],
        }),
        json!({"toEntities": ["kube-apiserver"]}),
    ]
}

fn cilium_rule(name: String, namespace: &str, clone: &str, spec: Value) -> DynamicObject {
    let mut rule = DynamicObject::new(&name, &cilium_api_resource())
        .within(namespace)
        .data(json!({ "spec": spec }));
    rule.metadata.labels = Some(clone_rule_labels(clone));
    rule
}

/// Ingress on the source endpoints from the clone endpoints
pub fn cilium_ingress_rule(peers: &ClonePeers) -> DynamicObject {
    cilium_rule(
        peers.ingress_rule_name(),
        &peers.source_namespace,
        &peers.clone,
        json!({
            "endpointSelector": {"matchLabels": {(labels::CLUSTER): peers.source}},
            "ingress": [{"fromEndpoints": [cilium_endpoint(&peers.clone, &peers.clone_namespace)]}],
        }),
    )
}

/// Egress from the clone endpoints to the source endpoints, DNS and the API server
pub fn cilium_egress_rule(peers: &ClonePeers, config: &Config) -> DynamicObject {
    let mut egress = vec![json!({
        "toEndpoints": [cilium_endpoint(&peers.source, &peers.source_namespace)],
    })];
    egress.extend(cilium_platform_egress(config));

    cilium_rule(
        peers.egress_rule_name(),
        &peers.clone_namespace,
        &peers.clone,
        json!({
            "endpointSelector": {"matchLabels": {(labels::CLUSTER): peers.clone}},
            "egress": egress,
        }),
    )
}

/// Traffic between the clone's own pods, plus DNS and the API server
pub fn cilium_intra_rule(peers: &ClonePeers, config: &Config) -> DynamicObject {
    let own = cilium_endpoint(&peers.clone, &peers.clone_namespace);
    let mut egress = vec![json!({"toEndpoints": [own.clone()]})];
    egress.extend(cilium_platform_egress(config));

    cilium_rule(
        peers.intra_rule_name(),
        &peers.clone_namespace,
        &peers.clone,
        json!({
            "endpointSelector": {"matchLabels": {(labels::CLUSTER): peers.clone}},
            "ingress": [{"fromEndpoints": [own]}],
            "egress": egress,
        }),
    )
}

async fn create_native(client: &Client, rule: NetworkPolicy) -> Result<NetworkRuleRef> {
    let namespace = rule.namespace().unwrap_or_default();
    let name = rule.name_any();
    let api: Api<NetworkPolicy> = Api::namespaced(client.clone(), &namespace);
    api.create(&PostParams::default(), &rule).await.map_err(|e| {
        CloneError::external(format!("create NetworkPolicy rule {}/{}", namespace, name), e)
    })?;
    info!("Created NetworkPolicy {}/{}", namespace, name);
    Ok(NetworkRuleRef {
        dialect: PolicyDialect::Native,
        namespace,
        name,
    })
}

async fn create_cilium(client: &Client, rule: DynamicObject) -> Result<NetworkRuleRef> {
    let namespace = rule.namespace().unwrap_or_default();
    let name = rule.name_any();
    let api: Api<DynamicObject> =
        Api::namespaced_with(client.clone(), &namespace, &cilium_api_resource());
    api.create(&PostParams::default(), &rule).await.map_err(|e| {
        CloneError::external(
            format!("create CiliumNetworkPolicy rule {}/{}", namespace, name),
            e,
        )
    })?;
    info!("Created CiliumNetworkPolicy {}/{}", namespace, name);
    Ok(NetworkRuleRef {
        dialect: PolicyDialect::Cilium,
        namespace,
        name,
    })
}

#[instrument(skip(client, config))]
async fn inject_native(client: &Client, config: &Config, peers: &ClonePeers) -> Result<Vec<NetworkRuleRef>> {
    let api: Api<NetworkPolicy> = Api::namespaced(client.clone(), &peers.source_namespace);
    let existing = api.list(&ListParams::default()).await.map_err(|e| {
        CloneError::external(
            format!("list NetworkPolicies in {}", peers.source_namespace),
            e,
        )
    })?;

    let isolating = existing.items.iter().any(|p| {
        p.spec
            .as_ref()
            .is_some_and(|s| native_selector_targets(&s.pod_selector, &peers.source))
    });
    if !isolating {
        debug!("No NetworkPolicy isolates {}", peers.source);
        return Ok(vec![]);
    }

    Ok(vec![
        create_native(client, native_ingress_rule(peers)).await?,
        create_native(client, native_egress_rule(peers, config)).await?,
    ])
}

#[instrument(skip(client, config))]
async fn inject_cilium(client: &Client, config: &Config, peers: &ClonePeers) -> Result<Vec<NetworkRuleRef>> {
    let api: Api<DynamicObject> =
        Api::namespaced_with(client.clone(), &peers.source_namespace, &cilium_api_resource());
    let existing = match api.list(&ListParams::default()).await {
        Ok(list) => list.items,
        Err(e) if is_not_found(&e) => {
            debug!("CiliumNetworkPolicy is not served by this cluster");
            return Ok(vec![]);
        }
        Err(e) => {
            return Err(CloneError::external(
                format!("list CiliumNetworkPolicies in {}", peers.source_namespace),
                e,
            ))
        }
    };
    if existing.is_empty() {
        return Ok(vec![]);
    }

    let mut created = vec![];
    if existing.iter().any(|p| cilium_policy_targets(p, &peers.source)) {
        created.push(create_cilium(client, cilium_ingress_rule(peers)).await?);
        created.push(create_cilium(client, cilium_egress_rule(peers, config)).await?);
    }
    created.push(create_cilium(client, cilium_intra_rule(peers, config)).await?);
    Ok(created)
}

/// Create the allow rules each policy dialect needs for `clone` to restore
/// from `source`.
///
/// A failure leaves already created rules behind; they are removed by
/// [`delete_network_rules`].
#[instrument(skip(client, config, source, clone), fields(source = %source.name_any(), clone = %clone.name_any()))]
pub async fn inject_if_needed(
    client: &Client,
    config: &Config,
    source: &PostgresCluster,
    clone: &PostgresCluster,
) -> Result<Vec<NetworkRuleRef>> {
    let peers = ClonePeers::new(source, clone);
    let mut created = inject_native(client, config, &peers).await?;
    created.extend(inject_cilium(client, config, &peers).await?);
    Ok(created)
}

async fn delete_labeled<K>(api: Api<K>, kind: &str, namespace: &str, selector: &str)
where
    K: kube::Resource + Clone + fmt::Debug + serde::de::DeserializeOwned,
{
    let lp = ListParams::default().labels(selector);
    match api.delete_collection(&DeleteParams::default(), &lp).await {
        Ok(_) => info!("Deleted labeled {} rules in {}", kind, namespace),
        Err(e) if is_not_found(&e) => debug!("No {} rules to delete in {}", kind, namespace),
        Err(e) => warn!("Failed to delete {} rules in {}: {}", kind, namespace, e),
    }
}

/// Bulk-delete the rules of both dialects matching `selector`, never failing.
///
/// Pass [`clone_selector`](crate::clone::metadata::clone_selector) to limit
/// the deletion to the rules of one clone.
#[instrument(skip(client))]
pub async fn delete_network_rules(client: &Client, namespaces: &[&str], selector: &str) {
    for namespace in namespaces {
        delete_labeled(
            Api::<NetworkPolicy>::namespaced(client.clone(), namespace),
            "NetworkPolicy",
            namespace,
            selector,
        )
        .await;
        delete_labeled(
            Api::<DynamicObject>::namespaced_with(client.clone(), namespace, &cilium_api_resource()),
            "CiliumNetworkPolicy",
            namespace,
            selector,
        )
        .await;
    }
}
