//! Controller-specific configuration resources.
//!
//! These resources carry proxy configuration that is not expressible through an `Ingress`. The
//! store does not interpret them; it only mirrors them and signals configuration changes.
//!
//! Unlike most custom resources, these keep their fields at the top level of the object rather
//! than under `spec`, so they implement [`kube::Resource`] directly.

use k8s_openapi::{apimachinery::pkg::apis::meta::v1::ObjectMeta, NamespaceResourceScope};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

pub const GROUP: &str = "configuration.konghq.com";
pub const VERSION: &str = "v1";

/// A proxy plugin and its configuration, referenced from other resources by name.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KongPlugin {
    #[serde(default)]
    pub metadata: ObjectMeta,

    /// The name of the plugin to instantiate.
    #[serde(rename = "plugin")]
    pub plugin_name: String,

    /// Plugin-specific configuration, passed through verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,

    #[serde(default)]
    pub disabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_ref: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protocols: Vec<String>,
}

/// A consumer of proxied APIs.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct KongConsumer {
    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_id: Option<String>,
}

/// Authentication material bound to a consumer.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KongCredential {
    #[serde(default)]
    pub metadata: ObjectMeta,

    /// The name of the `KongConsumer` in the same namespace.
    pub consumer_ref: String,

    /// The credential type, e.g. `key-auth` or `basic-auth`.
    #[serde(rename = "type")]
    pub credential_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

/// Proxy-level overrides for the routes and upstreams generated from an `Ingress`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct KongIngress {
    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<serde_json::Value>,
}

macro_rules! namespaced_resource {
    ($ty:ident, $plural:literal) => {
        impl kube::Resource for $ty {
            type DynamicType = ();
            type Scope = NamespaceResourceScope;

            fn kind(_: &()) -> Cow<'_, str> {
                Cow::Borrowed(stringify!($ty))
            }

            fn group(_: &()) -> Cow<'_, str> {
                Cow::Borrowed(GROUP)
            }

            fn version(_: &()) -> Cow<'_, str> {
                Cow::Borrowed(VERSION)
            }

            fn plural(_: &()) -> Cow<'_, str> {
                Cow::Borrowed($plural)
            }

            fn meta(&self) -> &ObjectMeta {
                &self.metadata
            }

            fn meta_mut(&mut self) -> &mut ObjectMeta {
                &mut self.metadata
            }
        }
    };
}

namespaced_resource!(KongPlugin, "kongplugins");
namespaced_resource!(KongConsumer, "kongconsumers");
namespaced_resource!(KongCredential, "kongcredentials");
namespaced_resource!(KongIngress, "kongingresses");

#[cfg(test)]
mod tests {
    use super::*;
    use kube::{Resource, ResourceExt};

    #[test]
    fn plugin_fields_are_top_level() {
        let plugin = serde_json::from_str::<KongPlugin>(
            r#"{
                "apiVersion": "configuration.konghq.com/v1",
                "kind": "KongPlugin",
                "metadata": {"namespace": "ns", "name": "rate-limit", "resourceVersion": "7"},
                "plugin": "rate-limiting",
                "config": {"minute": 5, "policy": "local"},
                "protocols": ["http", "https"]
            }"#,
        )
        .expect("plugin must deserialize");
        assert_eq!(plugin.namespace().as_deref(), Some("ns"));
        assert_eq!(plugin.name_any(), "rate-limit");
        assert_eq!(plugin.plugin_name, "rate-limiting");
        assert_eq!(
            plugin.config,
            Some(serde_json::json!({"minute": 5, "policy": "local"}))
        );
        assert!(!plugin.disabled);
        assert_eq!(plugin.protocols, ["http", "https"]);
    }

    #[test]
    fn consumer_and_credential_fields_are_top_level() {
        let consumer = serde_json::from_str::<KongConsumer>(
            r#"{
                "apiVersion": "configuration.konghq.com/v1",
                "kind": "KongConsumer",
                "metadata": {"namespace": "ns", "name": "alice"},
                "username": "alice",
                "custom_id": "1234"
            }"#,
        )
        .expect("consumer must deserialize");
        assert_eq!(consumer.username.as_deref(), Some("alice"));
        assert_eq!(consumer.custom_id.as_deref(), Some("1234"));

        let credential = serde_json::from_str::<KongCredential>(
            r#"{
                "apiVersion": "configuration.konghq.com/v1",
                "kind": "KongCredential",
                "metadata": {"namespace": "ns", "name": "alice-key"},
                "consumerRef": "alice",
                "type": "key-auth",
                "config": {"key": "s3cr3t"}
            }"#,
        )
        .expect("credential must deserialize");
        assert_eq!(credential.consumer_ref, "alice");
        assert_eq!(credential.credential_type, "key-auth");
        assert_eq!(credential.config, Some(serde_json::json!({"key": "s3cr3t"})));
    }

    #[test]
    fn kong_ingress_overrides_are_top_level() {
        let ki = serde_json::from_str::<KongIngress>(
            r#"{
                "apiVersion": "configuration.konghq.com/v1",
                "kind": "KongIngress",
                "metadata": {"namespace": "ns", "name": "sticky"},
                "upstream": {"hash_on": "cookie"},
                "route": {"strip_path": true}
            }"#,
        )
        .expect("kong ingress must deserialize");
        assert_eq!(ki.upstream, Some(serde_json::json!({"hash_on": "cookie"})));
        assert_eq!(ki.route, Some(serde_json::json!({"strip_path": true})));
        assert_eq!(ki.proxy, None);
    }

    fn namespaced<T: Resource<DynamicType = (), Scope = NamespaceResourceScope>>() {}

    #[test]
    fn resources_can_be_watched_per_namespace() {
        namespaced::<KongPlugin>();
        namespaced::<KongConsumer>();
        namespaced::<KongCredential>();
        namespaced::<KongIngress>();
    }

    #[test]
    fn resource_urls() {
        assert_eq!(KongPlugin::api_version(&()), "configuration.konghq.com/v1");
        assert_eq!(KongCredential::kind(&()), "KongCredential");
        assert_eq!(
            KongIngress::url_path(&(), Some("ns")),
            "/apis/configuration.konghq.com/v1/namespaces/ns/kongingresses"
        );
    }
}
