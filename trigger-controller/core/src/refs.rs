//! References as they are written on objects, before namespace defaulting.

use crate::{kind, Identity};

/// A route's reference to an anchor it wants to attach to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParentRef {
    pub group: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
    pub section_name: Option<String>,
    pub port: Option<u16>,
}

/// A policy's reference to the object it attaches to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetRef {
    pub group: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
    pub port: Option<u16>,
}

/// Any other reference: backends, certificates, filters and configs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectRef {
    pub group: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
    pub port: Option<u16>,
}

// === impl ParentRef ===

impl ParentRef {
    /// A parent ref to a gateway, with Gateway API defaults applied.
    pub fn gateway(namespace: Option<String>, name: impl Into<String>) -> Self {
        Self {
            group: kind::GATEWAY_GROUP.to_string(),
            kind: "Gateway".to_string(),
            namespace,
            name: name.into(),
            section_name: None,
            port: None,
        }
    }

    /// Resolves the anchor this ref names. Section names and ports narrow the
    /// attachment but not which anchor is named, so they are not carried.
    pub fn resolve(&self, route_ns: &str) -> Identity {
        Identity::new(
            self.group.clone(),
            self.kind.clone(),
            resolve_namespace(&self.group, &self.kind, &self.namespace, route_ns),
            self.name.clone(),
        )
    }

    pub fn is_anchor(&self) -> bool {
        kind::is_anchor(&self.group, &self.kind)
    }
}

// === impl TargetRef ===

impl TargetRef {
    /// Resolves the target. An empty namespace means the policy's namespace.
    pub fn resolve(&self, policy_ns: &str) -> Identity {
        Identity::new(
            self.group.clone(),
            self.kind.clone(),
            resolve_namespace(&self.group, &self.kind, &self.namespace, policy_ns),
            self.name.clone(),
        )
        .with_port(self.port)
    }

    pub fn is_local(&self, policy_ns: &str) -> bool {
        self.namespace
            .as_deref()
            .map_or(true, |ns| ns.is_empty() || ns == policy_ns)
    }

    pub fn is_service(&self) -> bool {
        kind::is_service(&self.group, &self.kind)
    }
}

// === impl ObjectRef ===

impl ObjectRef {
    pub fn new(group: impl Into<String>, kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            kind: kind.into(),
            namespace: None,
            name: name.into(),
            port: None,
        }
    }

    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    pub fn with_port(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    pub fn resolve(&self, local_ns: &str) -> Identity {
        Identity::new(
            self.group.clone(),
            self.kind.clone(),
            resolve_namespace(&self.group, &self.kind, &self.namespace, local_ns),
            self.name.clone(),
        )
        .with_port(self.port)
    }

    /// Whether the ref leaves the referring object's namespace.
    pub fn is_cross_namespace(&self, local_ns: &str) -> bool {
        self.namespace
            .as_deref()
            .is_some_and(|ns| !ns.is_empty() && ns != local_ns)
    }
}

/// Cluster-scoped kinds resolve to an empty namespace; otherwise a missing or
/// empty namespace means the referrer's.
fn resolve_namespace(group: &str, kind: &str, ns: &Option<String>, default: &str) -> String {
    if kind::lookup(group, kind).is_ok_and(|k| !k.is_namespaced()) {
        return String::new();
    }
    match ns.as_deref() {
        Some(ns) if !ns.is_empty() => ns.to_string(),
        _ => default.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_ref_defaults_namespace() {
        let pr = ParentRef::gateway(None, "g1");
        assert_eq!(
            pr.resolve("app"),
            Identity::new(kind::GATEWAY_GROUP, "Gateway", "app", "g1")
        );

        let pr = ParentRef {
            section_name: Some("http".to_string()),
            port: Some(80),
            ..ParentRef::gateway(Some("gw".to_string()), "g1")
        };
        assert_eq!(
            pr.resolve("app"),
            Identity::new(kind::GATEWAY_GROUP, "Gateway", "gw", "g1")
        );
        assert!(pr.is_anchor());
    }

    #[test]
    fn target_ref_empty_namespace_is_local() {
        let tr = TargetRef {
            group: String::new(),
            kind: "Service".to_string(),
            namespace: Some(String::new()),
            name: "s1".to_string(),
            port: None,
        };
        assert!(tr.is_local("app"));
        assert!(tr.is_service());
        assert_eq!(tr.resolve("app"), Identity::new("", "Service", "app", "s1"));

        let tr = TargetRef {
            namespace: Some("other".to_string()),
            port: Some(8080),
            ..tr
        };
        assert!(!tr.is_local("app"));
        assert_eq!(
            tr.resolve("app"),
            Identity::new("", "Service", "other", "s1").with_port(8080)
        );
    }

    #[test]
    fn cluster_scoped_refs_have_no_namespace() {
        let r = ObjectRef::new(kind::EXTENSION_GROUP, "FilterDefinition", "lua");
        assert_eq!(
            r.resolve("app"),
            Identity::new(kind::EXTENSION_GROUP, "FilterDefinition", "", "lua")
        );
    }

    #[test]
    fn object_ref_cross_namespace() {
        let r = ObjectRef::new("", "Secret", "tls");
        assert!(!r.is_cross_namespace("app"));
        let r = r.with_namespace(Some("app".to_string()));
        assert!(!r.is_cross_namespace("app"));
        assert!(r.is_cross_namespace("gw"));
    }
}
