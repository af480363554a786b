use std::fmt;

/// A Kubernetes API group and kind, e.g. `HTTPRoute.gateway.networking.k8s.io`.
///
/// The core group is represented by an empty string.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct GroupKind {
    pub group: String,
    pub kind: String,
}

/// A namespace-qualified object name. Cluster-scoped objects have an empty
/// namespace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

/// Identifies a single watched object, optionally narrowed to a port.
///
/// Identities are plain values: two identities with identical fields denote
/// the same object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct Identity {
    pub group: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

// === impl GroupKind ===

impl GroupKind {
    pub fn new(group: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: normalize_group(group.into()),
            kind: kind.into(),
        }
    }

    pub fn is(&self, group: &str, kind: &str) -> bool {
        self.group == normalize_group_str(group) && self.kind == kind
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            self.kind.fmt(f)
        } else {
            write!(f, "{}.{}", self.kind, self.group)
        }
    }
}

// === impl ObjectKey ===

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            self.name.fmt(f)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

// === impl Identity ===

impl Identity {
    pub fn new(
        group: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            group: normalize_group(group.into()),
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
            port: None,
        }
    }

    pub fn with_port(mut self, port: impl Into<Option<u16>>) -> Self {
        self.port = port.into();
        self
    }

    /// Returns the same object without a port qualifier.
    pub fn without_port(&self) -> Self {
        Self {
            port: None,
            ..self.clone()
        }
    }

    pub fn group_kind(&self) -> GroupKind {
        GroupKind {
            group: self.group.clone(),
            kind: self.kind.clone(),
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }

    pub fn is_kind(&self, group: &str, kind: &str) -> bool {
        self.group == normalize_group_str(group) && self.kind == kind
    }

    /// Returns an identity for another kind with the same namespace and name.
    pub fn as_kind(&self, group: &str, kind: &str) -> Self {
        Self::new(group, kind, self.namespace.clone(), self.name.clone())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group_kind(), self.key())?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        Ok(())
    }
}

// References written against the core group sometimes spell it out.
fn normalize_group(group: String) -> String {
    if group == "core" {
        String::new()
    } else {
        group
    }
}

fn normalize_group_str(group: &str) -> &str {
    if group == "core" {
        ""
    } else {
        group
    }
}
