//! Per-request context handed to an execution.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::types::Value;

/// The viewing user, as far as access checks and default providers care.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    /// User identifier.
    pub id: i64,
    /// Role names held by the user.
    #[serde(default)]
    pub roles: BTreeSet<String>,
    /// Permission names granted to the user.
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

impl UserContext {
    /// Creates a user without roles or permissions.
    pub fn new(id: i64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Adds a role.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    /// Adds a permission.
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }
}

/// Everything an execution may read about the incoming request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Path segments, e.g. `["articles", "42"]`.
    #[serde(default)]
    pub path: Vec<String>,
    /// Query-string parameters.
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    /// Viewing user, anonymous when absent.
    #[serde(default)]
    pub user: Option<UserContext>,
    /// Objects the surrounding application already loaded for this request,
    /// keyed by object type (`node` → its id).
    #[serde(default)]
    pub objects: BTreeMap<String, Value>,
}

impl RequestContext {
    /// Builds a context from a slash-separated path; empty segments are dropped.
    pub fn from_path(path: &str) -> Self {
        Self {
            path: path
                .split('/')
                .filter(|segment| !segment.is_empty())
                .map(str::to_owned)
                .collect(),
            ..Self::default()
        }
    }

    /// Builds a context from explicit segments.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: segments.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Adds a query-string parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Sets the viewing user.
    pub fn with_user(mut self, user: UserContext) -> Self {
        self.user = Some(user);
        self
    }

    /// Registers a current-context object.
    pub fn with_object(mut self, ty: impl Into<String>, value: impl Into<Value>) -> Self {
        self.objects.insert(ty.into(), value.into());
        self
    }

    /// Path segment at `index`, if present.
    pub fn segment(&self, index: usize) -> Option<&str> {
        self.path.get(index).map(String::as_str)
    }

    /// Whether the viewing user holds `permission`.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.user
            .as_ref()
            .is_some_and(|user| user.permissions.contains(permission))
    }

    /// Whether the viewing user holds `role`.
    pub fn has_role(&self, role: &str) -> bool {
        self.user
            .as_ref()
            .is_some_and(|user| user.roles.contains(role))
    }
}
