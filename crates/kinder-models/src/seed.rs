//! The versioned menu/permission seed file (`data/menu.json`).
//!
//! The tree is the desired end state of the `permissions` table. Top-level
//! nodes are categories (sidebar groups addressed by a `#anchor` path);
//! everything below them is a routable menu entry, and menu entries may nest.

use kinder_core::{OpsError, RoleCode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::permissions::PermissionKind;

fn validate_code(code: &str) -> Result<(), ValidationError> {
    let well_formed = code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
        && code.starts_with(|c: char| c.is_ascii_uppercase());
    if !well_formed {
        return Err(ValidationError::new("code_format"));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct PermissionNode {
    #[validate(length(min = 1, max = 100))]
    pub name: String,

    #[validate(length(min = 1, max = 100), custom(function = "validate_code"))]
    pub code: String,

    #[serde(rename = "type")]
    pub kind: PermissionKind,

    #[validate(length(min = 1, max = 255))]
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    #[serde(default)]
    pub sort: i32,

    /// Roles that see this node. Ignored for the admin role, which is
    /// granted everything.
    #[serde(default)]
    pub roles: Vec<RoleCode>,

    #[serde(default)]
    #[validate(nested)]
    pub children: Vec<PermissionNode>,
}

/// A seed node with its tree position resolved to the parent's code.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatPermission {
    pub name: String,
    pub code: String,
    pub kind: PermissionKind,
    pub path: String,
    pub component: Option<String>,
    pub icon: Option<String>,
    pub sort: i32,
    pub roles: Vec<RoleCode>,
    pub parent_code: Option<String>,
    pub depth: usize,
}

impl FlatPermission {
    pub fn is_category(&self) -> bool {
        self.kind == PermissionKind::Category
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct MenuSeed {
    #[validate(length(min = 1))]
    pub version: String,

    #[validate(nested)]
    pub nodes: Vec<PermissionNode>,

    /// Paths of stale entries that repair runs delete.
    #[serde(default)]
    pub invalid_paths: Vec<String>,

    /// Old path to corrected path, applied by repair runs.
    #[serde(default)]
    pub path_fixes: BTreeMap<String, String>,
}

impl MenuSeed {
    /// Parses and fully validates seed JSON.
    pub fn from_json(raw: &str) -> Result<Self, OpsError> {
        let seed: MenuSeed = serde_json::from_str(raw)
            .map_err(|e| OpsError::invalid_seed(format!("malformed seed JSON: {}", e)))?;
        seed.validate()
            .map_err(|e| OpsError::invalid_seed(describe(&e)))?;
        seed.validate_tree()?;
        Ok(seed)
    }

    /// Nodes in parent-before-child order.
    pub fn flatten(&self) -> Vec<FlatPermission> {
        fn walk(
            nodes: &[PermissionNode],
            parent: Option<&str>,
            depth: usize,
            out: &mut Vec<FlatPermission>,
        ) {
            for node in nodes {
                out.push(FlatPermission {
                    name: node.name.clone(),
                    code: node.code.clone(),
                    kind: node.kind,
                    path: node.path.clone(),
                    component: node.component.clone(),
                    icon: node.icon.clone(),
                    sort: node.sort,
                    roles: node.roles.clone(),
                    parent_code: parent.map(str::to_string),
                    depth,
                });
                walk(&node.children, Some(&node.code), depth + 1, out);
            }
        }

        let mut out = Vec::new();
        walk(&self.nodes, None, 0, &mut out);
        out
    }

    /// Structural checks the per-field validators cannot express.
    ///
    /// - codes are unique across the whole tree
    /// - top-level nodes are categories
    /// - a category never sits below a menu entry
    pub fn validate_tree(&self) -> Result<(), OpsError> {
        let mut problems = Vec::new();
        let mut seen = HashSet::new();

        for node in &self.nodes {
            if node.kind != PermissionKind::Category {
                problems.push(format!("top-level node '{}' must be a category", node.code));
            }
        }

        let flat = self.flatten();
        let kinds: BTreeMap<&str, PermissionKind> =
            flat.iter().map(|p| (p.code.as_str(), p.kind)).collect();

        for entry in &flat {
            if !seen.insert(entry.code.as_str()) {
                problems.push(format!("duplicate code '{}'", entry.code));
            }
            if let Some(parent) = &entry.parent_code {
                if entry.is_category() && kinds.get(parent.as_str()) == Some(&PermissionKind::Menu) {
                    problems.push(format!(
                        "category '{}' is nested under menu '{}'",
                        entry.code, parent
                    ));
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(OpsError::invalid_seed(problems.join("; ")))
        }
    }

    pub fn node_count(&self) -> usize {
        self.flatten().len()
    }
}

fn describe(errors: &ValidationErrors) -> String {
    // Nested errors render as `nodes[0].children[3].code: ...`.
    errors.to_string().replace('\n', "; ")
}
