//! `SHOW CATALOGS`, `SHOW CATALOG PROPERTIES` and `SHOW CREATE CATALOG`.

use std::fmt::Write as _;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::access::{Identity, PrivilegeAction};
use crate::error::CatalogError;
use crate::property::{self, CREATE_TIME};
use crate::registry::CatalogRegistry;
use crate::types::CatalogId;

/// One row of `SHOW CATALOGS`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRow {
    /// Catalog id
    pub id: CatalogId,
    /// Catalog name
    pub name: String,
    /// Kind name
    pub catalog_type: String,
    /// Whether this is the session's current catalog
    pub is_current: bool,
    /// Creation time as stamped by the leader
    pub create_time: String,
    /// Last committed change
    pub last_update_time: String,
    /// Comment
    pub comment: String,
}

impl CatalogRow {
    /// Column values in display order.
    pub fn columns(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.name.clone(),
            self.catalog_type.clone(),
            if self.is_current { "Yes" } else { "" }.to_string(),
            self.create_time.clone(),
            self.last_update_time.clone(),
            self.comment.clone(),
        ]
    }
}

/// Column headers of `SHOW CATALOGS`.
pub const SHOW_CATALOGS_HEADER: [&str; 7] = [
    "CatalogId",
    "CatalogName",
    "Type",
    "IsCurrent",
    "CreateTime",
    "LastUpdateTime",
    "Comment",
];

/// Compiles a SQL `LIKE` pattern. `%` matches any run, `_` one character and
/// a backslash escapes the next character. Matching is case-sensitive.
pub fn like_to_regex(pattern: &str) -> Result<Regex, CatalogError> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => re.push_str(&regex::escape(&escaped.to_string())),
                None => re.push_str(&regex::escape("\\")),
            },
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| CatalogError::invalid("", format!("bad LIKE pattern: {}", e)))
}

impl CatalogRegistry {
    /// Catalogs visible to `identity`, sorted by name, optionally filtered by
    /// a `LIKE` pattern. `current` marks the session's current catalog.
    pub fn show_catalogs(
        &self,
        identity: &Identity,
        like: Option<&str>,
        current: &str,
    ) -> Result<Vec<CatalogRow>, CatalogError> {
        let matcher = like.map(like_to_regex).transpose()?;
        let mut rows: Vec<CatalogRow> = self
            .list_visible_to(identity)
            .into_iter()
            .filter(|c| matcher.as_ref().map_or(true, |m| m.is_match(c.name())))
            .map(|c| CatalogRow {
                id: c.id(),
                name: c.name().to_string(),
                catalog_type: c.catalog_type().as_str().to_string(),
                is_current: c.name() == current,
                create_time: c.properties().get(CREATE_TIME).cloned().unwrap_or_default(),
                last_update_time: c.last_update_time().to_datetime_string(),
                comment: c.comment().to_string(),
            })
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    /// Property rows of a catalog with sensitive values masked. The referenced
    /// resource, if any, is the first row.
    pub fn show_catalog_properties(
        &self,
        identity: &Identity,
        name: &str,
    ) -> Result<Vec<(String, String)>, CatalogError> {
        let catalog = self.catalog_by_name(name)?;
        if !self
            .collab
            .access
            .check_catalog_privilege(identity, name, PrivilegeAction::Show)
        {
            return Err(CatalogError::AccessDenied {
                identity: identity.to_string(),
                catalog: name.to_string(),
            });
        }

        let mut rows = Vec::with_capacity(catalog.properties().len() + 1);
        if let Some(resource) = catalog.resource() {
            rows.push(("resource".to_string(), resource.to_string()));
        }
        rows.extend(property::printable(catalog.properties()));
        Ok(rows)
    }

    /// DDL that recreates the catalog, with sensitive values masked.
    pub fn show_create_catalog(&self, name: &str) -> Result<String, CatalogError> {
        let catalog = self.catalog_by_name(name)?;
        if catalog.is_internal() {
            return Err(CatalogError::unsupported(name, "no DDL for the internal catalog"));
        }

        let mut ddl = String::new();
        let _ = write!(ddl, "CREATE CATALOG `{}`", catalog.name());
        if let Some(resource) = catalog.resource() {
            let _ = write!(ddl, " WITH RESOURCE `{}`", resource);
        }
        if !catalog.comment().is_empty() {
            let _ = write!(ddl, "\nCOMMENT \"{}\"", quoted(catalog.comment()));
        }
        ddl.push_str("\n PROPERTIES (\n");
        let props = property::printable(catalog.properties());
        let body: Vec<String> = props
            .iter()
            .map(|(k, v)| format!("\"{}\" = \"{}\"", quoted(k), quoted(v)))
            .collect();
        ddl.push_str(&body.join(",\n"));
        ddl.push_str("\n);");
        Ok(ddl)
    }
}

/// Escapes a value for a double-quoted DDL literal.
fn quoted(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
