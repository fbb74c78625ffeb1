//! Deterministic schema and user names for a node.

use portal_crypto::hmac_suffix;
use portal_crypto::names::SUFFIX_LEN;

use super::error::ProvisionError;
use super::quote::{MAX_SCHEMA_LEN, MAX_USER_LEN};

const PREFIX: &str = "pp_";

/// Schema and user derived for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseNames {
    pub name: String,
    pub user: String,
}

/// Lowercase `node_name`, collapsing every run outside `[a-z0-9]` into `_`.
pub fn slug(node_name: &str) -> String {
    let mut out = String::with_capacity(node_name.len());
    let mut pending_sep = false;
    for c in node_name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c);
        } else {
            pending_sep = true;
        }
    }
    if out.is_empty() {
        out.push_str("node");
    }
    out
}

/// `pp_<slug>_<suffix>` for the schema (keyed `db-name:`) and the user
/// (keyed `db-user:`). Only the slug is shortened to fit the length limits;
/// the suffix is always kept whole.
pub fn generate_names(cluster_uuid: &str, node_name: &str) -> Result<DatabaseNames, ProvisionError> {
    if cluster_uuid.trim().is_empty() {
        return Err(ProvisionError::Validation(
            "cluster UUID is required to derive database names".into(),
        ));
    }
    let slug = slug(node_name);
    let name = compose(
        &slug,
        &hmac_suffix(&format!("db-name:{cluster_uuid}"), &slug),
        MAX_SCHEMA_LEN,
    );
    let user = compose(
        &slug,
        &hmac_suffix(&format!("db-user:{cluster_uuid}"), &slug),
        MAX_USER_LEN,
    );
    Ok(DatabaseNames { name, user })
}

fn compose(slug: &str, suffix: &str, max_len: usize) -> String {
    let budget = max_len - PREFIX.len() - 1 - SUFFIX_LEN;
    let mut head = &slug[..slug.len().min(budget)];
    head = head.trim_end_matches('_');
    if head.is_empty() {
        head = "n";
    }
    format!("{PREFIX}{head}_{suffix}")
}
