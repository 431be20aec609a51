use serde::{Deserialize, Serialize};

use crate::catalogue::CatalogueEntry;

/// An identity configured on this machine for one metadata service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalUser {
    pub username: String,
    pub user_pkey: String,
    pub ms_host: String,
}

/// The credentials a mount ends up using.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub user_pkey: String,
}

fn same_host(a: &str, b: &str) -> bool {
    let a = a.trim().trim_end_matches('/');
    let b = b.trim().trim_end_matches('/');
    !a.is_empty() && a.eq_ignore_ascii_case(b)
}

/// Pick the identity for mounting `entry`.
///
/// The catalogue's own credentials win; otherwise the first local user
/// registered for the entry's metadata service host is used.
pub fn resolve_identity(entry: &CatalogueEntry, users: &[LocalUser]) -> Option<Identity> {
    if entry.has_credentials() {
        return Some(Identity {
            username: entry.username.clone(),
            user_pkey: entry.user_pkey.clone(),
        });
    }

    users
        .iter()
        .filter(|user| !user.username.trim().is_empty() && !user.user_pkey.trim().is_empty())
        .find(|user| same_host(&user.ms_host, &entry.ms_host))
        .map(|user| Identity {
            username: user.username.trim().to_string(),
            user_pkey: user.user_pkey.clone(),
        })
}
