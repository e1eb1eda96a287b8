//! Store health checks.

use tracing::{debug, error};

use crate::paths::node;
use crate::store::Store;

/// Check store connectivity.
pub async fn check_connection(store: &dyn Store) -> bool {
    if store.ping().await {
        debug!("Store connection healthy");
        true
    } else {
        error!("Store ping failed");
        false
    }
}

/// Returns the root nodes that currently hold no data.
pub async fn empty_nodes(store: &dyn Store) -> Vec<String> {
    let mut empty = Vec::new();
    for name in node::ALL {
        match store.get(name).await {
            Ok(Some(_)) => {}
            Ok(None) => empty.push(name.to_string()),
            Err(e) => {
                error!(node = %name, error = %e, "Failed to read store node");
                empty.push(name.to_string());
            }
        }
    }
    empty
}
