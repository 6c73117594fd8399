//! Link registry: which connection currently owns each stable id.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};
use wsmux_protocol::LinkId;

use crate::contracts::LinkRouter;
use crate::proxy::RpcProxy;

/// The live connection for one stable id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StableConnInfo {
    pub conn_id: String,
    pub link_id: LinkId,
}

/// Maps stable ids to their current (connection, link) pair.
///
/// One instance per server, shared by handle with every connection. The
/// lock covers the map and the router bookkeeping calls, never socket I/O.
pub struct LinkRegistry {
    router: Arc<dyn LinkRouter>,
    routes: Mutex<HashMap<String, StableConnInfo>>,
}

impl LinkRegistry {
    pub fn new(router: Arc<dyn LinkRouter>) -> Self {
        Self {
            router,
            routes: Mutex::new(HashMap::new()),
        }
    }

    /// Install `proxy` as the link for `stable_id`. A previous owner's link
    /// is unregistered from the router first.
    pub fn register(&self, conn_id: &str, stable_id: &str, proxy: RpcProxy) -> LinkId {
        let mut routes = self.routes.lock();
        if let Some(prev) = routes.remove(stable_id) {
            warn!(stable_id, prev_conn_id = %prev.conn_id, conn_id, "replacing existing connection for stableid");
            if prev.link_id.is_some() {
                self.router.unregister_link(prev.link_id);
            }
        }
        let link_id = self.router.register_trusted_router(proxy);
        routes.insert(
            stable_id.to_string(),
            StableConnInfo {
                conn_id: conn_id.to_string(),
                link_id,
            },
        );
        info!(stable_id, conn_id, %link_id, "registered link");
        link_id
    }

    /// Remove the mapping for `stable_id` if `conn_id` still owns it.
    /// Returns false (and changes nothing) when a newer connection has
    /// taken over.
    pub fn unregister(&self, conn_id: &str, stable_id: &str) -> bool {
        let mut routes = self.routes.lock();
        let owned = routes
            .get(stable_id)
            .is_some_and(|info| info.conn_id == conn_id);
        if !owned {
            warn!(stable_id, conn_id, "not the current connection for stableid, ignoring unregister");
            return false;
        }
        if let Some(info) = routes.remove(stable_id) {
            if info.link_id.is_some() {
                self.router.unregister_link(info.link_id);
            }
            info!(stable_id, conn_id, link_id = %info.link_id, "unregistered link");
        }
        true
    }

    pub fn lookup(&self, stable_id: &str) -> Option<StableConnInfo> {
        self.routes.lock().get(stable_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.routes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.lock().is_empty()
    }
}
