//! Node classification by hardware class
//!
//! The two hardware generations are recorded in different views, and a
//! node's class is not known up front. Classification probes the views in
//! the request window:
//!
//! 1. Mountain: node locations with energy counter rows are mountain nodes.
//! 2. River: the remaining nodes are looked up by controller location (the
//!    node xname without its trailing `n<digits>` designator). Every node
//!    whose controller has rows in the window is a river node; several nodes can
//!    share one controller.
//! 3. Whatever is left is unknown.
//!
//! A failed probe is logged and treated as "no nodes of that class". Deadline
//! expiry and cancellation are not swallowed.

use super::connection::PgConnection;
use super::executor::fetch_locations;
use super::sql;
use crate::engine::QueryContext;
use crate::error::Result;
use crate::types::{NodeLookup, NodeWindow, TimeBoundRequest};
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Node subsets per hardware class
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSplit {
    /// Nodes found in the mountain view
    pub mountain: Vec<NodeLookup>,
    /// Nodes whose controller was found in the river view
    pub river: Vec<NodeLookup>,
    /// Nodes found in neither view
    pub unknown: Vec<NodeLookup>,
}

impl NodeSplit {
    /// True when neither class has nodes
    pub fn is_empty(&self) -> bool {
        self.mountain.is_empty() && self.river.is_empty()
    }

    /// Total number of classified and unknown nodes
    pub fn len(&self) -> usize {
        self.mountain.len() + self.river.len() + self.unknown.len()
    }
}

/// Source of "which locations have rows in this window"
#[async_trait]
pub trait LocationProbe: Send + Sync {
    /// Mountain node locations among `xnames` with rows in the window
    async fn mountain_locations(
        &self,
        window: &TimeBoundRequest,
        xnames: &[String],
    ) -> Result<Vec<String>>;

    /// River controller locations among `controllers` with rows in the window
    async fn river_locations(
        &self,
        window: &TimeBoundRequest,
        controllers: &[String],
    ) -> Result<Vec<String>>;
}

#[async_trait]
impl LocationProbe for PgConnection {
    async fn mountain_locations(
        &self,
        window: &TimeBoundRequest,
        xnames: &[String],
    ) -> Result<Vec<String>> {
        fetch_locations(self, "mountain locations", sql::MOUNTAIN_LOCATIONS, window, xnames).await
    }

    async fn river_locations(
        &self,
        window: &TimeBoundRequest,
        controllers: &[String],
    ) -> Result<Vec<String>> {
        fetch_locations(self, "river locations", sql::RIVER_LOCATIONS, window, controllers).await
    }
}

/// Controller location of a node xname
///
/// Strips a trailing `n<digits>` node designator: `x3000c0s19b1n0` becomes
/// `x3000c0s19b1`. Identifiers without one are returned unchanged.
pub fn controller_location(xname: &str) -> &str {
    let digits = xname
        .bytes()
        .rev()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits == 0 || digits == xname.len() {
        return xname;
    }
    let prefix = &xname[..xname.len() - digits];
    match prefix.strip_suffix('n') {
        Some(controller) if !controller.is_empty() => controller,
        _ => xname,
    }
}

/// Move every pending node whose key is in `found` into a new list
///
/// Caller order is kept in both lists.
fn take_matching<F>(pending: &mut Vec<NodeLookup>, found: &HashSet<String>, key: F) -> Vec<NodeLookup>
where
    F: Fn(&NodeLookup) -> &str,
{
    let (matched, rest): (Vec<_>, Vec<_>) = pending
        .drain(..)
        .partition(|node| found.contains(key(node)));
    *pending = rest;
    matched
}

/// Unique controller locations of `nodes`, in first-seen order
pub(crate) fn controller_locations(nodes: &[NodeLookup]) -> Vec<String> {
    let mut seen = HashSet::new();
    nodes
        .iter()
        .map(|n| controller_location(&n.xname))
        .filter(|c| seen.insert(*c))
        .map(str::to_string)
        .collect()
}

/// Degrade a probe failure to "nothing found", except for interruptions
fn degrade(class: &str, result: Result<Vec<String>>) -> Result<HashSet<String>> {
    match result {
        Ok(found) => Ok(found.into_iter().collect()),
        Err(e) if e.is_interrupted() => Err(e),
        Err(e) => {
            warn!(class, error = %e, "Node split probe failed, treating class as empty");
            Ok(HashSet::new())
        },
    }
}

/// Partition the requested nodes into mountain, river and unknown subsets
///
/// Every input node ends up in exactly one subset.
pub async fn classify<P>(probe: &P, ctx: &QueryContext, req: &NodeWindow) -> Result<NodeSplit>
where
    P: LocationProbe + ?Sized,
{
    let mut pending = req.nodes.clone();

    let xnames = req.xnames();
    let found = degrade(
        "mountain",
        ctx.run(
            "mountain node split",
            probe.mountain_locations(&req.window, &xnames),
        )
        .await,
    )?;
    let mountain = take_matching(&mut pending, &found, |n| n.xname.as_str());

    let river = if pending.is_empty() {
        Vec::new()
    } else {
        let controllers = controller_locations(&pending);
        let found = degrade(
            "river",
            ctx.run(
                "river node split",
                probe.river_locations(&req.window, &controllers),
            )
            .await,
        )?;
        take_matching(&mut pending, &found, |n| controller_location(&n.xname))
    };

    info!(
        mountain = mountain.len(),
        river = river.len(),
        unknown = pending.len(),
        "Node split"
    );
    if !pending.is_empty() {
        debug!(unknown = ?pending.iter().map(|n| &n.xname).collect::<Vec<_>>(), "Unclassified nodes");
    }

    Ok(NodeSplit {
        mountain,
        river,
        unknown: pending,
    })
}
