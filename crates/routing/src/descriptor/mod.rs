pub mod endpoint;
pub mod group;

use std::sync::Arc;

use serde::{ser::SerializeMap, Serialize};

use self::{endpoint::Endpoint, group::Group};

/// Node of a service topology: either a single endpoint or a group
/// of descriptors. Cloning is cheap, trees are immutable once built
/// (apart from the load tables of load-balanced groups) and can be
/// shared across threads.
///
/// ## Example
/// ```rust
/// use routing::prelude::*;
///
/// let t1 = Endpoint::with_total("server.t1", "http://10.0.0.1:80", 500).unwrap();
/// let t2 = Endpoint::with_total("server.t2", "http://10.0.0.2:80", 500).unwrap();
/// let root = Descriptor::from(
///     Group::new("server", Strategy::Ordered, vec![t1.into(), t2.into()]).unwrap(),
/// );
/// assert_eq!(root.endpoint_count(), 2);
/// ```
#[derive(Debug, Clone)]
pub enum Descriptor {
    Endpoint(Arc<Endpoint>),
    Group(Arc<Group>),
}

impl From<Endpoint> for Descriptor {
    fn from(endpoint: Endpoint) -> Self {
        Descriptor::Endpoint(Arc::new(endpoint))
    }
}

impl From<Group> for Descriptor {
    fn from(group: Group) -> Self {
        Descriptor::Group(Arc::new(group))
    }
}

impl Descriptor {
    #[inline]
    pub fn id(&self) -> &str {
        match self {
            Descriptor::Endpoint(endpoint) => endpoint.id(),
            Descriptor::Group(group) => group.id(),
        }
    }

    #[inline]
    pub fn is_group(&self) -> bool {
        matches!(self, Descriptor::Group(_))
    }

    #[inline]
    pub fn as_endpoint(&self) -> Option<&Arc<Endpoint>> {
        match self {
            Descriptor::Endpoint(endpoint) => Some(endpoint),
            Descriptor::Group(_) => None,
        }
    }

    #[inline]
    pub fn as_group(&self) -> Option<&Arc<Group>> {
        match self {
            Descriptor::Group(group) => Some(group),
            Descriptor::Endpoint(_) => None,
        }
    }

    /// Visit every endpoint depth-first in configured order, stop
    /// when `visitor` returns false.
    pub fn scan_endpoints(&self, mut visitor: impl FnMut(&Arc<Endpoint>) -> bool) {
        self._scan(&mut visitor);
    }

    fn _scan(&self, visitor: &mut impl FnMut(&Arc<Endpoint>) -> bool) -> bool {
        match self {
            Descriptor::Endpoint(endpoint) => visitor(endpoint),
            Descriptor::Group(group) => group.children().iter().all(|child| child._scan(visitor)),
        }
    }

    /// All endpoints of this tree in configured order.
    pub fn endpoints(&self) -> Vec<Arc<Endpoint>> {
        let mut collect = vec![];
        self.scan_endpoints(|endpoint| {
            collect.push(endpoint.clone());
            true
        });
        collect
    }

    pub fn endpoint_count(&self) -> usize {
        let mut count = 0;
        self.scan_endpoints(|_| {
            count += 1;
            true
        });
        count
    }

    /// First endpoint (in configured order) whose address has checksum `crc`.
    pub fn endpoint_by_crc(&self, crc: u32) -> Option<Arc<Endpoint>> {
        self.find(|endpoint| endpoint.crc() == crc)
    }

    pub fn endpoint_by_id(&self, id: &str) -> Option<Arc<Endpoint>> {
        self.find(|endpoint| endpoint.id() == id)
    }

    fn find(&self, predicate: impl Fn(&Endpoint) -> bool) -> Option<Arc<Endpoint>> {
        let mut found = None;
        self.scan_endpoints(|endpoint| {
            if predicate(endpoint.as_ref()) {
                found = Some(endpoint.clone());
                return false;
            }
            true
        });
        found
    }
}

const TYPE: &str = "type";
const ID: &str = "id";
const STRATEGY: &str = "strategy";
const CHILDREN: &str = "children";
const ENDPOINT: &str = "endpoint";

impl Serialize for Descriptor {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let len = if self.is_group() { 4 } else { 3 };
        let mut map = serializer.serialize_map(Some(len))?;
        match self {
            Descriptor::Endpoint(endpoint) => {
                map.serialize_entry(TYPE, "target")?;
                map.serialize_entry(ID, endpoint.id())?;
                map.serialize_entry(ENDPOINT, endpoint.as_ref())?;
            }
            Descriptor::Group(group) => {
                map.serialize_entry(TYPE, "group")?;
                map.serialize_entry(ID, group.id())?;
                map.serialize_entry(STRATEGY, &group.strategy())?;
                map.serialize_entry(CHILDREN, group.children())?;
            }
        }
        map.end()
    }
}
