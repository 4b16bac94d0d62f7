use std::{collections::HashSet, sync::Arc};

use rand::Rng;

use super::Descriptor;
use crate::{
    error::DescriptorError,
    strategy::{load::LoadTable, Selector, Strategy},
};

/// Composite of one or more descriptors sharing a selection strategy.
#[derive(Debug)]
pub struct Group {
    id: String,
    selector: Selector,
    children: Vec<Descriptor>,
}

impl Group {
    /// Groups require at least one child, child ids and the ids of
    /// all endpoints below must be unique.
    pub fn new(id: &str, strategy: Strategy, children: Vec<Descriptor>) -> Result<Self, DescriptorError> {
        if children.is_empty() {
            return Err(DescriptorError::invalid(
                id,
                "",
                "group must have at least one member",
            ));
        }
        let mut child_ids = HashSet::with_capacity(children.len());
        for child in children.iter() {
            if !child_ids.insert(child.id()) {
                return Err(DescriptorError::invalid(
                    id,
                    "",
                    format!("duplicate member id {:?}", child.id()),
                ));
            }
        }
        let mut leaf_ids = HashSet::new();
        let mut repeated = None;
        for child in children.iter() {
            child.scan_endpoints(|endpoint| {
                if leaf_ids.insert(endpoint.id().to_owned()) {
                    return true;
                }
                repeated = Some(endpoint.id().to_owned());
                false
            });
            if let Some(leaf) = repeated.take() {
                return Err(DescriptorError::invalid(
                    id,
                    "",
                    format!("duplicate endpoint id {leaf:?} in the tree"),
                ));
            }
        }
        let selector = Selector::new(strategy, children.iter().map(|c| c.id().to_owned()));
        Ok(Self {
            id: id.to_owned(),
            selector,
            children,
        })
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn strategy(&self) -> Strategy {
        self.selector.strategy()
    }

    #[inline]
    pub fn children(&self) -> &[Descriptor] {
        &self.children
    }

    /// Present only for load-balanced groups.
    #[inline]
    pub fn load(&self) -> Option<&Arc<LoadTable>> {
        self.selector.load()
    }

    /// Children in the order one dispatch should visit them.
    pub fn ordered_children<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<&Descriptor> {
        self.selector
            .order(self.children.len(), rng)
            .into_iter()
            .filter_map(|idx| self.children.get(idx))
            .collect()
    }
}
