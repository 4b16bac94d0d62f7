pub mod load;

use std::{fmt::Display, str::FromStr, sync::Arc};

use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};
use vendor::prelude::DashMap;

use self::load::LoadTable;

type TopoHashBuilder = std::hash::BuildHasherDefault<fxhash::FxHasher>;
type TashMap<K, V> = DashMap<K, V, TopoHashBuilder>;

pub const ORDERED: &str = "ordered";
pub const RANDOM: &str = "random";
pub const LOAD_BALANCED: &str = "loadbalanced";

/// Policy deciding in which order the children of a group are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Always first to last, as configured.
    Ordered,
    /// A fresh uniform shuffle for every dispatch.
    Random,
    /// Least failing, then least recently used child first.
    LoadBalanced,
}

impl Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Strategy::Ordered => ORDERED,
            Strategy::Random => RANDOM,
            Strategy::LoadBalanced => LOAD_BALANCED,
        };
        f.write_str(tag)
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag.to_ascii_lowercase().as_str() {
            ORDERED => Ok(Strategy::Ordered),
            RANDOM => Ok(Strategy::Random),
            LOAD_BALANCED => Ok(Strategy::LoadBalanced),
            _ => Err(format!(
                "unknown strategy {tag:?}, expect one of {ORDERED}, {RANDOM}, {LOAD_BALANCED}"
            )),
        }
    }
}

/// A strategy together with the state it keeps for one group.
#[derive(Debug, Clone)]
pub enum Selector {
    Ordered,
    Random,
    LoadBalanced(Arc<LoadTable>),
}

impl Selector {
    /// `child_ids` are the identities of the group's children, in
    /// configured order.
    pub fn new<I, S>(strategy: Strategy, child_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match strategy {
            Strategy::Ordered => Selector::Ordered,
            Strategy::Random => Selector::Random,
            Strategy::LoadBalanced => Selector::LoadBalanced(Arc::new(LoadTable::new(child_ids))),
        }
    }

    #[inline]
    pub fn strategy(&self) -> Strategy {
        match self {
            Selector::Ordered => Strategy::Ordered,
            Selector::Random => Strategy::Random,
            Selector::LoadBalanced(_) => Strategy::LoadBalanced,
        }
    }

    /// The load table, only present for load-balanced groups.
    #[inline]
    pub fn load(&self) -> Option<&Arc<LoadTable>> {
        match self {
            Selector::LoadBalanced(table) => Some(table),
            _ => None,
        }
    }

    /// Positions `0..count` in the order this dispatch should try them,
    /// `count` must be the number of children the selector was made for.
    pub fn order<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Vec<usize> {
        match self {
            Selector::Ordered => (0..count).collect(),
            Selector::Random => {
                let mut order: Vec<usize> = (0..count).collect();
                order.shuffle(rng);
                order
            }
            Selector::LoadBalanced(table) => table.order(),
        }
    }
}
