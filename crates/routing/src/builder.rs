//! Build a [Descriptor] tree out of a flat key/value configuration.
//!
//! A key holds either a target record
//! `target<D>address<D>total_timeout[<D>connect_timeout[<D>socket_timeout]]`
//! or a group record `group<D>strategy<D>member[<D>member]*`, where `<D>` is
//! the delimiter (`,` by default). A group member `m` of key `k` is looked up
//! as `k.m`, so trees are always acyclic.
//!
//! ## Example
//! ```rust
//! use std::collections::HashMap;
//! use routing::prelude::*;
//!
//! let config: HashMap<&str, &str> = [
//!     ("server", "group|loadbalanced|t1|t2"),
//!     ("server.t1", "target|http://10.0.0.1:80|500"),
//!     ("server.t2", "target|http://10.0.0.2:80|500"),
//! ].into_iter().collect();
//!
//! let root = DescriptorBuilder::new(BuilderConfig::with_delimiter('|'))
//!     .build(&config, "server")
//!     .unwrap();
//! assert_eq!(root.endpoint_count(), 2);
//! ```

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    hash::BuildHasher,
};

use crate::{
    descriptor::{endpoint::Endpoint, group::Group, Descriptor},
    error::DescriptorError,
    strategy::Strategy,
};

pub const TARGET_DESCRIPTOR_TYPE: &str = "target";
pub const GROUP_DESCRIPTOR_TYPE: &str = "group";
pub const DEFAULT_DELIMITER: char = ',';

/// Where the builder reads records from.
pub trait ConfigSource {
    fn lookup(&self, key: &str) -> Option<&str>;
}

impl<S: BuildHasher> ConfigSource for HashMap<String, String, S> {
    fn lookup(&self, key: &str) -> Option<&str> {
        self.get(key).map(String::as_str)
    }
}

impl<S: BuildHasher> ConfigSource for HashMap<&str, &str, S> {
    fn lookup(&self, key: &str) -> Option<&str> {
        self.get(key).copied()
    }
}

impl ConfigSource for BTreeMap<String, String> {
    fn lookup(&self, key: &str) -> Option<&str> {
        self.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Separates the fields of a record, fixed for a whole configuration.
    pub delimiter: char,
    /// Strip whitespace around fields, e.g. `target, http://host/, 500`.
    pub trim: bool,
}

impl BuilderConfig {
    pub fn with_delimiter(delimiter: char) -> Self {
        Self {
            delimiter,
            ..Default::default()
        }
    }
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            trim: true,
        }
    }
}

/// Parses and validates topologies, performs no I/O.
#[derive(Debug, Clone, Default)]
pub struct DescriptorBuilder {
    config: BuilderConfig,
}

/// Build the descriptor at `root_key` with the default [BuilderConfig].
pub fn build<C: ConfigSource + ?Sized>(config: &C, root_key: &str) -> Result<Descriptor, DescriptorError> {
    DescriptorBuilder::default().build(config, root_key)
}

impl DescriptorBuilder {
    pub fn new(config: BuilderConfig) -> Self {
        Self { config }
    }

    /// Build the fully resolved tree rooted at `root_key`.
    pub fn build<C: ConfigSource + ?Sized>(
        &self,
        config: &C,
        root_key: &str,
    ) -> Result<Descriptor, DescriptorError> {
        let root = self.build_key(config, root_key)?;
        vendor::debug!(
            "topology built";
            "root" => root_key,
            "group" => root.is_group(),
            "endpoints" => root.endpoint_count()
        );
        Ok(root)
    }

    fn build_key<C: ConfigSource + ?Sized>(&self, config: &C, key: &str) -> Result<Descriptor, DescriptorError> {
        let value = config
            .lookup(key)
            .ok_or_else(|| DescriptorError::missing(key))?;
        let fields = self.split(value);

        match fields.first().copied() {
            Some(TARGET_DESCRIPTOR_TYPE) => self.build_target(key, value, &fields[1..]),
            Some(GROUP_DESCRIPTOR_TYPE) => self.build_group(config, key, value, &fields[1..]),
            Some("") | None => Err(DescriptorError::invalid(key, value, "empty descriptor")),
            Some(other) => Err(DescriptorError::invalid(
                key,
                value,
                format!(
                    "unknown descriptor type {other:?}, expect {TARGET_DESCRIPTOR_TYPE} or {GROUP_DESCRIPTOR_TYPE}"
                ),
            )),
        }
    }

    fn split<'a>(&self, value: &'a str) -> Vec<&'a str> {
        value
            .split(self.config.delimiter)
            .map(|field| if self.config.trim { field.trim() } else { field })
            .collect()
    }

    fn build_target(&self, key: &str, value: &str, fields: &[&str]) -> Result<Descriptor, DescriptorError> {
        let address = match fields.first() {
            Some(address) if !address.is_empty() => *address,
            _ => return Err(DescriptorError::invalid(key, value, "target requires an address")),
        };
        if fields.len() > 4 {
            return Err(DescriptorError::invalid(
                key,
                value,
                "too many fields, expect address, total, connect and socket time-outs at most",
            ));
        }

        let timeout = |idx: usize, name: &str| -> Result<Option<u64>, DescriptorError> {
            match fields.get(idx) {
                None => Ok(None),
                Some(raw) => raw.parse::<u64>().map(Some).map_err(|_| {
                    DescriptorError::invalid(
                        key,
                        value,
                        format!("{name} time-out {raw:?} is not a non-negative integer"),
                    )
                }),
            }
        };
        let total = timeout(1, "total")?.unwrap_or(0);
        let connect = timeout(2, "connect")?.unwrap_or(total);
        let socket = timeout(3, "socket")?.unwrap_or(total);

        Ok(Endpoint::new(key, address, total, connect, socket)?.into())
    }

    fn build_group<C: ConfigSource + ?Sized>(
        &self,
        config: &C,
        key: &str,
        value: &str,
        fields: &[&str],
    ) -> Result<Descriptor, DescriptorError> {
        let strategy = match fields.first() {
            Some(tag) => tag
                .parse::<Strategy>()
                .map_err(|reason| DescriptorError::invalid(key, value, reason))?,
            None => return Err(DescriptorError::invalid(key, value, "group requires a strategy")),
        };

        let members = &fields[1..];
        if members.is_empty() || members.iter().any(|m| m.is_empty()) {
            return Err(DescriptorError::invalid(
                key,
                value,
                "group must have at least one member",
            ));
        }

        let mut seen = HashSet::with_capacity(members.len());
        let mut children = Vec::with_capacity(members.len());
        for member in members {
            if !seen.insert(*member) {
                return Err(DescriptorError::invalid(
                    key,
                    value,
                    format!("member {member:?} listed more than once"),
                ));
            }
            let member_key = format!("{key}.{member}");
            let child = self.build_key(config, &member_key).map_err(|e| match e {
                // an unresolved member makes the group itself invalid.
                DescriptorError::Missing { key: missing } if missing == member_key => {
                    DescriptorError::invalid(key, value, format!("member {member:?} has no entry {member_key:?}"))
                }
                other => other,
            })?;
            children.push(child);
        }

        let group = Group::new(key, strategy, children).map_err(|_| {
            DescriptorError::invalid(key, value, "group must have at least one member")
        })?;
        Ok(group.into())
    }
}
