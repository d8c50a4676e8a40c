//! Restriction policy: key paths remote clients may never modify.
//!
//! The policy mirrors the configuration tree; `true` leaves are forbidden keys.
//! The receiving side's filter is authoritative, the sender only uses it to warn early.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::tree::{render_path, AddressableConfig, ConfigPayload, ConfigTree, Namespace, PATH_SEPARATOR};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RestrictionNode {
	Leaf(bool),
	Branch(BTreeMap<String, RestrictionNode>),
}

impl RestrictionNode {
	/// Whether any `true` leaf sits at or below this node.
	pub fn has_restrictions(&self) -> bool {
		match self {
			RestrictionNode::Leaf(restricted) => *restricted,
			RestrictionNode::Branch(children) => children.values().any(RestrictionNode::has_restrictions),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RestrictionPolicy(BTreeMap<String, RestrictionNode>);

impl Default for RestrictionPolicy {
	/// `params.batch_size` may not change while a run is in flight.
	fn default() -> Self {
		let params = BTreeMap::from([("batch_size".to_string(), RestrictionNode::Leaf(true))]);
		Self(BTreeMap::from([("params".to_string(), RestrictionNode::Branch(params))]))
	}
}

impl RestrictionPolicy {
	/// A policy that restricts nothing.
	pub fn unrestricted() -> Self { Self(BTreeMap::new()) }

	pub fn from_nodes(nodes: BTreeMap<String, RestrictionNode>) -> Self { Self(nodes) }

	pub fn nodes(&self) -> &BTreeMap<String, RestrictionNode> { &self.0 }

	/// Builder helper: mark `path` restricted, creating branches as needed.
	pub fn restrict(mut self, path: &[&str]) -> Self {
		insert_restriction(&mut self.0, path);
		self
	}
}

fn insert_restriction(nodes: &mut BTreeMap<String, RestrictionNode>, path: &[&str]) {
	match path {
		[] => {}
		[last] => {
			nodes.insert(last.to_string(), RestrictionNode::Leaf(true));
		}
		[first, rest @ ..] => {
			let entry = nodes.entry(first.to_string()).or_insert_with(|| RestrictionNode::Branch(BTreeMap::new()));
			if !matches!(entry, RestrictionNode::Branch(_)) {
				*entry = RestrictionNode::Branch(BTreeMap::new());
			}
			if let RestrictionNode::Branch(children) = entry {
				insert_restriction(children, rest);
			}
		}
	}
}

/// Strip every restricted key from `tree` in place, returning the removed paths as `a->b->c`.
pub fn filter<C: AddressableConfig + ?Sized>(tree: &mut C, policy: &RestrictionPolicy) -> Vec<String> {
	let mut removed = Vec::new();
	let mut path = Vec::new();
	filter_nodes(tree, &policy.0, &mut path, &mut removed);
	removed
}

/// Same as [`filter`], with the policy's top level addressing the payload's namespaces.
pub fn filter_payload(payload: &mut ConfigPayload, policy: &RestrictionPolicy) -> Vec<String> {
	let mut removed = Vec::new();
	for (key, node) in &policy.0 {
		let Ok(ns) = key.parse::<Namespace>() else {
			debug!(key = %key, "restriction names no known namespace");
			continue;
		};
		let tree = payload.namespace_mut(ns);
		match node {
			RestrictionNode::Leaf(true) if !tree.is_empty() => {
				*tree = ConfigTree::new();
				removed.push(ns.as_str().to_string());
			}
			RestrictionNode::Leaf(_) => {}
			RestrictionNode::Branch(children) => {
				let mut inner = Vec::new();
				filter_nodes(tree, children, &mut Vec::new(), &mut inner);
				removed.extend(inner.into_iter().map(|p| format!("{ns}{PATH_SEPARATOR}{p}")));
			}
		}
	}
	removed
}

fn filter_nodes<C: AddressableConfig + ?Sized>(
	config: &mut C,
	policy: &BTreeMap<String, RestrictionNode>,
	path: &mut Vec<String>,
	removed: &mut Vec<String>,
) {
	for (key, node) in policy {
		path.push(key.clone());
		let keys: Vec<&str> = path.iter().map(String::as_str).collect();
		match node {
			RestrictionNode::Leaf(true) => {
				if config.remove_path(&keys).is_some() {
					removed.push(render_path(&keys));
				}
			}
			RestrictionNode::Leaf(false) => {}
			RestrictionNode::Branch(children) => {
				if matches!(config.get_path(&keys), Some(Value::Object(_))) {
					filter_nodes(config, children, path, removed);
				}
			}
		}
		path.pop();
	}
}

/// Human-readable notice for the paths removed from one epoch's request.
pub fn restriction_notice(epoch: &impl fmt::Display, removed: &[String]) -> Option<String> {
	if removed.is_empty() {
		return None;
	}
	Some(format!("The following variables in epoch {epoch} are restricted: {}.", removed.join(", ")))
}
