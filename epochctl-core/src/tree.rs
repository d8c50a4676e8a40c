//! Addressable configuration trees.
//!
//! A [`ConfigTree`] is an ordered JSON object. Everything that reads or writes
//! live configuration goes through [`AddressableConfig`], so the scheduler never
//! needs to know how the host stores its values.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result};

/// Separator used when rendering key paths for humans (`params->batch_size`).
pub const PATH_SEPARATOR: &str = "->";

/// Render a key path as `a->b->c`.
pub fn render_path<S: AsRef<str>>(path: &[S]) -> String {
	path.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(PATH_SEPARATOR)
}

/// Get/set/delete by key path. `set_path` only overwrites existing leaves and never creates keys.
pub trait AddressableConfig {
	fn get_path(&self, path: &[&str]) -> Option<&Value>;
	/// Overwrite an existing value, returning the previous one. Absent paths are left untouched.
	fn set_path(&mut self, path: &[&str], value: Value) -> Option<Value>;
	fn remove_path(&mut self, path: &[&str]) -> Option<Value>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigTree(Map<String, Value>);

impl ConfigTree {
	pub fn new() -> Self { Self(Map::new()) }

	/// Build from a JSON value, which must be an object.
	pub fn from_value(value: Value) -> Result<Self> {
		match value {
			Value::Object(map) => Ok(Self(map)),
			other => Err(Error::config(format!("expected a mapping, got {}", json_kind(&other)))),
		}
	}

	pub fn is_empty(&self) -> bool { self.0.is_empty() }
	pub fn len(&self) -> usize { self.0.len() }
	pub fn as_map(&self) -> &Map<String, Value> { &self.0 }
	pub fn as_map_mut(&mut self) -> &mut Map<String, Value> { &mut self.0 }

	pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
		self.0.insert(key.into(), value)
	}

	pub fn get(&self, key: &str) -> Option<&Value> { self.0.get(key) }
}

impl From<Map<String, Value>> for ConfigTree {
	fn from(map: Map<String, Value>) -> Self { Self(map) }
}

impl TryFrom<Value> for ConfigTree {
	type Error = Error;
	fn try_from(value: Value) -> Result<Self> { Self::from_value(value) }
}

impl AddressableConfig for ConfigTree {
	fn get_path(&self, path: &[&str]) -> Option<&Value> {
		let (last, parents) = path.split_last()?;
		let mut node = &self.0;
		for key in parents {
			node = node.get(*key)?.as_object()?;
		}
		node.get(*last)
	}

	fn set_path(&mut self, path: &[&str], value: Value) -> Option<Value> {
		let (last, parents) = path.split_last()?;
		let mut node = &mut self.0;
		for key in parents {
			node = node.get_mut(*key)?.as_object_mut()?;
		}
		let slot = node.get_mut(*last)?;
		Some(std::mem::replace(slot, value))
	}

	fn remove_path(&mut self, path: &[&str]) -> Option<Value> {
		let (last, parents) = path.split_last()?;
		let mut node = &mut self.0;
		for key in parents {
			node = node.get_mut(*key)?.as_object_mut()?;
		}
		node.remove(*last)
	}
}

/// Outcome of [`apply_update`]: the values that were overwritten (same shape as the
/// update, restricted to keys that actually changed) and per-key failures.
#[derive(Debug, Default)]
pub struct Applied {
	pub previous: ConfigTree,
	pub errors: Vec<Error>,
}

/// Overwrite every leaf of `update` that also exists in `live`.
///
/// Keys missing from `live` are skipped, never created. A subtree in one tree meeting a
/// non-mapping value in the other is reported as an apply error for that key; the
/// remaining keys are still applied.
pub fn apply_update<C: AddressableConfig + ?Sized>(live: &mut C, update: &ConfigTree) -> Applied {
	let mut applied = Applied::default();
	let mut path = Vec::new();
	apply_into(live, &update.0, &mut path, &mut applied.previous.0, &mut applied.errors);
	applied
}

fn apply_into<C: AddressableConfig + ?Sized>(
	live: &mut C,
	update: &Map<String, Value>,
	path: &mut Vec<String>,
	previous: &mut Map<String, Value>,
	errors: &mut Vec<Error>,
) {
	for (key, new) in update {
		path.push(key.clone());
		let keys: Vec<&str> = path.iter().map(String::as_str).collect();
		let current = live.get_path(&keys).map(|v| (v.is_object(), json_kind(v)));
		match (current, new) {
			(None, _) => debug!(path = %render_path(&keys), "skipping key absent from live config"),
			(Some((true, _)), Value::Object(upd)) => {
				let mut nested = Map::new();
				apply_into(live, upd, path, &mut nested, errors);
				if !nested.is_empty() {
					previous.insert(key.clone(), Value::Object(nested));
				}
			}
			(Some((true, _)), other) => errors.push(Error::apply(
				render_path(&keys),
				format!("cannot replace a mapping with {}", json_kind(other)),
			)),
			(Some((false, kind)), Value::Object(_)) => {
				errors.push(Error::apply(render_path(&keys), format!("live value is {kind}, not a mapping")))
			}
			(Some((false, _)), leaf) => {
				if let Some(old) = live.set_path(&keys, leaf.clone()) {
					previous.insert(key.clone(), old);
				}
			}
		}
		path.pop();
	}
}

/// Merge `changes` into `snapshot`, keeping whatever `snapshot` already holds for a path.
pub fn merge_first_write_wins(snapshot: &mut ConfigTree, changes: &ConfigTree) {
	merge_into(&mut snapshot.0, &changes.0);
}

fn merge_into(snapshot: &mut Map<String, Value>, changes: &Map<String, Value>) {
	for (key, value) in changes {
		match value {
			Value::Object(nested) => {
				let slot = snapshot.entry(key.clone()).or_insert_with(|| Value::Object(Map::new()));
				// a leaf captured earlier for this key already wins
				if let Value::Object(existing) = slot {
					merge_into(existing, nested);
				}
			}
			leaf => {
				snapshot.entry(key.clone()).or_insert_with(|| leaf.clone());
			}
		}
	}
}

fn json_kind(v: &Value) -> &'static str {
	match v {
		Value::Null => "null",
		Value::Bool(_) => "a boolean",
		Value::Number(_) => "a number",
		Value::String(_) => "a string",
		Value::Array(_) => "an array",
		Value::Object(_) => "a mapping",
	}
}

/// The four top-level namespaces of the controlled computation's configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
	Callbacks,
	Model,
	Params,
	Metrics,
}

impl Namespace {
	pub const ALL: [Namespace; 4] = [Namespace::Callbacks, Namespace::Model, Namespace::Params, Namespace::Metrics];

	pub fn as_str(&self) -> &'static str {
		match self {
			Namespace::Callbacks => "callbacks",
			Namespace::Model => "model",
			Namespace::Params => "params",
			Namespace::Metrics => "metrics",
		}
	}
}

impl fmt::Display for Namespace {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Namespace {
	type Err = Error;
	fn from_str(s: &str) -> Result<Self> {
		Namespace::ALL
			.into_iter()
			.find(|ns| ns.as_str() == s)
			.ok_or_else(|| Error::config(format!("unknown namespace: {s}")))
	}
}

/// A configuration delta addressed by namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigPayload {
	#[serde(default)]
	pub callbacks: ConfigTree,
	#[serde(default)]
	pub model: ConfigTree,
	#[serde(default)]
	pub params: ConfigTree,
	#[serde(default)]
	pub metrics: ConfigTree,
}

impl ConfigPayload {
	pub fn new() -> Self { Self::default() }

	/// Builder-style setter for one namespace.
	pub fn with(mut self, ns: Namespace, tree: ConfigTree) -> Self {
		*self.namespace_mut(ns) = tree;
		self
	}

	pub fn namespace(&self, ns: Namespace) -> &ConfigTree {
		match ns {
			Namespace::Callbacks => &self.callbacks,
			Namespace::Model => &self.model,
			Namespace::Params => &self.params,
			Namespace::Metrics => &self.metrics,
		}
	}

	pub fn namespace_mut(&mut self, ns: Namespace) -> &mut ConfigTree {
		match ns {
			Namespace::Callbacks => &mut self.callbacks,
			Namespace::Model => &mut self.model,
			Namespace::Params => &mut self.params,
			Namespace::Metrics => &mut self.metrics,
		}
	}

	pub fn is_empty(&self) -> bool { Namespace::ALL.iter().all(|ns| self.namespace(*ns).is_empty()) }

	/// Non-empty namespaces in fixed order.
	pub fn iter(&self) -> impl Iterator<Item = (Namespace, &ConfigTree)> {
		Namespace::ALL.into_iter().map(|ns| (ns, self.namespace(ns))).filter(|(_, t)| !t.is_empty())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn tree(v: Value) -> ConfigTree {
		ConfigTree::from_value(v).unwrap()
	}

	#[test]
	fn set_path_never_creates() {
		let mut t = tree(json!({"optimizer": {"lr": 0.1}}));
		assert_eq!(t.set_path(&["optimizer", "lr"], json!(0.2)), Some(json!(0.1)));
		assert_eq!(t.set_path(&["optimizer", "momentum"], json!(0.9)), None);
		assert_eq!(t.set_path(&["missing", "lr"], json!(0.9)), None);
		assert_eq!(t, tree(json!({"optimizer": {"lr": 0.2}})));
	}

	#[test]
	fn get_and_remove_by_path() {
		let mut t = tree(json!({"a": {"b": {"c": 1}}, "d": 2}));
		assert_eq!(t.get_path(&["a", "b", "c"]), Some(&json!(1)));
		assert_eq!(t.get_path(&["d", "x"]), None);
		assert_eq!(t.remove_path(&["a", "b", "c"]), Some(json!(1)));
		assert_eq!(t.get_path(&["a", "b"]), Some(&json!({})));
		assert_eq!(t.remove_path(&[]), None);
	}

	#[test]
	fn apply_returns_previous_values_only_for_changed_leaves() {
		let mut live = tree(json!({"optimizer": {"lr": 0.001, "decay": 0.0}, "epochs": 10}));
		let upd = tree(json!({"optimizer": {"lr": 0.01, "unknown": 1}, "nope": {"x": 1}}));
		let applied = apply_update(&mut live, &upd);
		assert!(applied.errors.is_empty());
		assert_eq!(applied.previous, tree(json!({"optimizer": {"lr": 0.001}})));
		assert_eq!(live, tree(json!({"optimizer": {"lr": 0.01, "decay": 0.0}, "epochs": 10})));
	}

	#[test]
	fn shape_mismatch_is_per_key() {
		let mut live = tree(json!({"optimizer": {"lr": 0.1}, "epochs": 10, "verbose": false}));
		let upd = tree(json!({"optimizer": 3, "epochs": {"x": 1}, "verbose": true}));
		let applied = apply_update(&mut live, &upd);
		assert_eq!(applied.errors.len(), 2);
		assert_eq!(live.get("verbose"), Some(&json!(true)));
		assert_eq!(live.get("epochs"), Some(&json!(10)));
		assert_eq!(applied.previous, tree(json!({"verbose": false})));
	}

	/// Host-side store that records every write it receives.
	struct Recording {
		inner: ConfigTree,
		writes: Vec<String>,
	}

	impl AddressableConfig for Recording {
		fn get_path(&self, path: &[&str]) -> Option<&Value> { self.inner.get_path(path) }

		fn set_path(&mut self, path: &[&str], value: Value) -> Option<Value> {
			self.writes.push(render_path(path));
			self.inner.set_path(path, value)
		}

		fn remove_path(&mut self, path: &[&str]) -> Option<Value> {
			self.writes.push(format!("-{}", render_path(path)));
			self.inner.remove_path(path)
		}
	}

	#[test]
	fn apply_writes_through_the_path_interface() {
		let mut live = Recording { inner: tree(json!({"optimizer": {"lr": 0.1, "decay": 0.0}, "epochs": 1})), writes: vec![] };
		let applied = apply_update(&mut live, &tree(json!({"optimizer": {"lr": 0.2}, "epochs": 4, "absent": 1})));
		assert!(applied.errors.is_empty());
		assert_eq!(live.writes, vec!["optimizer->lr".to_string(), "epochs".to_string()]);
		assert_eq!(live.inner, tree(json!({"optimizer": {"lr": 0.2, "decay": 0.0}, "epochs": 4})));
		assert_eq!(applied.previous, tree(json!({"optimizer": {"lr": 0.1}, "epochs": 1})));
	}

	#[test]
	fn first_write_wins_keeps_earliest_original() {
		let mut snap = ConfigTree::new();
		merge_first_write_wins(&mut snap, &tree(json!({"optimizer": {"lr": 0.001}})));
		merge_first_write_wins(&mut snap, &tree(json!({"optimizer": {"lr": 0.5, "decay": 0.1}, "epochs": 3})));
		assert_eq!(snap, tree(json!({"optimizer": {"lr": 0.001, "decay": 0.1}, "epochs": 3})));
	}

	#[test]
	fn payload_rejects_unknown_namespace() {
		let err = serde_json::from_value::<ConfigPayload>(json!({"params": {}, "optim": {}}));
		assert!(err.is_err());
		let ok: ConfigPayload = serde_json::from_value(json!({"params": {"lr": 1}})).unwrap();
		assert_eq!(ok.iter().map(|(ns, _)| ns).collect::<Vec<_>>(), vec![Namespace::Params]);
	}

	#[test]
	fn namespace_parse_roundtrip() {
		for ns in Namespace::ALL {
			assert_eq!(ns.as_str().parse::<Namespace>().unwrap(), ns);
		}
		assert!("optimizer".parse::<Namespace>().is_err());
	}
}
