// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::{BTreeSet, HashMap, VecDeque};

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::context::RequestContext;
use crate::error::AuthzError;
use crate::registry::Visibility;
use crate::types::OrgId;

/// Parent/child relationships between organizations.
#[async_trait]
pub trait OrgHierarchy: Send + Sync {
	async fn parent_of(&self, ctx: &RequestContext, org_id: OrgId) -> Result<Option<OrgId>, AuthzError>;

	async fn children_of(&self, ctx: &RequestContext, org_id: OrgId) -> Result<Vec<OrgId>, AuthzError>;
}

/// A fixed organization forest.
#[derive(Debug, Clone, Default)]
pub struct StaticOrgHierarchy {
	parents: HashMap<OrgId, OrgId>,
	children: HashMap<OrgId, Vec<OrgId>>,
}

impl StaticOrgHierarchy {
	pub fn new() -> Self {
		Self::default()
	}

	/// Builder: record `parent` as the parent of `child`, replacing any previous parent.
	pub fn with_parent(mut self, child: OrgId, parent: OrgId) -> Self {
		if let Some(old) = self.parents.insert(child, parent) {
			if let Some(siblings) = self.children.get_mut(&old) {
				siblings.retain(|c| *c != child);
			}
		}
		self.children.entry(parent).or_default().push(child);
		self
	}
}

#[async_trait]
impl OrgHierarchy for StaticOrgHierarchy {
	async fn parent_of(&self, _ctx: &RequestContext, org_id: OrgId) -> Result<Option<OrgId>, AuthzError> {
		Ok(self.parents.get(&org_id).copied())
	}

	async fn children_of(&self, _ctx: &RequestContext, org_id: OrgId) -> Result<Vec<OrgId>, AuthzError> {
		Ok(self.children.get(&org_id).cloned().unwrap_or_default())
	}
}

/// Expands `orgs` to every organization visible under `visibility`.
///
/// The walk keeps a visited set, so malformed data containing cycles still
/// terminates, and it visits every level rather than stopping at a fixed depth.
#[instrument(level = "debug", skip(hierarchy, ctx, orgs), fields(seeds = orgs.len()))]
pub async fn org_closure(
	hierarchy: &dyn OrgHierarchy,
	ctx: &RequestContext,
	orgs: &BTreeSet<OrgId>,
	visibility: Visibility,
) -> Result<BTreeSet<OrgId>, AuthzError> {
	let mut closure = orgs.clone();

	if visibility.includes_ancestors() {
		for org in orgs {
			let mut current = *org;
			let mut seen = BTreeSet::from([current]);
			while let Some(parent) = hierarchy.parent_of(ctx, current).await? {
				if !seen.insert(parent) {
					break;
				}
				closure.insert(parent);
				current = parent;
			}
		}
	}

	if visibility.includes_descendants() {
		let mut queue: VecDeque<OrgId> = orgs.iter().copied().collect();
		let mut seen: BTreeSet<OrgId> = orgs.clone();
		while let Some(org) = queue.pop_front() {
			for child in hierarchy.children_of(ctx, org).await? {
				if seen.insert(child) {
					closure.insert(child);
					queue.push_back(child);
				}
			}
		}
	}

	debug!(size = closure.len(), "Resolved organization closure");
	Ok(closure)
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	fn orgs(n: usize) -> Vec<OrgId> {
		(0..n).map(|_| OrgId::generate()).collect()
	}

	/// root -> mid -> leaf, root -> other
	fn tree() -> (StaticOrgHierarchy, Vec<OrgId>) {
		let ids = orgs(4);
		let hierarchy = StaticOrgHierarchy::new()
			.with_parent(ids[1], ids[0])
			.with_parent(ids[2], ids[1])
			.with_parent(ids[3], ids[0]);
		(hierarchy, ids)
	}

	#[tokio::test]
	async fn own_org_does_not_walk() {
		let (hierarchy, ids) = tree();
		let seeds = BTreeSet::from([ids[1]]);
		let closure = org_closure(&hierarchy, &RequestContext::new(), &seeds, Visibility::OwnOrg)
			.await
			.unwrap();
		assert_eq!(closure, seeds);
	}

	#[tokio::test]
	async fn ancestors_walk_to_root() {
		let (hierarchy, ids) = tree();
		let closure = org_closure(
			&hierarchy,
			&RequestContext::new(),
			&BTreeSet::from([ids[2]]),
			Visibility::WithAncestors,
		)
		.await
		.unwrap();
		assert_eq!(closure, BTreeSet::from([ids[0], ids[1], ids[2]]));
	}

	#[tokio::test]
	async fn descendants_cover_every_level() {
		let (hierarchy, ids) = tree();
		let closure = org_closure(
			&hierarchy,
			&RequestContext::new(),
			&BTreeSet::from([ids[0]]),
			Visibility::WithDescendants,
		)
		.await
		.unwrap();
		assert_eq!(closure, ids.iter().copied().collect());
	}

	#[tokio::test]
	async fn cycles_terminate() {
		let ids = orgs(3);
		let hierarchy = StaticOrgHierarchy::new()
			.with_parent(ids[1], ids[0])
			.with_parent(ids[2], ids[1])
			.with_parent(ids[0], ids[2]);
		let closure = org_closure(
			&hierarchy,
			&RequestContext::new(),
			&BTreeSet::from([ids[0]]),
			Visibility::Hierarchy,
		)
		.await
		.unwrap();
		assert_eq!(closure.len(), 3);
	}

	/// Random forest: each org after the first may pick an earlier org as parent.
	fn arb_forest() -> impl Strategy<Value = Vec<Option<usize>>> {
		(1usize..12).prop_flat_map(|n| {
			(0..n)
				.map(|i| {
					if i == 0 {
						Just(None).boxed()
					} else {
						prop::option::of(0..i).boxed()
					}
				})
				.collect::<Vec<_>>()
		})
	}

	fn reference_closure(
		parents: &[Option<usize>],
		seeds: &BTreeSet<usize>,
		visibility: Visibility,
	) -> BTreeSet<usize> {
		let mut out = seeds.clone();
		if visibility.includes_ancestors() {
			for &s in seeds {
				let mut cur = s;
				while let Some(p) = parents[cur] {
					out.insert(p);
					cur = p;
				}
			}
		}
		if visibility.includes_descendants() {
			for node in 0..parents.len() {
				if is_descendant_of_seed(parents, node, seeds) {
					out.insert(node);
				}
			}
		}
		out
	}

	fn is_descendant_of_seed(parents: &[Option<usize>], mut node: usize, seeds: &BTreeSet<usize>) -> bool {
		loop {
			if seeds.contains(&node) {
				return true;
			}
			match parents[node] {
				Some(p) => node = p,
				None => return false,
			}
		}
	}

	fn arb_visibility() -> impl Strategy<Value = Visibility> {
		prop_oneof![
			Just(Visibility::OwnOrg),
			Just(Visibility::WithAncestors),
			Just(Visibility::WithDescendants),
			Just(Visibility::Hierarchy),
		]
	}

	proptest! {
		#[test]
		fn closure_matches_reference_walk(
			parents in arb_forest(),
			seed_bits in prop::collection::vec(any::<bool>(), 12),
			visibility in arb_visibility(),
		) {
			let ids = orgs(parents.len());
			let mut hierarchy = StaticOrgHierarchy::new();
			for (child, parent) in parents.iter().enumerate() {
				if let Some(p) = parent {
					hierarchy = hierarchy.with_parent(ids[child], ids[*p]);
				}
			}
			let seeds: BTreeSet<usize> = (0..parents.len()).filter(|i| seed_bits[*i]).collect();
			let seed_ids: BTreeSet<OrgId> = seeds.iter().map(|i| ids[*i]).collect();

			let closure = tokio_test::block_on(org_closure(
				&hierarchy,
				&RequestContext::new(),
				&seed_ids,
				visibility,
			)).unwrap();

			let expected: BTreeSet<OrgId> = reference_closure(&parents, &seeds, visibility)
				.into_iter()
				.map(|i| ids[i])
				.collect();
			prop_assert_eq!(closure, expected);
		}
	}
}
