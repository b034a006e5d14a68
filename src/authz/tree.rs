use std::collections::HashMap;

use crate::authz::matcher::AdminIdentity;
use crate::authz::types::{segments, AccessRule, AdminEntity, AdminGroup, CaId, GroupId, RuleEffect};

/// Rule declared at one node of a group's resource trie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NodeRule {
    effect: RuleEffect,
    recursive: bool,
}

/// Path-segment trie of one group's rules.
#[derive(Debug, Clone, Default)]
struct RuleNode {
    rule: Option<NodeRule>,
    children: HashMap<String, RuleNode>,
}

impl RuleNode {
    fn insert(&mut self, rule: &AccessRule) {
        let mut node = self;
        for segment in segments(&rule.resource) {
            node = node.children.entry(segment.to_string()).or_default();
        }
        node.rule = Some(NodeRule {
            effect: rule.effect,
            recursive: rule.recursive,
        });
    }

    fn count(&self) -> usize {
        usize::from(self.rule.is_some()) + self.children.values().map(RuleNode::count).sum::<usize>()
    }
}

/// Whether the rule at a node (if any) grants the node itself.
fn grants_here(rule: Option<NodeRule>, inherited: bool) -> bool {
    match rule {
        Some(NodeRule { effect: RuleEffect::Accept, .. }) => true,
        Some(NodeRule { effect: RuleEffect::Decline, .. }) => false,
        None => inherited,
    }
}

/// Inherited accept state handed to the children of a node.
fn inherited_below(rule: Option<NodeRule>, inherited: bool) -> bool {
    match rule {
        Some(NodeRule { effect: RuleEffect::Accept, recursive: true }) => true,
        Some(NodeRule { effect: RuleEffect::Decline, .. }) => false,
        Some(NodeRule { effect: RuleEffect::Accept, recursive: false }) | None => inherited,
    }
}

/// One group compiled for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledGroup {
    pub id: GroupId,
    pub name: String,
    pub ca_id: CaId,
    pub entities: Vec<AdminEntity>,
    superadmin: bool,
    rules: RuleNode,
}

impl CompiledGroup {
    fn compile(group: &AdminGroup) -> Self {
        let mut rules = RuleNode::default();
        for rule in &group.rules {
            rules.insert(rule);
        }
        Self {
            id: group.id,
            name: group.name.clone(),
            ca_id: group.ca_id,
            entities: group.entities.clone(),
            superadmin: group.is_superadmin_group(),
            rules,
        }
    }

    pub fn is_superadmin(&self) -> bool {
        self.superadmin
    }

    /// A group is a candidate for an admin when any of its entities match.
    pub fn has_member(&self, admin: &AdminIdentity) -> bool {
        self.entities.iter().any(|entity| entity.matches(admin))
    }

    /// Resolve the group's rules for a resource: the most specific declared rule wins,
    /// recursive accepts flow down until a decline, and the default is deny.
    pub fn grants(&self, resource: &str) -> bool {
        if self.superadmin {
            return true;
        }

        let mut node = &self.rules;
        let mut inherited = false;
        let mut granted = grants_here(node.rule, inherited);

        for segment in segments(resource) {
            inherited = inherited_below(node.rule, inherited);
            match node.children.get(segment) {
                Some(child) => {
                    node = child;
                    granted = grants_here(node.rule, inherited);
                }
                None => return inherited,
            }
        }

        granted
    }
}

/// Compiled, immutable view of every admin group at one store version.
#[derive(Debug, Clone, Default)]
pub struct AccessTree {
    groups: Vec<CompiledGroup>,
    by_id: HashMap<GroupId, usize>,
    version: i64,
}

impl AccessTree {
    /// Compile a full group snapshot in one pass.
    pub fn build(groups: &[AdminGroup], version: i64) -> Self {
        let compiled: Vec<CompiledGroup> = groups.iter().map(CompiledGroup::compile).collect();
        let by_id = compiled
            .iter()
            .enumerate()
            .map(|(idx, group)| (group.id, idx))
            .collect();

        let tree = Self {
            groups: compiled,
            by_id,
            version,
        };

        tracing::debug!(
            groups = tree.groups.len(),
            rules = tree.rule_count(),
            version,
            "Compiled access tree"
        );

        tree
    }

    /// Empty tree used before the first successful build. Denies everything.
    pub fn empty() -> Self {
        Self {
            version: -1,
            ..Default::default()
        }
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn groups(&self) -> &[CompiledGroup] {
        &self.groups
    }

    pub fn group(&self, id: GroupId) -> Option<&CompiledGroup> {
        self.by_id.get(&id).map(|&idx| &self.groups[idx])
    }

    /// Groups the admin is a member of.
    pub fn candidate_groups<'a>(
        &'a self,
        admin: &'a AdminIdentity,
    ) -> impl Iterator<Item = &'a CompiledGroup> + 'a {
        self.groups.iter().filter(move |group| group.has_member(admin))
    }

    pub fn rule_count(&self) -> usize {
        self.groups.iter().map(|g| g.rules.count()).sum()
    }
}
