//! Typed expert/taxonomy graph
//!
//! Experts link to Domain, Field and Skill nodes through HAS_DOMAIN,
//! HAS_FIELD and HAS_SKILL edges. Edges are traversable in both directions.

use crate::error::{Result, ScholarError};
use crate::storage::Database;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Domain,
    Field,
    Skill,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Domain => "domain",
            NodeKind::Field => "field",
            NodeKind::Skill => "skill",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = ScholarError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "domain" => Ok(NodeKind::Domain),
            "field" => Ok(NodeKind::Field),
            "skill" => Ok(NodeKind::Skill),
            other => Err(ScholarError::Graph(format!("Unknown node kind: {}", other))),
        }
    }
}

/// A taxonomy category. Names are matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaxonomyNode {
    pub kind: NodeKind,
    pub name: String,
}

impl TaxonomyNode {
    pub fn new(kind: NodeKind, name: &str) -> Self {
        Self {
            kind,
            name: normalize_name(name),
        }
    }
}

fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expert {
    pub id: String,
    pub name: String,
}

/// An expert with their categories, as imported
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpertProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub skills: Vec<String>,
}

impl ExpertProfile {
    pub fn nodes(&self) -> Vec<TaxonomyNode> {
        let mut nodes = BTreeSet::new();
        for (kind, names) in [
            (NodeKind::Domain, &self.domains),
            (NodeKind::Field, &self.fields),
            (NodeKind::Skill, &self.skills),
        ] {
            for name in names {
                let node = TaxonomyNode::new(kind, name);
                if !node.name.is_empty() {
                    nodes.insert(node);
                }
            }
        }
        nodes.into_iter().collect()
    }
}

/// Number of nodes of each kind shared with some other expert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SharedCounts {
    pub domains: u32,
    pub fields: u32,
    pub skills: u32,
}

impl SharedCounts {
    pub fn add(&mut self, kind: NodeKind, n: u32) {
        match kind {
            NodeKind::Domain => self.domains += n,
            NodeKind::Field => self.fields += n,
            NodeKind::Skill => self.skills += n,
        }
    }
}

/// Read access to the expert/taxonomy graph
pub trait TaxonomySource: Send + Sync {
    fn expert(&self, id: &str) -> Result<Option<Expert>>;

    /// Nodes reachable from an expert
    fn nodes_of(&self, expert_id: &str) -> Result<Vec<TaxonomyNode>>;

    /// Experts reachable from a node
    fn experts_with(&self, node: &TaxonomyNode) -> Result<Vec<String>>;

    /// Per-expert counts of how many of `nodes` each expert links to,
    /// `exclude` left out
    fn matching_node_counts(
        &self,
        nodes: &[TaxonomyNode],
        exclude: &str,
    ) -> Result<HashMap<String, SharedCounts>> {
        let mut counts: HashMap<String, SharedCounts> = HashMap::new();
        for node in nodes {
            for expert_id in self.experts_with(node)? {
                if expert_id != exclude {
                    counts.entry(expert_id).or_default().add(node.kind, 1);
                }
            }
        }
        Ok(counts)
    }

    /// Counts of nodes each other expert shares with `expert_id`
    fn shared_node_counts(&self, expert_id: &str) -> Result<HashMap<String, SharedCounts>> {
        let nodes = self.nodes_of(expert_id)?;
        self.matching_node_counts(&nodes, expert_id)
    }
}

/// In-memory graph with adjacency in both directions
#[derive(Debug, Default, Clone)]
pub struct TaxonomyGraph {
    experts: BTreeMap<String, Expert>,
    expert_nodes: HashMap<String, BTreeSet<TaxonomyNode>>,
    node_experts: HashMap<TaxonomyNode, BTreeSet<String>>,
}

impl TaxonomyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_expert(&mut self, id: &str, name: &str) {
        self.experts.insert(
            id.to_string(),
            Expert {
                id: id.to_string(),
                name: name.to_string(),
            },
        );
        self.expert_nodes.entry(id.to_string()).or_default();
    }

    /// Add an edge from an existing expert to a node, creating the node
    pub fn link(&mut self, expert_id: &str, kind: NodeKind, name: &str) -> Result<()> {
        if !self.experts.contains_key(expert_id) {
            return Err(ScholarError::ExpertNotFound {
                id: expert_id.to_string(),
            });
        }
        let node = TaxonomyNode::new(kind, name);
        if node.name.is_empty() {
            return Err(ScholarError::Graph("Node name must not be empty".to_string()));
        }
        self.expert_nodes
            .entry(expert_id.to_string())
            .or_default()
            .insert(node.clone());
        self.node_experts
            .entry(node)
            .or_default()
            .insert(expert_id.to_string());
        Ok(())
    }

    pub fn add_profile(&mut self, profile: &ExpertProfile) {
        self.add_expert(&profile.id, &profile.name);
        for node in profile.nodes() {
            self.expert_nodes
                .entry(profile.id.clone())
                .or_default()
                .insert(node.clone());
            self.node_experts
                .entry(node)
                .or_default()
                .insert(profile.id.clone());
        }
    }

    pub fn expert_count(&self) -> usize {
        self.experts.len()
    }

    pub fn node_count(&self) -> usize {
        self.node_experts.len()
    }
}

impl TaxonomySource for TaxonomyGraph {
    fn expert(&self, id: &str) -> Result<Option<Expert>> {
        Ok(self.experts.get(id).cloned())
    }

    fn nodes_of(&self, expert_id: &str) -> Result<Vec<TaxonomyNode>> {
        Ok(self
            .expert_nodes
            .get(expert_id)
            .map(|nodes| nodes.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn experts_with(&self, node: &TaxonomyNode) -> Result<Vec<String>> {
        Ok(self
            .node_experts
            .get(node)
            .map(|experts| experts.iter().cloned().collect())
            .unwrap_or_default())
    }
}

/// Graph backed by the `experts`, `taxonomy_nodes` and `expert_taxonomy`
/// tables
#[derive(Clone)]
pub struct SqliteTaxonomyStore {
    db: Database,
}

impl SqliteTaxonomyStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert or update an expert and add its edges. Existing edges are kept.
    pub fn upsert_profile(&self, profile: &ExpertProfile) -> Result<()> {
        if profile.id.trim().is_empty() {
            return Err(ScholarError::Graph("Expert id must not be empty".to_string()));
        }

        let mut conn = self.db.get_conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO experts (id, name) VALUES (?1, ?2)
             ON CONFLICT (id) DO UPDATE SET name = excluded.name",
            params![profile.id, profile.name],
        )?;

        {
            let mut insert_node = tx.prepare_cached(
                "INSERT OR IGNORE INTO taxonomy_nodes (kind, name) VALUES (?1, ?2)",
            )?;
            let mut node_id =
                tx.prepare_cached("SELECT id FROM taxonomy_nodes WHERE kind = ?1 AND name = ?2")?;
            let mut link = tx.prepare_cached(
                "INSERT OR IGNORE INTO expert_taxonomy (expert_id, node_id) VALUES (?1, ?2)",
            )?;

            for node in profile.nodes() {
                insert_node.execute(params![node.kind.as_str(), node.name])?;
                let id: i64 =
                    node_id.query_row(params![node.kind.as_str(), node.name], |row| row.get(0))?;
                link.execute(params![profile.id, id])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    pub fn expert_count(&self) -> Result<usize> {
        let conn = self.db.get_conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM experts", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

impl TaxonomySource for SqliteTaxonomyStore {
    fn expert(&self, id: &str) -> Result<Option<Expert>> {
        let conn = self.db.get_conn()?;
        let expert = conn
            .query_row(
                "SELECT id, name FROM experts WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Expert {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(expert)
    }

    fn nodes_of(&self, expert_id: &str) -> Result<Vec<TaxonomyNode>> {
        let conn = self.db.get_conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT n.kind, n.name FROM expert_taxonomy et
             JOIN taxonomy_nodes n ON n.id = et.node_id
             WHERE et.expert_id = ?1
             ORDER BY n.kind, n.name",
        )?;
        let rows = stmt.query_map(params![expert_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut nodes = Vec::new();
        for row in rows {
            let (kind, name) = row?;
            nodes.push(TaxonomyNode {
                kind: kind.parse()?,
                name,
            });
        }
        Ok(nodes)
    }

    fn experts_with(&self, node: &TaxonomyNode) -> Result<Vec<String>> {
        let conn = self.db.get_conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT et.expert_id FROM expert_taxonomy et
             JOIN taxonomy_nodes n ON n.id = et.node_id
             WHERE n.kind = ?1 AND n.name = ?2
             ORDER BY et.expert_id",
        )?;
        let rows = stmt.query_map(params![node.kind.as_str(), node.name], |row| row.get(0))?;

        let mut experts = Vec::new();
        for row in rows {
            experts.push(row?);
        }
        Ok(experts)
    }

    fn shared_node_counts(&self, expert_id: &str) -> Result<HashMap<String, SharedCounts>> {
        let conn = self.db.get_conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT other.expert_id, n.kind, COUNT(*)
             FROM expert_taxonomy source
             JOIN expert_taxonomy other ON other.node_id = source.node_id
             JOIN taxonomy_nodes n ON n.id = source.node_id
             WHERE source.expert_id = ?1 AND other.expert_id <> ?1
             GROUP BY other.expert_id, n.kind",
        )?;
        let rows = stmt.query_map(params![expert_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut counts: HashMap<String, SharedCounts> = HashMap::new();
        for row in rows {
            let (other, kind, n) = row?;
            counts
                .entry(other)
                .or_default()
                .add(kind.parse()?, n.max(0) as u32);
        }
        Ok(counts)
    }
}
