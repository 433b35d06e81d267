//! Course domain model and the prerequisite graph

use super::common::StringUuid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::{HashMap, HashSet};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Course entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Course {
    pub id: StringUuid,
    pub title: String,
    /// Primary instructor
    pub instructor_id: Option<StringUuid>,
    pub branch_id: Option<StringUuid>,
    /// Business owning `branch_id`, joined in from `branches`
    pub business_id: Option<StringUuid>,
    pub is_active: bool,
    /// Maximum number of enrollments; `None` or 0 means unlimited
    pub enrollment_capacity: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Course {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: StringUuid::new_v4(),
            title: String::new(),
            instructor_id: None,
            branch_id: None,
            business_id: None,
            is_active: true,
            enrollment_capacity: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Course {
    /// True when `enrolled` already fills the configured capacity.
    pub fn is_full(&self, enrolled: i64) -> bool {
        match self.enrollment_capacity {
            Some(capacity) if capacity > 0 => enrolled >= i64::from(capacity),
            _ => false,
        }
    }
}

/// A content item inside a course
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Topic {
    pub id: StringUuid,
    pub course_id: StringUuid,
    pub title: String,
}

/// `course_id` requires `prerequisite_id`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, FromRow)]
pub struct PrerequisiteEdge {
    pub course_id: StringUuid,
    pub prerequisite_id: StringUuid,
}

/// Input for replacing a course's prerequisite set
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UpdatePrerequisitesInput {
    #[validate(length(max = 50))]
    pub prerequisite_ids: Vec<Uuid>,
}

/// Result of replacing a course's prerequisites
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct PrerequisiteChangeReport {
    pub prerequisite_ids: Vec<StringUuid>,
    pub added: Vec<StringUuid>,
    pub removed: Vec<StringUuid>,
    pub messages: Vec<String>,
}

/// Outcome of a locked prerequisite replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrerequisiteReplacement {
    /// New set stored; `previous` is the set it replaced, read under the same lock
    Replaced { previous: Vec<StringUuid> },
    /// Nothing stored; the locked graph plus the new set contains this path
    Cyclic { path: Vec<StringUuid> },
}

impl PrerequisiteReplacement {
    /// Decide a replacement against the full edge set read under the lock.
    pub fn check(
        edges: Vec<PrerequisiteEdge>,
        course_id: StringUuid,
        prerequisite_ids: &[StringUuid],
        max_depth: usize,
    ) -> Self {
        let previous: Vec<StringUuid> = edges
            .iter()
            .filter(|e| e.course_id == course_id)
            .map(|e| e.prerequisite_id)
            .collect();

        let mut graph = PrerequisiteGraph::from_edges(edges);
        graph.set_prerequisites(course_id, prerequisite_ids);
        match graph.find_cycle(course_id, max_depth) {
            Some(path) => Self::Cyclic { path },
            None => Self::Replaced { previous },
        }
    }
}

/// One auto-enrollment the forward cascade wants to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeStep {
    /// Prerequisite course to enroll into
    pub course_id: StringUuid,
    /// Course whose prerequisite list caused the step
    pub required_by: StringUuid,
}

/// Directed graph of prerequisite edges, keyed by course id.
///
/// Edges point from a course to the courses it requires. The stored data permits
/// cycles, so every walk is bounded by an explicit depth cap.
#[derive(Debug, Clone, Default)]
pub struct PrerequisiteGraph {
    edges: HashMap<StringUuid, Vec<StringUuid>>,
}

impl PrerequisiteGraph {
    pub fn from_edges<I>(edges: I) -> Self
    where
        I: IntoIterator<Item = PrerequisiteEdge>,
    {
        let mut graph = Self::default();
        for edge in edges {
            graph.add_edge(edge.course_id, edge.prerequisite_id);
        }
        graph
    }

    pub fn add_edge(&mut self, course_id: StringUuid, prerequisite_id: StringUuid) {
        let targets = self.edges.entry(course_id).or_default();
        if !targets.contains(&prerequisite_id) {
            targets.push(prerequisite_id);
        }
    }

    /// Replace the outgoing edges of `course_id`.
    pub fn set_prerequisites(&mut self, course_id: StringUuid, prerequisite_ids: &[StringUuid]) {
        let mut deduped = Vec::with_capacity(prerequisite_ids.len());
        for id in prerequisite_ids {
            if !deduped.contains(id) {
                deduped.push(*id);
            }
        }
        self.edges.insert(course_id, deduped);
    }

    pub fn prerequisites_of(&self, course_id: StringUuid) -> &[StringUuid] {
        self.edges
            .get(&course_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_circular_dependency(&self, root: StringUuid, max_depth: usize) -> bool {
        self.find_cycle(root, max_depth).is_some()
    }

    /// Depth-first search for a path that revisits a course.
    ///
    /// The visited set is copied per branch so siblings sharing a prerequisite
    /// (a diamond) are not mistaken for a cycle. A path longer than `max_depth`
    /// is reported as cyclic as well, which guarantees termination.
    pub fn find_cycle(&self, root: StringUuid, max_depth: usize) -> Option<Vec<StringUuid>> {
        self.walk(root, &HashSet::new(), &[], 0, max_depth)
    }

    fn walk(
        &self,
        course_id: StringUuid,
        visited: &HashSet<StringUuid>,
        path: &[StringUuid],
        depth: usize,
        max_depth: usize,
    ) -> Option<Vec<StringUuid>> {
        let mut here = path.to_vec();
        here.push(course_id);

        if depth > max_depth || visited.contains(&course_id) {
            return Some(here);
        }

        let mut branch_visited = visited.clone();
        branch_visited.insert(course_id);

        self.prerequisites_of(course_id)
            .iter()
            .find_map(|next| self.walk(*next, &branch_visited, &here, depth + 1, max_depth))
    }

    /// Transitive prerequisites of `root`, deepest first.
    ///
    /// Each prerequisite appears once, attributed to the first course found to
    /// require it. Callers must run the cycle check first; the depth cap only
    /// keeps this walk finite.
    pub fn cascade_plan(&self, root: StringUuid, max_depth: usize) -> Vec<CascadeStep> {
        let mut seen = HashSet::from([root]);
        let mut steps = Vec::new();
        self.plan_from(root, 0, max_depth, &mut seen, &mut steps);
        steps
    }

    fn plan_from(
        &self,
        course_id: StringUuid,
        depth: usize,
        max_depth: usize,
        seen: &mut HashSet<StringUuid>,
        steps: &mut Vec<CascadeStep>,
    ) {
        if depth >= max_depth {
            return;
        }
        for prerequisite in self.prerequisites_of(course_id) {
            if !seen.insert(*prerequisite) {
                continue;
            }
            self.plan_from(*prerequisite, depth + 1, max_depth, seen, steps);
            steps.push(CascadeStep {
                course_id: *prerequisite,
                required_by: course_id,
            });
        }
    }
}
