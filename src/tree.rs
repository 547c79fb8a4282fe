//! Native gradient-boosted tree ensembles.
//!
//! A fold artifact in the `json` format is one boosted ensemble of regression trees.
//! Trees are stored as structure-of-arrays, one entry per node:
//!
//! ```json
//! {
//!     "num_features": 9,
//!     "schema_version": 1,
//!     "base_score": 11.5,
//!     "trees": [{
//!         "split_indices":    [6, 0, 0],
//!         "split_conditions": [2.0, 0.0, 0.0],
//!         "left_children":    [1, -1, -1],
//!         "right_children":   [2, -1, -1],
//!         "default_left":     [true, false, false],
//!         "base_weights":     [0.0, -3.0, 6.0]
//!     }]
//! }
//! ```
//!
//! A node with a negative left child is a leaf whose output is its `base_weights` entry.
//! Split nodes send `x < threshold` left, everything else right, and NaN in the
//! `default_left` direction. The ensemble output is `base_score` plus the sum of one
//! leaf per tree.

use crate::error::ConfigurationFailure;
use crate::fold::Fold;
use serde::{Deserialize, Serialize};

/// On-disk layout of a single tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeDef {
    pub split_indices: Vec<u32>,
    pub split_conditions: Vec<f32>,
    pub left_children: Vec<i32>,
    pub right_children: Vec<i32>,
    pub default_left: Vec<bool>,
    pub base_weights: Vec<f32>,
}

/// On-disk layout of a boosted ensemble.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEnsembleDef {
    pub num_features: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u32>,

    #[serde(default)]
    pub base_score: f32,

    pub trees: Vec<TreeDef>,
}

/// Validated regression tree ready for traversal.
#[derive(Debug, Clone)]
pub struct Tree {
    split_indices: Box<[u32]>,
    split_thresholds: Box<[f32]>,
    left_children: Box<[u32]>,
    right_children: Box<[u32]>,
    default_left: Box<[bool]>,
    is_leaf: Box<[bool]>,
    leaf_values: Box<[f32]>,
}

impl Tree {
    /// Validate a tree definition against the ensemble's feature count.
    ///
    /// Children must point forward (child index greater than parent index), which
    /// guarantees traversal terminates.
    pub fn from_def(def: TreeDef, num_features: usize) -> Result<Self, String> {
        let n = def.left_children.len();
        if n == 0 {
            return Err("tree has no nodes".to_string());
        }
        let lengths = [
            def.split_indices.len(),
            def.split_conditions.len(),
            def.right_children.len(),
            def.default_left.len(),
            def.base_weights.len(),
        ];
        if lengths.iter().any(|&len| len != n) {
            return Err(format!(
                "node arrays have mismatched lengths (left_children has {n})"
            ));
        }

        let mut left_children = Vec::with_capacity(n);
        let mut right_children = Vec::with_capacity(n);
        let mut is_leaf = Vec::with_capacity(n);

        for node in 0..n {
            let left = def.left_children[node];
            if left < 0 {
                if !def.base_weights[node].is_finite() {
                    return Err(format!("leaf {node} has non-finite weight"));
                }
                left_children.push(0);
                right_children.push(0);
                is_leaf.push(true);
                continue;
            }

            let right = def.right_children[node];
            for child in [left, right] {
                if child <= node as i32 || child as usize >= n {
                    return Err(format!("node {node} has invalid child {child}"));
                }
            }
            if def.split_indices[node] as usize >= num_features {
                return Err(format!(
                    "node {node} splits on feature {} but only {num_features} features exist",
                    def.split_indices[node]
                ));
            }
            if def.split_conditions[node].is_nan() {
                return Err(format!("node {node} has NaN threshold"));
            }
            left_children.push(left as u32);
            right_children.push(right as u32);
            is_leaf.push(false);
        }

        Ok(Self {
            split_indices: def.split_indices.into_boxed_slice(),
            split_thresholds: def.split_conditions.into_boxed_slice(),
            left_children: left_children.into_boxed_slice(),
            right_children: right_children.into_boxed_slice(),
            default_left: def.default_left.into_boxed_slice(),
            is_leaf: is_leaf.into_boxed_slice(),
            leaf_values: def.base_weights.into_boxed_slice(),
        })
    }

    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.is_leaf.len()
    }

    /// Largest leaf magnitude, i.e. the most this tree can move a prediction.
    pub fn max_abs_leaf(&self) -> f32 {
        self.is_leaf
            .iter()
            .zip(self.leaf_values.iter())
            .filter(|(&leaf, _)| leaf)
            .map(|(_, value)| value.abs())
            .fold(0.0, f32::max)
    }

    /// Walk from the root to a leaf and return its value.
    pub fn predict_row(&self, features: &[f32]) -> f32 {
        let mut idx = 0usize;

        while !self.is_leaf[idx] {
            let fvalue = features
                .get(self.split_indices[idx] as usize)
                .copied()
                .unwrap_or(f32::NAN);

            idx = if fvalue.is_nan() {
                if self.default_left[idx] {
                    self.left_children[idx] as usize
                } else {
                    self.right_children[idx] as usize
                }
            } else if fvalue < self.split_thresholds[idx] {
                self.left_children[idx] as usize
            } else {
                self.right_children[idx] as usize
            };
        }

        self.leaf_values[idx]
    }
}

/// Boosted tree ensemble used as one fold.
#[derive(Debug, Clone)]
pub struct TreeEnsemble {
    name: String,
    num_features: usize,
    schema_version: Option<u32>,
    base_score: f32,
    trees: Vec<Tree>,
}

impl TreeEnsemble {
    pub fn from_def(name: impl Into<String>, def: TreeEnsembleDef) -> Result<Self, ConfigurationFailure> {
        let name = name.into();
        let invalid = |reason: String| ConfigurationFailure::InvalidArtifact {
            fold: name.clone(),
            reason,
        };

        if def.num_features == 0 {
            return Err(invalid("num_features must be positive".to_string()));
        }
        if !def.base_score.is_finite() {
            return Err(invalid("base_score is not finite".to_string()));
        }

        let trees = def
            .trees
            .into_iter()
            .enumerate()
            .map(|(i, tree)| {
                Tree::from_def(tree, def.num_features).map_err(|reason| invalid(format!("tree {i}: {reason}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Every partial sum at inference is bounded by this, so a finite bound means
        // a finite prediction for any input.
        let bound = trees
            .iter()
            .fold(def.base_score.abs(), |acc, tree| acc + tree.max_abs_leaf());
        if !bound.is_finite() {
            return Err(invalid(
                "base_score plus leaf weights can overflow f32".to_string(),
            ));
        }

        Ok(Self {
            name,
            num_features: def.num_features,
            schema_version: def.schema_version,
            base_score: def.base_score,
            trees,
        })
    }

    /// Decode and validate a JSON artifact.
    pub fn from_json_slice(name: impl Into<String>, bytes: &[u8]) -> Result<Self, ConfigurationFailure> {
        let name = name.into();
        let def: TreeEnsembleDef =
            serde_json::from_slice(bytes).map_err(|e| ConfigurationFailure::InvalidArtifact {
                fold: name.clone(),
                reason: e.to_string(),
            })?;
        Self::from_def(name, def)
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Fold for TreeEnsemble {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_features(&self) -> usize {
        self.num_features
    }

    fn schema_version(&self) -> Option<u32> {
        self.schema_version
    }

    fn predict(&self, features: &[f32]) -> f64 {
        let sum: f32 = self.trees.iter().map(|tree| tree.predict_row(features)).sum();
        f64::from(self.base_score + sum)
    }
}
