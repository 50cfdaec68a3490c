use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::OptimizationError;
use crate::structs::goal::{Goal, GoalKind};
use crate::structs::structures::{Structure, StructureRegistry};

/// Name prefixes of target volumes; every other structure is treated as an organ at risk
const TARGET_PREFIXES: [&str; 3] = ["PTV", "CTV", "GTV"];

/// Named numeric features describing one patient and its goals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    features: BTreeMap<String, f64>,
}

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.features.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.features.get(name).copied()
    }

    pub fn names(&self) -> Vec<String> {
        self.features.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.features.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

fn is_target(name: &str) -> bool {
    TARGET_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// The target volume features are computed against
///
/// The first structure named `PTV*`, else the structure of the first goal that asks for dose
/// coverage.
fn find_target<'r>(registry: &'r StructureRegistry, goals: &[Goal]) -> Option<&'r Structure> {
    registry.iter().find(|s| s.name().starts_with("PTV")).or_else(|| {
        goals
            .iter()
            .filter(|g| {
                matches!(
                    g.kind(),
                    GoalKind::MinDose | GoalKind::MinDvh | GoalKind::Conformity
                )
            })
            .find_map(|g| registry.get(g.structure_name()))
    })
}

/// Build the feature vector for the dose predictor
///
/// Features are `ptv_volume`, per organ at risk `<organ>_volume`, `<organ>_ptv_overlap` (cc),
/// `<organ>_ptv_overlap_percent` and `<organ>_distance_to_ptv` (centroid distance, `-1` when
/// either structure is empty), and per goal `goal_<i>_kind`, `_dose`, `_volume` (`-1` when
/// absent), `_weight` and `_priority`.
pub fn extract_features(
    registry: &StructureRegistry,
    goals: &[Goal],
) -> Result<FeatureVector, OptimizationError> {
    let target = find_target(registry, goals).ok_or_else(|| {
        OptimizationError::FeatureExtraction("no target structure found".to_string())
    })?;
    if target.is_empty() {
        return Err(OptimizationError::FeatureExtraction(format!(
            "target structure '{}' is empty",
            target.name()
        )));
    }

    let mut features = FeatureVector::new();
    features.insert("ptv_volume", registry.volume_cc(target));
    features.insert("n_goals", goals.len() as f64);

    let target_centroid = target.centroid();
    for organ in registry.iter().filter(|s| !is_target(s.name())) {
        let name = organ.name();
        let volume = registry.volume_cc(organ);
        let overlap = organ.overlap(target) as f64 * registry.voxel_volume_cc();
        let percent = if volume > 0.0 {
            overlap / volume * 100.0
        } else {
            0.0
        };
        let distance = match (target_centroid, organ.centroid()) {
            (Some(a), Some(b)) => registry.distance(a, b),
            _ => -1.0,
        };
        features.insert(format!("{}_volume", name), volume);
        features.insert(format!("{}_ptv_overlap", name), overlap);
        features.insert(format!("{}_ptv_overlap_percent", name), percent);
        features.insert(format!("{}_distance_to_ptv", name), distance);
    }

    for (i, goal) in goals.iter().enumerate() {
        features.insert(format!("goal_{}_kind", i), goal.kind().ordinal() as f64);
        features.insert(format!("goal_{}_dose", i), goal.dose_value());
        features.insert(
            format!("goal_{}_volume", i),
            goal.volume_value().unwrap_or(-1.0),
        );
        features.insert(format!("goal_{}_weight", i), goal.weight());
        features.insert(format!("goal_{}_priority", i), goal.priority() as f64);
    }

    tracing::debug!(
        "Extracted {} features against target '{}'",
        features.len(),
        target.name()
    );
    Ok(features)
}
