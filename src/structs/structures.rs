use std::collections::BTreeMap;

use ndarray::Array3;

use crate::error::OptimizationError;

/// Volume of one voxel in cc when no spacing has been provided (1 mm³)
const DEFAULT_VOXEL_CC: f64 = 0.001;

/// A named region of interest on the planning grid
///
/// The mask is indexed `[z][y][x]`. Voxel coordinates inside the mask are cached on creation,
/// since every objective evaluation reads dose at exactly those voxels.
#[derive(Debug, Clone)]
pub struct Structure {
    name: String,
    mask: Array3<bool>,
    voxels: Vec<[usize; 3]>,
}

impl Structure {
    pub fn new(name: impl Into<String>, mask: Array3<bool>) -> Self {
        let voxels = mask
            .indexed_iter()
            .filter(|(_, &inside)| inside)
            .map(|((z, y, x), _)| [z, y, x])
            .collect();
        Self {
            name: name.into(),
            mask,
            voxels,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mask(&self) -> &Array3<bool> {
        &self.mask
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.mask.dim()
    }

    /// Coordinates of every voxel inside the structure
    pub fn voxels(&self) -> &[[usize; 3]] {
        &self.voxels
    }

    /// Number of voxels inside the structure
    pub fn voxel_count(&self) -> usize {
        self.voxels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    /// Mean voxel coordinate, `None` for an empty structure
    pub fn centroid(&self) -> Option<[f64; 3]> {
        if self.voxels.is_empty() {
            return None;
        }
        let n = self.voxels.len() as f64;
        let mut sum = [0.0; 3];
        for voxel in &self.voxels {
            for axis in 0..3 {
                sum[axis] += voxel[axis] as f64;
            }
        }
        Some([sum[0] / n, sum[1] / n, sum[2] / n])
    }

    /// Number of voxels shared with another structure
    pub fn overlap(&self, other: &Structure) -> usize {
        self.mask
            .iter()
            .zip(other.mask.iter())
            .filter(|(a, b)| **a && **b)
            .count()
    }
}

/// Maps structure names to their masks on a shared voxel grid
#[derive(Debug, Clone, Default)]
pub struct StructureRegistry {
    structures: BTreeMap<String, Structure>,
    shape: Option<(usize, usize, usize)>,
    /// Voxel spacing in mm, ordered z, y, x
    voxel_size: Option<[f64; 3]>,
}

impl StructureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a structure. All masks must share the same grid; re-adding a name replaces it.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        mask: Array3<bool>,
    ) -> Result<(), OptimizationError> {
        let name = name.into();
        let found = mask.dim();
        if let Some(expected) = self.shape {
            if expected != found {
                return Err(OptimizationError::GridMismatch {
                    what: format!("structure '{}'", name),
                    expected,
                    found,
                });
            }
        }
        let structure = Structure::new(name.clone(), mask);
        tracing::info!(
            "Added structure {} with {} voxels",
            name,
            structure.voxel_count()
        );
        self.shape = Some(found);
        self.structures.insert(name, structure);
        Ok(())
    }

    pub fn set_voxel_size(&mut self, voxel_size: [f64; 3]) {
        self.voxel_size = Some(voxel_size);
    }

    pub fn voxel_size(&self) -> Option<[f64; 3]> {
        self.voxel_size
    }

    /// Volume of a single voxel in cc
    pub fn voxel_volume_cc(&self) -> f64 {
        match self.voxel_size {
            Some([dz, dy, dx]) => dz * dy * dx / 1000.0,
            None => DEFAULT_VOXEL_CC,
        }
    }

    /// Volume of a structure in cc
    pub fn volume_cc(&self, structure: &Structure) -> f64 {
        structure.voxel_count() as f64 * self.voxel_volume_cc()
    }

    /// Distance between two grid points in mm, or in voxel units without spacing
    pub fn distance(&self, a: [f64; 3], b: [f64; 3]) -> f64 {
        let spacing = self.voxel_size.unwrap_or([1.0; 3]);
        (0..3)
            .map(|axis| ((a[axis] - b[axis]) * spacing[axis]).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    pub fn get(&self, name: &str) -> Option<&Structure> {
        self.structures.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.structures.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.structures.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Structure> {
        self.structures.values()
    }

    pub fn len(&self) -> usize {
        self.structures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structures.is_empty()
    }

    /// Grid shape shared by all registered masks
    pub fn shape(&self) -> Option<(usize, usize, usize)> {
        self.shape
    }
}
