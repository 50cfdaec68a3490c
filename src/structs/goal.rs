use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GoalError;

/// The clinical objective a [Goal] expresses for its structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalKind {
    /// Every voxel of the structure should receive at least the target dose
    MinDose,
    /// No voxel of the structure should exceed the target dose
    MaxDose,
    /// The mean structure dose should not exceed the target dose
    MeanDose,
    /// At least `volume_value`% of the structure should receive the target dose
    MinDvh,
    /// The dose received by `volume_value`% of the structure should not exceed the target
    MaxDvh,
    /// Dose within the structure should be flat
    UniformDose,
    /// The high-dose region should match the structure's shape
    Conformity,
    /// Dose gradient at the structure border
    DoseFallOff,
}

impl GoalKind {
    pub const ALL: [GoalKind; 8] = [
        GoalKind::MinDose,
        GoalKind::MaxDose,
        GoalKind::MeanDose,
        GoalKind::MinDvh,
        GoalKind::MaxDvh,
        GoalKind::UniformDose,
        GoalKind::Conformity,
        GoalKind::DoseFallOff,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GoalKind::MinDose => "min_dose",
            GoalKind::MaxDose => "max_dose",
            GoalKind::MeanDose => "mean_dose",
            GoalKind::MinDvh => "min_dvh",
            GoalKind::MaxDvh => "max_dvh",
            GoalKind::UniformDose => "uniform_dose",
            GoalKind::Conformity => "conformity",
            GoalKind::DoseFallOff => "dose_fall_off",
        }
    }

    /// DVH goals are defined at a volume level and cannot be evaluated without one
    pub fn requires_volume(&self) -> bool {
        matches!(self, GoalKind::MinDvh | GoalKind::MaxDvh)
    }

    /// Index of the kind in [GoalKind::ALL], used as a numeric descriptor
    pub fn ordinal(&self) -> usize {
        GoalKind::ALL
            .iter()
            .position(|kind| kind == self)
            .unwrap_or_default()
    }
}

impl fmt::Display for GoalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for GoalKind {
    type Err = GoalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "min_dose" => Ok(GoalKind::MinDose),
            "max_dose" => Ok(GoalKind::MaxDose),
            "mean_dose" => Ok(GoalKind::MeanDose),
            "min_dvh" => Ok(GoalKind::MinDvh),
            "max_dvh" => Ok(GoalKind::MaxDvh),
            "uniform" | "uniform_dose" => Ok(GoalKind::UniformDose),
            "conformity" => Ok(GoalKind::Conformity),
            "falloff" | "dose_fall_off" | "dose_falloff" => Ok(GoalKind::DoseFallOff),
            _ => Err(GoalError::InvalidGoalKind(s.to_string())),
        }
    }
}

/// A single clinical objective on one structure
///
/// Goals are validated when built and immutable afterwards. Use [Goal::builder] to create one,
/// or convert a [GoalRecord] read from a persisted plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GoalRecord", into = "GoalRecord")]
pub struct Goal {
    structure_name: String,
    kind: GoalKind,
    dose_value: f64,
    volume_value: Option<f64>,
    weight: f64,
    priority: u32,
    is_required: bool,
}

impl Goal {
    /// Start building a goal with weight 1, priority 1 and no volume value
    pub fn builder(structure_name: impl Into<String>, kind: GoalKind, dose_value: f64) -> GoalBuilder {
        GoalBuilder {
            structure_name: structure_name.into(),
            kind,
            dose_value,
            volume_value: None,
            weight: 1.0,
            priority: 1,
            is_required: false,
        }
    }

    pub fn structure_name(&self) -> &str {
        &self.structure_name
    }

    pub fn kind(&self) -> GoalKind {
        self.kind
    }

    pub fn dose_value(&self) -> f64 {
        self.dose_value
    }

    pub fn volume_value(&self) -> Option<f64> {
        self.volume_value
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn is_required(&self) -> bool {
        self.is_required
    }

    /// A copy of this goal with a different target dose, validated like any other goal
    pub fn with_dose_value(&self, dose_value: f64) -> Result<Goal, GoalError> {
        GoalRecord {
            dose_value,
            ..GoalRecord::from(self.clone())
        }
        .try_into()
    }

    /// Key identifying the goal in a persisted evaluation, e.g. `PTV_min_dose`
    pub fn key(&self) -> String {
        format!("{}_{}", self.structure_name, self.kind)
    }

    fn validate(&self) -> Result<(), GoalError> {
        if !self.dose_value.is_finite() {
            return Err(GoalError::InvalidParameter {
                name: "dose_value",
                value: self.dose_value,
                reason: "must be finite",
            });
        }
        if self.kind.requires_volume() {
            match self.volume_value {
                None => return Err(GoalError::MissingVolumeValue(self.kind)),
                Some(v) if !(0.0..=100.0).contains(&v) => {
                    return Err(GoalError::InvalidParameter {
                        name: "volume_value",
                        value: v,
                        reason: "must be within [0, 100]",
                    })
                }
                Some(_) => {}
            }
        }
        if let Some(v) = self.volume_value {
            if !v.is_finite() {
                return Err(GoalError::InvalidParameter {
                    name: "volume_value",
                    value: v,
                    reason: "must be finite",
                });
            }
        }
        if !(self.weight > 0.0) || !self.weight.is_finite() {
            return Err(GoalError::InvalidParameter {
                name: "weight",
                value: self.weight,
                reason: "must be positive",
            });
        }
        Ok(())
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.structure_name;
        let d = self.dose_value;
        let v = self.volume_value.unwrap_or_default();
        let w = self.weight;
        match self.kind {
            GoalKind::MinDose => write!(f, "{s}: min dose >= {d} Gy (w={w})"),
            GoalKind::MaxDose => write!(f, "{s}: max dose <= {d} Gy (w={w})"),
            GoalKind::MeanDose => write!(f, "{s}: mean dose <= {d} Gy (w={w})"),
            GoalKind::MinDvh => write!(f, "{s}: D{v}% >= {d} Gy (w={w})"),
            GoalKind::MaxDvh => write!(f, "{s}: D{v}% <= {d} Gy (w={w})"),
            GoalKind::UniformDose => write!(f, "{s}: uniform dose = {d} Gy (w={w})"),
            GoalKind::Conformity => write!(f, "{s}: conformity at {d} Gy (w={w})"),
            GoalKind::DoseFallOff => write!(f, "{s}: dose fall-off {d} Gy/cm (w={w})"),
        }
    }
}

/// Builder for [Goal]; validation happens in [GoalBuilder::build]
#[derive(Debug, Clone)]
pub struct GoalBuilder {
    structure_name: String,
    kind: GoalKind,
    dose_value: f64,
    volume_value: Option<f64>,
    weight: f64,
    priority: i64,
    is_required: bool,
}

impl GoalBuilder {
    pub fn volume(mut self, volume_value: f64) -> Self {
        self.volume_value = Some(volume_value);
        self
    }

    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn required(mut self, is_required: bool) -> Self {
        self.is_required = is_required;
        self
    }

    pub fn build(self) -> Result<Goal, GoalError> {
        GoalRecord {
            structure_name: self.structure_name,
            kind: self.kind.to_string(),
            dose_value: self.dose_value,
            volume_value: self.volume_value,
            weight: self.weight,
            priority: self.priority,
            is_required: self.is_required,
        }
        .try_into()
    }
}

/// Plain key-value form of a [Goal], as persisted in result files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalRecord {
    pub structure_name: String,
    #[serde(alias = "goal_type")]
    pub kind: String,
    pub dose_value: f64,
    #[serde(default)]
    pub volume_value: Option<f64>,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default = "default_priority")]
    pub priority: i64,
    #[serde(default)]
    pub is_required: bool,
}

impl TryFrom<GoalRecord> for Goal {
    type Error = GoalError;

    fn try_from(record: GoalRecord) -> Result<Self, Self::Error> {
        let kind: GoalKind = record.kind.parse()?;
        if record.priority <= 0 || record.priority > u32::MAX as i64 {
            return Err(GoalError::InvalidParameter {
                name: "priority",
                value: record.priority as f64,
                reason: "must be a positive integer",
            });
        }
        let goal = Goal {
            structure_name: record.structure_name,
            kind,
            dose_value: record.dose_value,
            volume_value: record.volume_value,
            weight: record.weight,
            priority: record.priority as u32,
            is_required: record.is_required,
        };
        goal.validate()?;
        Ok(goal)
    }
}

impl From<Goal> for GoalRecord {
    fn from(goal: Goal) -> Self {
        GoalRecord {
            structure_name: goal.structure_name,
            kind: goal.kind.to_string(),
            dose_value: goal.dose_value,
            volume_value: goal.volume_value,
            weight: goal.weight,
            priority: goal.priority as i64,
            is_required: goal.is_required,
        }
    }
}

fn default_weight() -> f64 {
    1.0
}

fn default_priority() -> i64 {
    1
}
