// src/config.rs - Pipeline configuration: per-stage thresholds, JSON loading, validation
//
// Every field has a default; a JSON file only needs to name what it overrides.
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::ball::BallDetectorConfig;
use crate::club_cue::ClubCueConfig;
use crate::error::ConfigError;
use crate::gap_fill::GapFillConfig;
use crate::hand_fusion::FusionConfig;
use crate::identity::IdentityConfig;
use crate::line_orientation::LineDetectorConfig;
use crate::stabilize::{StabilizeConfig, WristSmoothing};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub identity: IdentityConfig,
    pub gap_fill: GapFillConfig,
    pub fusion: FusionConfig,
    pub club_cue: ClubCueConfig,
    pub stabilize: StabilizeConfig,
    /// Used by the standalone ball locator, not by the wrist pipeline.
    pub ball: BallDetectorConfig,
}

impl PipelineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: PipelineConfig =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_file(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::invalid_value("(serialization)", e.to_string()))?;
        std::fs::write(path, json).map_err(|source| ConfigError::FileWrite {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        non_negative("identity.swap_margin", self.identity.swap_margin)?;

        let f = &self.fusion;
        positive("fusion.speed_bypass", f.speed_bypass)?;
        positive("fusion.roi_radius", f.roi_radius)?;
        positive("fusion.accept_radius", f.accept_radius)?;
        if !(-1.0..=1.0).contains(&f.min_direction_cosine) {
            return Err(ConfigError::invalid_value(
                "fusion.min_direction_cosine",
                "must be in [-1, 1]",
            ));
        }
        non_negative("fusion.inward_slack", f.inward_slack)?;
        non_negative("fusion.other_elbow_slack", f.other_elbow_slack)?;
        non_negative("fusion.other_wrist_slack", f.other_wrist_slack)?;
        ratio_range("fusion.forearm_min_ratio", f.forearm_min_ratio, f.forearm_max_ratio)?;
        ratio_range("fusion.blend_min_ratio", f.blend_min_ratio, f.blend_max_ratio)?;
        unit_interval("fusion.alpha_slow", f.alpha_slow)?;
        unit_interval("fusion.alpha_moderate", f.alpha_moderate)?;
        positive("fusion.slow_speed", f.slow_speed)?;
        positive("fusion.max_step", f.max_step)?;
        unit_interval("fusion.gain_floor", f.gain_floor)?;
        positive("fusion.top_closeness", f.top_closeness)?;
        positive("fusion.address_closeness", f.address_closeness)?;
        positive("fusion.collapse_ratio", f.collapse_ratio)?;
        positive("fusion.expand_ratio", f.expand_ratio)?;
        positive("fusion.base_variance", f.base_variance)?;
        positive("fusion.variance_speed_scale", f.variance_speed_scale)?;

        let c = &self.club_cue;
        positive("club_cue.roi_radius", c.roi_radius)?;
        unit_interval("club_cue.min_confidence", c.min_confidence)?;
        non_negative("club_cue.nudge", c.nudge)?;
        validate_line(&c.line)?;

        let s = &self.stabilize;
        positive("stabilize.min_cutoff", s.min_cutoff)?;
        non_negative("stabilize.beta", s.beta)?;
        positive("stabilize.d_cutoff", s.d_cutoff)?;
        positive("stabilize.speed_bypass", s.speed_bypass)?;
        if let WristSmoothing::Tuned { min_cutoff, beta } = s.wrists {
            positive("stabilize.wrists.min_cutoff", min_cutoff)?;
            non_negative("stabilize.wrists.beta", beta)?;
        }

        let b = &self.ball;
        if b.grid_step == 0 {
            return Err(ConfigError::invalid_value("ball.grid_step", "must be > 0"));
        }
        if b.radius_step == 0 {
            return Err(ConfigError::invalid_value("ball.radius_step", "must be > 0"));
        }
        if b.angular_samples == 0 {
            return Err(ConfigError::invalid_value("ball.angular_samples", "must be > 0"));
        }
        Ok(())
    }
}

fn validate_line(l: &LineDetectorConfig) -> Result<(), ConfigError> {
    unit_interval("club_cue.line.edge_threshold", l.edge_threshold)?;
    if l.min_points < 2 {
        return Err(ConfigError::invalid_value("club_cue.line.min_points", "must be >= 2"));
    }
    if l.max_points < l.min_points {
        return Err(ConfigError::invalid_value(
            "club_cue.line.max_points",
            format!("must be >= min_points ({})", l.min_points),
        ));
    }
    positive("club_cue.line.prior_max_deviation", l.prior_max_deviation)?;
    unit_interval("club_cue.line.low_confidence", l.low_confidence)?;
    unit_interval("club_cue.line.prior_blend", l.prior_blend)?;
    unit_interval("club_cue.line.confidence_floor", l.confidence_floor)
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::invalid_value(
            field,
            format!("must be finite and > 0, got {value}"),
        ));
    }
    Ok(())
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::invalid_value(
            field,
            format!("must be finite and >= 0, got {value}"),
        ));
    }
    Ok(())
}

fn unit_interval(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::invalid_value(field, format!("must be in [0, 1], got {value}")));
    }
    Ok(())
}

fn ratio_range(field: &'static str, min: f64, max: f64) -> Result<(), ConfigError> {
    positive(field, min)?;
    if !max.is_finite() || max < min {
        return Err(ConfigError::invalid_value(field, format!("range [{min}, {max}] is inverted")));
    }
    Ok(())
}
