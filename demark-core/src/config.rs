//! Run configuration for the pipeline.
//!
//! Mirrors the command surface: paths, region list, algorithm, quality and
//! tuning knobs. Validation happens once up front so every later failure is
//! an execution failure, not a shape failure.

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};
use crate::mask::Region;
use crate::restore::{telea, Algorithm};

/// Output quality tier, mapped to encoder rate parameters at remux time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Low,
    Medium,
    High,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Low => "low",
            Quality::Medium => "medium",
            Quality::High => "high",
        }
    }

    /// CRF-style constant quality value for encoders that take one.
    pub fn crf(&self) -> u32 {
        match self {
            Quality::Low => 28,
            Quality::Medium => 23,
            Quality::High => 18,
        }
    }

    /// Target bitrate for encoders that are rate-driven instead.
    pub fn bitrate(&self) -> &'static str {
        match self {
            Quality::Low => "4M",
            Quality::Medium => "6M",
            Quality::High => "8M",
        }
    }
}

impl FromStr for Quality {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Quality::Low),
            "medium" => Ok(Quality::Medium),
            "high" => Ok(Quality::High),
            other => Err(CoreError::Config(format!("unknown quality tier: {other}"))),
        }
    }
}

/// Everything one run needs to know.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub regions: Vec<Region>,
    pub algorithm: Algorithm,
    pub quality: Quality,
    /// Explicit batch size; `None` lets the detected device decide.
    pub batch_size: Option<usize>,
    /// Propagation window for the neighborhood inpainter.
    pub inpaint_radius: u32,
    /// Checkpoint cache override; `None` falls back to the environment and
    /// then the default cache location.
    pub model_cache_dir: Option<PathBuf>,
}

impl CoreConfig {
    pub fn new(input_path: PathBuf, output_path: PathBuf) -> Self {
        Self {
            input_path,
            output_path,
            regions: Vec::new(),
            algorithm: Algorithm::Telea,
            quality: Quality::High,
            batch_size: None,
            inpaint_radius: telea::DEFAULT_RADIUS,
            model_cache_dir: None,
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.input_path.as_os_str().is_empty() {
            return Err(CoreError::Config("input path is empty".to_string()));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(CoreError::Config("output path is empty".to_string()));
        }
        if self.input_path == self.output_path {
            return Err(CoreError::Config(
                "output path must differ from input path".to_string(),
            ));
        }
        if self.inpaint_radius == 0 {
            return Err(CoreError::Config(
                "inpaint radius must be at least 1".to_string(),
            ));
        }
        if let Some(0) = self.batch_size {
            return Err(CoreError::Config(
                "batch size override must be positive; omit it for auto".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> CoreConfig {
        CoreConfig::new(PathBuf::from("/in/clip.mp4"), PathBuf::from("/out/clip.mp4"))
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_same_input_output_rejected() {
        let mut config = valid_config();
        config.output_path = config.input_path.clone();
        assert!(matches!(
            config.validate(),
            Err(CoreError::Config(_))
        ));
    }

    #[test]
    fn test_degenerate_knobs_rejected() {
        let mut config = valid_config();
        config.inpaint_radius = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.batch_size = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_quality_parsing_and_mapping() {
        assert_eq!("HIGH".parse::<Quality>().unwrap(), Quality::High);
        assert_eq!("medium".parse::<Quality>().unwrap(), Quality::Medium);
        assert!("ultra".parse::<Quality>().is_err());
        assert!(Quality::Low.crf() > Quality::High.crf());
    }
}
