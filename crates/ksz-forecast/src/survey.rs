//! Survey geometry presets.

use ksz_core::{Cosmology, ErrorInfo, KszError};
use serde::{Deserialize, Serialize};

/// Named survey configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SurveyPreset {
    /// Current-generation kSZ survey, 4000 square degrees.
    #[serde(rename = "stage-ii")]
    StageII,
    /// Upcoming survey, 6000 square degrees.
    #[serde(rename = "stage-iii")]
    StageIII,
    /// Next-generation survey, 10000 square degrees over five bins.
    #[default]
    #[serde(rename = "stage-iv")]
    StageIV,
}

impl SurveyPreset {
    /// Instantiates the preset for a fiducial cosmology.
    ///
    /// Mass limits are expressed in `M_sun / h` and velocity errors in
    /// `h km/s`, so both depend on the fiducial `h`.
    pub fn build(&self, fiducial: &Cosmology) -> Result<SurveySpec, KszError> {
        let h = fiducial.params().h;
        let (z_min, z_max, nz, m_min, area, sigma_v): (f64, f64, usize, f64, f64, &[f64]) =
            match self {
                SurveyPreset::StageII => (0.1, 0.4, 3, 1.0e14, 0.4e4, &[310.0, 460.0, 560.0][..]),
                SurveyPreset::StageIII => (0.1, 0.4, 3, 1.0e14, 0.6e4, &[160.0, 200.0, 230.0][..]),
                SurveyPreset::StageIV => (
                    0.1,
                    0.6,
                    5,
                    0.6e14,
                    1.0e4,
                    &[120.0, 120.0, 120.0, 120.0, 130.0][..],
                ),
            };
        SurveySpec::new(
            z_min,
            z_max,
            nz,
            m_min * h,
            1.0e16 * h,
            overlap_to_f_sky(area),
            sigma_v.iter().map(|s| s / h).collect(),
        )
    }
}

/// Sky fraction for an overlap area in square degrees.
pub fn overlap_to_f_sky(area: f64) -> f64 {
    area / (360.0 * 360.0) * std::f64::consts::PI
}

/// Redshift binning, mass limits and noise of one survey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveySpec {
    z_min: f64,
    z_max: f64,
    z_edges: Vec<f64>,
    center_z: Vec<f64>,
    m_min: f64,
    m_max: f64,
    f_sky: f64,
    sigma_v: Vec<f64>,
}

impl SurveySpec {
    /// Builds a survey with `nz` equal-width redshift bins.
    pub fn new(
        z_min: f64,
        z_max: f64,
        nz: usize,
        m_min: f64,
        m_max: f64,
        f_sky: f64,
        sigma_v: Vec<f64>,
    ) -> Result<Self, KszError> {
        if nz == 0 || !(z_max > z_min) {
            return Err(KszError::Config(
                ErrorInfo::new("survey-bins", "survey needs a non-empty increasing redshift range")
                    .with_context("z_min", z_min.to_string())
                    .with_context("z_max", z_max.to_string())
                    .with_context("nz", nz.to_string()),
            ));
        }
        if sigma_v.len() != nz {
            return Err(KszError::Config(
                ErrorInfo::new("survey-sigma-v", "one velocity error per redshift bin is required")
                    .with_context("nz", nz.to_string())
                    .with_context("sigma_v", sigma_v.len().to_string()),
            ));
        }
        let width = (z_max - z_min) / nz as f64;
        let z_edges: Vec<f64> = (0..=nz)
            .map(|i| if i == nz { z_max } else { z_min + i as f64 * width })
            .collect();
        let center_z = z_edges
            .windows(2)
            .map(|pair| round_to(0.5 * (pair[0] + pair[1]), 5))
            .collect();
        Ok(Self {
            z_min,
            z_max,
            z_edges,
            center_z,
            m_min,
            m_max,
            f_sky,
            sigma_v,
        })
    }

    pub fn z_min(&self) -> f64 {
        self.z_min
    }

    pub fn z_max(&self) -> f64 {
        self.z_max
    }

    /// Number of redshift bins.
    pub fn nz(&self) -> usize {
        self.center_z.len()
    }

    pub fn z_edges(&self) -> &[f64] {
        &self.z_edges
    }

    /// Bin centres rounded to five decimals.
    pub fn center_z(&self) -> &[f64] {
        &self.center_z
    }

    pub fn m_min(&self) -> f64 {
        self.m_min
    }

    pub fn m_max(&self) -> f64 {
        self.m_max
    }

    pub fn f_sky(&self) -> f64 {
        self.f_sky
    }

    /// Velocity error per bin in `h km/s`.
    pub fn sigma_v(&self) -> &[f64] {
        &self.sigma_v
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}
