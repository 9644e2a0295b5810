//! Cosmology value objects and the parameters that stencils vary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, KszError};
use crate::fingerprint::{fingerprint, Fingerprint};

/// Numeric parameters a stencil may vary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CosmoParameter {
    /// Dimensionless Hubble parameter.
    #[serde(rename = "h")]
    H,
    /// Physical cold dark matter density.
    #[serde(rename = "omega_cdm")]
    OmegaCdm,
    /// Physical baryon density.
    #[serde(rename = "omega_b")]
    OmegaB,
    /// Physical axion energy density.
    #[serde(rename = "omega_axion")]
    OmegaAxion,
    /// Axion mass in eV.
    #[serde(rename = "m_axion")]
    MAxion,
    /// Scalar spectral index.
    #[serde(rename = "n_s")]
    NS,
    /// Scalar amplitude.
    #[serde(rename = "A_s")]
    AS,
    /// Axion share of the total dark matter density.
    #[serde(rename = "axion_frac")]
    AxionFrac,
}

impl CosmoParameter {
    /// All parameters in canonical order.
    pub const ALL: [CosmoParameter; 8] = [
        CosmoParameter::H,
        CosmoParameter::OmegaCdm,
        CosmoParameter::OmegaB,
        CosmoParameter::OmegaAxion,
        CosmoParameter::MAxion,
        CosmoParameter::NS,
        CosmoParameter::AS,
        CosmoParameter::AxionFrac,
    ];

    /// Stable textual name used in plans, logs and output metadata.
    pub fn name(&self) -> &'static str {
        match self {
            CosmoParameter::H => "h",
            CosmoParameter::OmegaCdm => "omega_cdm",
            CosmoParameter::OmegaB => "omega_b",
            CosmoParameter::OmegaAxion => "omega_axion",
            CosmoParameter::MAxion => "m_axion",
            CosmoParameter::NS => "n_s",
            CosmoParameter::AS => "A_s",
            CosmoParameter::AxionFrac => "axion_frac",
        }
    }
}

impl fmt::Display for CosmoParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CosmoParameter {
    type Err = KszError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CosmoParameter::ALL
            .iter()
            .copied()
            .find(|param| param.name() == s || param.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                KszError::Config(
                    ErrorInfo::new("unknown-parameter", "unknown cosmological parameter")
                        .with_context("name", s)
                        .with_hint("expected one of h, omega_cdm, omega_b, omega_axion, m_axion, n_s, A_s, axion_frac"),
                )
            })
    }
}

/// Raw physical parameter tuple of a cosmology.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CosmoParams {
    /// Dimensionless Hubble parameter.
    pub h: f64,
    /// Physical cold dark matter density.
    pub omega_cdm: f64,
    /// Physical baryon density.
    pub omega_b: f64,
    /// Physical axion energy density.
    pub omega_axion: f64,
    /// Axion mass in eV.
    pub m_axion: f64,
    /// Scalar spectral index.
    pub n_s: f64,
    /// Scalar amplitude.
    #[serde(rename = "A_s")]
    pub a_s: f64,
}

/// Tabulated Hubble rate produced by an external solver run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubbleTable {
    z: Vec<f64>,
    hubble: Vec<f64>,
}

impl HubbleTable {
    /// Builds a table; redshifts must be strictly increasing with at least two samples.
    pub fn new(z: Vec<f64>, hubble: Vec<f64>) -> Result<Self, KszError> {
        if z.len() != hubble.len() || z.len() < 2 {
            return Err(KszError::Config(
                ErrorInfo::new("hubble-table-shape", "hubble table needs matching columns")
                    .with_context("z_len", z.len().to_string())
                    .with_context("hubble_len", hubble.len().to_string()),
            ));
        }
        if z.windows(2).any(|pair| !(pair[1] > pair[0])) {
            return Err(KszError::Config(ErrorInfo::new(
                "hubble-table-order",
                "hubble table redshifts must be strictly increasing",
            )));
        }
        Ok(Self { z, hubble })
    }

    /// Linear interpolation of the Hubble rate; `None` outside the tabulated range.
    pub fn interpolate(&self, z: f64) -> Option<f64> {
        let first = *self.z.first()?;
        let last = *self.z.last()?;
        if !(z >= first && z <= last) {
            return None;
        }
        let upper = self.z.partition_point(|&node| node < z).max(1);
        let (z0, z1) = (self.z[upper - 1], self.z[upper]);
        let (h0, h1) = (self.hubble[upper - 1], self.hubble[upper]);
        Some(h0 + (h1 - h0) * (z - z0) / (z1 - z0))
    }

    /// Number of tabulated samples.
    pub fn len(&self) -> usize {
        self.z.len()
    }

    /// Always false for a constructed table.
    pub fn is_empty(&self) -> bool {
        self.z.is_empty()
    }
}

/// How a cosmology obtains its Hubble-rate evolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HubbleSource {
    /// Flat LCDM expression evaluated from the parameter tuple.
    Analytic,
    /// Tabulated output of the external solver, attached after its run completes.
    FromFile {
        /// Interpolation table, absent until the run's output has been read.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        table: Option<HubbleTable>,
    },
}

impl HubbleSource {
    /// Whether the external solver must be invoked in read-from-file mode.
    pub fn reads_from_file(&self) -> bool {
        matches!(self, HubbleSource::FromFile { .. })
    }
}

/// Inputs to [`Cosmology::generate`]; unspecified fields use the fiducial defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateParams {
    /// Dimensionless Hubble parameter.
    pub h: f64,
    /// Total physical dark matter density (cold plus axion).
    pub omega_dm: f64,
    /// Physical baryon density.
    pub omega_b: f64,
    /// Scalar spectral index.
    pub n_s: f64,
    /// Scalar amplitude.
    #[serde(rename = "A_s")]
    pub a_s: f64,
    /// Axion mass in eV.
    pub m_axion: f64,
    /// Axion share of the total dark matter density.
    pub axion_frac: f64,
    /// Read the Hubble rate from the solver output instead of the analytic form.
    pub read_hubble_from_file: bool,
}

impl Default for GenerateParams {
    fn default() -> Self {
        Self {
            h: 0.6737,
            omega_dm: 0.1198,
            omega_b: 0.02233,
            n_s: 0.9652,
            a_s: 2.1e-9,
            m_axion: 1.0e-24,
            axion_frac: 0.0,
            read_hubble_from_file: false,
        }
    }
}

/// Immutable cosmology; only the Hubble table may be attached after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cosmology {
    params: CosmoParams,
    hubble: HubbleSource,
}

impl Cosmology {
    /// Creates a cosmology from an explicit parameter tuple.
    pub fn new(params: CosmoParams, read_hubble_from_file: bool) -> Self {
        let hubble = if read_hubble_from_file {
            HubbleSource::FromFile { table: None }
        } else {
            HubbleSource::Analytic
        };
        Self { params, hubble }
    }

    /// Builds a cosmology from fiducial defaults, splitting dark matter by `axion_frac`.
    pub fn generate(spec: GenerateParams) -> Result<Self, KszError> {
        check_fraction(spec.axion_frac)?;
        let params = CosmoParams {
            h: spec.h,
            omega_cdm: (1.0 - spec.axion_frac) * spec.omega_dm,
            omega_b: spec.omega_b,
            omega_axion: spec.axion_frac * spec.omega_dm,
            m_axion: spec.m_axion,
            n_s: spec.n_s,
            a_s: spec.a_s,
        };
        Ok(Self::new(params, spec.read_hubble_from_file))
    }

    /// Raw parameter tuple.
    pub fn params(&self) -> &CosmoParams {
        &self.params
    }

    /// Hubble-rate source of this cosmology.
    pub fn hubble_source(&self) -> &HubbleSource {
        &self.hubble
    }

    /// Whether the solver reads the Hubble rate from file for this cosmology.
    pub fn reads_hubble_from_file(&self) -> bool {
        self.hubble.reads_from_file()
    }

    /// Content fingerprint used as the run cache key.
    pub fn fingerprint(&self) -> Fingerprint {
        fingerprint(self)
    }

    /// Current value of a parameter.
    pub fn value(&self, param: CosmoParameter) -> f64 {
        let p = &self.params;
        match param {
            CosmoParameter::H => p.h,
            CosmoParameter::OmegaCdm => p.omega_cdm,
            CosmoParameter::OmegaB => p.omega_b,
            CosmoParameter::OmegaAxion => p.omega_axion,
            CosmoParameter::MAxion => p.m_axion,
            CosmoParameter::NS => p.n_s,
            CosmoParameter::AS => p.a_s,
            CosmoParameter::AxionFrac => {
                let total = p.omega_cdm + p.omega_axion;
                if total == 0.0 {
                    0.0
                } else {
                    p.omega_axion / total
                }
            }
        }
    }

    /// Copy with one parameter replaced and all others held fixed.
    ///
    /// Replacing `axion_frac` keeps the total dark matter density constant.
    /// Passing the current value returns the unchanged tuple, so every stencil
    /// centred on the same fiducial shares its zero-offset cosmology.
    /// The copy never carries an attached Hubble table: it describes a
    /// different cosmology that needs its own solver run.
    pub fn with_value(&self, param: CosmoParameter, value: f64) -> Result<Self, KszError> {
        if !value.is_finite() {
            return Err(KszError::Config(
                ErrorInfo::new("non-finite-parameter", "parameter value must be finite")
                    .with_context("parameter", param.name())
                    .with_context("value", value.to_string()),
            ));
        }
        if value.to_bits() == self.value(param).to_bits() {
            return Ok(Self::new(self.params, self.reads_hubble_from_file()));
        }
        let mut params = self.params;
        match param {
            CosmoParameter::H => params.h = value,
            CosmoParameter::OmegaCdm => params.omega_cdm = value,
            CosmoParameter::OmegaB => params.omega_b = value,
            CosmoParameter::OmegaAxion => params.omega_axion = value,
            CosmoParameter::MAxion => params.m_axion = value,
            CosmoParameter::NS => params.n_s = value,
            CosmoParameter::AS => params.a_s = value,
            CosmoParameter::AxionFrac => {
                check_fraction(value)?;
                let total = params.omega_cdm + params.omega_axion;
                params.omega_axion = value * total;
                params.omega_cdm = (1.0 - value) * total;
            }
        }
        Ok(Self::new(params, self.reads_hubble_from_file()))
    }

    /// Attaches the tabulated Hubble rate produced by the solver run.
    pub fn attach_hubble(&mut self, table: HubbleTable) -> Result<(), KszError> {
        match &mut self.hubble {
            HubbleSource::FromFile { table: slot } => {
                *slot = Some(table);
                Ok(())
            }
            HubbleSource::Analytic => Err(KszError::Config(ErrorInfo::new(
                "hubble-analytic",
                "cannot attach a hubble table to an analytic cosmology",
            ))),
        }
    }

    /// Total matter density parameter `Omega_m`.
    pub fn omega_matter(&self) -> f64 {
        let p = &self.params;
        (p.omega_cdm + p.omega_b + p.omega_axion) / (p.h * p.h)
    }

    /// Hubble rate in km/s/Mpc at redshift `z`.
    pub fn hubble_at(&self, z: f64) -> Result<f64, KszError> {
        match &self.hubble {
            HubbleSource::Analytic => {
                let omega_m = self.omega_matter();
                let e2 = omega_m * (1.0 + z).powi(3) + (1.0 - omega_m);
                Ok(100.0 * self.params.h * e2.sqrt())
            }
            HubbleSource::FromFile { table: None } => Err(KszError::Config(
                ErrorInfo::new("hubble-missing", "hubble table has not been attached")
                    .with_hint("attach the solver output before evaluating"),
            )),
            HubbleSource::FromFile { table: Some(table) } => {
                table.interpolate(z).ok_or_else(|| {
                    KszError::Config(
                        ErrorInfo::new("hubble-range", "redshift outside tabulated range")
                            .with_context("z", z.to_string()),
                    )
                })
            }
        }
    }
}

fn check_fraction(value: f64) -> Result<(), KszError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(KszError::Config(
            ErrorInfo::new("axion-fraction-range", "axion fraction must lie in [0, 1]")
                .with_context("value", value.to_string()),
        ))
    }
}
