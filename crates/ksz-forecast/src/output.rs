//! Derivative tensors written once per axion mass.

use std::fs;
use std::path::{Path, PathBuf};

use ksz_core::{stable_hash_string, to_canonical_json_bytes, CosmoParameter, ErrorInfo, KszError};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Identity of one tensor row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivativeLabel {
    pub parameter: CosmoParameter,
    pub step_size: f64,
    pub axion_frac: f64,
}

/// Dense `[derivative][redshift][separation]` array for one axion mass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivativeTensor {
    axion_mass: f64,
    labels: Vec<DerivativeLabel>,
    redshifts: Vec<f64>,
    separations: Vec<f64>,
    shape: [usize; 3],
    data: Vec<f64>,
}

impl DerivativeTensor {
    /// Stacks per-derivative matrices of shape `(redshifts, separations)`.
    pub fn from_matrices(
        axion_mass: f64,
        labels: Vec<DerivativeLabel>,
        redshifts: Vec<f64>,
        separations: Vec<f64>,
        matrices: &[DMatrix<f64>],
    ) -> Result<Self, KszError> {
        let (nz, nr) = (redshifts.len(), separations.len());
        if labels.len() != matrices.len() {
            return Err(KszError::Stencil(
                ErrorInfo::new("tensor-rows", "one label per derivative is required")
                    .with_context("labels", labels.len().to_string())
                    .with_context("derivatives", matrices.len().to_string()),
            ));
        }
        let mut data = Vec::with_capacity(matrices.len() * nz * nr);
        for (label, matrix) in labels.iter().zip(matrices) {
            if matrix.shape() != (nz, nr) {
                return Err(KszError::Stencil(
                    ErrorInfo::new("stencil-shape", "derivative does not match the evaluation grid")
                        .with_context("parameter", label.parameter.name())
                        .with_context("expected", format!("{:?}", (nz, nr)))
                        .with_context("found", format!("{:?}", matrix.shape())),
                ));
            }
            for i in 0..nz {
                data.extend(matrix.row(i).iter().copied());
            }
        }
        Ok(Self {
            axion_mass,
            shape: [labels.len(), nz, nr],
            labels,
            redshifts,
            separations,
            data,
        })
    }

    pub fn axion_mass(&self) -> f64 {
        self.axion_mass
    }

    pub fn labels(&self) -> &[DerivativeLabel] {
        &self.labels
    }

    pub fn redshifts(&self) -> &[f64] {
        &self.redshifts
    }

    pub fn separations(&self) -> &[f64] {
        &self.separations
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    /// Row-major values.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Element `[derivative][redshift][separation]`.
    pub fn get(&self, derivative: usize, z: usize, r: usize) -> Option<f64> {
        let [nd, nz, nr] = self.shape;
        if derivative >= nd || z >= nz || r >= nr {
            return None;
        }
        self.data.get((derivative * nz + z) * nr + r).copied()
    }

    /// `derivs_ma=<mass>` with the mass in three-decimal scientific notation.
    pub fn file_stem(&self) -> String {
        format!("derivs_ma={}", format_mass(self.axion_mass))
    }

    /// Writes the bincode tensor and its JSON metadata into `dir`.
    pub fn write(&self, dir: &Path) -> Result<TensorFiles, KszError> {
        fs::create_dir_all(dir).map_err(|err| KszError::io("tensor-mkdir", dir, err))?;
        let stem = self.file_stem();
        let tensor = dir.join(format!("{stem}.bin"));
        let metadata = dir.join(format!("{stem}.json"));
        let bytes = bincode::serialize(self)
            .map_err(|err| KszError::Serde(ErrorInfo::new("bincode-serialize", err.to_string())))?;
        fs::write(&tensor, &bytes).map_err(|err| KszError::io("tensor-write", &tensor, err))?;
        let meta = TensorMetadata {
            axion_mass: self.axion_mass,
            shape: self.shape,
            labels: self.labels.clone(),
            redshifts: self.redshifts.clone(),
            separations: self.separations.clone(),
            data_hash: stable_hash_string(&self.data)?,
        };
        fs::write(&metadata, to_canonical_json_bytes(&meta)?)
            .map_err(|err| KszError::io("tensor-write", &metadata, err))?;
        Ok(TensorFiles { tensor, metadata })
    }

    /// Reads a tensor written by [`DerivativeTensor::write`].
    pub fn read(path: &Path) -> Result<Self, KszError> {
        let bytes = fs::read(path).map_err(|err| KszError::io("tensor-read", path, err))?;
        let tensor: Self = bincode::deserialize(&bytes).map_err(|err| {
            KszError::Serde(
                ErrorInfo::new("bincode-deserialize", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        let [nd, nz, nr] = tensor.shape;
        if tensor.data.len() != nd * nz * nr {
            return Err(KszError::SchemaMismatch(
                ErrorInfo::new("tensor-shape", "tensor data does not match its shape")
                    .with_context("path", path.display().to_string()),
            ));
        }
        Ok(tensor)
    }
}

/// Sidecar describing a tensor file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorMetadata {
    pub axion_mass: f64,
    pub shape: [usize; 3],
    pub labels: Vec<DerivativeLabel>,
    pub redshifts: Vec<f64>,
    pub separations: Vec<f64>,
    pub data_hash: String,
}

/// Paths produced by [`DerivativeTensor::write`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorFiles {
    pub tensor: PathBuf,
    pub metadata: PathBuf,
}

/// `1.000E-26` style rendering of a mass.
pub fn format_mass(mass: f64) -> String {
    let raw = format!("{mass:.3E}");
    match raw.split_once('E') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ("-", digits),
                None => ("+", exponent),
            };
            format!("{mantissa}E{sign}{digits:0>2}")
        }
        None => raw,
    }
}
