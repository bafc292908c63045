//! Window-function tables.
//!
//! Each table stores only the first half of a symmetric window; the second
//! half is applied by indexing backwards. Tables are built once per
//! supported transform size and are read-only afterwards.

use std::f64::consts::PI;

use crate::error::{EngineError, Result};
use crate::params::analysis_constants::MIN_FFT_EXPONENT;
use crate::params::WindowKind;

/// Half-length coefficient table for one (size, window) pair
#[derive(Debug, Clone)]
pub struct WindowTable {
    kind: WindowKind,
    size: usize,
    half: Vec<f64>,
}

impl WindowTable {
    /// Build the table for a transform of `size` samples
    pub fn new(kind: WindowKind, size: usize) -> Self {
        let coefficients = kind.coefficients();
        let denom = (size.max(2) - 1) as f64;
        let half_correction = 0.5 / denom;

        let half = (0..size / 2)
            .map(|i| {
                let angle = PI * (i as f64 - half_correction) / denom;
                coefficients
                    .iter()
                    .enumerate()
                    .map(|(k, a)| a * (2.0 * k as f64 * angle).cos())
                    .sum()
            })
            .collect();

        Self { kind, size, half }
    }

    pub fn kind(&self) -> WindowKind {
        self.kind
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Coefficient for sample `i` of the full-length window
    pub fn coefficient(&self, i: usize) -> f64 {
        if i < self.size / 2 {
            self.half[i]
        } else {
            self.half[self.size - 1 - i]
        }
    }

    /// Multiply `samples` in place: first half forward, second half backward
    pub fn apply(&self, samples: &mut [f64]) {
        debug_assert_eq!(samples.len(), self.size);
        let (front, back) = samples.split_at_mut(self.size / 2);
        for (s, w) in front.iter_mut().zip(&self.half) {
            *s *= w;
        }
        for (s, w) in back.iter_mut().zip(self.half.iter().rev()) {
            *s *= w;
        }
    }

    /// Mean coefficient over the full window (≈1 for every kind)
    pub fn gain(&self) -> f64 {
        self.half.iter().sum::<f64>() * 2.0 / self.size as f64
    }

    /// Equivalent noise bandwidth in bins, for averaged-noise correction
    pub fn noise_gain_bins(&self) -> f64 {
        self.kind.noise_gain_bins()
    }
}

/// Every window table for every supported transform size
#[derive(Debug)]
pub struct WindowBank {
    max_exponent: u32,
    tables: Vec<Vec<WindowTable>>,
}

impl WindowBank {
    /// Build tables for sizes 2^MIN_FFT_EXPONENT..=2^max_exponent
    pub fn new(max_exponent: u32) -> Self {
        let tables = (MIN_FFT_EXPONENT..=max_exponent)
            .map(|exponent| {
                let size = 1usize << exponent;
                WindowKind::ALL
                    .iter()
                    .map(|&kind| WindowTable::new(kind, size))
                    .collect()
            })
            .collect();

        Self {
            max_exponent,
            tables,
        }
    }

    /// Table for a transform of 2^exponent samples
    pub fn table(&self, exponent: u32, kind: WindowKind) -> Result<&WindowTable> {
        if exponent < MIN_FFT_EXPONENT || exponent > self.max_exponent {
            return Err(EngineError::UnsupportedPlan {
                exponent,
                min: MIN_FFT_EXPONENT,
                max: self.max_exponent,
            });
        }
        Ok(&self.tables[(exponent - MIN_FFT_EXPONENT) as usize][kind.index()])
    }

    /// Number of tables held (plans × window kinds)
    pub fn len(&self) -> usize {
        self.tables.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
