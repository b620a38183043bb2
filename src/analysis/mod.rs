/// Spot analysis: ingest, optional background subtraction, Gaussian fit, widths.

pub mod derive;
pub mod fitting;
pub mod model;
pub mod params;
pub mod residual;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, warn};
use ndarray::Array2;

use crate::calibration::Calibration;
use crate::formats::{BinaryLayout, ReaderRegistry};
use crate::pipeline;
use crate::types::{CalibratedImage, SourceInfo, Warning};

use derive::DerivedMetrics;
use fitting::{FitOptions, FitResult};
use model::MeshGrid;
use params::{ParamId, ParamSet, NUM_PARAMS};

/// Everything one analysis produces. Read-only snapshot for display layers.
#[derive(Clone, Debug)]
pub struct SpotReport {
    /// Where the primary image came from (`None` for in-memory input).
    pub source: Option<SourceInfo>,
    /// Observed image, after background subtraction if it was applied.
    pub image: CalibratedImage,
    /// Whether a background image was subtracted.
    pub background_subtracted: bool,
    /// Parameters the optimizer started from.
    pub initial: ParamSet,
    /// Model evaluated at the initial parameters.
    pub guess: Array2<f64>,
    pub fit: FitResult,
    pub metrics: DerivedMetrics,
    pub warnings: Vec<Warning>,
}

impl SpotReport {
    pub fn fitted(&self) -> &Array2<f64> {
        &self.fit.model
    }

    /// Observed minus fitted.
    pub fn residual(&self) -> &Array2<f64> {
        &self.fit.residual
    }

    /// `x width=(w±s)µm` / `y width=(w±s)µm`.
    pub fn summary_lines(&self) -> [String; 2] {
        let fmt = |axis: &str, w: f64, s: Option<f64>| match s {
            Some(s) => format!("{} width=({}\u{00B1}{})\u{00B5}m", axis, w, s),
            None => format!("{} width=({}\u{00B1}n/a)\u{00B5}m", axis, w),
        };
        [
            fmt("x", self.metrics.width_x, self.metrics.width_x_uncertainty),
            fmt("y", self.metrics.width_y, self.metrics.width_y_uncertainty),
        ]
    }
}

/// Changes applied on top of the image-derived initial guess.
#[derive(Clone, Debug, Default)]
struct ParamOverrides {
    values: [Option<f64>; NUM_PARAMS],
    bounds: [Option<(f64, f64)>; NUM_PARAMS],
    vary: [Option<bool>; NUM_PARAMS],
}

impl ParamOverrides {
    fn apply(&self, set: &mut ParamSet) {
        for id in ParamId::ALL {
            let i = id.index();
            if let Some(v) = self.values[i] {
                set.set_value(id, v);
            }
            if let Some((min, max)) = self.bounds[i] {
                set.set_bounds(id, min, max);
            }
            if let Some(vary) = self.vary[i] {
                set.set_vary(id, vary);
            }
        }
    }
}

/// Builder configuration for analysis (internal).
struct AnalysisConfig {
    readers: ReaderRegistry,
    calibration: Calibration,
    background: Option<PathBuf>,
    subtract_background: bool,
    overrides: ParamOverrides,
    fit_options: FitOptions,
}

/// Spot analyzer with builder pattern.
pub struct SpotAnalyzer {
    config: AnalysisConfig,
    thread_pool: Option<Arc<rayon::ThreadPool>>,
}

impl SpotAnalyzer {
    pub fn new() -> Self {
        SpotAnalyzer {
            config: AnalysisConfig {
                readers: ReaderRegistry::default(),
                calibration: Calibration::default(),
                background: None,
                subtract_background: false,
                overrides: ParamOverrides::default(),
                fit_options: FitOptions::default(),
            },
            thread_pool: None,
        }
    }

    /// Subtract this image from every analyzed image.
    pub fn with_background<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.background = Some(path.as_ref().to_path_buf());
        self.config.subtract_background = true;
        self
    }

    /// Request background subtraction. Without a background image this is
    /// reported as [`Warning::MissingBackground`] and no correction is made.
    pub fn with_background_subtraction(mut self) -> Self {
        self.config.subtract_background = true;
        self
    }

    /// Keep the selected background but do not subtract it.
    pub fn without_background_subtraction(mut self) -> Self {
        self.config.subtract_background = false;
        self
    }

    pub fn with_calibration(mut self, calibration: Calibration) -> Self {
        self.config.calibration = calibration;
        self
    }

    /// Geometry and sample type of `.dat` files.
    pub fn with_binary_layout(mut self, layout: BinaryLayout) -> Self {
        self.config.readers.binary_layout = layout;
        self
    }

    /// Field separator of delimited-text files.
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.config.readers.delimiter = delimiter;
        self
    }

    /// Start the optimizer at `value` instead of the default guess.
    pub fn with_initial_value(mut self, id: ParamId, value: f64) -> Self {
        self.config.overrides.values[id.index()] = Some(value);
        self
    }

    pub fn with_bounds(mut self, id: ParamId, min: f64, max: f64) -> Self {
        self.config.overrides.bounds[id.index()] = Some((min, max));
        self
    }

    /// Hold a parameter at its initial value.
    pub fn with_fixed(mut self, id: ParamId) -> Self {
        self.config.overrides.vary[id.index()] = Some(false);
        self
    }

    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.config.fit_options.max_iterations = n.max(1);
        self
    }

    /// Use a custom rayon thread pool.
    pub fn with_thread_pool(mut self, pool: Arc<rayon::ThreadPool>) -> Self {
        self.thread_pool = Some(pool);
        self
    }

    /// Analyze an image file.
    pub fn analyze<P: AsRef<Path>>(&self, path: P) -> Result<SpotReport> {
        let path = path.as_ref();
        match &self.thread_pool {
            Some(pool) => pool.install(|| self.analyze_impl(path)),
            None => self.analyze_impl(path),
        }
    }

    /// Analyze an already calibrated image, with an optional in-memory background.
    pub fn analyze_image(
        &self,
        image: &CalibratedImage,
        background: Option<&CalibratedImage>,
    ) -> Result<SpotReport> {
        let run = || {
            let mut warnings = Vec::new();
            let (image, subtracted) = match background {
                Some(bg) => (
                    pipeline::subtract_background(image, bg)
                        .context("Background subtraction failed")?,
                    true,
                ),
                None => (image.clone(), false),
            };
            self.run_analysis(None, image, subtracted, &mut warnings)
        };
        match &self.thread_pool {
            Some(pool) => pool.install(run),
            None => run(),
        }
    }

    fn analyze_impl(&self, path: &Path) -> Result<SpotReport> {
        let (info, image) = pipeline::ingest_with(path, &self.config.readers, &self.config.calibration)
            .with_context(|| format!("Failed to ingest {}", path.display()))?;
        let mut warnings = info.warnings.clone();

        let (image, subtracted) = if self.config.subtract_background {
            match &self.config.background {
                Some(bg_path) => {
                    let (bg_info, background) = pipeline::ingest_with(
                        bg_path,
                        &self.config.readers,
                        &self.config.calibration,
                    )
                    .with_context(|| {
                        format!("Failed to ingest background {}", bg_path.display())
                    })?;
                    warnings.extend(bg_info.warnings);
                    let corrected = pipeline::subtract_background(&image, &background)
                        .context("Background subtraction failed")?;
                    (corrected, true)
                }
                None => {
                    warn!("{}", Warning::MissingBackground);
                    warnings.push(Warning::MissingBackground);
                    (image, false)
                }
            }
        } else {
            (image, false)
        };

        self.run_analysis(Some(info), image, subtracted, &mut warnings)
    }

    fn run_analysis(
        &self,
        source: Option<SourceInfo>,
        image: CalibratedImage,
        background_subtracted: bool,
        warnings: &mut Vec<Warning>,
    ) -> Result<SpotReport> {
        let mut initial = ParamSet::initial_guess(image.data());
        self.config.overrides.apply(&mut initial);
        debug!("Initial parameters: {:?}", initial.values());

        let grid = MeshGrid::from_image(&image);
        let guess = model::evaluate(&initial.values(), &grid);

        let fit = fitting::fit(&initial, &grid, image.data(), &self.config.fit_options)
            .context("Spot fit failed")?;

        if !fit.converged {
            let warning = Warning::FitNonConvergence {
                iterations: fit.iterations,
            };
            warn!("{}", warning);
            warnings.push(warning);
        }

        let metrics = derive::derive(&fit, &image);

        Ok(SpotReport {
            source,
            image,
            background_subtracted,
            initial,
            guess,
            fit,
            metrics,
            warnings: std::mem::take(warnings),
        })
    }
}

impl Default for SpotAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
