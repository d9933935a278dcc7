//! The coordinate transformation chain.
//!
//! A [`CoordinatesTransformer`] is built once from a [`ChainConfig`] and then applied to any
//! number of coordinate runs. Stages always run in the order simplify, reproject, reverse, swap,
//! and the result is handed to a [`CoordinatesWriter`] which formats it. A built chain holds no
//! mutable state and can be shared between threads.
use std::{fmt, sync::Arc};

use tracing::debug;

use crate::{
    config::ChainConfig,
    error::{Error, Result},
    event::GeometryType,
    geometry::{
        crs::{CrsTransformer, CrsTransformerFactory, EpsgCrs},
        simplify::simplify,
        writer::{CoordinateFormatter, CoordinatesWriter, TextCoordinatesWriter},
    },
};

/// What a stage may know about the run it is processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunContext {
    pub geometry_type: GeometryType,
}

impl RunContext {
    #[must_use]
    pub fn new(geometry_type: GeometryType) -> Self {
        Self { geometry_type }
    }
}

/// One step of the chain, working on a flat run of `dimension`-tuples.
pub trait CoordinatesStage: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// # Errors
    ///
    /// Stage specific, e.g. a reprojection that cannot handle the dimension.
    fn process(
        &self,
        coordinates: Vec<f64>,
        dimension: usize,
        context: &RunContext,
    ) -> Result<Vec<f64>>;
}

#[derive(Debug)]
struct SimplifyStage {
    tolerance: f64,
    min_points: Option<usize>,
}

impl SimplifyStage {
    fn min_points(&self, geometry_type: GeometryType) -> usize {
        match (self.min_points, geometry_type) {
            (Some(min_points), _) => min_points,
            (None, GeometryType::Unknown) => 0,
            (None, geometry_type) if geometry_type.is_polygonal() => 4,
            (None, _) => 2,
        }
    }
}

impl CoordinatesStage for SimplifyStage {
    fn name(&self) -> &'static str {
        "simplify"
    }

    fn process(
        &self,
        coordinates: Vec<f64>,
        dimension: usize,
        context: &RunContext,
    ) -> Result<Vec<f64>> {
        Ok(simplify(
            &coordinates,
            dimension,
            self.tolerance,
            self.min_points(context.geometry_type),
        ))
    }
}

#[derive(Debug)]
struct ReprojectStage {
    transformer: Arc<dyn CrsTransformer>,
}

impl CoordinatesStage for ReprojectStage {
    fn name(&self) -> &'static str {
        "reproject"
    }

    fn process(&self, coordinates: Vec<f64>, dimension: usize, _: &RunContext) -> Result<Vec<f64>> {
        self.transformer.transform(
            &coordinates,
            dimension,
            self.transformer.needs_coordinate_swap(),
        )
    }
}

#[derive(Debug)]
struct ReverseStage;

impl CoordinatesStage for ReverseStage {
    fn name(&self) -> &'static str {
        "reverse"
    }

    fn process(&self, coordinates: Vec<f64>, dimension: usize, _: &RunContext) -> Result<Vec<f64>> {
        Ok(coordinates
            .chunks_exact(dimension)
            .rev()
            .flatten()
            .copied()
            .collect())
    }
}

#[derive(Debug)]
struct SwapStage;

impl CoordinatesStage for SwapStage {
    fn name(&self) -> &'static str {
        "swap"
    }

    fn process(
        &self,
        mut coordinates: Vec<f64>,
        dimension: usize,
        _: &RunContext,
    ) -> Result<Vec<f64>> {
        for tuple in coordinates.chunks_exact_mut(dimension) {
            tuple.swap(0, 1);
        }
        Ok(coordinates)
    }
}

/// Converts a tolerance given in target units to source units.
#[allow(clippy::float_cmp)]
fn normalize_tolerance(tolerance: f64, transformer: Option<&dyn CrsTransformer>) -> f64 {
    let Some(transformer) = transformer else {
        return tolerance;
    };
    let target = transformer.target_unit_equivalent_in_meters();
    let source = transformer.source_unit_equivalent_in_meters();

    match (target == 1.0, source == 1.0) {
        (true, false) => tolerance / source,
        (false, true) => tolerance * target,
        _ => tolerance,
    }
}

#[derive(Debug)]
pub struct CoordinatesTransformer {
    source_crs: EpsgCrs,
    target_crs: EpsgCrs,
    stages: Vec<Box<dyn CoordinatesStage>>,
    formatter: CoordinateFormatter,
}

impl CoordinatesTransformer {
    /// Builds the chain. All CRS lookups happen here, so an unusable configuration fails before
    /// any coordinate was read.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for an invalid configuration, [`Error::UnsupportedCrs`] if the factory
    /// does not know the source or target system.
    pub fn build(config: &ChainConfig, factory: &dyn CrsTransformerFactory) -> Result<Self> {
        config.validate()?;
        for crs in [&config.source_crs, &config.target_crs] {
            if !factory.is_supported(crs) {
                return Err(Error::UnsupportedCrs(crs.to_string()));
            }
        }

        let transformer = factory.transformer(&config.source_crs, &config.target_crs)?;
        let tolerance = normalize_tolerance(config.simplify_tolerance, transformer.as_deref());

        let mut stages: Vec<Box<dyn CoordinatesStage>> = Vec::new();
        if tolerance > 0.0 {
            stages.push(Box::new(SimplifyStage {
                tolerance,
                min_points: config.min_points_for_simplify,
            }));
        }
        if let Some(transformer) = transformer {
            stages.push(Box::new(ReprojectStage { transformer }));
        }
        if config.reverse_order {
            stages.push(Box::new(ReverseStage));
        }
        if config.swap_axes {
            stages.push(Box::new(SwapStage));
        }

        let chain = Self {
            source_crs: config.source_crs,
            target_crs: config.target_crs,
            stages,
            formatter: CoordinateFormatter::new(config.output_precision),
        };
        debug!(
            source = %chain.source_crs,
            target = %chain.target_crs,
            stages = ?chain.stage_names(),
            precision = config.output_precision,
            "built coordinate chain"
        );
        Ok(chain)
    }

    /// A chain without stages and without rounding.
    #[must_use]
    pub fn identity() -> Self {
        Self {
            source_crs: EpsgCrs::default(),
            target_crs: EpsgCrs::default(),
            stages: Vec::new(),
            formatter: CoordinateFormatter::default(),
        }
    }

    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// No stage and no rounding: output equals input.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.stages.is_empty() && self.formatter.precision() == 0
    }

    #[must_use]
    pub fn formatter(&self) -> CoordinateFormatter {
        self.formatter
    }

    #[must_use]
    pub fn source_crs(&self) -> EpsgCrs {
        self.source_crs
    }

    #[must_use]
    pub fn target_crs(&self) -> EpsgCrs {
        self.target_crs
    }

    /// Runs all stages on one run. Values are not rounded here, see [`Self::write`].
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCoordinates`] if the run does not consist of whole tuples, otherwise
    /// whatever a stage reports.
    pub fn process(
        &self,
        coordinates: Vec<f64>,
        dimension: usize,
        context: &RunContext,
    ) -> Result<Vec<f64>> {
        if !(2..=3).contains(&dimension) {
            return Err(Error::Dimension {
                expected: 2,
                found: dimension,
            });
        }
        if coordinates.len() % dimension != 0 {
            return Err(Error::coordinates(
                format!("{} values", coordinates.len()),
                format!("not a multiple of dimension {dimension}"),
            ));
        }

        self.stages
            .iter()
            .try_fold(coordinates, |coordinates, stage| {
                stage.process(coordinates, dimension, context)
            })
    }

    /// Runs all stages and hands the result to `writer`.
    ///
    /// # Errors
    ///
    /// See [`Self::process`], plus whatever the writer reports.
    pub fn write(
        &self,
        coordinates: Vec<f64>,
        dimension: usize,
        context: &RunContext,
        writer: &mut dyn CoordinatesWriter,
    ) -> Result<()> {
        let transformed = self.process(coordinates, dimension, context)?;
        writer.write(&transformed, dimension)
    }

    /// Runs all stages and formats the result as text.
    ///
    /// # Errors
    ///
    /// See [`Self::process`].
    pub fn to_text(
        &self,
        coordinates: Vec<f64>,
        dimension: usize,
        context: &RunContext,
    ) -> Result<String> {
        let mut writer = TextCoordinatesWriter::new(self.formatter);
        self.write(coordinates, dimension, context, &mut writer)?;
        Ok(writer.into_string())
    }
}
