//! Measure definitions

use chrono::{DateTime, FixedOffset};
use octofhir_cqm_types::MeasureScoring;

use super::group::GroupDef;
use super::sde::SdeDef;
use crate::engine::LibraryIdentifier;
use crate::error::MeasureResult;

/// Default period the measure is evaluated over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurementPeriod {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

/// A measure and everything accumulated for it during one evaluation run
#[derive(Debug, Clone)]
pub struct MeasureDef {
    id: String,
    url: String,
    version: Option<String>,
    library: LibraryIdentifier,
    scoring: Option<MeasureScoring>,
    measurement_period: Option<MeasurementPeriod>,
    groups: Vec<GroupDef>,
    sdes: Vec<SdeDef>,
    errors: Vec<String>,
}

impl MeasureDef {
    /// Build a measure, resolving and validating the scoring of every group
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        library: LibraryIdentifier,
        scoring: Option<MeasureScoring>,
        mut groups: Vec<GroupDef>,
    ) -> MeasureResult<Self> {
        let url = url.into();
        for group in &mut groups {
            group.bind(scoring, &url)?;
        }
        Ok(Self {
            id: id.into(),
            url,
            version: None,
            library,
            scoring,
            measurement_period: None,
            groups,
            sdes: Vec::new(),
            errors: Vec::new(),
        })
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_measurement_period(mut self, period: MeasurementPeriod) -> Self {
        self.measurement_period = Some(period);
        self
    }

    pub fn with_sde(mut self, sde: SdeDef) -> Self {
        self.sdes.push(sde);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn library(&self) -> &LibraryIdentifier {
        &self.library
    }

    pub fn scoring(&self) -> Option<MeasureScoring> {
        self.scoring
    }

    pub fn measurement_period(&self) -> Option<&MeasurementPeriod> {
        self.measurement_period.as_ref()
    }

    pub fn groups(&self) -> &[GroupDef] {
        &self.groups
    }

    pub fn groups_mut(&mut self) -> &mut [GroupDef] {
        &mut self.groups
    }

    pub fn sdes(&self) -> &[SdeDef] {
        &self.sdes
    }

    pub fn sdes_mut(&mut self) -> &mut [SdeDef] {
        &mut self.sdes
    }

    /// Record a per-subject failure against this measure
    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }
}
