//! Performance metric descriptions and their propagation scopes.

use std::collections::BTreeMap;

use crate::error::{EntityKind, FormatError, FormatErrorKind};
use crate::structure::{Field, FieldType, VersionedStructure};
use crate::table::EntityTable;
use crate::utils::{capacity_hint, read_string, scaled_range, since, version_enum};

use super::ScopeIndex;

const METRICS_SECTION: VersionedStructure = VersionedStructure::new(&[
    Field::new("pMetrics", 0, 0x00, FieldType::U64),
    Field::new("nMetrics", 0, 0x08, FieldType::U32),
    Field::new("szMetric", 0, 0x0c, FieldType::U8),
    Field::new("szScopeInst", 0, 0x0d, FieldType::U8),
    Field::new("szSummary", 0, 0x0e, FieldType::U8),
    Field::new("pScopes", 0, 0x10, FieldType::U64),
    Field::new("nScopes", 0, 0x18, FieldType::U16),
    Field::new("szScope", 0, 0x1a, FieldType::U8),
]);

const METRIC: VersionedStructure = VersionedStructure::new(&[
    Field::new("pName", 0, 0x00, FieldType::U64),
    Field::new("pScopeInsts", 0, 0x08, FieldType::U64),
    Field::new("pSummaries", 0, 0x10, FieldType::U64),
    Field::new("nScopeInsts", 0, 0x18, FieldType::U16),
    Field::new("nSummaries", 0, 0x1a, FieldType::U16),
]);

const SCOPE_INSTANCE: VersionedStructure = VersionedStructure::new(&[
    Field::new("pScope", 0, 0x00, FieldType::U64),
    Field::new("propMetricId", 0, 0x08, FieldType::U16),
]);

const SUMMARY: VersionedStructure = VersionedStructure::new(&[
    Field::new("pScope", 0, 0x00, FieldType::U64),
    Field::new("pFormula", 0, 0x08, FieldType::U64),
    Field::new("combine", 0, 0x10, FieldType::U8),
    Field::new("statMetricId", 0, 0x12, FieldType::U16),
]);

const SCOPE: VersionedStructure = VersionedStructure::new(&[
    Field::new("pScopeName", 0, 0x00, FieldType::U64),
    Field::new("type", 0, 0x08, FieldType::U8),
    Field::new("propagationIndex", 0, 0x09, FieldType::U8),
]);

/// How metric values are propagated through the context tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ScopeKind {
    /// Propagation defined by the producer, with no fixed meaning.
    Custom,
    /// Values are attributed to the exact context only.
    Point,
    /// Values are propagated to every ancestor (inclusive costs).
    Execution,
    /// Values are propagated along edges whose bit is set in a context's propagation mask.
    Transitive {
        /// The bit in [`Context::propagation`](super::Context::propagation) governing this scope.
        propagation_index: u8,
    },
}

impl ScopeKind {
    fn decode(version: u8, ty: u8, propagation_index: u8) -> Result<Self, FormatError> {
        Ok(match ty {
            0 if since(version, 0) => ScopeKind::Custom,
            1 if since(version, 0) => ScopeKind::Point,
            2 if since(version, 0) => ScopeKind::Execution,
            3 if since(version, 0) => ScopeKind::Transitive { propagation_index },
            _ => {
                return Err(FormatErrorKind::InvalidEnumValue {
                    name: "ScopeKind",
                    value: ty.into(),
                }
                .into())
            }
        })
    }
}

/// A named propagation scope, shared between metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PropagationScope {
    /// The name of the scope, for example `point` or `execution`.
    pub name: String,
    /// The propagation rule of the scope.
    pub kind: ScopeKind,
}

/// A metric instantiated for one propagation scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ScopeInstance {
    /// The propagation scope.
    pub scope: ScopeIndex,
    /// The metric id of the propagated values, as used in `cct.db` and `profile.db`.
    pub prop_metric_id: u16,
}

version_enum! {
    /// How a summary statistic combines values across profiles.
    pub enum Combine: u8 {
        /// The sum of all values.
        Sum = 0, since 0;
        /// The smallest value.
        Min = 1, since 0;
        /// The largest value.
        Max = 2, since 0;
    }
}

/// A statistic summarizing a propagated metric across all profiles.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SummaryStatistic {
    /// The propagation scope the statistic was computed for.
    pub scope: ScopeIndex,
    /// The formula applied to each value before combining, `$$` stands for the value.
    pub formula: String,
    /// How the transformed values are combined.
    pub combine: Combine,
    /// The metric id of the statistic in the summary profile.
    pub stat_metric_id: u16,
}

/// A single performance metric.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Metric {
    /// The name of the metric, for example `cycles`.
    pub name: String,
    /// One instance per propagation scope, in file order.
    pub scope_instances: Vec<ScopeInstance>,
    /// The summary statistics, in file order.
    pub summaries: Vec<SummaryStatistic>,
}

/// Where a metric id is defined, as indices into [`PerformanceMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MetricSlot {
    metric: usize,
    entry: usize,
}

/// The metrics section of a `meta.db` file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PerformanceMetrics {
    /// All propagation scopes, in file order.
    pub scopes: Vec<PropagationScope>,
    /// All metrics, in file order.
    pub metrics: Vec<Metric>,
    #[cfg_attr(feature = "serde", serde(skip))]
    prop_ids: BTreeMap<u16, MetricSlot>,
    #[cfg_attr(feature = "serde", serde(skip))]
    stat_ids: BTreeMap<u16, MetricSlot>,
}

impl PerformanceMetrics {
    pub(crate) fn parse(version: u8, buf: &[u8], offset: u64) -> Result<Self, FormatError> {
        let section = METRICS_SECTION.decode(version, buf, offset)?;

        let scope_count = section.u64("nScopes")?;
        let scope_stride = section.u64("szScope")?;
        let mut scopes = EntityTable::with_capacity(
            EntityKind::Scope,
            capacity_hint(buf, scope_count, scope_stride),
        );
        for offset in scaled_range(section.u64("pScopes")?, scope_count, scope_stride) {
            let record = SCOPE.decode(version, buf, offset)?;
            let scope = PropagationScope {
                name: read_string(buf, record.u64("pScopeName")?)?,
                kind: ScopeKind::decode(
                    version,
                    record.u8("type")?,
                    record.u8("propagationIndex")?,
                )?,
            };
            scopes.push(offset, scope);
        }

        let inst_stride = section.u64("szScopeInst")?;
        let summary_stride = section.u64("szSummary")?;
        let metric_stride = section.u64("szMetric")?;
        let metric_count = section.u64("nMetrics")?;
        let mut metrics = Vec::with_capacity(capacity_hint(buf, metric_count, metric_stride));
        for offset in scaled_range(section.u64("pMetrics")?, metric_count, metric_stride) {
            let record = METRIC.decode(version, buf, offset)?;

            let mut scope_instances = Vec::new();
            let insts = scaled_range(
                record.u64("pScopeInsts")?,
                record.u64("nScopeInsts")?,
                inst_stride,
            );
            for offset in insts {
                let inst = SCOPE_INSTANCE.decode(version, buf, offset)?;
                scope_instances.push(ScopeInstance {
                    scope: ScopeIndex::new(scopes.resolve(inst.u64("pScope")?)?),
                    prop_metric_id: inst.u16("propMetricId")?,
                });
            }

            let mut summaries = Vec::new();
            let stats = scaled_range(
                record.u64("pSummaries")?,
                record.u64("nSummaries")?,
                summary_stride,
            );
            for offset in stats {
                let summary = SUMMARY.decode(version, buf, offset)?;
                summaries.push(SummaryStatistic {
                    scope: ScopeIndex::new(scopes.resolve(summary.u64("pScope")?)?),
                    formula: read_string(buf, summary.u64("pFormula")?)?,
                    combine: Combine::decode(version, summary.u8("combine")?)?,
                    stat_metric_id: summary.u16("statMetricId")?,
                });
            }

            metrics.push(Metric {
                name: read_string(buf, record.u64("pName")?)?,
                scope_instances,
                summaries,
            });
        }

        Ok(Self::new(scopes.into_items(), metrics))
    }

    /// Indexes metric ids. A later definition of the same id replaces an earlier one.
    fn new(scopes: Vec<PropagationScope>, metrics: Vec<Metric>) -> Self {
        let mut prop_ids = BTreeMap::new();
        let mut stat_ids = BTreeMap::new();
        for (metric, m) in metrics.iter().enumerate() {
            for (entry, inst) in m.scope_instances.iter().enumerate() {
                prop_ids.insert(inst.prop_metric_id, MetricSlot { metric, entry });
            }
            for (entry, summary) in m.summaries.iter().enumerate() {
                stat_ids.insert(summary.stat_metric_id, MetricSlot { metric, entry });
            }
        }

        PerformanceMetrics {
            scopes,
            metrics,
            prop_ids,
            stat_ids,
        }
    }

    /// Looks up a propagated metric id, as used in `cct.db` and non-summary profiles.
    pub fn prop_metric(&self, id: u16) -> Option<(&Metric, &ScopeInstance)> {
        let slot = self.prop_ids.get(&id)?;
        let metric = self.metrics.get(slot.metric)?;
        Some((metric, metric.scope_instances.get(slot.entry)?))
    }

    /// Looks up a summary statistic id, as used in the summary profile.
    pub fn summary_metric(&self, id: u16) -> Option<(&Metric, &SummaryStatistic)> {
        let slot = self.stat_ids.get(&id)?;
        let metric = self.metrics.get(slot.metric)?;
        Some((metric, metric.summaries.get(slot.entry)?))
    }

    /// Returns the propagation scope at `index`.
    pub fn scope(&self, index: ScopeIndex) -> Option<&PropagationScope> {
        self.scopes.get(index.index())
    }
}
