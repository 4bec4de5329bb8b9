//! Consistency checks between indicator definitions, series and
//! neighborhoods. Used by the `validate` command on bundled or live data.

use crate::domain::{IndicatorDefinition, IndicatorSeries, Neighborhood};
use crate::series::is_strictly_ascending;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    MissingSeries { indicator: String },
    UnknownSeries { indicator: String },
    UnknownNeighborhoodMetric { neighborhood: String, indicator: String },
    NotAscending { indicator: String },
    BadPeriodLabel { indicator: String, date: String },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSeries { indicator } => write!(f, "missing series for {indicator}"),
            Self::UnknownSeries { indicator } => {
                write!(f, "series has unknown indicator id {indicator}")
            }
            Self::UnknownNeighborhoodMetric {
                neighborhood,
                indicator,
            } => write!(f, "neighborhood {neighborhood} has unknown indicator {indicator}"),
            Self::NotAscending { indicator } => {
                write!(f, "series {indicator} is not strictly ascending by date")
            }
            Self::BadPeriodLabel { indicator, date } => {
                write!(f, "series {indicator} has malformed period label {date}")
            }
        }
    }
}

pub fn validate(
    definitions: &[IndicatorDefinition],
    series: &IndicatorSeries,
    neighborhoods: &[Neighborhood],
) -> Vec<ValidationIssue> {
    let known: BTreeSet<&str> = definitions.iter().map(|d| d.id.as_str()).collect();
    let mut issues = Vec::new();

    for def in definitions {
        match series.get(&def.id) {
            None => issues.push(ValidationIssue::MissingSeries {
                indicator: def.id.clone(),
            }),
            Some(points) => {
                if !is_strictly_ascending(points) {
                    issues.push(ValidationIssue::NotAscending {
                        indicator: def.id.clone(),
                    });
                }
                for p in points.iter().filter(|p| !def.granularity.accepts(&p.date)) {
                    issues.push(ValidationIssue::BadPeriodLabel {
                        indicator: def.id.clone(),
                        date: p.date.clone(),
                    });
                }
            }
        }
    }

    for id in series.keys().filter(|id| !known.contains(id.as_str())) {
        issues.push(ValidationIssue::UnknownSeries { indicator: id.clone() });
    }

    for hood in neighborhoods {
        for key in hood.metrics.keys().filter(|k| !known.contains(k.as_str())) {
            issues.push(ValidationIssue::UnknownNeighborhoodMetric {
                neighborhood: hood.id.clone(),
                indicator: key.clone(),
            });
        }
    }

    issues
}
