//! Marketing calculators.
//!
//! Each calculator is a serde payload persisted through
//! [`crate::sync::ToolDataSync`] under its [`Tool::NAME`], plus a pure
//! `evaluate` that turns the inputs into a report.

mod agendamento;
mod cpa_maximo;
mod planejamento;
mod simulador;
mod sonar;

pub use agendamento::{MetricasAgendamento, SchedulingReport};
pub use cpa_maximo::{CostKind, CpaMaximo, CpaReport, VariableCost};
pub use planejamento::{ConversionMetric, PlanReport, Planejamento, RevenueKind};
pub use simulador::{Recommendation, SimulationReport, Simulador, Verdict};
pub use sonar::{Sonar, SonarReport, SonarStatus};

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A calculator whose inputs are persisted per user.
pub trait Tool: Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static {
    /// Name of the persisted record.
    const NAME: &'static str;

    type Report: fmt::Display;

    fn evaluate(&self) -> Self::Report;
}

/// Every calculator, addressable by its persisted name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    CpaMaximo,
    Simulador,
    Planejamento,
    MetricasAgendamento,
    Sonar,
}

impl ToolKind {
    pub const ALL: [ToolKind; 5] = [
        ToolKind::CpaMaximo,
        ToolKind::Simulador,
        ToolKind::Planejamento,
        ToolKind::MetricasAgendamento,
        ToolKind::Sonar,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::CpaMaximo => CpaMaximo::NAME,
            ToolKind::Simulador => Simulador::NAME,
            ToolKind::Planejamento => Planejamento::NAME,
            ToolKind::MetricasAgendamento => MetricasAgendamento::NAME,
            ToolKind::Sonar => Sonar::NAME,
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ToolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        ToolKind::ALL
            .into_iter()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = ToolKind::ALL.iter().map(ToolKind::name).collect();
                format!("Unknown tool '{}'. Valid options: {}", s, names.join(", "))
            })
    }
}

/// Traffic-light rating of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Green,
    Yellow,
    Red,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Green => write!(f, "green"),
            Signal::Yellow => write!(f, "yellow"),
            Signal::Red => write!(f, "red"),
        }
    }
}

/// `numerator / denominator`, or 0 when the denominator is not positive.
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Formats an amount as Brazilian reais, e.g. `R$ 9.390,86`.
pub fn fmt_brl(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let digits = (cents / 100).to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}R$ {},{:02}", sign, grouped, cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_brl() {
        assert_eq!(fmt_brl(9390.86), "R$ 9.390,86");
        assert_eq!(fmt_brl(0.0), "R$ 0,00");
        assert_eq!(fmt_brl(1234567.891), "R$ 1.234.567,89");
        assert_eq!(fmt_brl(-250.0), "-R$ 250,00");
        assert_eq!(fmt_brl(999.999), "R$ 1.000,00");
    }

    #[test]
    fn test_ratio_guards_zero() {
        assert_eq!(ratio(10.0, 0.0), 0.0);
        assert_eq!(ratio(10.0, -1.0), 0.0);
        assert_eq!(ratio(10.0, 4.0), 2.5);
    }

    #[test]
    fn test_tool_kind_from_str() {
        assert_eq!("sonar".parse::<ToolKind>().unwrap(), ToolKind::Sonar);
        assert_eq!(
            "CPA-maximo".parse::<ToolKind>().unwrap(),
            ToolKind::CpaMaximo
        );
        assert!("roi".parse::<ToolKind>().is_err());
    }

    #[test]
    fn test_tool_names_are_unique() {
        let mut names: Vec<&str> = ToolKind::ALL.iter().map(ToolKind::name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), ToolKind::ALL.len());
    }
}
