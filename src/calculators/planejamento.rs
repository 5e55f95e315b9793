use std::fmt;

use serde::{Deserialize, Serialize};

use super::{fmt_brl, ratio, Tool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RevenueKind {
    #[serde(rename = "produto")]
    Product,
    #[serde(rename = "servico")]
    Service,
    #[serde(rename = "comissao")]
    Commission,
}

/// Funnel event paid for on the way to a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionMetric {
    #[serde(rename = "leads")]
    Leads,
    #[serde(rename = "cliques")]
    Clicks,
    #[serde(rename = "checkouts")]
    Checkouts,
    #[serde(rename = "conversas")]
    Conversations,
}

impl ConversionMetric {
    pub fn label(&self) -> &'static str {
        match self {
            ConversionMetric::Leads => "Leads",
            ConversionMetric::Clicks => "Clicks",
            ConversionMetric::Checkouts => "Checkouts",
            ConversionMetric::Conversations => "Conversations",
        }
    }

    pub fn cost_label(&self) -> &'static str {
        match self {
            ConversionMetric::Leads => "Average cost per lead (CPL)",
            ConversionMetric::Clicks => "Average cost per click (CPC)",
            ConversionMetric::Checkouts => "Cost per initiated checkout",
            ConversionMetric::Conversations => "Cost per started conversation",
        }
    }
}

/// Works back from a revenue goal to the traffic investment it needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Planejamento {
    pub revenue_goal: f64,
    pub revenue_kind: RevenueKind,
    pub revenue_value: f64,
    pub conversion_metric: ConversionMetric,
    pub events_per_sale: f64,
    pub cost_per_event: f64,
}

impl Default for Planejamento {
    fn default() -> Self {
        Self {
            revenue_goal: 50_000.0,
            revenue_kind: RevenueKind::Product,
            revenue_value: 197.0,
            conversion_metric: ConversionMetric::Leads,
            events_per_sale: 20.0,
            cost_per_event: 8.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanReport {
    pub required_sales: f64,
    pub total_events: f64,
    pub total_investment: f64,
    pub gross_profit: f64,
    pub roas: f64,
    pub final_conversion_rate: f64,
    pub metric: ConversionMetric,
}

impl PlanReport {
    /// Whole sales needed to hit the goal.
    pub fn sales_to_close(&self) -> u64 {
        self.required_sales.ceil() as u64
    }

    pub fn events_to_generate(&self) -> u64 {
        self.total_events.ceil() as u64
    }
}

impl Tool for Planejamento {
    const NAME: &'static str = "planejamento";

    type Report = PlanReport;

    fn evaluate(&self) -> PlanReport {
        let required_sales = ratio(self.revenue_goal, self.revenue_value);
        let total_events = required_sales * self.events_per_sale;
        let total_investment = total_events * self.cost_per_event;

        PlanReport {
            required_sales,
            total_events,
            total_investment,
            gross_profit: self.revenue_goal - total_investment,
            roas: ratio(self.revenue_goal, total_investment),
            final_conversion_rate: ratio(100.0, self.events_per_sale),
            metric: self.conversion_metric,
        }
    }
}

impl fmt::Display for PlanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Required investment: {}", fmt_brl(self.total_investment))?;
        writeln!(f, "Gross profit:        {}", fmt_brl(self.gross_profit))?;
        writeln!(f, "Expected ROAS:       {:.2}", self.roas)?;
        writeln!(f, "Sales needed:        {}", self.sales_to_close())?;
        writeln!(
            f,
            "{} needed: {}",
            self.metric.label(),
            self.events_to_generate()
        )?;
        write!(f, "Final conversion:    {:.2}%", self.final_conversion_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_values() {
        let report = Planejamento::default().evaluate();

        assert_eq!(report.sales_to_close(), 254);
        assert_eq!(fmt_brl(report.gross_profit), "R$ 9.390,86");
        assert_eq!(report.final_conversion_rate, 5.0);
        assert_eq!(report.events_to_generate(), 5077);
    }

    #[test]
    fn test_zero_price_and_events_do_not_divide_by_zero() {
        let plan = Planejamento {
            revenue_value: 0.0,
            events_per_sale: 0.0,
            ..Planejamento::default()
        };
        let report = plan.evaluate();
        assert_eq!(report.required_sales, 0.0);
        assert_eq!(report.total_investment, 0.0);
        assert_eq!(report.roas, 0.0);
        assert_eq!(report.final_conversion_rate, 0.0);
        assert_eq!(report.gross_profit, 50_000.0);
    }

    #[test]
    fn test_kinds_keep_their_stored_names() {
        let plan = Planejamento {
            revenue_kind: RevenueKind::Commission,
            conversion_metric: ConversionMetric::Conversations,
            ..Planejamento::default()
        };
        let value = serde_json::to_value(plan).unwrap();
        assert_eq!(value["revenueKind"], "comissao");
        assert_eq!(value["conversionMetric"], "conversas");
    }
}
