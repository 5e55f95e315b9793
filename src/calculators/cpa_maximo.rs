use std::fmt;

use serde::{Deserialize, Serialize};

use super::{fmt_brl, ratio, Tool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostKind {
    /// Amount in reais per sale.
    Fixed,
    /// Share of the product price.
    Percentage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableCost {
    pub id: u64,
    pub name: String,
    pub value: f64,
    #[serde(rename = "type")]
    pub kind: CostKind,
}

/// Highest acquisition cost a product can afford at a given ROI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CpaMaximo {
    pub product_price: f64,
    pub platform_percentage: f64,
    pub platform_fixed: f64,
    pub variable_costs: Vec<VariableCost>,
}

impl Default for CpaMaximo {
    fn default() -> Self {
        Self {
            product_price: 197.0,
            platform_percentage: 6.99,
            platform_fixed: 2.50,
            variable_costs: vec![VariableCost {
                id: 1,
                name: "Impostos".to_string(),
                value: 10.0,
                kind: CostKind::Percentage,
            }],
        }
    }
}

impl CpaMaximo {
    /// Appends an empty fixed cost and returns its id.
    pub fn add_variable_cost(&mut self) -> u64 {
        let id = self.variable_costs.iter().map(|c| c.id).max().unwrap_or(0) + 1;
        self.variable_costs.push(VariableCost {
            id,
            name: String::new(),
            value: 0.0,
            kind: CostKind::Fixed,
        });
        id
    }

    pub fn remove_variable_cost(&mut self, id: u64) -> bool {
        let before = self.variable_costs.len();
        self.variable_costs.retain(|c| c.id != id);
        self.variable_costs.len() != before
    }

    pub fn variable_cost_mut(&mut self, id: u64) -> Option<&mut VariableCost> {
        self.variable_costs.iter_mut().find(|c| c.id == id)
    }

    pub fn platform_fee(&self) -> f64 {
        self.product_price * self.platform_percentage / 100.0 + self.platform_fixed
    }

    fn cost_amount(&self, cost: &VariableCost) -> f64 {
        match cost.kind {
            CostKind::Fixed => cost.value,
            CostKind::Percentage => self.product_price * cost.value / 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CpaReport {
    pub revenue_per_sale: f64,
    pub total_costs: f64,
    pub contribution_margin: f64,
    pub contribution_percentage: f64,
    pub cpa_roi_1: f64,
    pub cpa_roi_1_5: f64,
    pub cpa_roi_2: f64,
}

impl Tool for CpaMaximo {
    const NAME: &'static str = "cpa_maximo";

    type Report = CpaReport;

    fn evaluate(&self) -> CpaReport {
        let total_costs = self
            .variable_costs
            .iter()
            .fold(self.platform_fee(), |total, cost| {
                total + self.cost_amount(cost)
            });
        let margin = self.product_price - total_costs;

        CpaReport {
            revenue_per_sale: self.product_price,
            total_costs,
            contribution_margin: margin,
            contribution_percentage: ratio(margin, self.product_price) * 100.0,
            cpa_roi_1: margin.max(0.0),
            cpa_roi_1_5: (margin / 1.5).max(0.0),
            cpa_roi_2: (margin / 2.0).max(0.0),
        }
    }
}

impl fmt::Display for CpaReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Revenue per sale:      {}", fmt_brl(self.revenue_per_sale))?;
        writeln!(f, "Total variable costs:  {}", fmt_brl(self.total_costs))?;
        writeln!(
            f,
            "Contribution margin:   {} ({:.2}%)",
            fmt_brl(self.contribution_margin),
            self.contribution_percentage
        )?;
        writeln!(f, "Max CPA, ROI 1 (break even): {}", fmt_brl(self.cpa_roi_1))?;
        writeln!(f, "Max CPA, ROI 1.5:            {}", fmt_brl(self.cpa_roi_1_5))?;
        write!(f, "Max CPA, ROI 2 (ideal):      {}", fmt_brl(self.cpa_roi_2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_values() {
        let report = CpaMaximo::default().evaluate();

        assert!((report.contribution_margin - 161.0297).abs() < 1e-9);
        assert_eq!(fmt_brl(report.cpa_roi_1), "R$ 161,03");
        assert_eq!(fmt_brl(report.cpa_roi_1_5), "R$ 107,35");
        assert!((report.cpa_roi_2 - 80.51485).abs() < 1e-9);
    }

    #[test]
    fn test_fixed_and_percentage_costs() {
        let mut cpa = CpaMaximo {
            product_price: 100.0,
            platform_percentage: 0.0,
            platform_fixed: 0.0,
            variable_costs: Vec::new(),
        };
        let id = cpa.add_variable_cost();
        cpa.variable_cost_mut(id).unwrap().value = 15.0;
        let pct = cpa.add_variable_cost();
        let cost = cpa.variable_cost_mut(pct).unwrap();
        cost.kind = CostKind::Percentage;
        cost.value = 5.0;

        let report = cpa.evaluate();
        assert_eq!(report.total_costs, 20.0);
        assert_eq!(report.contribution_margin, 80.0);
        assert_eq!(report.contribution_percentage, 80.0);
    }

    #[test]
    fn test_negative_margin_floors_cpa_at_zero() {
        let cpa = CpaMaximo {
            product_price: 10.0,
            platform_fixed: 20.0,
            ..CpaMaximo::default()
        };
        let report = cpa.evaluate();
        assert!(report.contribution_margin < 0.0);
        assert_eq!(report.cpa_roi_1, 0.0);
        assert_eq!(report.cpa_roi_2, 0.0);
    }

    #[test]
    fn test_zero_price_has_zero_percentage() {
        let cpa = CpaMaximo {
            product_price: 0.0,
            ..CpaMaximo::default()
        };
        assert_eq!(cpa.evaluate().contribution_percentage, 0.0);
    }

    #[test]
    fn test_add_and_remove_costs() {
        let mut cpa = CpaMaximo::default();
        let id = cpa.add_variable_cost();
        assert_eq!(id, 2);
        assert!(cpa.remove_variable_cost(1));
        assert!(!cpa.remove_variable_cost(1));
        assert_eq!(cpa.variable_costs.len(), 1);
        assert_eq!(cpa.add_variable_cost(), 3);
    }

    #[test]
    fn test_payload_uses_type_key() {
        let value = serde_json::to_value(CpaMaximo::default()).unwrap();
        assert_eq!(value["variableCosts"][0]["type"], "percentage");
        assert_eq!(value["productPrice"], 197.0);
    }
}
