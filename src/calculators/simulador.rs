use std::fmt;

use serde::{Deserialize, Serialize};

use super::{fmt_brl, ratio, Signal, Tool};

/// Snapshot of a running campaign, judged for scaling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Simulador {
    pub product_value: f64,
    pub daily_budget: f64,
    pub spend: f64,
    pub sales: f64,
    pub ctr: f64,
    pub cpc: f64,
    pub cpm: f64,
    pub frequency: f64,
}

impl Default for Simulador {
    fn default() -> Self {
        Self {
            product_value: 197.0,
            daily_budget: 100.0,
            spend: 500.0,
            sales: 5.0,
            ctr: 2.5,
            cpc: 1.2,
            cpm: 15.0,
            frequency: 1.8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    ScaleVertically,
    ScaleHorizontally,
    KeepOptimizing,
    Pause,
}

impl Verdict {
    pub fn title(&self) -> &'static str {
        match self {
            Verdict::ScaleVertically => "SCALE VERTICALLY",
            Verdict::ScaleHorizontally => "SCALE HORIZONTALLY",
            Verdict::KeepOptimizing => "KEEP AND OPTIMIZE",
            Verdict::Pause => "PAUSE OR ADJUST",
        }
    }

    pub fn advice(&self) -> &'static str {
        match self {
            Verdict::ScaleVertically => {
                "The campaign performs exceptionally well: ROAS above 2.0 and CPA within the ideal limit."
            }
            Verdict::ScaleHorizontally => {
                "Promising results with ROAS between 1.5 and 2.0. Controlled tests are recommended."
            }
            Verdict::KeepOptimizing => "Make small adjustments before scaling.",
            Verdict::Pause => "Critical indicators: ROAS below break even or CPA too high.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recommendation {
    pub signal: Signal,
    pub title: &'static str,
    pub text: &'static str,
}

impl Recommendation {
    fn new(signal: Signal, title: &'static str, text: &'static str) -> Self {
        Self {
            signal,
            title,
            text,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationReport {
    pub spend: f64,
    pub revenue: f64,
    pub profit: f64,
    pub cpa: f64,
    pub roas: f64,
    pub cpa_max: f64,
    pub cpa_ideal: f64,
    pub cpa_target: f64,
    pub verdict: Verdict,
    pub recommendations: Vec<Recommendation>,
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl Simulador {
    fn verdict(roas: f64, cpa: f64, cpa_target: f64) -> Verdict {
        if roas >= 2.0 && cpa <= cpa_target {
            Verdict::ScaleVertically
        } else if (1.5..2.0).contains(&roas) {
            Verdict::ScaleHorizontally
        } else if (1.0..1.5).contains(&roas) {
            Verdict::KeepOptimizing
        } else {
            Verdict::Pause
        }
    }

    fn recommendations(&self, roas: f64) -> Vec<Recommendation> {
        let mut recs = Vec::with_capacity(4);

        recs.push(if self.ctr < 1.0 {
            Recommendation::new(
                Signal::Red,
                "Critical CTR",
                "CTR below 1%: the ad is not catching attention. Review the headline, copy and above all the creative.",
            )
        } else if self.ctr < 2.0 {
            Recommendation::new(
                Signal::Yellow,
                "Average CTR",
                "CTR between 1% and 2% is acceptable but can improve. Test new creative angles.",
            )
        } else {
            Recommendation::new(
                Signal::Green,
                "Healthy CTR",
                "Excellent CTR. Keep the current creative structure and focus on scaling.",
            )
        });

        recs.push(if self.cpc > 2.5 {
            Recommendation::new(
                Signal::Red,
                "High CPC",
                "A CPC above R$ 2,50 is a warning sign: the audience may be saturated or the ad not relevant. Test new audiences or improve the ad.",
            )
        } else if self.cpc > 1.5 {
            Recommendation::new(
                Signal::Yellow,
                "Average CPC",
                "CPC is in the attention range. Monitor it and optimize creative or targeting to bring it down.",
            )
        } else {
            Recommendation::new(
                Signal::Green,
                "Ideal CPC",
                "Great CPC: the ad is attractive to the selected audience, a strong signal to scale.",
            )
        });

        recs.push(if self.frequency > 2.5 {
            Recommendation::new(
                Signal::Red,
                "High frequency",
                "Frequency above 2.5 suggests audience saturation. Rotate creatives or widen the audience.",
            )
        } else if self.frequency > 2.0 {
            Recommendation::new(
                Signal::Yellow,
                "Average frequency",
                "Frequency is approaching 2.5. Start preparing new creatives.",
            )
        } else {
            Recommendation::new(
                Signal::Green,
                "Healthy frequency",
                "Frequency is at ideal levels. Keep going.",
            )
        });

        recs.push(if roas >= 2.0 {
            Recommendation::new(
                Signal::Green,
                "Excellent ROAS",
                "ROAS above 2.0 means high profitability. Raise the budget gradually and consider lookalike audiences.",
            )
        } else if roas >= 1.0 {
            Recommendation::new(
                Signal::Yellow,
                "Average ROAS",
                "ROAS between 1.0 and 2.0 pays for itself with a tight margin. Optimize CPA and conversion before scaling.",
            )
        } else {
            Recommendation::new(
                Signal::Red,
                "Insufficient ROAS",
                "The campaign is losing money. Pause now or make drastic changes to offer, page or structure.",
            )
        });

        recs
    }
}

impl Tool for Simulador {
    const NAME: &'static str = "simulador";

    type Report = SimulationReport;

    fn evaluate(&self) -> SimulationReport {
        let revenue = self.product_value * self.sales;
        let cpa = ratio(self.spend, self.sales);
        let roas = ratio(revenue, self.spend);
        let cpa_target = round_cents(self.product_value / 2.0);

        SimulationReport {
            spend: self.spend,
            revenue,
            profit: revenue - self.spend,
            cpa,
            roas,
            cpa_max: self.product_value,
            cpa_ideal: round_cents(self.product_value / 1.5),
            cpa_target,
            verdict: Self::verdict(roas, cpa, cpa_target),
            recommendations: self.recommendations(roas),
        }
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: {}", self.verdict.title(), self.verdict.advice())?;
        writeln!(f)?;
        writeln!(f, "CPA: {}", fmt_brl(self.cpa))?;
        writeln!(f, "ROAS: {:.2}", self.roas)?;
        writeln!(f, "Revenue: {}", fmt_brl(self.revenue))?;
        writeln!(f, "Profit: {}", fmt_brl(self.profit))?;
        writeln!(
            f,
            "CPA max {} / ideal {} / target {}",
            fmt_brl(self.cpa_max),
            fmt_brl(self.cpa_ideal),
            fmt_brl(self.cpa_target)
        )?;
        for rec in &self.recommendations {
            write!(f, "\n[{}] {}: {}", rec.signal, rec.title, rec.text)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_campaign() {
        let sim = Simulador {
            spend: 250.0,
            ctr: 3.0,
            cpc: 1.0,
            frequency: 1.5,
            ..Simulador::default()
        };
        let report = sim.evaluate();

        assert_eq!(report.cpa, 50.0);
        assert_eq!(format!("{:.2}", report.roas), "3.94");
        assert_eq!(report.revenue, 985.0);
        assert_eq!(report.profit, 735.0);
        assert_eq!(report.verdict, Verdict::ScaleVertically);
        assert!(report
            .recommendations
            .iter()
            .all(|r| r.signal == Signal::Green));
    }

    #[test]
    fn test_verdict_bands() {
        assert_eq!(Simulador::verdict(1.7, 0.0, 50.0), Verdict::ScaleHorizontally);
        assert_eq!(Simulador::verdict(1.0, 0.0, 50.0), Verdict::KeepOptimizing);
        assert_eq!(Simulador::verdict(0.9, 0.0, 50.0), Verdict::Pause);
        assert_eq!(Simulador::verdict(2.5, 60.0, 50.0), Verdict::Pause);
    }

    #[test]
    fn test_no_sales_and_no_spend_yield_zero() {
        let sim = Simulador {
            sales: 0.0,
            spend: 0.0,
            ..Simulador::default()
        };
        let report = sim.evaluate();
        assert_eq!(report.cpa, 0.0);
        assert_eq!(report.roas, 0.0);
        assert_eq!(report.verdict, Verdict::Pause);
    }

    #[test]
    fn test_recommendation_thresholds() {
        let sim = Simulador {
            ctr: 0.5,
            cpc: 2.0,
            frequency: 3.0,
            ..Simulador::default()
        };
        let signals: Vec<Signal> = sim
            .evaluate()
            .recommendations
            .iter()
            .map(|r| r.signal)
            .collect();
        // default campaign: revenue 985 on 500 spend
        assert_eq!(
            signals,
            vec![Signal::Red, Signal::Yellow, Signal::Red, Signal::Yellow]
        );
    }

    #[test]
    fn test_cpa_targets() {
        let report = Simulador::default().evaluate();
        assert_eq!(report.cpa_max, 197.0);
        assert_eq!(report.cpa_ideal, 131.33);
        assert_eq!(report.cpa_target, 98.5);
    }
}
