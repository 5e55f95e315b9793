use std::fmt;

use serde::{Deserialize, Serialize};

use super::{fmt_brl, ratio, Tool};

const CTR_BAND: (f64, f64) = (1.0, 2.0);
const CONNECT_BAND: (f64, f64) = (75.0, 90.0);
const PAGE_BAND: (f64, f64) = (5.0, 10.0);
const CHECKOUT_BAND: (f64, f64) = (20.0, 40.0);
const ROAS_BAND: (f64, f64) = (1.5, 2.5);

/// Full-funnel diagnosis from ad impressions down to purchases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Sonar {
    pub impressions: f64,
    pub clicks: f64,
    pub cpm: f64,
    pub cpc: f64,
    pub page_views: f64,
    pub checkouts: f64,
    pub purchases: f64,
    pub ad_spend: f64,
    pub average_order: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SonarStatus {
    Optimize,
    AlmostThere,
    Scale,
}

impl SonarStatus {
    fn from_performance(performance: f64) -> Self {
        if performance < 1.0 {
            SonarStatus::Optimize
        } else if performance < 2.0 {
            SonarStatus::AlmostThere
        } else {
            SonarStatus::Scale
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            SonarStatus::Optimize => {
                "TIME TO OPTIMIZE! Your metrics need to improve significantly before scaling."
            }
            SonarStatus::AlmostThere => {
                "ALMOST THERE! The ideal moment to scale is close. Optimize the points below."
            }
            SonarStatus::Scale => "IDEAL MOMENT TO SCALE! Your metrics are excellent, invest more.",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SonarReport {
    pub ctr: f64,
    pub connect_rate: f64,
    pub page_conversion: f64,
    pub checkout_conversion: f64,
    pub purchases_per_mille: f64,
    pub cac: f64,
    pub roas: f64,
    pub revenue: f64,
    pub profit: f64,
    pub cpm: f64,
    pub cpc: f64,
    /// Average band score, from 0 to 2.
    pub performance: f64,
    pub status: SonarStatus,
}

/// 0 below the band, 1 inside it, 2 at or above its top.
fn score(value: f64, (low, high): (f64, f64)) -> u8 {
    if value >= high {
        2
    } else if value >= low {
        1
    } else {
        0
    }
}

impl Tool for Sonar {
    const NAME: &'static str = "sonar";

    type Report = SonarReport;

    fn evaluate(&self) -> SonarReport {
        let ctr = ratio(self.clicks, self.impressions) * 100.0;
        let connect_rate = ratio(self.page_views, self.clicks) * 100.0;
        let page_conversion = ratio(self.checkouts, self.page_views) * 100.0;
        let checkout_conversion = ratio(self.purchases, self.checkouts) * 100.0;
        let revenue = self.purchases * self.average_order;
        let roas = ratio(revenue, self.ad_spend);

        let total = score(ctr, CTR_BAND)
            + score(connect_rate, CONNECT_BAND)
            + score(page_conversion, PAGE_BAND)
            + score(checkout_conversion, CHECKOUT_BAND)
            + score(roas, ROAS_BAND);
        let performance = f64::from(total) / 5.0;

        SonarReport {
            ctr,
            connect_rate,
            page_conversion,
            checkout_conversion,
            purchases_per_mille: ratio(self.purchases, self.impressions) * 1000.0,
            cac: ratio(self.ad_spend, self.purchases),
            roas,
            revenue,
            profit: revenue - self.ad_spend,
            cpm: self.cpm,
            cpc: self.cpc,
            performance,
            status: SonarStatus::from_performance(performance),
        }
    }
}

impl fmt::Display for SonarReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.status.message())?;
        writeln!(f)?;
        writeln!(f, "CTR:                    {:.2}%", self.ctr)?;
        writeln!(f, "Connect rate:           {:.2}%", self.connect_rate)?;
        writeln!(f, "Page conversion:        {:.2}%", self.page_conversion)?;
        writeln!(f, "Checkout conversion:    {:.2}%", self.checkout_conversion)?;
        writeln!(f, "Purchases per 1k imp.:  {:.2}", self.purchases_per_mille)?;
        writeln!(f, "CAC:                    {}", fmt_brl(self.cac))?;
        writeln!(f, "ROAS:                   {:.2}", self.roas)?;
        writeln!(f, "Profit:                 {}", fmt_brl(self.profit))?;
        write!(f, "Performance:            {:.1} / 2", self.performance)
    }
}
