use std::fmt;

use serde::{Deserialize, Serialize};

use super::{fmt_brl, ratio, Tool};

const LEADS_PER_SDR: f64 = 200.0;
const CALLS_PER_CLOSER: f64 = 50.0;

/// Funnel for sales closed on scheduled calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricasAgendamento {
    pub investment: f64,
    pub lead_price: f64,
    /// Percent of leads that book a call.
    pub scheduling_rate: f64,
    /// Percent of booked calls that happen.
    pub attendance_rate: f64,
    /// Percent of calls that close.
    pub conversion_rate: f64,
    pub average_ticket: f64,
}

impl Default for MetricasAgendamento {
    fn default() -> Self {
        Self {
            investment: 1000.0,
            lead_price: 5.0,
            scheduling_rate: 10.0,
            attendance_rate: 50.0,
            conversion_rate: 10.0,
            average_ticket: 1000.0,
        }
    }
}

impl MetricasAgendamento {
    /// Name of the first input that differs between two payloads.
    pub fn changed_field(old: &Self, new: &Self) -> Option<&'static str> {
        [
            ("investment", old.investment, new.investment),
            ("leadPrice", old.lead_price, new.lead_price),
            ("schedulingRate", old.scheduling_rate, new.scheduling_rate),
            ("attendanceRate", old.attendance_rate, new.attendance_rate),
            ("conversionRate", old.conversion_rate, new.conversion_rate),
            ("averageTicket", old.average_ticket, new.average_ticket),
        ]
        .into_iter()
        .find(|(_, before, after)| before != after)
        .map(|(name, _, _)| name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulingReport {
    pub leads: f64,
    pub scheduled: f64,
    pub calls: f64,
    pub sales: f64,
    pub revenue: f64,
    pub cost_per_call: f64,
    pub cac: f64,
    pub roas: f64,
    pub sdrs: u64,
    pub closers: u64,
}

impl Tool for MetricasAgendamento {
    const NAME: &'static str = "metricas_agendamento";

    type Report = SchedulingReport;

    fn evaluate(&self) -> SchedulingReport {
        let leads = ratio(self.investment, self.lead_price);
        let scheduled = leads * self.scheduling_rate / 100.0;
        let calls = scheduled * self.attendance_rate / 100.0;
        let sales = calls * self.conversion_rate / 100.0;
        let revenue = sales * self.average_ticket;

        SchedulingReport {
            leads,
            scheduled,
            calls,
            sales,
            revenue,
            cost_per_call: ratio(self.investment, calls),
            cac: ratio(self.investment, sales),
            roas: ratio(revenue, self.investment),
            sdrs: ratio(leads, LEADS_PER_SDR).ceil() as u64,
            closers: ratio(calls, CALLS_PER_CLOSER).ceil() as u64,
        }
    }
}

impl fmt::Display for SchedulingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Leads {:.0} -> scheduled {:.0} -> calls {:.0} -> sales {:.1}",
            self.leads, self.scheduled, self.calls, self.sales
        )?;
        writeln!(f, "Revenue:       {}", fmt_brl(self.revenue))?;
        writeln!(f, "Cost per call: {}", fmt_brl(self.cost_per_call))?;
        writeln!(f, "CAC:           {}", fmt_brl(self.cac))?;
        writeln!(f, "ROAS:          {:.2}", self.roas)?;
        write!(f, "Team:          {} SDR(s), {} closer(s)", self.sdrs, self.closers)
    }
}
