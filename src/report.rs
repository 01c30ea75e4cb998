use std::fmt;
use tabled::{
    builder::Builder,
    settings::{object::Columns, Alignment, Modify, Style},
    Table,
};

use crate::mortgage::{Mortgage, EDGE_PMTS};

pub const DEFAULT_CURRENCY: &str = "SAR";

/// Formats `amount` with thousands separators and two decimals, e.g. `1,234,567.89`.
pub fn format_currency(amount: f64) -> String {
    let fixed = format!("{:.2}", amount.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    // -0.001 formats as 0.00, so the sign goes by the rounded text
    let sign = if amount < 0. && fixed.chars().any(|c| c != '0' && c != '.') {
        "-"
    } else {
        ""
    };
    format!("{}{}.{}", sign, grouped, cents)
}

/// Principal vs total interest, the two slices of the payment breakdown.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct PaymentBreakdown {
    pub principal: f64,
    pub interest: f64,
}

impl PaymentBreakdown {
    pub fn of(mortgage: &Mortgage) -> Self {
        Self {
            principal: mortgage.summary.loan_amount,
            interest: mortgage.summary.total_interest,
        }
    }

    /// Percentage shares of (principal, interest); both zero for an empty loan.
    pub fn shares(&self) -> (f64, f64) {
        let total = self.principal + self.interest;
        if total <= 0. {
            return (0., 0.);
        }
        (
            self.principal / total * 100.,
            self.interest / total * 100.,
        )
    }
}

/// Terminal rendering of a calculated mortgage.
pub struct Report<'a> {
    mortgage: &'a Mortgage,
    currency: &'a str,
}

impl<'a> Report<'a> {
    pub fn new(mortgage: &'a Mortgage) -> Self {
        Self {
            mortgage,
            currency: DEFAULT_CURRENCY,
        }
    }

    pub fn with_currency(mut self, currency: &'a str) -> Self {
        self.currency = currency;
        self
    }

    fn money(&self, amount: f64) -> String {
        format!("{} {}", format_currency(amount), self.currency)
    }

    pub fn schedule_table(&self) -> Table {
        let rows = self.mortgage.schedule();
        let dated = rows.iter().any(|row| row.pmt_date.is_some());

        let mut builder = Builder::default();
        let mut header = vec!["Month".to_string()];
        if dated {
            header.push("Date".to_string());
        }
        header.extend(
            ["Payment", "Principal", "Interest", "Remaining Balance"]
                .iter()
                .map(|h| h.to_string()),
        );
        builder.push_record(header);

        for row in rows {
            let mut record = vec![row.month.to_string()];
            if dated {
                record.push(row.pmt_date.map(|d| d.to_string()).unwrap_or_default());
            }
            record.extend([
                format_currency(row.payment),
                format_currency(row.principal),
                format_currency(row.interest),
                format_currency(row.end_balance),
            ]);
            builder.push_record(record);
        }

        let mut table = builder.build();
        table
            .with(Style::psql())
            .with(Modify::new(Columns::new(1..)).with(Alignment::right()));
        table
    }

    pub fn footnote(&self) -> String {
        format!(
            "This schedule shows the first {} and last {} payments of your {}-year mortgage.",
            EDGE_PMTS, EDGE_PMTS, self.mortgage.params.term_years
        )
    }
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summary = &self.mortgage.summary;
        writeln!(f, "Results")?;
        writeln!(f, "  Loan Amount:     {}", self.money(summary.loan_amount))?;
        writeln!(f, "  Monthly Payment: {}", self.money(summary.monthly_payment))?;
        writeln!(f, "  Total Interest:  {}", self.money(summary.total_interest))?;
        writeln!(f)?;

        let breakdown = PaymentBreakdown::of(self.mortgage);
        let (principal_share, interest_share) = breakdown.shares();
        writeln!(f, "Payment Breakdown")?;
        writeln!(
            f,
            "  Principal:       {} ({:.1}%)",
            self.money(breakdown.principal),
            principal_share
        )?;
        writeln!(
            f,
            "  Total Interest:  {} ({:.1}%)",
            self.money(breakdown.interest),
            interest_share
        )?;
        writeln!(f)?;

        writeln!(f, "Amortization Schedule")?;
        writeln!(f, "{}", self.schedule_table())?;
        write!(f, "{}", self.footnote())
    }
}
