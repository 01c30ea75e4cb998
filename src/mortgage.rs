use chrono::{Months, NaiveDate};
use log::{info, trace};
use std::fmt;

use crate::error::{MortgageError, Result};

/// Number of payments reported at each end of the schedule.
pub const EDGE_PMTS: u32 = 5;

#[derive(Clone, Copy, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LoanParameters {
    pub property_value: f64,
    pub down_payment_pct: f64,
    /// Percent per year, 0..=100.
    pub annual_rate: f64,
    pub term_years: u32,
    pub first_pmt_date: Option<NaiveDate>,
}

impl LoanParameters {
    pub fn new(property_value: f64, down_payment_pct: f64, annual_rate: f64, term_years: u32) -> Self {
        Self {
            property_value,
            down_payment_pct,
            annual_rate,
            term_years,
            first_pmt_date: None,
        }
    }

    pub fn with_first_pmt_date(mut self, first_pmt_date: NaiveDate) -> Self {
        self.first_pmt_date = Some(first_pmt_date);
        self
    }

    /// Rejects anything that would turn the annuity formula into NaN or infinity.
    pub fn validate(&self) -> Result<()> {
        if !self.property_value.is_finite() || self.property_value < 0. {
            return Err(MortgageError::invalid(
                "property_value",
                format!("{} must be a non-negative amount", self.property_value),
            ));
        }
        if !(0. ..=100.).contains(&self.down_payment_pct) {
            return Err(MortgageError::invalid(
                "down_payment_pct",
                format!("{} is outside 0..=100", self.down_payment_pct),
            ));
        }
        if !(0. ..=100.).contains(&self.annual_rate) {
            return Err(MortgageError::invalid(
                "annual_rate",
                format!("{} is outside 0..=100", self.annual_rate),
            ));
        }
        if self.term_years < 1 {
            return Err(MortgageError::invalid("term_years", "term must be at least one year"));
        }
        if self.term_years.checked_mul(12).is_none() {
            return Err(MortgageError::invalid(
                "term_years",
                format!("{} years is too many monthly payments", self.term_years),
            ));
        }
        if let Some(first) = self.first_pmt_date {
            if pmt_date(first, self.pmt_count()).is_none() {
                return Err(MortgageError::invalid(
                    "first_pmt_date",
                    format!("payments starting {} run past the last representable date", first),
                ));
            }
        }
        Ok(())
    }

    pub fn down_payment(&self) -> f64 {
        self.property_value * (self.down_payment_pct / 100.)
    }

    pub fn loan_amount(&self) -> f64 {
        self.property_value - self.down_payment()
    }

    pub fn monthly_rate(&self) -> f64 {
        self.annual_rate / 100. / 12.
    }

    pub fn pmt_count(&self) -> u32 {
        self.term_years.saturating_mul(12)
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LoanSummary {
    pub loan_amount: f64,
    pub down_payment: f64,
    pub monthly_payment: f64,
    pub total_interest: f64,
    pub pmt_count: u32,
}

impl LoanSummary {
    pub fn total_paid(&self) -> f64 {
        self.loan_amount + self.total_interest
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AmortizationRow {
    pub month: u32,
    pub pmt_date: Option<NaiveDate>,
    pub payment: f64,
    pub principal: f64,
    pub interest: f64,
    pub end_balance: f64,
}

impl fmt::Display for AmortizationRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pmt number {}", self.month)?;
        if let Some(date) = self.pmt_date {
            write!(f, ", date {}", date)?;
        }
        write!(
            f,
            ", payment {:.2}, principal paid {:.2}, interest paid {:.2}, ending balance {:.2}",
            self.payment, self.principal, self.interest, self.end_balance
        )
    }
}

/// Month-by-month walk over the whole term.
///
/// The running balance is never clamped, so rounding drift does not compound;
/// each yielded row reports `max(0, balance)`. Clone it to restart the walk.
#[derive(Clone, Debug)]
pub struct Amortization {
    balance: f64,
    monthly_rate: f64,
    pmt_amount: f64,
    pmt_count: u32,
    month: u32,
    first_pmt_date: Option<NaiveDate>,
}

impl Amortization {
    pub fn pmt_amount(&self) -> f64 {
        self.pmt_amount
    }

    /// Running balance after the last yielded payment, unclamped.
    pub fn balance(&self) -> f64 {
        self.balance
    }
}

impl Iterator for Amortization {
    type Item = AmortizationRow;

    fn next(&mut self) -> Option<Self::Item> {
        if self.month >= self.pmt_count {
            return None;
        }
        self.month += 1;

        let interest = self.balance * self.monthly_rate;
        let principal = self.pmt_amount - interest;
        self.balance -= principal;
        trace!(
            "pmt # {}, interest {}, principal {}, end bal {}",
            self.month,
            interest,
            principal,
            self.balance
        );

        Some(AmortizationRow {
            month: self.month,
            pmt_date: self.first_pmt_date.and_then(|first| pmt_date(first, self.month)),
            payment: self.pmt_amount,
            principal,
            interest,
            end_balance: self.balance.max(0.),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.pmt_count - self.month) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Amortization {}

/// Starts a full amortization walk for `params`.
pub fn amortize(params: &LoanParameters) -> Result<Amortization> {
    params.validate()?;
    let loan_amount = params.loan_amount();
    let monthly_rate = params.monthly_rate();
    let pmt_count = params.pmt_count();

    Ok(Amortization {
        balance: loan_amount,
        monthly_rate,
        pmt_amount: get_pmt_amount(loan_amount, monthly_rate, pmt_count),
        pmt_count,
        month: 0,
        first_pmt_date: params.first_pmt_date,
    })
}

#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mortgage {
    pub params: LoanParameters,
    pub summary: LoanSummary,
    schedule: Vec<AmortizationRow>,
}

impl Mortgage {
    pub fn get_pmt_amount(&self) -> f64 {
        self.summary.monthly_payment
    }

    pub fn get_pmt_count(&self) -> u32 {
        self.summary.pmt_count
    }

    /// Reported rows: the first and last [`EDGE_PMTS`] months.
    pub fn schedule(&self) -> &[AmortizationRow] {
        &self.schedule
    }

    pub fn get_pmt_detail(&self, month: u32) -> Option<&AmortizationRow> {
        self.schedule.iter().find(|row| row.month == month)
    }

    pub fn get_pmt_info(&self, month: u32) -> String {
        match self.get_pmt_detail(month) {
            Some(row) => row.to_string(),
            None => "No payment information.".to_string(),
        }
    }
}

/// Computes the summary and the truncated schedule for one set of inputs.
pub fn calculate_mortgage(params: &LoanParameters) -> Result<Mortgage> {
    let walk = amortize(params)?;
    let pmt_count = params.pmt_count();
    let monthly_payment = walk.pmt_amount();
    let tail_start = pmt_count.saturating_sub(EDGE_PMTS);

    let mut total_interest = 0.;
    let mut schedule = Vec::with_capacity((2 * EDGE_PMTS) as usize);
    for row in walk {
        total_interest += row.interest;
        if row.month <= EDGE_PMTS || row.month > tail_start {
            schedule.push(row);
        }
    }

    let summary = LoanSummary {
        loan_amount: params.loan_amount(),
        down_payment: params.down_payment(),
        monthly_payment,
        total_interest,
        pmt_count,
    };
    info!(
        "loan {:.2} over {} payments: monthly payment {:.2}, total interest {:.2}",
        summary.loan_amount, pmt_count, monthly_payment, total_interest
    );

    Ok(Mortgage {
        params: *params,
        summary,
        schedule,
    })
}

/// Level payment that retires `principal` over `pmt_count` months.
///
/// Uses `r / (1 - (1 + r)^-n)`, algebraically the usual annuity factor, with
/// `1 - (1 + r)^-n` evaluated as `-expm1(-n * ln_1p(r))` so rates too small to
/// change `1 + r` still give the right payment. A zero rate spreads the
/// principal evenly.
pub fn get_pmt_amount(principal: f64, monthly_rate: f64, pmt_count: u32) -> f64 {
    if pmt_count == 0 {
        return 0.;
    }
    if monthly_rate == 0. {
        return principal / pmt_count as f64;
    }
    let repaid_share = -(-(pmt_count as f64) * monthly_rate.ln_1p()).exp_m1();
    principal * monthly_rate / repaid_share
}

// payment dates step from the first date so month-end clamping never accumulates
fn pmt_date(first: NaiveDate, month: u32) -> Option<NaiveDate> {
    first.checked_add_months(Months::new(month.saturating_sub(1)))
}

#[cfg(test)]
mod tests {
    use super::{amortize, calculate_mortgage, get_pmt_amount, pmt_date, LoanParameters, EDGE_PMTS};
    use crate::error::MortgageError;
    use chrono::NaiveDate;
    use test_log::test;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn test_get_pmt_amount() {
        assert!(close(get_pmt_amount(400000., 0.05 / 12., 300), 2338.3602, 1e-4));
        assert!(close(get_pmt_amount(200000., 0.07 / 12., 180), 1797.6565, 1e-4));
        assert_eq!(get_pmt_amount(120000., 0., 120), 1000.);
        assert_eq!(get_pmt_amount(120000., 0.01, 0), 0.);
    }

    #[test]
    fn test_reference_mortgage() {
        let mortgage = calculate_mortgage(&LoanParameters::new(500000., 20., 5., 25)).unwrap();
        let summary = mortgage.summary;

        assert_eq!(summary.loan_amount, 400000.);
        assert_eq!(summary.down_payment, 100000.);
        assert_eq!(mortgage.get_pmt_count(), 300);
        assert!(close(mortgage.get_pmt_amount(), 2338.07, 0.5));
        assert!(close(mortgage.get_pmt_amount(), 2338.36, 0.01));
        assert!(close(summary.total_interest, 301508.05, 0.01));
        assert!(close(summary.total_paid(), 701508.05, 0.01));

        let first = mortgage.get_pmt_detail(1).unwrap();
        assert!(close(first.interest, 1666.67, 0.01));
        assert!(close(first.principal, 671.69, 0.01));
        assert!(close(first.end_balance, 399328.31, 0.01));
        assert_eq!(
            mortgage.get_pmt_info(1),
            "pmt number 1, payment 2338.36, principal paid 671.69, interest paid 1666.67, ending balance 399328.31"
        );
    }

    #[test]
    fn test_reported_months() {
        let mortgage = calculate_mortgage(&LoanParameters::new(500000., 20., 5., 25)).unwrap();
        let months: Vec<u32> = mortgage.schedule().iter().map(|row| row.month).collect();
        assert_eq!(months, vec![1, 2, 3, 4, 5, 296, 297, 298, 299, 300]);
        assert!(mortgage.get_pmt_detail(6).is_none());
        assert_eq!(mortgage.get_pmt_info(150), "No payment information.");

        let short = calculate_mortgage(&LoanParameters::new(100000., 0., 4., 1)).unwrap();
        let months: Vec<u32> = short.schedule().iter().map(|row| row.month).collect();
        assert_eq!(months, vec![1, 2, 3, 4, 5, 8, 9, 10, 11, 12]);
        assert_eq!(short.schedule().len(), 2 * EDGE_PMTS as usize);
    }

    #[test]
    fn test_loan_amount_bounds() {
        for (value, pct) in [(500000., 20.), (350000., 0.), (350000., 100.), (0., 50.), (812345.67, 12.5)] {
            let params = LoanParameters::new(value, pct, 4.5, 20);
            let summary = calculate_mortgage(&params).unwrap().summary;
            assert_eq!(summary.loan_amount, value - value * (pct / 100.));
            assert!(summary.loan_amount >= 0. && summary.loan_amount <= value);
        }
    }

    #[test]
    fn test_full_walk_repays_principal() {
        for (rate, term) in [
            (5., 25),
            (7., 15),
            (0.25, 30),
            (29.9, 1),
            (12., 10),
            (1e-6, 25),
            (1e-10, 25),
            (1e-15, 25),
            (1e-300, 30),
        ] {
            let params = LoanParameters::new(640000., 15., rate, term);
            let mut walk = amortize(&params).unwrap();
            assert_eq!(walk.len(), term as usize * 12);
            assert!(walk.pmt_amount().is_finite(), "rate {} term {}", rate, term);

            let repaid: f64 = walk.clone().map(|row| row.principal).sum();
            assert!(close(repaid, params.loan_amount(), 1e-2), "rate {} term {}", rate, term);

            let last = walk.by_ref().last().unwrap();
            assert!(close(last.end_balance, 0., 1e-2));
            assert!(close(walk.balance(), 0., 1e-2), "rate {} term {}", rate, term);
        }
    }

    #[test]
    fn test_tiny_rate_matches_even_split() {
        // 400000 over 300 months barely moves from the zero-rate payment
        for rate in [1e-15, 1e-10] {
            let mortgage = calculate_mortgage(&LoanParameters::new(500000., 20., rate, 25)).unwrap();
            assert!(close(mortgage.get_pmt_amount(), 400000. / 300., 1e-6), "rate {}", rate);
            assert!(mortgage.summary.total_interest.is_finite());
            assert!(mortgage.summary.total_interest >= 0.);
            for row in mortgage.schedule() {
                assert!(row.principal.is_finite() && row.interest.is_finite());
                assert!(row.interest >= 0.);
            }
        }
    }

    #[test]
    fn test_rows_are_consistent() {
        let mortgage = calculate_mortgage(&LoanParameters::new(275000., 10., 6.25, 30)).unwrap();
        let rows = mortgage.schedule();
        for row in rows {
            assert_eq!(row.payment, mortgage.get_pmt_amount());
            assert!(row.principal >= 0. && row.interest >= 0.);
            assert!(close(row.principal + row.interest, row.payment, 1e-9));
            assert!(row.end_balance >= 0.);
        }
        for pair in rows.windows(2) {
            assert!(pair[1].end_balance <= pair[0].end_balance);
        }
        assert!(close(rows[rows.len() - 1].end_balance, 0., 1e-2));
    }

    #[test]
    fn test_zero_interest() {
        let mortgage = calculate_mortgage(&LoanParameters::new(360000., 0., 0., 10)).unwrap();
        assert_eq!(mortgage.get_pmt_amount(), 360000. / 120.);
        assert_eq!(mortgage.summary.total_interest, 0.);
        assert!(mortgage.schedule().iter().all(|row| row.interest == 0.));

        let walk = amortize(&mortgage.params).unwrap();
        assert!(walk.clone().all(|row| row.interest == 0.));
        assert!(close(walk.last().unwrap().end_balance, 0., 1e-6));
    }

    #[test]
    fn test_walk_restarts() {
        let walk = amortize(&LoanParameters::new(500000., 20., 5., 25)).unwrap();
        let first: Vec<_> = walk.clone().take(3).collect();
        let again: Vec<_> = walk.take(3).collect();
        assert_eq!(first, again);
    }

    #[test]
    fn test_invalid_parameters() {
        let cases = [
            (LoanParameters::new(500000., 150., 5., 25), "down_payment_pct"),
            (LoanParameters::new(500000., -1., 5., 25), "down_payment_pct"),
            (LoanParameters::new(500000., f64::NAN, 5., 25), "down_payment_pct"),
            (LoanParameters::new(500000., 20., 5., 0), "term_years"),
            (LoanParameters::new(-1., 20., 5., 25), "property_value"),
            (LoanParameters::new(f64::INFINITY, 20., 5., 25), "property_value"),
            (LoanParameters::new(500000., 20., -0.5, 25), "annual_rate"),
            (LoanParameters::new(500000., 20., f64::NAN, 25), "annual_rate"),
            (LoanParameters::new(500000., 20., 100.5, 25), "annual_rate"),
            (LoanParameters::new(500000., 20., 5., u32::MAX), "term_years"),
        ];
        for (params, expected) in cases {
            match calculate_mortgage(&params) {
                Err(MortgageError::InvalidParameter { field, .. }) => assert_eq!(field, expected),
                other => panic!("expected invalid {}, got {:?}", expected, other),
            }
        }
    }

    #[test]
    fn test_pmt_dates() {
        assert_eq!(
            pmt_date(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(), 2),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
        assert_eq!(
            pmt_date(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(), 3),
            NaiveDate::from_ymd_opt(2024, 3, 31)
        );

        let params = LoanParameters::new(500000., 20., 5., 25)
            .with_first_pmt_date(NaiveDate::from_ymd_opt(2024, 4, 1).unwrap());
        let mortgage = calculate_mortgage(&params).unwrap();
        let first = mortgage.get_pmt_detail(1).unwrap();
        let last = mortgage.get_pmt_detail(300).unwrap();
        assert_eq!(first.pmt_date, NaiveDate::from_ymd_opt(2024, 4, 1));
        assert_eq!(last.pmt_date, NaiveDate::from_ymd_opt(2049, 3, 1));
        assert!(mortgage.get_pmt_info(1).starts_with("pmt number 1, date 2024-04-01, payment 2338.36"));

        let late = LoanParameters::new(500000., 20., 5., 25).with_first_pmt_date(NaiveDate::MAX);
        assert!(matches!(
            calculate_mortgage(&late),
            Err(MortgageError::InvalidParameter { field: "first_pmt_date", .. })
        ));
    }
}
