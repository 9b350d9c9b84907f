// 🧮 Financial Calculators - loan, compound interest, aguinaldo
//
// Pure and re-entrant: no shared state, safe to call from any request.
// Every calculator returns `Option`. `None` means "no result": the input is
// outside the parameter domain or the arithmetic produced NaN/Infinity, and
// callers must render that as an empty state rather than a number.

use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// Days in the proration denominator (fixed, leap years included)
pub const DAYS_PER_YEAR: f64 = 365.0;

/// Salary days per month used to derive the daily salary
pub const SALARY_DAYS_PER_MONTH: f64 = 30.0;

/// Statutory minimum aguinaldo
pub const DEFAULT_BONUS_DAYS: f64 = 15.0;

/// Longest projection we will compute. A resource limit on the yearly
/// series, not a rule of the domain.
pub const MAX_PROJECTION_YEARS: u32 = 100;

/// Longest term we will expand into a month-by-month schedule. Same kind of
/// limit as `MAX_PROJECTION_YEARS`; `amortize` itself has no cap.
pub const MAX_SCHEDULE_YEARS: u32 = 100;

fn finite(value: f64) -> Option<f64> {
    if value.is_finite() {
        Some(value)
    } else {
        None
    }
}

// ============================================================================
// LOAN AMORTIZATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoanParameters {
    pub principal: f64,
    pub annual_rate_percent: f64,
    pub term_years: u32,
}

impl LoanParameters {
    pub fn is_valid(&self) -> bool {
        self.principal.is_finite()
            && self.principal > 0.0
            && self.annual_rate_percent.is_finite()
            && self.annual_rate_percent >= 0.0
            && self.term_years > 0
    }

    fn monthly_rate(&self) -> f64 {
        self.annual_rate_percent / 100.0 / 12.0
    }

    /// `None` when the term does not fit in a month count
    fn months(&self) -> Option<u32> {
        self.term_years.checked_mul(12)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoanQuote {
    pub monthly_payment: f64,
    pub total_payment: f64,
    pub total_interest: f64,
}

/// Fixed monthly payment for a fully amortizing loan.
///
/// `i = rate/100/12`, `n = years*12`; `P/n` when `i == 0`, otherwise
/// `P·i·(1+i)^n / ((1+i)^n − 1)`.
pub fn amortize(params: &LoanParameters) -> Option<LoanQuote> {
    if !params.is_valid() {
        return None;
    }

    let i = params.monthly_rate();
    let n = params.months()? as f64;

    let monthly_payment = if i == 0.0 {
        params.principal / n
    } else {
        let x = (1.0 + i).powf(n);
        params.principal * i * x / (x - 1.0)
    };

    let monthly_payment = finite(monthly_payment)?;
    let total_payment = finite(monthly_payment * n)?;
    let total_interest = finite(total_payment - params.principal)?;

    Some(LoanQuote {
        monthly_payment,
        total_payment,
        total_interest,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Installment {
    pub month: u32,
    pub payment: f64,
    pub interest: f64,
    pub principal: f64,
    pub balance: f64,
}

/// Month-by-month breakdown of `amortize`'s payment.
///
/// Terms longer than `MAX_SCHEDULE_YEARS` return `None` even when `amortize`
/// has a quote for them: the cap bounds the rows we materialize, it does not
/// make the loan invalid.
pub fn amortization_schedule(params: &LoanParameters) -> Option<Vec<Installment>> {
    if params.term_years > MAX_SCHEDULE_YEARS {
        return None;
    }

    let quote = amortize(params)?;
    let i = params.monthly_rate();
    let months = params.months()?;

    let mut balance = params.principal;
    let mut rows = Vec::with_capacity(months as usize);

    for month in 1..=months {
        let interest = balance * i;
        let principal = quote.monthly_payment - interest;
        balance -= principal;

        // Float drift leaves a few cents (±) on the last row
        if month == months || balance.abs() < 1e-6 {
            balance = 0.0;
        }

        rows.push(Installment {
            month,
            payment: quote.monthly_payment,
            interest: finite(interest)?,
            principal: finite(principal)?,
            balance: finite(balance)?,
        });
    }

    Some(rows)
}

// ============================================================================
// COMPOUND INTEREST
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompoundInterestParameters {
    pub initial_deposit: f64,
    pub monthly_contribution: f64,
    pub annual_rate_percent: f64,
    pub years: u32,
}

impl CompoundInterestParameters {
    pub fn is_valid(&self) -> bool {
        self.initial_deposit.is_finite()
            && self.initial_deposit >= 0.0
            && self.monthly_contribution.is_finite()
            && self.monthly_contribution >= 0.0
            && self.annual_rate_percent.is_finite()
            && self.annual_rate_percent > 0.0
            && (1..=MAX_PROJECTION_YEARS).contains(&self.years)
    }
}

/// Balance at the end of a year. `interest` is cumulative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YearSnapshot {
    pub year: u32,
    pub principal: f64,
    pub interest: f64,
    pub total: f64,
}

/// Year-by-year projection, starting with a year-0 snapshot.
///
/// Each month earns `(principal + interest carried from the end of the
/// previous year) × rate/12`, then the contribution is added. Interest earned
/// earlier in the same year does not itself earn interest until the next year:
/// compounding is yearly on interest, monthly on contributions.
///
/// `years` above `MAX_PROJECTION_YEARS` returns `None`. That cap is a resource
/// limit on the series we build, not a bound the domain places on deposits.
pub fn project(params: &CompoundInterestParameters) -> Option<Vec<YearSnapshot>> {
    if !params.is_valid() {
        return None;
    }

    let monthly_rate = params.annual_rate_percent / 100.0 / 12.0;
    let mut principal = params.initial_deposit;
    let mut total_interest = 0.0;

    let mut series = Vec::with_capacity(params.years as usize + 1);
    series.push(YearSnapshot {
        year: 0,
        principal,
        interest: 0.0,
        total: principal,
    });

    for year in 1..=params.years {
        let mut interest_this_year = 0.0;

        for _ in 0..12 {
            interest_this_year += (principal + total_interest) * monthly_rate;
            principal += params.monthly_contribution;
        }

        total_interest += interest_this_year;

        series.push(YearSnapshot {
            year,
            principal: finite(principal)?,
            interest: finite(total_interest)?,
            total: finite(principal + total_interest)?,
        });
    }

    Some(series)
}

// ============================================================================
// AGUINALDO (proportional statutory bonus)
// ============================================================================

fn default_bonus_days() -> f64 {
    DEFAULT_BONUS_DAYS
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BonusParameters {
    pub monthly_salary: f64,
    #[serde(default = "default_bonus_days")]
    pub bonus_days: f64,
    pub worked_full_year: bool,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
}

impl BonusParameters {
    pub fn full_year(monthly_salary: f64) -> Self {
        BonusParameters {
            monthly_salary,
            bonus_days: DEFAULT_BONUS_DAYS,
            worked_full_year: true,
            start_date: None,
        }
    }

    pub fn since(monthly_salary: f64, start_date: NaiveDate) -> Self {
        BonusParameters {
            monthly_salary,
            bonus_days: DEFAULT_BONUS_DAYS,
            worked_full_year: false,
            start_date: Some(start_date),
        }
    }

    pub fn with_days(mut self, bonus_days: f64) -> Self {
        self.bonus_days = bonus_days;
        self
    }

    pub fn is_valid(&self) -> bool {
        self.monthly_salary.is_finite()
            && self.monthly_salary > 0.0
            && self.bonus_days.is_finite()
            && self.bonus_days >= 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BonusQuote {
    pub daily_salary: f64,
    pub days_worked: u32,
    pub proration: f64,
    pub amount: f64,
}

/// Inclusive days from `start` to Dec 31 of `year`; 0 if `start` is in another year
pub fn days_worked_in_year(start: NaiveDate, year: i32) -> u32 {
    if start.year() != year {
        return 0;
    }

    match NaiveDate::from_ymd_opt(year, 12, 31) {
        Some(dec31) => ((dec31 - start).num_days() + 1).max(0) as u32,
        None => 0,
    }
}

/// Aguinaldo owed for the year containing `as_of`.
///
/// Full year: `salary/30 × days`. Otherwise prorated by the inclusive days
/// from the start date to Dec 31 over 365. A partial year with no start date
/// has no answer.
pub fn compute_bonus(params: &BonusParameters, as_of: NaiveDate) -> Option<BonusQuote> {
    if !params.is_valid() {
        return None;
    }

    let daily_salary = params.monthly_salary / SALARY_DAYS_PER_MONTH;

    let (days_worked, proration) = if params.worked_full_year {
        (DAYS_PER_YEAR as u32, 1.0)
    } else {
        let start = params.start_date?;
        let days = days_worked_in_year(start, as_of.year());
        (days, days as f64 / DAYS_PER_YEAR)
    };

    let amount = finite(daily_salary * params.bonus_days * proration)?;

    Some(BonusQuote {
        daily_salary,
        days_worked,
        proration,
        amount,
    })
}

/// `compute_bonus` against today's local date
pub fn compute_bonus_today(params: &BonusParameters) -> Option<BonusQuote> {
    compute_bonus(params, Local::now().date_naive())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn loan(principal: f64, rate: f64, years: u32) -> LoanParameters {
        LoanParameters {
            principal,
            annual_rate_percent: rate,
            term_years: years,
        }
    }

    // ---- loan ----

    #[test]
    fn test_amortize_standard_loan() {
        let quote = amortize(&loan(200_000.0, 12.0, 5)).unwrap();

        assert!(approx(quote.monthly_payment, 4448.89, 0.01), "{}", quote.monthly_payment);
        assert!(approx(quote.total_interest, 66_933.37, 0.01), "{}", quote.total_interest);
        assert!(approx(quote.total_payment, quote.monthly_payment * 60.0, 1e-6));
    }

    #[test]
    fn test_amortize_zero_rate_guard() {
        for (principal, years) in [(120_000.0, 1u32), (50_000.0, 3), (1.0, 30)] {
            let quote = amortize(&loan(principal, 0.0, years)).unwrap();
            assert_eq!(quote.monthly_payment, principal / (years as f64 * 12.0));
            assert!(approx(quote.total_interest, 0.0, 1e-9));
        }
    }

    #[test]
    fn test_amortize_rejects_degenerate_input() {
        assert_eq!(amortize(&loan(0.0, 10.0, 5)), None);
        assert_eq!(amortize(&loan(-5.0, 10.0, 5)), None);
        assert_eq!(amortize(&loan(1000.0, -1.0, 5)), None);
        assert_eq!(amortize(&loan(1000.0, 10.0, 0)), None);
        assert_eq!(amortize(&loan(f64::NAN, 10.0, 5)), None);
        assert_eq!(amortize(&loan(f64::INFINITY, 10.0, 5)), None);
    }

    #[test]
    fn test_amortize_withholds_non_finite_result() {
        // (1+i)^n overflows to infinity → inf/inf = NaN
        assert_eq!(amortize(&loan(1000.0, 1.0e6, 1000)), None);
        // Finite inputs, overflowing product
        assert_eq!(amortize(&loan(f64::MAX, 12.0, 30)), None);
    }

    #[test]
    fn test_schedule_pays_off_loan() {
        let params = loan(200_000.0, 12.0, 5);
        let schedule = amortization_schedule(&params).unwrap();

        assert_eq!(schedule.len(), 60);
        assert_eq!(schedule[0].month, 1);
        assert!(approx(schedule[0].interest, 2000.0, 1e-9));
        assert_eq!(schedule.last().unwrap().balance, 0.0);

        let principal_paid: f64 = schedule.iter().map(|r| r.principal).sum();
        assert!(approx(principal_paid, 200_000.0, 0.01));

        let interest_paid: f64 = schedule.iter().map(|r| r.interest).sum();
        let quote = amortize(&params).unwrap();
        assert!(approx(interest_paid, quote.total_interest, 0.01));
    }

    #[test]
    fn test_schedule_zero_rate() {
        let schedule = amortization_schedule(&loan(12_000.0, 0.0, 1)).unwrap();
        assert!(schedule.iter().all(|r| r.interest == 0.0 && r.principal == 1000.0));
        assert_eq!(schedule[5].balance, 6000.0);
    }

    #[test]
    fn test_amortize_term_beyond_month_count_has_no_result() {
        // 357_913_942 * 12 does not fit in u32; wrapping would quote 8 months
        assert_eq!(amortize(&loan(120_000.0, 0.0, 357_913_942)), None);
        assert_eq!(amortize(&loan(120_000.0, 12.0, u32::MAX)), None);

        // Largest term that still fits is an ordinary (tiny) quote
        let quote = amortize(&loan(120_000.0, 0.0, 357_913_941)).unwrap();
        assert!(approx(quote.monthly_payment, 120_000.0 / 4_294_967_292.0, 1e-12));
    }

    #[test]
    fn test_schedule_length_is_capped() {
        // Quote exists, but the schedule would be 600M rows
        let huge = loan(1.0, 0.0, 50_000_000);
        assert!(amortize(&huge).is_some());
        assert_eq!(amortization_schedule(&huge), None);

        assert_eq!(amortization_schedule(&loan(100_000.0, 12.0, MAX_SCHEDULE_YEARS + 1)), None);

        let longest = amortization_schedule(&loan(100_000.0, 12.0, MAX_SCHEDULE_YEARS)).unwrap();
        assert_eq!(longest.len(), MAX_SCHEDULE_YEARS as usize * 12);
        assert_eq!(longest.last().unwrap().balance, 0.0);
        println!("✅ Schedule cap PASSED");
    }

    // ---- compound interest ----

    fn compound(initial: f64, monthly: f64, rate: f64, years: u32) -> CompoundInterestParameters {
        CompoundInterestParameters {
            initial_deposit: initial,
            monthly_contribution: monthly,
            annual_rate_percent: rate,
            years,
        }
    }

    #[test]
    fn test_project_single_year() {
        let series = project(&compound(10_000.0, 0.0, 12.0, 1)).unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(
            series[0],
            YearSnapshot {
                year: 0,
                principal: 10_000.0,
                interest: 0.0,
                total: 10_000.0
            }
        );
        assert!(approx(series[1].interest, 1200.0, 1e-6));
        assert!(approx(series[1].total, 11_200.0, 1e-6));
    }

    /// Interest earned within a year only compounds from the next year on.
    /// Changing this changes every projection the site shows.
    #[test]
    fn test_project_deferred_compounding_regression() {
        let series = project(&compound(10_000.0, 0.0, 12.0, 3)).unwrap();

        // Year 2: 12 × (10000 + 1200) × 1% = 1344
        assert!(approx(series[2].interest, 2544.0, 1e-6));
        assert!(approx(series[2].total, 12_544.0, 1e-6));

        // Year 3: 12 × (10000 + 2544) × 1% = 1505.28
        assert!(approx(series[3].interest, 4049.28, 1e-6));
        assert!(approx(series[3].total, 14_049.28, 1e-6));

        // Monthly compounding would give 11268.25 after one year; we don't.
        assert!(series[1].total < 11_268.0);
    }

    #[test]
    fn test_project_with_contributions() {
        let series = project(&compound(0.0, 1000.0, 12.0, 1)).unwrap();

        // Month k (0-based) earns on k·1000 → 1% × (0+1+…+11)·1000 = 660
        assert!(approx(series[1].principal, 12_000.0, 1e-9));
        assert!(approx(series[1].interest, 660.0, 1e-6));
        assert!(approx(series[1].total, 12_660.0, 1e-6));
    }

    #[test]
    fn test_project_rejects_degenerate_input() {
        assert_eq!(project(&compound(1000.0, 0.0, 0.0, 5)), None);
        assert_eq!(project(&compound(1000.0, 0.0, 5.0, 0)), None);
        assert_eq!(project(&compound(-1.0, 0.0, 5.0, 5)), None);
        assert_eq!(project(&compound(1000.0, -10.0, 5.0, 5)), None);
        assert_eq!(project(&compound(1000.0, 0.0, 5.0, MAX_PROJECTION_YEARS + 1)), None);
    }

    #[test]
    fn test_project_withholds_overflow() {
        assert_eq!(project(&compound(f64::MAX / 2.0, 0.0, 1.0e300, 2)), None);
    }

    // ---- aguinaldo ----

    #[test]
    fn test_bonus_full_year() {
        let quote = compute_bonus(&BonusParameters::full_year(15_000.0), date(2026, 6, 1)).unwrap();

        assert!(approx(quote.amount, 7500.0, 1e-9));
        assert!(approx(quote.daily_salary, 500.0, 1e-9));
        assert_eq!(quote.proration, 1.0);
    }

    #[test]
    fn test_bonus_custom_days() {
        let params = BonusParameters::full_year(15_000.0).with_days(30.0);
        let quote = compute_bonus(&params, date(2026, 1, 15)).unwrap();
        assert!(approx(quote.amount, 15_000.0, 1e-9));
    }

    #[test]
    fn test_bonus_prorated() {
        // Jul 1 → Dec 31 inclusive = 184 days
        let params = BonusParameters::since(15_000.0, date(2026, 7, 1));
        let quote = compute_bonus(&params, date(2026, 10, 18)).unwrap();

        assert_eq!(quote.days_worked, 184);
        assert!(approx(quote.amount, 500.0 * 15.0 * 184.0 / 365.0, 1e-9));
    }

    #[test]
    fn test_bonus_started_dec_31_counts_one_day() {
        let params = BonusParameters::since(36_500.0, date(2026, 12, 31));
        let quote = compute_bonus(&params, date(2026, 12, 31)).unwrap();
        assert_eq!(quote.days_worked, 1);
    }

    #[test]
    fn test_bonus_start_outside_current_year_clamps_to_zero() {
        let previous = BonusParameters::since(15_000.0, date(2025, 3, 1));
        let next = BonusParameters::since(15_000.0, date(2027, 1, 1));

        assert_eq!(compute_bonus(&previous, date(2026, 5, 1)).unwrap().amount, 0.0);
        assert_eq!(compute_bonus(&next, date(2026, 5, 1)).unwrap().days_worked, 0);
    }

    #[test]
    fn test_bonus_partial_year_needs_start_date() {
        let params = BonusParameters {
            monthly_salary: 15_000.0,
            bonus_days: 15.0,
            worked_full_year: false,
            start_date: None,
        };
        assert_eq!(compute_bonus(&params, date(2026, 1, 1)), None);
    }

    #[test]
    fn test_bonus_rejects_degenerate_input() {
        assert_eq!(compute_bonus(&BonusParameters::full_year(0.0), date(2026, 1, 1)), None);
        assert_eq!(
            compute_bonus(&BonusParameters::full_year(1000.0).with_days(-1.0), date(2026, 1, 1)),
            None
        );
    }

    #[test]
    fn test_bonus_params_default_days_from_json() {
        let params: BonusParameters =
            serde_json::from_str(r#"{"monthly_salary": 9000, "worked_full_year": true}"#).unwrap();
        assert_eq!(params.bonus_days, DEFAULT_BONUS_DAYS);
        assert_eq!(params.start_date, None);
    }
}
