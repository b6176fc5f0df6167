//! Tax computation: filing status, 2024 rule tables, and the bracket engine.
//!
//! Everything in this module is a pure function over exact decimals. The
//! same [`crate::aggregate::TaxProfile`] always produces byte-identical
//! results, and nothing here performs I/O.
//!
//! Amounts stay unrounded through the computation; rounding to cents
//! (half-up) happens only in [`TaxSummary::rounded`] at presentation time.

use crate::error::TaxDocError;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Supported federal filing statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FilingStatus {
    Single,
    MarriedFilingJointly,
    MarriedFilingSeparately,
    HeadOfHousehold,
}

impl FilingStatus {
    /// Parse a user-supplied status string.
    ///
    /// Case-insensitive; whitespace, underscores, and hyphens are all
    /// accepted as word separators, and the usual abbreviations work.
    /// Anything unrecognised is a validation error — never silently
    /// defaulted, since the standard deduction and brackets both key off it.
    pub fn parse(input: &str) -> Result<Self, TaxDocError> {
        let key: String = input
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .flat_map(|c| c.to_lowercase())
            .collect();
        match key.as_str() {
            "single" => Ok(FilingStatus::Single),
            "marriedfilingjointly" | "marriedjointly" | "mfj" => {
                Ok(FilingStatus::MarriedFilingJointly)
            }
            "marriedfilingseparately" | "marriedseparately" | "mfs" => {
                Ok(FilingStatus::MarriedFilingSeparately)
            }
            "headofhousehold" | "hoh" => Ok(FilingStatus::HeadOfHousehold),
            _ => Err(TaxDocError::UnsupportedFilingStatus {
                input: input.to_string(),
            }),
        }
    }
}

impl fmt::Display for FilingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FilingStatus::Single => "Single",
            FilingStatus::MarriedFilingJointly => "Married Filing Jointly",
            FilingStatus::MarriedFilingSeparately => "Married Filing Separately",
            FilingStatus::HeadOfHousehold => "Head of Household",
        };
        f.write_str(s)
    }
}

impl FromStr for FilingStatus {
    type Err = TaxDocError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilingStatus::parse(s)
    }
}

/// One marginal bracket: income in `[lower, upper)` is taxed at `rate`.
///
/// `upper = None` marks the top bracket. Brackets are stored contiguously
/// (each bracket's `upper` equals the next bracket's `lower`) so an amount
/// sitting exactly on a boundary is taxed in the lower bracket: the lower
/// bracket's portion is `min(upper, taxable) - lower` and the next
/// bracket's portion is zero.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bracket {
    pub lower: Decimal,
    pub upper: Option<Decimal>,
    pub rate: Decimal,
}

const fn bracket(lower: u64, upper: Option<u64>, rate_bp: i64) -> (u64, Option<u64>, i64) {
    (lower, upper, rate_bp)
}

/// Rule tables for one tax year.
///
/// Kept as data rather than code: an unsupported year or a missing status
/// entry is a [`TaxDocError::Configuration`] (deployment defect), not a
/// silent fallback.
#[derive(Debug, Clone)]
pub struct TaxYearRules {
    pub year: u16,
    standard_deductions: BTreeMap<FilingStatus, Decimal>,
    brackets: BTreeMap<FilingStatus, Vec<Bracket>>,
    /// Flat non-refundable estimate credit per dependent.
    pub dependent_credit: Decimal,
}

impl TaxYearRules {
    /// 2024 IRS constants: standard deductions, marginal brackets, and a
    /// flat per-dependent credit used for the estimate.
    pub fn year_2024() -> Self {
        // (lower, upper, rate in basis points)
        let single = [
            bracket(0, Some(11_600), 1000),
            bracket(11_600, Some(47_150), 1200),
            bracket(47_150, Some(100_525), 2200),
            bracket(100_525, Some(191_950), 2400),
            bracket(191_950, Some(243_725), 3200),
            bracket(243_725, Some(609_350), 3500),
            bracket(609_350, None, 3700),
        ];
        let mfj = [
            bracket(0, Some(23_200), 1000),
            bracket(23_200, Some(94_300), 1200),
            bracket(94_300, Some(201_050), 2200),
            bracket(201_050, Some(383_900), 2400),
            bracket(383_900, Some(487_450), 3200),
            bracket(487_450, Some(731_200), 3500),
            bracket(731_200, None, 3700),
        ];
        let mfs = [
            bracket(0, Some(11_600), 1000),
            bracket(11_600, Some(47_150), 1200),
            bracket(47_150, Some(100_525), 2200),
            bracket(100_525, Some(191_950), 2400),
            bracket(191_950, Some(243_725), 3200),
            bracket(243_725, Some(365_600), 3500),
            bracket(365_600, None, 3700),
        ];
        let hoh = [
            bracket(0, Some(16_550), 1000),
            bracket(16_550, Some(63_100), 1200),
            bracket(63_100, Some(100_500), 2200),
            bracket(100_500, Some(191_950), 2400),
            bracket(191_950, Some(243_700), 3200),
            bracket(243_700, Some(609_350), 3500),
            bracket(609_350, None, 3700),
        ];

        let to_brackets = |rows: &[(u64, Option<u64>, i64)]| -> Vec<Bracket> {
            rows.iter()
                .map(|&(lower, upper, rate_bp)| Bracket {
                    lower: Decimal::from(lower),
                    upper: upper.map(Decimal::from),
                    rate: Decimal::new(rate_bp, 4),
                })
                .collect()
        };

        let mut brackets = BTreeMap::new();
        brackets.insert(FilingStatus::Single, to_brackets(&single));
        brackets.insert(FilingStatus::MarriedFilingJointly, to_brackets(&mfj));
        brackets.insert(FilingStatus::MarriedFilingSeparately, to_brackets(&mfs));
        brackets.insert(FilingStatus::HeadOfHousehold, to_brackets(&hoh));

        let mut standard_deductions = BTreeMap::new();
        standard_deductions.insert(FilingStatus::Single, Decimal::from(14_600u32));
        standard_deductions.insert(FilingStatus::MarriedFilingJointly, Decimal::from(29_200u32));
        standard_deductions.insert(
            FilingStatus::MarriedFilingSeparately,
            Decimal::from(14_600u32),
        );
        standard_deductions.insert(FilingStatus::HeadOfHousehold, Decimal::from(21_900u32));

        Self {
            year: 2024,
            standard_deductions,
            brackets,
            dependent_credit: Decimal::from(500u32),
        }
    }

    /// Standard deduction for a filing status.
    pub fn standard_deduction(&self, status: FilingStatus) -> Result<Decimal, TaxDocError> {
        self.standard_deductions.get(&status).copied().ok_or_else(|| {
            TaxDocError::Configuration(format!(
                "no standard deduction for {status} in tax year {}",
                self.year
            ))
        })
    }

    /// Bracket table for a filing status, validated for shape.
    pub fn brackets(&self, status: FilingStatus) -> Result<&[Bracket], TaxDocError> {
        let table = self.brackets.get(&status).ok_or_else(|| {
            TaxDocError::Configuration(format!(
                "no bracket table for {status} in tax year {}",
                self.year
            ))
        })?;
        validate_brackets(table, status, self.year)?;
        Ok(table)
    }
}

/// Brackets must start at zero, be contiguous and ascending, and end open.
fn validate_brackets(
    table: &[Bracket],
    status: FilingStatus,
    year: u16,
) -> Result<(), TaxDocError> {
    let bad = |detail: String| TaxDocError::Configuration(format!("{status} {year}: {detail}"));

    let first = table
        .first()
        .ok_or_else(|| bad("empty bracket table".into()))?;
    if !first.lower.is_zero() {
        return Err(bad(format!("first bracket starts at {}", first.lower)));
    }
    for pair in table.windows(2) {
        match pair[0].upper {
            Some(upper) if upper == pair[1].lower => {}
            Some(upper) => {
                return Err(bad(format!(
                    "bracket gap: {} ends at {upper}, next starts at {}",
                    pair[0].lower, pair[1].lower
                )))
            }
            None => return Err(bad("non-terminal bracket has no upper bound".into())),
        }
    }
    if table.last().and_then(|b| b.upper).is_some() {
        return Err(bad("top bracket must be unbounded".into()));
    }
    Ok(())
}

/// The computed tax summary. Derived, never mutated after computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxSummary {
    pub gross_income: Decimal,
    pub standard_deduction: Decimal,
    pub taxable_income: Decimal,
    pub calculated_tax: Decimal,
    pub total_withheld: Decimal,
    /// `calculated_tax - total_withheld`; negative means a refund.
    pub tax_due_or_refund: Decimal,
}

impl TaxSummary {
    /// Presentation copy rounded half-up to cents.
    pub fn rounded(&self) -> TaxSummary {
        let r = |d: Decimal| d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        TaxSummary {
            gross_income: r(self.gross_income),
            standard_deduction: r(self.standard_deduction),
            taxable_income: r(self.taxable_income),
            calculated_tax: r(self.calculated_tax),
            total_withheld: r(self.total_withheld),
            tax_due_or_refund: r(self.tax_due_or_refund),
        }
    }
}

/// Marginal tax on `taxable_income` under `table`.
///
/// Sums `rate × portion` over the portion of income falling inside each
/// bracket. Continuous and non-decreasing in `taxable_income` by
/// construction.
pub fn bracket_tax(taxable_income: Decimal, table: &[Bracket]) -> Decimal {
    let mut tax = Decimal::ZERO;
    for b in table {
        if taxable_income <= b.lower {
            break;
        }
        let top = match b.upper {
            Some(upper) => taxable_income.min(upper),
            None => taxable_income,
        };
        tax += b.rate * (top - b.lower);
    }
    tax
}

/// Compute a [`TaxSummary`] from aggregated totals.
///
/// See [`crate::aggregate::TaxProfile`] for how the totals are built.
pub fn compute(
    profile: &crate::aggregate::TaxProfile,
    rules: &TaxYearRules,
) -> Result<TaxSummary, TaxDocError> {
    let gross_income = profile.total_wages
        + profile.total_interest_income
        + profile.total_nonemployee_compensation;

    let standard_deduction = rules.standard_deduction(profile.filing_status)?;
    let taxable_income = (gross_income - standard_deduction).max(Decimal::ZERO);

    let table = rules.brackets(profile.filing_status)?;
    let before_credits = bracket_tax(taxable_income, table);

    let credit = rules.dependent_credit * Decimal::from(profile.dependents);
    let calculated_tax = (before_credits - credit).max(Decimal::ZERO);

    let total_withheld = profile.total_federal_withheld;

    Ok(TaxSummary {
        gross_income,
        standard_deduction,
        taxable_income,
        calculated_tax,
        total_withheld,
        tax_due_or_refund: calculated_tax - total_withheld,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::TaxProfile;
    use rust_decimal_macros::dec;

    fn profile(wages: Decimal, withheld: Decimal, status: FilingStatus) -> TaxProfile {
        TaxProfile {
            total_wages: wages,
            total_federal_withheld: withheld,
            total_interest_income: Decimal::ZERO,
            total_nonemployee_compensation: Decimal::ZERO,
            filing_status: status,
            dependents: 0,
            sources: Default::default(),
        }
    }

    #[test]
    fn parse_filing_status_variants() {
        assert_eq!(FilingStatus::parse("single").unwrap(), FilingStatus::Single);
        assert_eq!(
            FilingStatus::parse("Married Filing Jointly").unwrap(),
            FilingStatus::MarriedFilingJointly
        );
        assert_eq!(
            FilingStatus::parse("MFS").unwrap(),
            FilingStatus::MarriedFilingSeparately
        );
        assert_eq!(
            FilingStatus::parse(" hoh ").unwrap(),
            FilingStatus::HeadOfHousehold
        );
    }

    #[test]
    fn parse_accepts_separator_variants() {
        // The forms the CLI documents for --filing-status.
        assert_eq!(
            FilingStatus::parse("married_jointly").unwrap(),
            FilingStatus::MarriedFilingJointly
        );
        assert_eq!(
            FilingStatus::parse("married_separately").unwrap(),
            FilingStatus::MarriedFilingSeparately
        );
        assert_eq!(
            FilingStatus::parse("head_of_household").unwrap(),
            FilingStatus::HeadOfHousehold
        );
        assert_eq!(
            FilingStatus::parse("married-filing-jointly").unwrap(),
            FilingStatus::MarriedFilingJointly
        );
    }

    #[test]
    fn parse_rejects_unknown_status() {
        let err = FilingStatus::parse("Quadruple").unwrap_err();
        assert!(matches!(err, TaxDocError::UnsupportedFilingStatus { .. }));
    }

    #[test]
    fn single_50k_scenario() {
        let rules = TaxYearRules::year_2024();
        let summary = compute(
            &profile(dec!(50000.00), dec!(6000.00), FilingStatus::Single),
            &rules,
        )
        .unwrap();

        assert_eq!(summary.gross_income, dec!(50000.00));
        assert_eq!(summary.standard_deduction, dec!(14600));
        assert_eq!(summary.taxable_income, dec!(35400.00));
        // 11600 × 10% + 23800 × 12% = 1160 + 2856
        assert_eq!(summary.calculated_tax, dec!(4016.00));
        assert_eq!(summary.tax_due_or_refund, dec!(-1984.00));
        assert_eq!(summary.rounded().tax_due_or_refund, dec!(-1984.00));
    }

    #[test]
    fn zero_income_yields_zero_tax() {
        let rules = TaxYearRules::year_2024();
        let summary = compute(
            &profile(Decimal::ZERO, Decimal::ZERO, FilingStatus::Single),
            &rules,
        )
        .unwrap();
        assert_eq!(summary.taxable_income, Decimal::ZERO);
        assert_eq!(summary.calculated_tax, Decimal::ZERO);
    }

    #[test]
    fn boundary_amount_taxed_in_lower_bracket() {
        let rules = TaxYearRules::year_2024();
        let table = rules.brackets(FilingStatus::Single).unwrap();
        // Exactly at the 10%/12% boundary: all of it at 10%.
        assert_eq!(bracket_tax(dec!(11600), table), dec!(1160.0000));
        // One cent above: that cent at 12%.
        assert_eq!(bracket_tax(dec!(11600.01), table), dec!(1160.001200));
    }

    #[test]
    fn bracket_tax_is_monotonic_and_continuous() {
        let rules = TaxYearRules::year_2024();
        let table = rules.brackets(FilingStatus::Single).unwrap();
        let step = dec!(0.01);
        for edge in [dec!(11600), dec!(47150), dec!(100525), dec!(609350)] {
            let mut prev = bracket_tax(edge - step, table);
            for income in [edge, edge + step] {
                let tax = bracket_tax(income, table);
                assert!(tax >= prev, "tax decreased at income {income}");
                // One cent of income adds at most 0.37 cents of tax; any
                // larger jump would be a discontinuity at the edge.
                assert!(
                    tax - prev <= dec!(0.0037),
                    "discontinuity near {edge}: {prev} -> {tax}"
                );
                prev = tax;
            }
        }
    }

    #[test]
    fn compute_is_deterministic() {
        let rules = TaxYearRules::year_2024();
        let p = profile(dec!(123456.78), dec!(20000), FilingStatus::HeadOfHousehold);
        let a = compute(&p, &rules).unwrap();
        let b = compute(&p, &rules).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn dependent_credit_never_pushes_below_zero() {
        let rules = TaxYearRules::year_2024();
        let mut p = profile(dec!(15000), Decimal::ZERO, FilingStatus::Single);
        p.dependents = 10;
        let summary = compute(&p, &rules).unwrap();
        // Bracket tax on 400 taxable is 40, far below the 5000 credit.
        assert_eq!(summary.calculated_tax, Decimal::ZERO);
    }

    #[test]
    fn dependent_credit_reduces_tax() {
        let rules = TaxYearRules::year_2024();
        let mut p = profile(dec!(50000.00), Decimal::ZERO, FilingStatus::Single);
        p.dependents = 2;
        let summary = compute(&p, &rules).unwrap();
        assert_eq!(summary.calculated_tax, dec!(3016.0000));
    }

    #[test]
    fn mfj_uses_its_own_tables() {
        let rules = TaxYearRules::year_2024();
        let summary = compute(
            &profile(dec!(50000.00), Decimal::ZERO, FilingStatus::MarriedFilingJointly),
            &rules,
        )
        .unwrap();
        assert_eq!(summary.standard_deduction, dec!(29200));
        // taxable 20800, all in the 10% bracket
        assert_eq!(summary.calculated_tax, dec!(2080.0000));
    }

    #[test]
    fn all_2024_tables_validate() {
        let rules = TaxYearRules::year_2024();
        for status in [
            FilingStatus::Single,
            FilingStatus::MarriedFilingJointly,
            FilingStatus::MarriedFilingSeparately,
            FilingStatus::HeadOfHousehold,
        ] {
            rules.brackets(status).expect("table must validate");
            rules.standard_deduction(status).expect("deduction exists");
        }
    }
}
