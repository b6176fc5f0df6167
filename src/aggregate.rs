//! Aggregation: merge per-page extractions into one set of totals.
//!
//! This is the fan-in barrier of the pipeline. It runs only after every
//! page task has completed (or definitively failed), sums same-named fields
//! across all forms in exact decimals, and records which source files
//! contributed to each total. Absent fields contribute zero — missing data
//! degrades the estimate, it never blocks it.
//!
//! Summation over `Decimal` is associative and commutative, so the result
//! is independent of the order pages happened to finish in.

use crate::extract::{ExtractedForm, FieldName};
use crate::tax::FilingStatus;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Aggregated totals for one request, plus the request's filer inputs.
///
/// Built once by [`aggregate`], immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxProfile {
    pub total_wages: Decimal,
    pub total_federal_withheld: Decimal,
    pub total_interest_income: Decimal,
    pub total_nonemployee_compensation: Decimal,
    pub filing_status: FilingStatus,
    pub dependents: u32,
    /// Source files contributing to each aggregated field, in sorted order.
    ///
    /// Surfaced so the caller can spot an accidental duplicate upload — two
    /// 1099-NECs from different payers and the same file uploaded twice look
    /// identical to the totals, and only the caller can tell them apart.
    pub sources: BTreeMap<FieldName, Vec<String>>,
}

/// Sum same-named fields across all extracted forms.
pub fn aggregate(
    forms: &[ExtractedForm],
    filing_status: FilingStatus,
    dependents: u32,
) -> TaxProfile {
    let mut totals: BTreeMap<FieldName, Decimal> = BTreeMap::new();
    let mut sources: BTreeMap<FieldName, Vec<String>> = BTreeMap::new();

    for form in forms {
        for (&field, &amount) in &form.fields {
            *totals.entry(field).or_insert(Decimal::ZERO) += amount;
            sources
                .entry(field)
                .or_default()
                .push(form.source_file.clone());
        }
    }

    // Sorted contributor lists keep the output independent of completion order.
    for list in sources.values_mut() {
        list.sort();
    }

    let total = |field: FieldName| totals.get(&field).copied().unwrap_or(Decimal::ZERO);

    let profile = TaxProfile {
        total_wages: total(FieldName::Wages),
        total_federal_withheld: total(FieldName::FederalWithheld),
        total_interest_income: total(FieldName::InterestIncome),
        total_nonemployee_compensation: total(FieldName::NonemployeeCompensation),
        filing_status,
        dependents,
        sources,
    };

    info!(
        "Aggregated {} forms: wages {}, withheld {}, interest {}, nonemployee {}",
        forms.len(),
        profile.total_wages,
        profile.total_federal_withheld,
        profile.total_interest_income,
        profile.total_nonemployee_compensation
    );

    profile
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::FormType;
    use rust_decimal_macros::dec;

    fn w2(file: &str, wages: Decimal, withheld: Decimal) -> ExtractedForm {
        let mut fields = BTreeMap::new();
        fields.insert(FieldName::Wages, wages);
        fields.insert(FieldName::FederalWithheld, withheld);
        ExtractedForm {
            source_file: file.into(),
            page_index: 0,
            form_type: FormType::W2,
            fields,
            confidences: BTreeMap::new(),
            notes: Vec::new(),
        }
    }

    fn int1099(file: &str, interest: Decimal) -> ExtractedForm {
        let mut fields = BTreeMap::new();
        fields.insert(FieldName::InterestIncome, interest);
        ExtractedForm {
            source_file: file.into(),
            page_index: 0,
            form_type: FormType::Int1099,
            fields,
            confidences: BTreeMap::new(),
            notes: Vec::new(),
        }
    }

    #[test]
    fn two_w2s_sum_per_field() {
        let forms = vec![
            w2("a.pdf", dec!(20000.00), dec!(2000.00)),
            w2("b.pdf", dec!(30000.00), dec!(4000.00)),
        ];
        let profile = aggregate(&forms, FilingStatus::Single, 0);
        assert_eq!(profile.total_wages, dec!(50000.00));
        assert_eq!(profile.total_federal_withheld, dec!(6000.00));
        assert_eq!(
            profile.sources[&FieldName::Wages],
            vec!["a.pdf".to_string(), "b.pdf".to_string()]
        );
    }

    #[test]
    fn aggregation_is_order_independent() {
        let forms = vec![
            w2("a.pdf", dec!(20000.00), dec!(2000.00)),
            int1099("c.pdf", dec!(123.45)),
            w2("b.pdf", dec!(30000.00), dec!(4000.00)),
        ];
        let mut reversed = forms.clone();
        reversed.reverse();

        let x = aggregate(&forms, FilingStatus::Single, 1);
        let y = aggregate(&reversed, FilingStatus::Single, 1);

        assert_eq!(x.total_wages, y.total_wages);
        assert_eq!(x.total_federal_withheld, y.total_federal_withheld);
        assert_eq!(x.total_interest_income, y.total_interest_income);
        assert_eq!(x.sources, y.sources);
    }

    #[test]
    fn absent_fields_contribute_zero() {
        let profile = aggregate(&[], FilingStatus::HeadOfHousehold, 3);
        assert_eq!(profile.total_wages, Decimal::ZERO);
        assert_eq!(profile.total_interest_income, Decimal::ZERO);
        assert!(profile.sources.is_empty());
        assert_eq!(profile.dependents, 3);
    }

    #[test]
    fn duplicate_source_files_are_visible() {
        let forms = vec![
            w2("same.pdf", dec!(10000), dec!(1000)),
            w2("same.pdf", dec!(10000), dec!(1000)),
        ];
        let profile = aggregate(&forms, FilingStatus::Single, 0);
        assert_eq!(profile.total_wages, dec!(20000));
        // Caller can see the same file twice and flag the duplicate.
        assert_eq!(profile.sources[&FieldName::Wages].len(), 2);
    }
}
