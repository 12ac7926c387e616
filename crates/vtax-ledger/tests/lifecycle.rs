//! Ledger lifecycle under arbitrary operation sequences.

use proptest::prelude::*;
use rust_decimal_macros::dec;
use uuid::Uuid;
use vtax_catalog::seed::default_catalog;
use vtax_core::{ActorId, CompanyId, ServiceType, Timestamp};
use vtax_engine::{CalculationItem, TaxCalculator};
use vtax_ledger::{
    CalculableKind, CalculableRef, CalculationLedger, CalculationStatus, CalculationType,
    LedgerError, NewCalculation, TransitionEvidence,
};

#[derive(Debug, Clone, Copy)]
enum Op {
    Validate,
    Apply,
    Void,
    Adjust,
    Annotate,
    Stale,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Validate),
        Just(Op::Apply),
        Just(Op::Void),
        Just(Op::Adjust),
        Just(Op::Annotate),
        Just(Op::Stale),
    ]
}

fn seeded(company: CompanyId) -> NewCalculation {
    let at = Timestamp::parse("2026-01-01T00:00:00Z").unwrap();
    let catalog = default_catalog(company, ActorId::new(), at).unwrap();
    let input = CalculationItem::new(
        ServiceType::new("voip_fixed").unwrap(),
        dec!(49.99),
        Timestamp::parse("2026-02-01T00:00:00Z").unwrap(),
    );
    let result = TaxCalculator::new(&catalog).calculate(input.clone()).unwrap();
    NewCalculation {
        company_id: company,
        calculable: CalculableRef::new(CalculableKind::Invoice, Uuid::new_v4()),
        calculation_type: CalculationType::Invoice,
        input,
        result,
    }
}

fn evidence() -> TransitionEvidence {
    TransitionEvidence::new(ActorId::new(), "test")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn voided_records_never_change(ops in proptest::collection::vec(op(), 1..12)) {
        let ledger = CalculationLedger::new();
        let company = CompanyId::new();
        let id = ledger.create(seeded(company), &evidence()).record.id;
        let mut voided_snapshot = None;

        for op in ops {
            let current = ledger.get(&company, &id).unwrap();
            let version = Some(current.version);
            let outcome = match op {
                Op::Validate => ledger.validate(&company, &id, version, None, &evidence()).map(|_| ()),
                Op::Apply => ledger.apply(&company, &id, version, &evidence()).map(|_| ()),
                Op::Void => ledger.void(&company, &id, version, &evidence()).map(|_| ()),
                Op::Adjust => ledger
                    .adjust(&company, &id, version, current.input.clone(), current.result.clone(), &evidence())
                    .map(|_| ()),
                Op::Annotate => ledger
                    .annotate(&company, &id, version, "note", serde_json::json!({}), &evidence())
                    .map(|_| ()),
                Op::Stale => ledger
                    .apply(&company, &id, Some(current.version + 1), &evidence())
                    .map(|_| ()),
            };
            if let Op::Stale = op {
                let stale = matches!(outcome, Err(LedgerError::VersionConflict { .. }));
                prop_assert!(stale);
            }

            let after = ledger.get(&company, &id).unwrap();
            prop_assert!(after.version >= current.version);
            prop_assert_eq!(&after.result, &current.result);
            if outcome.is_err() {
                prop_assert_eq!(&after, &current);
            }
            if let Some(snapshot) = &voided_snapshot {
                prop_assert_eq!(&after, snapshot);
            } else if after.status == CalculationStatus::Voided {
                voided_snapshot = Some(after.clone());
            }
        }
    }

    #[test]
    fn event_versions_are_contiguous(ops in proptest::collection::vec(op(), 1..12)) {
        let ledger = CalculationLedger::new();
        let company = CompanyId::new();
        let id = ledger.create(seeded(company), &evidence()).record.id;
        for op in ops {
            let _ = match op {
                Op::Validate => ledger.validate(&company, &id, None, None, &evidence()).map(|_| ()),
                Op::Apply | Op::Stale => ledger.apply(&company, &id, None, &evidence()).map(|_| ()),
                Op::Void => ledger.void(&company, &id, None, &evidence()).map(|_| ()),
                Op::Adjust | Op::Annotate => ledger
                    .annotate(&company, &id, None, "note", serde_json::json!({}), &evidence())
                    .map(|_| ()),
            };
        }
        let record = ledger.get(&company, &id).unwrap();
        let versions: Vec<u64> = ledger.events(&company, &id).unwrap().iter().map(|e| e.version).collect();
        let expected: Vec<u64> = (1..=record.version).collect();
        prop_assert_eq!(versions, expected);
    }
}

#[test]
fn history_round_trips_through_json() {
    let ledger = CalculationLedger::new();
    let company = CompanyId::new();
    let write = ledger.create(seeded(company), &evidence());
    let id = write.record.id;
    ledger.apply(&company, &id, None, &evidence()).unwrap();

    let record = ledger.get(&company, &id).unwrap();
    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["status"], "applied");
    assert_eq!(json["status_history"][0]["from"], "draft");
    let back: vtax_ledger::TaxCalculation = serde_json::from_value(json).unwrap();
    assert_eq!(back, record);

    let events = ledger.events(&company, &id).unwrap();
    let restored = CalculationLedger::new();
    restored.restore(back, events.clone());
    assert_eq!(restored.events(&company, &id).unwrap(), events);
}
