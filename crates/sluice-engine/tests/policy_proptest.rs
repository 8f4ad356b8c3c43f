use proptest::prelude::*;
use sluice_engine::checkpoint::HighWaterMark;
use sluice_engine::config::parser;
use sluice_engine::config::validator;
use sluice_engine::quality::{CheckRegistry, QualityGate};
use sluice_engine::schema::{classify, infer, TypeCompatibility};
use sluice_types::quality::{CheckKind, QualityAction, QualityCheck};
use sluice_types::record::Record;
use sluice_types::schema::DataType;
use sluice_types::value::Value;

fn data_type() -> impl Strategy<Value = DataType> {
    prop_oneof![
        Just(DataType::Integer),
        Just(DataType::Float),
        Just(DataType::Boolean),
        Just(DataType::Date),
        Just(DataType::Datetime),
        Just(DataType::String),
    ]
}

fn action() -> impl Strategy<Value = QualityAction> {
    prop_oneof![
        Just(QualityAction::Quarantine),
        Just(QualityAction::Warn),
        Just(QualityAction::Fail),
    ]
}

proptest! {
    #[test]
    fn widening_and_narrowing_are_mirror_images(from in data_type(), to in data_type()) {
        let forward = classify(from, to);
        let backward = classify(to, from);
        match forward {
            TypeCompatibility::Identical => prop_assert_eq!(from, to),
            TypeCompatibility::Widening => prop_assert_eq!(backward, TypeCompatibility::Narrowing),
            TypeCompatibility::Narrowing => prop_assert_eq!(backward, TypeCompatibility::Widening),
            TypeCompatibility::Incompatible => prop_assert_eq!(backward, TypeCompatibility::Incompatible),
        }
    }

    #[test]
    fn high_water_mark_never_regresses(values in prop::collection::vec(prop::option::of(-1000_i64..1000), 1..50)) {
        let mut mark = HighWaterMark::new(None);
        let mut previous: Option<i64> = None;
        for value in &values {
            mark.observe(&value.map_or(Value::Null, Value::Int));
            let current = match mark.get() {
                Some(Value::Int(n)) => Some(*n),
                Some(other) => return Err(TestCaseError::fail(format!("unexpected mark {other:?}"))),
                None => None,
            };
            prop_assert!(current >= previous);
            previous = current;
        }
        prop_assert_eq!(previous, values.iter().flatten().copied().max());
    }

    #[test]
    fn quarantine_partitions_every_batch(
        amounts in prop::collection::vec(-50_i64..50, 0..40),
        first_row in 1_u64..1000,
    ) {
        let checks = vec![QualityCheck {
            column: "amount".into(),
            kind: CheckKind::Range { min: Some(0.0), max: None },
            action: QualityAction::Quarantine,
        }];
        let gate = QualityGate::new(&checks, &CheckRegistry::new()).unwrap();
        let records: Vec<Record> = amounts.iter().map(|a| Record::new().with("amount", *a)).collect();

        let result = gate.validate_batch(records, first_row);

        let negatives = amounts.iter().filter(|a| **a < 0).count();
        prop_assert_eq!(result.valid_records.len() + result.invalid_records.len(), amounts.len());
        prop_assert_eq!(result.quarantined().count(), negatives);
        prop_assert!(result.failure().is_none());
        for invalid in &result.invalid_records {
            let offset = usize::try_from(invalid.row_number - first_row).unwrap();
            prop_assert!(amounts[offset] < 0);
        }
    }

    #[test]
    fn governing_action_is_the_most_severe(actions in prop::collection::vec(action(), 1..5)) {
        let checks: Vec<QualityCheck> = actions
            .iter()
            .map(|action| QualityCheck {
                column: "code".into(),
                kind: CheckKind::InList { values: vec![serde_json::json!("ok")] },
                action: *action,
            })
            .collect();
        let gate = QualityGate::new(&checks, &CheckRegistry::new()).unwrap();

        let result = gate.validate_batch(vec![Record::new().with("code", "bad")], 1);

        let expected = actions.iter().copied().max().unwrap();
        prop_assert_eq!(result.invalid_records.len(), 1);
        prop_assert_eq!(result.invalid_records[0].action, expected);
        prop_assert_eq!(result.invalid_records[0].failures.len(), actions.len());
        prop_assert_eq!(result.valid_records.len(), usize::from(expected == QualityAction::Warn));
    }

    #[test]
    fn integer_samples_infer_integer(values in prop::collection::vec(prop::option::of(any::<i64>()), 1..30)) {
        let records: Vec<Record> = values
            .iter()
            .map(|v| Record::new().with("n", v.map_or(Value::Null, Value::Int)))
            .collect();

        let inference = infer(records, 100);
        let column = inference.schema.column("n").unwrap();

        prop_assert_eq!(inference.rows_sampled, values.len());
        prop_assert_eq!(column.nullable, values.iter().any(Option::is_none));
        let expected = if values.iter().all(Option::is_none) { DataType::String } else { DataType::Integer };
        prop_assert_eq!(column.data_type, expected);
    }

    #[test]
    fn checkpoint_requires_tracking_column(has_tracking in any::<bool>()) {
        let tracking_line = if has_tracking { "\n    tracking_column: id" } else { "" };
        let yaml = format!(
            r#"
version: "1.0"
sources:
  - name: src
    type: memory
destinations:
  - name: dst
    type: memory
resources:
  - name: users
    source: src
    destination: dst
    checkpoint: true{tracking_line}
"#
        );

        let config = parser::parse_pipeline_str(&yaml).expect("generated yaml must parse");
        let result = validator::validate_pipeline(&config);

        if has_tracking {
            prop_assert!(result.is_ok());
        } else {
            prop_assert!(result.is_err());
        }
    }
}
