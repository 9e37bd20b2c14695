//! Domain-equality tests for engine values
//!
//! - Resource identity ignores content
//! - Numeric identity ignores representation
//! - Structural identity for lists and tuples
//! - Observation identity is per instance

use indexmap::IndexMap;
use octofhir_cqm_types::*;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rstest::rstest;
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::HashSet;

// ============================================================================
// Resources
// ============================================================================

#[test]
fn test_distinct_instances_of_same_resource_collapse() {
    let first = ExpressionValue::Resource(
        ResourceValue::from_json(json!({"resourceType": "Encounter", "id": "123", "status": "planned"}))
            .unwrap(),
    );
    let second = ExpressionValue::Resource(
        ResourceValue::from_json(json!({"resourceType": "Encounter", "id": "123", "status": "finished"}))
            .unwrap(),
    );

    let keys: HashSet<MemberKey> = [first, second].iter().map(MemberKey::of).collect();
    assert_eq!(keys.len(), 1);
}

#[test]
fn test_anonymous_resources_key_on_content() {
    let a = ExpressionValue::Resource(
        ResourceValue::from_json(json!({"resourceType": "Observation", "valueInteger": 1})).unwrap(),
    );
    let b = ExpressionValue::Resource(
        ResourceValue::from_json(json!({"resourceType": "Observation", "valueInteger": 2})).unwrap(),
    );
    assert_ne!(MemberKey::of(&a), MemberKey::of(&b));
    assert_eq!(MemberKey::of(&a), MemberKey::of(&a.clone()));
}

#[test]
fn test_subject_reference_matches_resource_key() {
    let subject = SubjectRef::parse("Patient/p1").unwrap();
    assert_eq!(
        subject.to_value().member_key(),
        MemberKey::Resource {
            resource_type: "Patient".to_string(),
            id: "p1".to_string()
        }
    );
}

// ============================================================================
// Structural values
// ============================================================================

#[rstest]
#[case(ExpressionValue::Integer(5), ExpressionValue::Decimal(Decimal::new(50, 1)), true)]
#[case(ExpressionValue::from("M"), ExpressionValue::from("M"), true)]
#[case(ExpressionValue::from("M"), ExpressionValue::from("F"), false)]
#[case(ExpressionValue::from(true), ExpressionValue::from("true"), false)]
#[case(
    ExpressionValue::Code(CodeDef::new("urn:a", "1").with_display("One")),
    ExpressionValue::Code(CodeDef::new("urn:a", "1")),
    true
)]
#[case(
    ExpressionValue::Code(CodeDef::new("urn:a", "1")),
    ExpressionValue::Code(CodeDef::new("urn:b", "1")),
    false
)]
fn test_value_identity(
    #[case] left: ExpressionValue,
    #[case] right: ExpressionValue,
    #[case] same: bool,
) {
    assert_eq!(MemberKey::of(&left) == MemberKey::of(&right), same);
}

#[test]
fn test_tuple_identity_ignores_element_order() {
    let mut a = IndexMap::new();
    a.insert("gender".to_string(), ExpressionValue::from("M"));
    a.insert("age".to_string(), ExpressionValue::Integer(40));
    let mut b = IndexMap::new();
    b.insert("age".to_string(), ExpressionValue::Integer(40));
    b.insert("gender".to_string(), ExpressionValue::from("M"));

    assert_eq!(
        MemberKey::of(&ExpressionValue::Tuple(a)),
        MemberKey::of(&ExpressionValue::Tuple(b))
    );
}

#[test]
fn test_list_identity_is_ordered() {
    let a = ExpressionValue::list(vec![ExpressionValue::Integer(1), ExpressionValue::Integer(2)]);
    let b = ExpressionValue::list(vec![ExpressionValue::Integer(2), ExpressionValue::Integer(1)]);
    assert_ne!(MemberKey::of(&a), MemberKey::of(&b));
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_integer_and_decimal_agree(n in -1_000_000i64..1_000_000i64, scale in 0u32..6) {
        let decimal = Decimal::new(n * 10i64.pow(scale), scale);
        prop_assert_eq!(
            MemberKey::of(&ExpressionValue::Integer(n)),
            MemberKey::of(&ExpressionValue::Decimal(decimal))
        );
    }

    #[test]
    fn prop_resource_key_ignores_content(id in "[a-z0-9-]{1,16}", status in "[a-z]{1,10}") {
        let bare = ExpressionValue::resource("Encounter", id.clone());
        let full = ExpressionValue::Resource(
            ResourceValue::from_json(json!({"resourceType": "Encounter", "id": id, "status": status})).unwrap(),
        );
        prop_assert_eq!(MemberKey::of(&bare), MemberKey::of(&full));
    }

    #[test]
    fn prop_observations_never_collide(value in -1e6f64..1e6f64) {
        let a = QuantityDef::new(value);
        let b = QuantityDef::new(value);
        prop_assert_ne!(MemberKey::from(&a), MemberKey::from(&b));
    }
}
