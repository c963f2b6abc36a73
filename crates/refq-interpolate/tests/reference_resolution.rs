use pretty_assertions::assert_eq;
use proptest::prelude::*;
use refq_interpolate::{interpolate, InterpolateError, InterpolatedQuery, Interpolation, Interpolator};
use refq_registry::{QueryRecord, QueryRegistry, QuerySource};

fn registry(pairs: &[(&str, &str)]) -> QueryRegistry {
    pairs.iter().map(|(id, expr)| QueryRecord::new(*id, *expr)).collect()
}

fn at(position: usize, length: usize) -> Interpolation {
    Interpolation { position, length }
}

#[test]
fn expression_without_references_is_unchanged() {
    let r = registry(&[("A", "rate(http_requests_total[5m])"), ("B", "1+1")]);
    let q = interpolate(&r, "A").unwrap();
    assert_eq!(
        q,
        InterpolatedQuery { ref_id: "A".into(), expr: "rate(http_requests_total[5m])".into(), interpolations: vec![] }
    );
}

#[test]
fn single_reference_is_substituted() {
    let r = registry(&[("A", "1+1"), ("B", "@A*2")]);
    let q = interpolate(&r, "B").unwrap();
    assert_eq!(q.expr, "1+1*2");
    assert_eq!(q.interpolations, vec![at(0, 3)]);
}

#[test]
fn each_range_covers_the_text_it_pulled_in() {
    let r = registry(&[
        ("A", "sum(rate(http_requests_total[5m]))"),
        ("B", "sum(rate(http_errors_total[5m]))"),
        ("C", "@B / @A"),
    ]);
    let q = interpolate(&r, "C").unwrap();
    let chars: Vec<char> = q.expr.chars().collect();
    let pulled: Vec<String> = q.interpolations.iter().map(|i| chars[i.range()].iter().collect()).collect();
    assert_eq!(pulled, vec!["sum(rate(http_errors_total[5m]))", "sum(rate(http_requests_total[5m]))"]);
}

#[test]
fn unknown_reference_is_left_intact() {
    let r = registry(&[("B", "@Z+1")]);
    let q = interpolate(&r, "B").unwrap();
    assert_eq!(q.expr, "@Z+1");
    assert!(q.interpolations.is_empty());
}

#[test]
fn nested_references_resolve_across_passes() {
    let r = registry(&[("A", "1"), ("B", "@A+1"), ("C", "@B*2")]);
    let q = interpolate(&r, "C").unwrap();
    assert_eq!(q.expr, "1+1*2");
    assert_eq!(q.interpolations, vec![at(0, 4), at(0, 1)]);
}

#[test]
fn self_reference_is_circular() {
    let r = registry(&[("A", "@A+1")]);
    assert_eq!(
        interpolate(&r, "A"),
        Err(InterpolateError::CircularReference { ref_id: "A".into(), unresolved: vec!["A".into()] })
    );
}

#[test]
fn self_reference_next_to_resolvable_one_is_still_circular() {
    let r = registry(&[
        ("A", "sumSeries(cpu, @A, @B)"),
        ("B", "add(cpu, 1.5)"),
    ]);
    let err = interpolate(&r, "A").unwrap_err();
    assert_eq!(err, InterpolateError::CircularReference { ref_id: "A".into(), unresolved: vec!["A".into()] });
}

#[test]
fn mutual_cycle_is_circular() {
    let r = registry(&[("A", "@B"), ("B", "@A")]);
    assert!(matches!(
        interpolate(&r, "A"),
        Err(InterpolateError::CircularReference { ref ref_id, .. }) if ref_id == "A"
    ));
    assert!(matches!(
        interpolate(&r, "B"),
        Err(InterpolateError::CircularReference { ref ref_id, .. }) if ref_id == "B"
    ));
}

#[test]
fn longer_cycle_through_third_query_is_circular() {
    let r = registry(&[("A", "@B+1"), ("B", "@C+1"), ("C", "@A+1")]);
    assert!(matches!(interpolate(&r, "A"), Err(InterpolateError::CircularReference { .. })));
}

#[test]
fn target_must_exist() {
    let r = registry(&[("A", "1")]);
    assert_eq!(interpolate(&r, "B"), Err(InterpolateError::NotFound { ref_id: "B".into() }));
}

#[test]
fn registry_is_not_mutated_by_interpolation() {
    let r = registry(&[("A", "1+1"), ("B", "@A*2")]);
    let before = r.clone();
    interpolate(&r, "B").unwrap();
    assert_eq!(r, before);
    assert_eq!(r.get_query("B").map(|q| q.expr.as_str()), Some("@A*2"));
}

#[test]
fn edits_are_seen_by_the_next_call() {
    let mut r = registry(&[("A", "@B"), ("B", "@A")]);
    assert!(interpolate(&r, "A").is_err());
    r.set_query(QueryRecord::new("B", "up"));
    assert_eq!(interpolate(&r, "A").map(|q| q.expr), Ok("up".to_string()));
}

#[test]
fn interpolated_query_serializes_for_the_editor() {
    let r = registry(&[("A", "1+1"), ("B", "@A*2")]);
    let q = interpolate(&r, "B").unwrap();
    assert_eq!(
        serde_json::to_value(&q).unwrap(),
        serde_json::json!({
            "refId": "B",
            "expr": "1+1*2",
            "interpolations": [{ "position": 0, "length": 3 }]
        })
    );
}

/// A store other than `QueryRegistry` plugs in through `QuerySource`.
struct PanelTargets(Vec<QueryRecord>);

impl QuerySource for PanelTargets {
    fn get_query(&self, ref_id: &str) -> Option<&QueryRecord> {
        self.0.iter().find(|q| q.ref_id == ref_id)
    }
    fn list_queries(&self) -> Vec<&QueryRecord> {
        self.0.iter().collect()
    }
}

#[test]
fn custom_source_is_supported() {
    let targets = PanelTargets(vec![QueryRecord::new("A", "cpu"), QueryRecord::new("B", "avg(@A)")]);
    let q = Interpolator::new(&targets).interpolate("B").unwrap();
    assert_eq!(q.expr, "avg(cpu)");
    assert_eq!(q.interpolations, vec![at(4, 3)]);
}

fn arb_registry() -> impl Strategy<Value = QueryRegistry> {
    prop::collection::vec("(@[A-E]|@Z|[0-9+*()]){0,8}", 1..=5).prop_map(|exprs| {
        exprs
            .into_iter()
            .zip(["A", "B", "C", "D", "E"])
            .map(|(expr, id)| QueryRecord::new(id, expr))
            .collect()
    })
}

proptest! {
    #[test]
    fn token_free_expressions_are_returned_verbatim(expr in "[a-z0-9+*() {}=\"]{0,40}", r in arb_registry()) {
        let mut r = r;
        r.set_query(QueryRecord::new("Q", expr.clone()));
        let q = interpolate(&r, "Q").unwrap();
        prop_assert_eq!(q.expr, expr);
        prop_assert!(q.interpolations.is_empty());
    }

    #[test]
    fn reinterpolation_is_identical(r in arb_registry()) {
        for query in r.list_queries() {
            let first = interpolate(&r, &query.ref_id);
            let second = interpolate(&r, &query.ref_id);
            prop_assert_eq!(first, second);
        }
    }

    #[test]
    fn success_leaves_no_reference_to_a_known_query(r in arb_registry()) {
        for (_, result) in Interpolator::new(&r).interpolate_all() {
            if let Ok(q) = result {
                let leftover = refq_token::extract_references(&q.expr);
                for id in leftover.ids {
                    prop_assert!(r.get_query(&id.to_string()).is_none());
                }
            }
        }
    }
}
