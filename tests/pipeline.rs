//! End-to-end runs through the public API: normalize a hierarchy, aggregate
//! the raw matrix, then classify test rows with each variant.

use hfs_fast::{
    compute_aggregated_values, information_gain, shrink, EngineConfig, Estimator, HfsError, HieAode,
    Hierarchy, InstanceError, LazySelector, Result, Variant,
};
use ndarray::{array, Array2, ArrayView2};

/// Estimator that always answers class 0; only checks the call shape.
struct Majority;

impl Estimator for Majority {
    fn name(&self) -> &str {
        "majority"
    }

    fn fit(&mut self, _x: ArrayView2<'_, u8>, _y: &[usize]) -> Result<()> {
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, u8>) -> Result<Vec<usize>> {
        Ok(vec![0; x.nrows()])
    }
}

/// 0 -> 1 -> 2, with an unused node 3 hanging between 1 and 2.
fn raw_hierarchy() -> Hierarchy {
    Hierarchy::from_edges(&[(0, 1), (1, 3), (3, 2), (1, 2)]).unwrap()
}

fn chain_train() -> (Array2<u8>, Vec<usize>) {
    (array![[1u8, 1, 0], [1, 0, 0], [1, 1, 1], [0, 0, 1]], vec![0, 0, 1, 1])
}

/// Deterministic pseudo-random binary matrix.
fn generated(rows: usize, cols: usize, salt: usize) -> Array2<u8> {
    Array2::from_shape_fn((rows, cols), |(r, c)| u8::from((r * 7 + c * 13 + salt) % 5 < 2))
}

#[test]
fn test_shrink_then_predict_chain() {
    let hierarchy = shrink(&[0, 1, 2], &raw_hierarchy()).unwrap();
    assert_eq!(hierarchy.edges(), vec![(0, 1), (1, 2)]);

    let (x, y) = chain_train();
    // Last row has a conditioning value different from its descendant's
    let test = array![[1u8, 1, 1], [1, 0, 0], [1, 1, 0]];
    let mut selector: Box<dyn LazySelector> = Box::new(HieAode::with_variant(hierarchy, Variant::Full));
    selector.fit(x.view(), &y, test.view(), None).unwrap();

    let predictions = selector.select_and_predict(true, true, Some(&Majority)).unwrap();
    assert_eq!(predictions, vec![Ok(1), Ok(0), Ok(1)]);
    assert!(selector.select_and_predict(false, false, None).unwrap().is_empty());
}

#[test]
fn test_aggregation_feeds_engine() {
    let hierarchy = shrink(&[0, 1, 2], &raw_hierarchy()).unwrap();
    let raw = array![[0u8, 0, 1], [0, 1, 0], [1, 0, 0], [0, 0, 0]];
    let aggregated = compute_aggregated_values(raw.view(), &hierarchy, &[0, 1, 2]).unwrap();
    assert_eq!(aggregated, array![[1u8, 1, 1], [1, 1, 0], [1, 0, 0], [0, 0, 0]]);

    let y = vec![1, 1, 0, 0];
    let gains = information_gain(aggregated.view(), &y).unwrap();
    assert!((gains[1] - 1.0).abs() < 1e-9);

    let mut engine = HieAode::with_variant(hierarchy, Variant::Lite);
    engine.fit(aggregated.view(), &y, aggregated.view(), None).unwrap();
    let predictions = engine.select_and_predict(true, false, None).unwrap();
    assert_eq!(predictions.len(), 4);
    assert!(predictions.iter().all(|p| matches!(p, Ok(c) if *c < 2)));
}

#[test]
fn test_variants_from_config_agree_across_threads() {
    let edges = [(0, 1), (0, 2), (1, 3), (1, 4), (2, 5), (4, 6), (5, 7)];
    let hierarchy = Hierarchy::from_edges(&edges).unwrap();
    let x = generated(40, 8, 1);
    let y: Vec<usize> = (0..40).map(|r| r % 3).collect();
    let test = generated(12, 8, 4);

    for variant in ["full", "lite", "plus_plus"] {
        let text = format!("variant = \"{variant}\"\nwarm_cache = true\n");
        let sequential = EngineConfig::from_toml_str(&text).unwrap();
        let parallel = EngineConfig {
            parallel: true,
            ..sequential.clone()
        };

        let mut a = HieAode::new(hierarchy.clone(), sequential);
        let mut b = HieAode::new(hierarchy.clone(), parallel);
        a.fit(x.view(), &y, test.view(), None).unwrap();
        b.fit(x.view(), &y, test.view(), None).unwrap();

        let pa = a.select_and_predict(true, false, None).unwrap();
        let pb = b.select_and_predict(true, false, None).unwrap();
        assert_eq!(pa, pb, "variant {variant}");
        assert_eq!(pa.len(), 12);
    }
}

#[test]
fn test_bad_rows_reported_individually() {
    let hierarchy = Hierarchy::from_edges(&[(0, 1), (1, 2)]).unwrap();
    let (x, y) = chain_train();
    let test = array![[1u8, 1, 1], [1, 3, 0]];
    let mut engine = HieAode::with_variant(hierarchy, Variant::PlusPlus);
    engine.fit(x.view(), &y, test.view(), None).unwrap();

    let predictions = engine.select_and_predict(true, false, None).unwrap();
    assert!(predictions[0].is_ok());
    assert_eq!(
        predictions[1],
        Err(InstanceError::NonBinaryValue {
            row: 1,
            column: 1,
            value: 3
        })
    );
}

#[test]
fn test_plus_variant_rejected() {
    let hierarchy = Hierarchy::from_edges(&[(0, 1), (1, 2)]).unwrap();
    let (x, y) = chain_train();
    let mut engine = HieAode::with_variant(hierarchy, Variant::Plus);
    engine.fit(x.view(), &y, x.view(), None).unwrap();
    assert!(matches!(
        engine.select_and_predict(true, false, None),
        Err(HfsError::VariantNotImplemented("HieAODE+"))
    ));
}

#[test]
fn test_downstream_estimator_driven_by_caller() {
    let (x, y) = chain_train();
    let mut estimator: Box<dyn Estimator> = Box::new(Majority);
    estimator.fit(x.view(), &y).unwrap();
    assert_eq!(estimator.predict(x.view()).unwrap(), vec![0; 4]);
    assert_eq!(estimator.name(), "majority");
}
