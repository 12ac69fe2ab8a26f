//! Python extension module.
//!
//! Hierarchies cross the boundary as edge lists of `(general, specific)`
//! node ids; matrices as `uint8` numpy arrays.

use numpy::{PyArray2, PyReadonlyArray2};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::engine::{HieAode, Variant};
use crate::errors::HfsError;
use crate::hierarchy::Hierarchy;
use crate::{normalize, relevance, EngineConfig};

impl From<HfsError> for PyErr {
    fn from(err: HfsError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

fn hierarchy_from(nodes: Option<Vec<u32>>, edges: &[(u32, u32)]) -> Result<Hierarchy, HfsError> {
    Hierarchy::new(nodes.unwrap_or_default(), edges)
}

/// Predict test rows with a HieAODE variant.
/// Rows that fail validation come back as -1.
#[pyfunction]
#[pyo3(signature = (x_train, y_train, x_test, edges, variant="full", nodes=None, columns=None, parallel=false))]
#[allow(clippy::too_many_arguments)]
fn hie_aode_predict<'py>(
    py: Python<'py>,
    x_train: PyReadonlyArray2<'py, u8>,
    y_train: Vec<usize>,
    x_test: PyReadonlyArray2<'py, u8>,
    edges: Vec<(u32, u32)>,
    variant: &str,
    nodes: Option<Vec<u32>>,
    columns: Option<Vec<u32>>,
    parallel: bool,
) -> PyResult<Vec<i64>> {
    let variant: Variant = variant.parse()?;
    let hierarchy = hierarchy_from(nodes, &edges)?;
    let x_train = x_train.as_array().to_owned();
    let x_test = x_test.as_array().to_owned();

    // Detach Python thread state during inference
    let predictions = py.detach(|| -> Result<Vec<i64>, HfsError> {
        let config = EngineConfig {
            variant,
            parallel,
            warm_cache: parallel,
            ..EngineConfig::default()
        };
        let mut engine = HieAode::new(hierarchy, config);
        engine.fit(x_train.view(), &y_train, x_test.view(), columns.as_deref())?;
        Ok(engine
            .select_and_predict(true, false, None)?
            .into_iter()
            .map(|p| p.map(|c| c as i64).unwrap_or(-1))
            .collect())
    })?;
    Ok(predictions)
}

#[pyfunction]
#[pyo3(signature = (identifiers, edges, nodes=None))]
fn shrink_dag(identifiers: Vec<u32>, edges: Vec<(u32, u32)>, nodes: Option<Vec<u32>>) -> PyResult<Vec<(u32, u32)>> {
    let hierarchy = hierarchy_from(nodes, &edges)?;
    Ok(normalize::shrink(&identifiers, &hierarchy)?.edges())
}

#[pyfunction]
#[pyo3(signature = (identifiers, edges, nodes=None))]
fn connect_dag(identifiers: Vec<u32>, edges: Vec<(u32, u32)>, nodes: Option<Vec<u32>>) -> PyResult<Vec<(u32, u32)>> {
    let hierarchy = hierarchy_from(nodes, &edges)?;
    Ok(normalize::connect(&identifiers, &hierarchy)?.edges())
}

/// Returns the new edge list and the root id.
#[pyfunction]
#[pyo3(signature = (edges, nodes=None))]
fn add_virtual_root_node(edges: Vec<(u32, u32)>, nodes: Option<Vec<u32>>) -> PyResult<(Vec<(u32, u32)>, Option<u32>)> {
    let rooted = normalize::add_virtual_root_node(&hierarchy_from(nodes, &edges)?)?;
    Ok((rooted.edges(), rooted.root()))
}

#[pyfunction]
#[pyo3(signature = (x, edges, columns, nodes=None))]
fn compute_aggregated_values<'py>(
    py: Python<'py>,
    x: PyReadonlyArray2<'py, u8>,
    edges: Vec<(u32, u32)>,
    columns: Vec<u32>,
    nodes: Option<Vec<u32>>,
) -> PyResult<Bound<'py, PyArray2<u8>>> {
    let hierarchy = hierarchy_from(nodes, &edges)?;
    let out = normalize::compute_aggregated_values(x.as_array(), &hierarchy, &columns)?;
    Ok(PyArray2::from_owned_array(py, out))
}

#[pyfunction]
fn information_gain<'py>(x: PyReadonlyArray2<'py, u8>, y: Vec<usize>) -> PyResult<Vec<f64>> {
    Ok(relevance::information_gain(x.as_array(), &y)?)
}

#[pyfunction]
fn gain_ratio<'py>(x: PyReadonlyArray2<'py, u8>, y: Vec<usize>) -> PyResult<Vec<f64>> {
    Ok(relevance::gain_ratio(x.as_array(), &y)?)
}

#[pymodule]
fn hfs_fast(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(hie_aode_predict, m)?)?;
    m.add_function(wrap_pyfunction!(shrink_dag, m)?)?;
    m.add_function(wrap_pyfunction!(connect_dag, m)?)?;
    m.add_function(wrap_pyfunction!(add_virtual_root_node, m)?)?;
    m.add_function(wrap_pyfunction!(compute_aggregated_values, m)?)?;
    m.add_function(wrap_pyfunction!(information_gain, m)?)?;
    m.add_function(wrap_pyfunction!(gain_ratio, m)?)?;
    Ok(())
}
