use heatscape_components::heat_field::Gradient;
use heatscape_core::errors::HeatscapeError;
use heatscape_core::historical::HistoricalTable;
use heatscape_core::projection::{HorizonRange, ProjectionModel, ProjectionParameters};
use heatscape_core::scenario::EmissionScenario;
use heatscape_core::{FloatValue, Year};
use numpy::{PyArray1, ToPyArray};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;

fn to_py_err(e: HeatscapeError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn load_table(path: Option<&str>) -> PyResult<HistoricalTable> {
    match path {
        Some(path) => HistoricalTable::from_path(path).map_err(to_py_err),
        None => Ok(HistoricalTable::reference()),
    }
}

/// Python wrapper for EmissionScenario
#[pyclass(name = "EmissionScenario", module = "heatscape._lib")]
#[derive(Clone)]
pub struct PyEmissionScenario(pub EmissionScenario);

#[pymethods]
impl PyEmissionScenario {
    #[new]
    pub fn new(base_mt_co2: FloatValue, rate_percent: FloatValue) -> PyResult<Self> {
        EmissionScenario::new(base_mt_co2, rate_percent)
            .map(PyEmissionScenario)
            .map_err(to_py_err)
    }

    /// Set the rate, returning the clamped value
    pub fn set_rate(&mut self, rate_percent: FloatValue) -> PyResult<FloatValue> {
        self.0.set_rate(rate_percent).map_err(to_py_err)
    }

    pub fn set_base(&mut self, base_mt_co2: FloatValue) -> PyResult<()> {
        self.0.set_base(base_mt_co2).map_err(to_py_err)
    }

    #[getter]
    pub fn rate_percent(&self) -> FloatValue {
        self.0.rate_percent()
    }

    #[getter]
    pub fn base_mt_co2(&self) -> FloatValue {
        self.0.base_mt_co2()
    }

    #[getter]
    pub fn active_mt_co2(&self) -> FloatValue {
        self.0.active_mt_co2()
    }

    #[getter]
    pub fn result_mt_co2(&self) -> FloatValue {
        self.0.result_mt_co2()
    }

    fn __repr__(&self) -> String {
        format!(
            "EmissionScenario(base_mt_co2={}, rate_percent={}, result_mt_co2={})",
            self.0.base_mt_co2(),
            self.0.rate_percent(),
            self.0.result_mt_co2()
        )
    }
}

/// Project temperature and CO2 over an inclusive range of years
///
/// Uses the built-in reference table unless `table_path` points to a TOML table.
/// Returns a dict of numpy arrays: `years`, `temperatures` and `co2_mt`.
#[pyfunction]
#[pyo3(signature = (start, end, scenario=None, table_path=None))]
fn project<'py>(
    py: Python<'py>,
    start: Year,
    end: Year,
    scenario: Option<PyEmissionScenario>,
    table_path: Option<String>,
) -> PyResult<Bound<'py, PyDict>> {
    let table = load_table(table_path.as_deref())?;
    let horizon = HorizonRange::new(start, end).map_err(to_py_err)?;
    let model = ProjectionModel::fit(table, ProjectionParameters::default()).map_err(to_py_err)?;
    let series = model
        .project(horizon, scenario.as_ref().map(|s| &s.0))
        .map_err(to_py_err)?;

    let result = PyDict::new_bound(py);
    result.set_item("years", PyArray1::from_slice_bound(py, series.years()))?;
    result.set_item("temperatures", series.temperatures().to_pyarray_bound(py))?;
    result.set_item("co2_mt", series.co2_mt().to_pyarray_bound(py))?;
    Ok(result)
}

/// Name of the heat field gradient for a temperature range
#[pyfunction]
fn select_gradient(min: FloatValue, max: FloatValue) -> &'static str {
    Gradient::select(min, max).name()
}

#[pymodule]
#[pyo3(name = "_lib")]
fn heatscape(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add_class::<PyEmissionScenario>()?;
    m.add_function(wrap_pyfunction!(project, m)?)?;
    m.add_function(wrap_pyfunction!(select_gradient, m)?)?;
    Ok(())
}
