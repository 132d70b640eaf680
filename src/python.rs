//! Python bindings using PyO3. Inputs and outputs are JSON strings.

use crate::config::CalculatorConfig;
use crate::cube::CubeEngine;
use crate::cube_strategy::{run_cube_simulation, run_cube_simulation_parallel};
use crate::damage::StatCalculator;
use crate::game_data::GameData;
use crate::potential::{PotentialType, Rarity};
use crate::progress::Silent;
use crate::scroll::{run_scroll_simulation, run_scroll_simulation_parallel};
use crate::simulation::{available_cores, thread_count};
use crate::upgrade_planner;
use crate::weapon::{calculate_weapon_attacks, Tier};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use serde::Serialize;

fn parse_config(config_json: &str) -> PyResult<CalculatorConfig> {
    CalculatorConfig::from_json(config_json).map_err(|e| PyValueError::new_err(format!("Invalid config JSON: {}", e)))
}

fn to_json<T: Serialize>(value: &T) -> PyResult<String> {
    serde_json::to_string(value).map_err(|e| PyRuntimeError::new_err(format!("Failed to serialize results: {}", e)))
}

/// Damage breakdown for the configured stats
#[pyfunction]
fn compute_damage(config_json: &str) -> PyResult<String> {
    let config = parse_config(config_json)?;
    let breakdown = StatCalculator::new(&config.stats).compute_in(&config.context());
    to_json(&breakdown)
}

/// Set A vs set B gain for every configured cube slot
#[pyfunction]
#[pyo3(signature = (config_json, bonus=false))]
fn compare_potentials(config_json: &str, bonus: bool) -> PyResult<String> {
    let config = parse_config(config_json)?;
    let engine = CubeEngine::new(GameData::builtin(), config.stats.clone(), config.context());
    let potential_type = if bonus { PotentialType::Bonus } else { PotentialType::Regular };
    let rows: Vec<_> = config.cube.slots.iter().map(|s| engine.compare_sets(s, potential_type)).collect();
    to_json(&rows)
}

/// Cube strategy simulation
#[pyfunction]
#[pyo3(signature = (config_json, parallel=false))]
fn simulate_cubes(py: Python<'_>, config_json: &str, parallel: bool) -> PyResult<String> {
    let config = parse_config(config_json)?;
    let request = config.cube_request();

    // Release GIL during computation
    let report = py.allow_threads(|| {
        let engine = CubeEngine::new(GameData::builtin(), config.stats.clone(), config.context());
        if parallel {
            run_cube_simulation_parallel(&engine, &request)
        } else {
            run_cube_simulation(&engine, &request, &mut Silent)
        }
    });
    let report = report.map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
    to_json(&report)
}

/// Scroll strategy simulation
#[pyfunction]
#[pyo3(signature = (config_json, parallel=false))]
fn simulate_scrolls(py: Python<'_>, config_json: &str, parallel: bool) -> PyResult<String> {
    let config = parse_config(config_json)?;
    let request = config.scroll_request();
    let ctx = config.context();

    let report = py.allow_threads(|| {
        if parallel {
            run_scroll_simulation_parallel(&request, &config.stats, &ctx)
        } else {
            run_scroll_simulation(&request, &config.stats, &ctx, &mut Silent)
        }
    });
    let report = report.map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
    to_json(&report)
}

/// Greedy upgrade plan for the configured weapons and budget
#[pyfunction]
fn plan_upgrades(py: Python<'_>, config_json: &str) -> PyResult<String> {
    let config = parse_config(config_json)?;
    let data = GameData::builtin();
    let weapons = config.armory().weapons().to_vec();
    let plan = py.allow_threads(|| upgrade_planner::plan_upgrades(&weapons, config.upgrade_budget, &data));
    to_json(&plan)
}

/// Inventory and equipped attack % for one weapon
#[pyfunction]
fn weapon_attacks(rarity: &str, tier: &str, level: u32) -> PyResult<String> {
    let rarity: Rarity = rarity.parse().map_err(PyValueError::new_err)?;
    let tier: Tier = tier.parse().map_err(PyValueError::new_err)?;
    to_json(&calculate_weapon_attacks(rarity, tier, level, &GameData::builtin()))
}

/// Number of threads the parallel runners use
#[pyfunction]
fn get_thread_count() -> PyResult<usize> {
    Ok(thread_count())
}

/// Number of available CPU cores
#[pyfunction]
fn get_available_cores() -> PyResult<usize> {
    Ok(available_cores())
}

/// Python module definition
#[pymodule]
fn dps_forge_lib(_py: Python<'_>, m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(compute_damage, m)?)?;
    m.add_function(wrap_pyfunction!(compare_potentials, m)?)?;
    m.add_function(wrap_pyfunction!(simulate_cubes, m)?)?;
    m.add_function(wrap_pyfunction!(simulate_scrolls, m)?)?;
    m.add_function(wrap_pyfunction!(plan_upgrades, m)?)?;
    m.add_function(wrap_pyfunction!(weapon_attacks, m)?)?;
    m.add_function(wrap_pyfunction!(get_thread_count, m)?)?;
    m.add_function(wrap_pyfunction!(get_available_cores, m)?)?;
    Ok(())
}
