//! End-to-end runs of the seasonal-trend decomposition method.

mod common;

use std::sync::Arc;

use load_forecast::calendar::HolidayCalendar;
use load_forecast::error::ForecastError;
use load_forecast::forecast::Diagnostics;
use load_forecast::pipeline::{ForecastInputs, ForecastRunner};

fn runner() -> ForecastRunner {
    ForecastRunner::new(Arc::new(HolidayCalendar::empty()))
}

const TARGETS: [(i32, f64); 2] = [(2025, 9_000_000.0), (2026, 9_500_000.0)];

#[test]
fn one_year_of_history_is_rejected() {
    let cfg = common::stl_config(2025, 2026, 1);
    let inputs = ForecastInputs::new(
        common::history_table(2023, 2023),
        common::scenario_table(&TARGETS),
    );
    let err = runner().run(&cfg, &inputs).unwrap_err();
    assert!(matches!(err, ForecastError::Configuration(_)), "{err:?}");
    assert!(
        err.reasons()
            .iter()
            .any(|r| r.field == "history" && r.message.contains("insufficient history")),
        "reasons: {:?}",
        err.reasons()
    );
}

#[test]
fn preflight_lists_every_reason() {
    let mut cfg = common::stl_config(2025, 2026, 1);
    cfg.load_factor.enabled = true;
    cfg.load_factor.target_fiscal_year = 2026;
    let inputs = ForecastInputs::new(
        common::history_table(2023, 2023),
        common::scenario_table(&[(2040, 1.0e7)]),
    );
    let err = runner().run(&cfg, &inputs).unwrap_err();
    let fields: Vec<&str> = err.reasons().iter().map(|r| r.field.as_str()).collect();
    assert_eq!(fields, vec!["history", "scenarios"]);
}

#[test]
fn rejected_config_still_reports_data_shortfalls() {
    let mut cfg = common::stl_config(2025, 2025, 1);
    cfg.load_factor.enabled = true;
    cfg.load_factor.target_fiscal_year = 2025;
    cfg.load_factor.improvement_percent = 75.0;
    let inputs = ForecastInputs::new(
        common::history_table(2023, 2023),
        common::scenario_table(&[(2040, 1.0e7)]),
    );
    let err = runner().run(&cfg, &inputs).unwrap_err();
    let fields: Vec<&str> = err.reasons().iter().map(|r| r.field.as_str()).collect();
    assert_eq!(
        fields,
        vec![
            "history",
            "scenarios",
            "forecast.end_fy",
            "load_factor.improvement_percent"
        ]
    );
    assert!(err.to_string().contains("insufficient history"), "{err}");
}

#[test]
fn seeded_runs_are_reproducible_and_meet_targets() {
    let cfg = common::stl_config(2025, 2026, 2024);
    let inputs = common::three_year_inputs(&TARGETS);
    let a = runner().run(&cfg, &inputs).expect("first run");
    let b = runner().run(&cfg, &inputs).expect("second run");
    assert_eq!(a.table, b.table);

    assert_eq!(a.table.len(), 2 * 8760);
    for (fy, target) in TARGETS {
        let total = a.table.year_total(fy);
        assert!(common::rel_diff(total, target) < 0.005, "FY{fy}: {total}");
    }
    assert!(a.table.values().iter().all(|v| *v >= 0.0));

    match &a.diagnostics {
        Diagnostics::Stl(d) => {
            assert_eq!(d.parameters.period, 8760);
            assert!(d.parameters.trend > d.parameters.period && d.parameters.trend % 2 == 1);
            assert!((0.0..=1.0).contains(&d.quality_score));
        }
        other => panic!("expected STL diagnostics, got {other:?}"),
    }
}

#[test]
fn different_seeds_give_different_noise() {
    let inputs = common::three_year_inputs(&TARGETS);
    let a = runner().run(&common::stl_config(2025, 2026, 1), &inputs).expect("seed 1");
    let b = runner().run(&common::stl_config(2025, 2026, 2), &inputs).expect("seed 2");
    assert_ne!(a.table, b.table);
}

#[test]
fn improved_preset_ramps_load_factor() {
    let mut cfg = common::stl_config(2025, 2027, 5);
    cfg.load_factor.enabled = true;
    cfg.load_factor.target_fiscal_year = 2027;
    cfg.load_factor.improvement_percent = 10.0;
    let targets = [(2025, 9.0e6), (2026, 9.5e6), (2027, 1.0e7)];
    let outcome = runner()
        .run(&cfg, &common::three_year_inputs(&targets))
        .expect("run should succeed");

    assert_eq!(
        outcome.reshaping.iter().map(|r| r.fiscal_year).collect::<Vec<_>>(),
        vec![2026, 2027]
    );
    for step in &outcome.reshaping {
        assert!(step.load_factor_after + 1e-9 >= step.load_factor_before, "{step:?}");
        assert!(step.load_factor_after <= 0.95 + 1e-9);
    }
    for (fy, target) in targets {
        let total = outcome.table.year_total(fy);
        assert!(common::rel_diff(total, target) < 0.005, "FY{fy}: {total}");
    }
}
