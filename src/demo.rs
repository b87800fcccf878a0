// src/demo.rs

//! Demo flows for the CLI, backed by synthetic deterministic calculators.
//!
//! The real calculation routines are external programs; these stand-ins
//! produce plausible, reproducible numbers from a few fields of the input
//! structure so that every flow shape can be exercised end to end.

use serde_json::{Value, json};

use crate::cli::DemoKind;
use crate::config::ConfigFile;
use crate::dag::{Flow, Input, Job, JobInputs, Node, fn_callable};
use crate::errors::Result;
use crate::makers::{
    CalculationKind, Calculators, HighThroughputZtMaker, MakeContext, NodeBuilder, ScreeningMaker,
};

/// Temperatures (K) the synthetic transport and phonon models report on.
fn temperatures() -> Vec<f64> {
    (0..14).map(|i| 100.0 + 50.0 * i as f64).collect()
}

fn structure_field(inputs: &JobInputs, field: &str, default: f64) -> f64 {
    inputs
        .get("structure")
        .and_then(|s| s.get(field))
        .and_then(Value::as_f64)
        .unwrap_or(default)
}

fn formula(inputs: &JobInputs) -> String {
    inputs
        .get("structure")
        .and_then(|s| s.get("formula"))
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string()
}

fn espresso(inputs: JobInputs) -> anyhow::Result<Value> {
    let calculation = inputs.str("calculation")?.to_string();
    let structure = inputs.require("structure")?.clone();
    let gap = structure_field(&inputs, "gap", 1.1);
    let lattice = structure_field(&inputs, "lattice", 5.43);

    let band_gap = match calculation.as_str() {
        "bands" => json!(gap),
        _ => Value::Null,
    };

    Ok(json!({
        "structure": structure,
        "dir_name": format!("calc/{}/{}", formula(&inputs), calculation),
        "energy": -7.9 * lattice,
        "calculation_type": calculation,
        "band_gap": band_gap,
        "prev_dir": inputs.get("prev_dir").cloned().unwrap_or(Value::Null),
    }))
}

fn relax(inputs: JobInputs) -> anyhow::Result<Value> {
    let mut structure = inputs.require("structure")?.clone();
    if let Value::Object(map) = &mut structure {
        map.insert("relaxed".to_string(), json!(true));
    }
    Ok(json!({
        "structure": structure,
        "dir_name": format!("calc/{}/relax", formula(&inputs)),
    }))
}

fn phonon(inputs: JobInputs) -> anyhow::Result<Value> {
    let scale = structure_field(&inputs, "kappa_scale", 0.01);
    let temps = temperatures();
    let kappa: Vec<f64> = temps.iter().map(|t| scale * 300.0 / t).collect();
    Ok(json!({
        "temperatures": temps,
        "thermal_conductivity_phononic": kappa,
    }))
}

fn transport(_inputs: JobInputs) -> anyhow::Result<Value> {
    let temps = temperatures();
    let seebeck: Vec<f64> = temps.iter().map(|t| 100.0 * t / 300.0).collect();
    let sigma: Vec<f64> = temps.iter().map(|t| 1e5 / t).collect();
    let kappa_el: Vec<f64> = temps
        .iter()
        .zip(&sigma)
        .map(|(t, s)| s * 2.44e-8 * t)
        .collect();
    Ok(json!({
        "temperatures": temps,
        "seebeck_coefficient": seebeck,
        "electrical_conductivity": sigma,
        "electronic_thermal_conductivity": kappa_el,
    }))
}

fn numbers(value: &Value, field: &str) -> anyhow::Result<Vec<f64>> {
    value
        .get(field)
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow::anyhow!("missing numeric list '{field}'"))?
        .iter()
        .map(|v| {
            v.as_f64()
                .ok_or_else(|| anyhow::anyhow!("non-numeric entry in '{field}'"))
        })
        .collect()
}

/// ZT = S²σT/κ with S converted from µV/K.
fn figure_of_merit(inputs: JobInputs) -> anyhow::Result<Value> {
    let transport = inputs.require("transport_props")?;
    let phonon = inputs.require("phonon_props")?;

    let temps = numbers(transport, "temperatures")?;
    let seebeck = numbers(transport, "seebeck_coefficient")?;
    let sigma = numbers(transport, "electrical_conductivity")?;
    let kappa_el = numbers(transport, "electronic_thermal_conductivity")?;
    let kappa_ph = numbers(phonon, "thermal_conductivity_phononic")?;

    let mut zt = Vec::with_capacity(temps.len());
    for i in 0..temps.len() {
        let s = seebeck[i] * 1e-6;
        let kappa = kappa_el[i] + kappa_ph.get(i).copied().unwrap_or(0.0);
        zt.push(s * s * sigma[i] * temps[i] / kappa);
    }

    let (best, max_zt) = zt
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::MIN), |acc, (i, v)| if v > acc.1 { (i, v) } else { acc });

    Ok(json!({
        "temperatures": temps,
        "zt_values": zt,
        "max_zt": max_zt,
        "optimal_temperature": temps.get(best).copied().unwrap_or(0.0),
    }))
}

/// Calculators for every `CalculationKind`, all deterministic.
pub fn synthetic_calculators() -> Calculators {
    Calculators::new()
        .with(CalculationKind::Espresso, fn_callable("synthetic espresso", espresso))
        .with(CalculationKind::Relax, fn_callable("synthetic relax", relax))
        .with(CalculationKind::Phonon, fn_callable("synthetic phonon", phonon))
        .with(CalculationKind::Transport, fn_callable("synthetic transport", transport))
        .with(
            CalculationKind::FigureOfMerit,
            fn_callable("synthetic zt", figure_of_merit),
        )
}

/// Build the requested demo flow.
pub fn build(kind: DemoKind, cfg: &ConfigFile, ctx: &MakeContext) -> Result<Flow> {
    match kind {
        DemoKind::Chain => Ok(chain_flow()),
        DemoKind::Screening => screening_flow(cfg.screening.threshold),
        DemoKind::Zt => zt_flow(cfg.screening.threshold, ctx),
    }
}

/// `A` yields 10, `B` doubles it; the flow outputs `{ "result": 20 }`.
pub fn chain_flow() -> Flow {
    let a = Job::new("A", fn_callable("value", |_| Ok(json!(10))));
    let b = Job::new(
        "B",
        fn_callable("double", |inputs: JobInputs| Ok(json!(inputs.f64("x")? * 2.0))),
    )
    .with_input("x", a.output());

    Flow::new("chain")
        .with_output("result", b.output())
        .with_nodes([a, b])
}

/// Three scored candidates; the passing ones get a follow-up job.
pub fn screening_flow(threshold: f64) -> Result<Flow> {
    let candidates: Vec<Input> = [("alpha", 0.3), ("beta", 0.6), ("gamma", 0.8)]
        .into_iter()
        .map(|(name, score)| Input::literal(json!({ "name": name, "score": score })))
        .collect();

    let scorer: NodeBuilder = std::sync::Arc::new(|index: usize, candidate: Input| -> Result<Node> {
        Ok(Job::new(
            format!("score_{index}"),
            fn_callable("score", |inputs: JobInputs| {
                Ok(inputs
                    .require("candidate")?
                    .get("score")
                    .cloned()
                    .unwrap_or(Value::Null))
            }),
        )
        .with_input("candidate", candidate)
        .into())
    });

    let expander: NodeBuilder = std::sync::Arc::new(|index: usize, candidate: Input| -> Result<Node> {
        Ok(Job::new(
            format!("refine_{index}"),
            fn_callable("refine", |inputs: JobInputs| {
                let candidate = inputs.require("candidate")?;
                Ok(json!({
                    "name": candidate.get("name").cloned().unwrap_or(Value::Null),
                    "refined_score": candidate.get("score").and_then(Value::as_f64).unwrap_or(0.0) * 1.1,
                }))
            }),
        )
        .with_input("candidate", candidate)
        .into())
    });

    ScreeningMaker::new("screening", threshold, scorer, expander).make_flow(candidates)
}

/// High-throughput ZT screening over three synthetic structures.
pub fn zt_flow(threshold: f64, ctx: &MakeContext) -> Result<Flow> {
    let structures = vec![
        Input::literal(json!({ "formula": "Bi2Te3", "lattice": 10.4, "kappa_scale": 0.005 })),
        Input::literal(json!({ "formula": "PbTe", "lattice": 6.46, "kappa_scale": 0.008 })),
        Input::literal(json!({ "formula": "Si", "lattice": 5.43, "kappa_scale": 0.05 })),
    ];

    HighThroughputZtMaker::default()
        .with_threshold(threshold)
        .make_flow(structures, ctx)
}
