use std::process::ExitCode;

use mbc_solver::{BeamElement, ElementSpec, Error, Node, status_code};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn usage() {
    eprintln!("usage: mbc-cli <history.json>");
}

#[derive(Debug, Deserialize)]
struct NodeInput {
    id: i32,
    coords: [f64; 3],
    #[serde(default = "default_ndof")]
    ndof: usize,
}

fn default_ndof() -> usize {
    6
}

/// One prescribed displacement increment, applied `repeat` times.
#[derive(Debug, Deserialize)]
struct StepInput {
    node: i32,
    dof: usize,
    increment: f64,
    #[serde(default = "one")]
    repeat: usize,
    /// Element updates per increment before the commit
    #[serde(default = "one")]
    iterations: usize,
}

fn one() -> usize {
    1
}

#[derive(Debug, Deserialize)]
struct History {
    element: ElementSpec,
    nodes: [NodeInput; 2],
    steps: Vec<StepInput>,
}

#[derive(Debug, Serialize)]
struct StepReport {
    step: usize,
    status: i32,
    basic_force: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct Report {
    generated_at: String,
    element: i32,
    completed: bool,
    steps: Vec<StepReport>,
}

/// Run every increment as update → commit; the first failure is reverted
/// and ends the replay.
fn replay(history: &History) -> Result<Report, Error> {
    let mut element = history.element.build()?;
    let mut nodes: Vec<Node> = history
        .nodes
        .iter()
        .map(|n| Node::new(n.id, n.coords[0], n.coords[1], n.coords[2], n.ndof))
        .collect();
    element.set_domain(&nodes[0], &nodes[1])?;

    let mut steps = Vec::new();
    let mut completed = true;
    'history: for input in &history.steps {
        let Some(target) = nodes.iter().position(|n| n.id == input.node) else {
            return Err(Error::Config(format!("step refers to unknown node {}", input.node)));
        };
        if input.dof >= nodes[target].get_number_dof() {
            return Err(Error::Config(format!(
                "node {} has no DOF {}",
                input.node, input.dof
            )));
        }
        for _ in 0..input.repeat {
            nodes[target].incr_trial_disp_dof(input.dof, input.increment);
            let mut result = Ok(());
            for _ in 0..input.iterations.max(1) {
                result = element.update(&nodes[0], &nodes[1]);
                if result.is_err() {
                    break;
                }
            }
            let status = status_code(&result);
            match result {
                Ok(()) => {
                    element.commit_state()?;
                    nodes.iter_mut().for_each(Node::commit_state);
                    steps.push(StepReport {
                        step: steps.len() + 1,
                        status,
                        basic_force: element.basic_force()?.iter().copied().collect(),
                        error: None,
                    });
                }
                Err(err) => {
                    warn!(error = %err, "step failed, reverting to last commit");
                    element.revert_to_last_commit()?;
                    nodes.iter_mut().for_each(Node::revert_to_last_commit);
                    steps.push(StepReport {
                        step: steps.len() + 1,
                        status,
                        basic_force: element.basic_force()?.iter().copied().collect(),
                        error: Some(err.to_string()),
                    });
                    completed = false;
                    break 'history;
                }
            }
        }
    }
    info!(element = element.tag(), steps = steps.len(), completed, "replay finished");

    Ok(Report {
        generated_at: chrono::Utc::now().to_rfc3339(),
        element: element.tag(),
        completed,
        steps,
    })
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        usage();
        return ExitCode::from(2);
    }

    let history: History = match std::fs::read_to_string(&args[1])
        .map_err(Error::from)
        .and_then(|text| serde_json::from_str(&text).map_err(Error::from))
    {
        Ok(history) => history,
        Err(err) => {
            eprintln!("input error: {err}");
            return ExitCode::from(1);
        }
    };

    let report = match replay(&history) {
        Ok(report) => report,
        Err(err) => {
            eprintln!("replay error: {err}");
            return ExitCode::from(1);
        }
    };
    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(err) => {
            eprintln!("output error: {err}");
            return ExitCode::from(1);
        }
    }
    if report.completed {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(steps: &str) -> History {
        serde_json::from_str(&format!(
            r#"{{
                "element": {{
                    "type": "mixed",
                    "tag": 1,
                    "nodes": [1, 2],
                    "section": {{ "type": "elastic", "ea": 1e6, "eiz": 1e5, "eiy": 1e5, "gj": 5e4 }}
                }},
                "nodes": [
                    {{ "id": 1, "coords": [0.0, 0.0, 0.0] }},
                    {{ "id": 2, "coords": [100.0, 0.0, 0.0] }}
                ],
                "steps": {steps}
            }}"#
        ))
        .unwrap()
    }

    #[test]
    fn replays_rotation_history() {
        let report = replay(&history(
            r#"[{ "node": 2, "dof": 5, "increment": 0.0002, "repeat": 5 }]"#,
        ))
        .unwrap();
        assert!(report.completed);
        assert_eq!(report.steps.len(), 5);
        let last = &report.steps[4].basic_force;
        assert!((last[2] - 4.0).abs() < 1e-6);
        assert!(report.steps.iter().all(|s| s.status == 0));
    }

    #[test]
    fn unknown_node_is_rejected() {
        let err = replay(&history(r#"[{ "node": 7, "dof": 0, "increment": 1.0 }]"#)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
