//! `gtfs-e2e plan`: show dependencies and what an isolated run would execute

use clap::Args;
use gtfs_e2e::{E2eError, RunMode, Suite};
use serde::Serialize;

use super::SuiteArgs;
use crate::output::{self, OutputFormat, TableDisplay};

#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub suite: SuiteArgs,
}

#[derive(Debug, Serialize)]
pub struct PlanRow {
    pub name: String,
    pub depends_on: Vec<String>,
    pub closure: Vec<String>,
    /// `run` or `skip` under isolation; absent otherwise
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isolated: Option<&'static str>,
}

impl TableDisplay for PlanRow {
    fn headers() -> Vec<&'static str> {
        vec!["Test", "Depends on", "Closure", "Isolated"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.depends_on.join(", "),
            self.closure.join(", "),
            self.isolated.unwrap_or("-").to_string(),
        ]
    }
}

pub fn plan(suite: &Suite, mode: &RunMode) -> Result<Vec<PlanRow>, E2eError> {
    let isolated = match mode {
        RunMode::All => None,
        RunMode::Isolate(target) => {
            if !suite.contains(target) {
                return Err(E2eError::UnknownTest(target.clone()));
            }
            Some((target.as_str(), suite.graph().closure(target)))
        }
    };

    let rows = suite
        .cases()
        .iter()
        .map(|case| PlanRow {
            name: case.name().to_string(),
            depends_on: case.dependencies().to_vec(),
            closure: suite.graph().closure(case.name()).into_iter().collect(),
            isolated: isolated.as_ref().map(|(target, closure)| {
                if case.name() == *target || closure.contains(case.name()) {
                    "run"
                } else {
                    "skip"
                }
            }),
        })
        .collect();
    Ok(rows)
}

pub async fn execute(args: PlanArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = args.suite.load_config()?;
    let suite = args.suite.load_suite(&config)?;

    for problem in suite.ordering_problems() {
        output::print_warning(&problem);
    }

    let rows = plan(&suite, &config.run_mode())?;
    output::print_list(&rows, format);
    Ok(())
}
