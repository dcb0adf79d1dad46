//! `gtfs-e2e stop`: terminate a helper recorded in a pid file

use std::path::PathBuf;

use clap::Args;
use gtfs_e2e::helper::stop_helper;

use crate::output;

#[derive(Args, Debug)]
pub struct StopArgs {
    /// Helper name, e.g. `coverage-collector`
    pub name: String,

    /// Directory holding the pid files
    #[arg(long, default_value = "test-results/pids")]
    pub pid_dir: PathBuf,
}

pub async fn execute(args: StopArgs) -> anyhow::Result<()> {
    let pid = stop_helper(&args.pid_dir, &args.name)?;
    output::print_success(&format!("Stopped {} (pid: {})", args.name, pid));
    Ok(())
}
