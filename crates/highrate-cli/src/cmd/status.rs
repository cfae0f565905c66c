//! Status subcommand - what a request already has on disk
//!
//! Reads only the local output tree; never connects.

use anyhow::Result;
use clap::Args;
use comfy_table::Cell;
use highrate_cddis::{HourStatus, LocalLayout, RetrievalRequest, Stage, survey};

use super::{RequestArgs, print_summary, table};

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub request: RequestArgs,
}

pub fn run(args: StatusArgs, engine: &highrate_cddis::Config) -> Result<()> {
    let request = args.request.request()?;
    let root = args
        .request
        .output
        .clone()
        .unwrap_or_else(|| engine.output_dir.clone());
    let report = survey(&request, &LocalLayout::new(&root))?;

    let mut table = table(&["Station", "DOY", "Hour", "Files", "Stage", "Status"]);
    for hour in &report {
        table.add_row(vec![
            Cell::new(&hour.station),
            Cell::new(&hour.day),
            Cell::new(&hour.hour),
            Cell::new(hour.files.len()),
            Cell::new(hour.stage().map_or("-", Stage::name)),
            Cell::new(verdict(hour, &request)),
        ]);
    }
    eprintln!("\n{table}");

    let done = report.iter().filter(|h| is_done(h, &request)).count();
    print_summary(
        "Local status",
        &[
            ("Root", root.display().to_string()),
            ("Request", request.to_string()),
            ("Complete", format!("{done}/{}", report.len())),
        ],
    );
    Ok(())
}

fn is_done(hour: &HourStatus, request: &RetrievalRequest) -> bool {
    hour.stage().is_some_and(|stage| stage >= request.target_stage())
}

fn verdict(hour: &HourStatus, request: &RetrievalRequest) -> &'static str {
    if hour.files.is_empty() {
        "missing"
    } else if is_done(hour, request) {
        "complete"
    } else {
        "pending"
    }
}
