pub mod fetch;
pub mod status;

use std::path::PathBuf;

use anyhow::Result;
use chrono::Datelike;
use clap::Args;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use highrate_cddis::{RequestSpec, RetrievalRequest};

/// Request selection shared by `fetch` and `status`
#[derive(Args, Debug, Clone)]
pub struct RequestArgs {
    /// Station code (e.g. BRST00FRA); omit or "all" for every station
    #[arg(short, long, default_value = "")]
    pub station: String,

    /// Year (default: current year)
    #[arg(short, long)]
    pub year: Option<i32>,

    /// Day of year: 300, 300-305 or all
    #[arg(short, long)]
    pub doy: String,

    /// Hours: 00, 00-05; omit for all 24
    #[arg(long, default_value = "")]
    pub hours: String,

    /// Remote subfolder (default: two-digit year + "d", e.g. 24d)
    #[arg(long)]
    pub subfolder: Option<String>,

    /// Decompress .crx.gz to .crx
    #[arg(short = 'x', long)]
    pub extract: bool,

    /// Convert .crx to .rnx with CRX2RNX (implies --extract)
    #[arg(short, long)]
    pub convert: bool,

    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl RequestArgs {
    /// Validate into an engine request
    pub fn request(&self) -> Result<RetrievalRequest> {
        let spec = RequestSpec {
            station: self.station.clone(),
            year: self.year.unwrap_or_else(|| chrono::Local::now().year()),
            days: self.doy.clone(),
            subfolder: self.subfolder.clone().unwrap_or_default(),
            hours: self.hours.clone(),
            extract: self.extract,
            convert: self.convert,
        };
        Ok(RetrievalRequest::try_from(spec)?)
    }
}

/// Table with the shared look, cyan headers
pub fn table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(headers.iter().map(|h| Cell::new(h).fg(Color::Cyan)));
    table
}

/// Print a key-value summary table on stderr
pub fn print_summary(title: &str, rows: &[(&str, String)]) {
    let mut table = table(&[title, "Value"]);
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    eprintln!("\n{table}");
}
