//! Offline analysis: same pipeline as the upload endpoint, run against a
//! local file and written to disk instead of streamed to a browser.

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use leadlens_core::export::{
    write_detail_csv, write_summary_csv, DETAIL_FILE_NAME, SUMMARY_FILE_NAME,
};
use leadlens_core::{analyze_csv, Aggregation};

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Lead CSV to analyze (must carry a SORGENTE column)
    #[arg(long)]
    pub input: PathBuf,

    /// Directory the two report files are written into
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,

    /// How many terms to print in the ranking
    #[arg(long, default_value_t = 10)]
    pub top: usize,
}

pub fn run(args: &AnalyzeArgs) -> anyhow::Result<()> {
    let data = fs::read(&args.input)
        .with_context(|| format!("cannot read {}", args.input.display()))?;
    let aggregation = analyze_csv(&data)
        .with_context(|| format!("cannot analyze {}", args.input.display()))?;

    print_ranking(&aggregation, args.top);

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("cannot create {}", args.out_dir.display()))?;
    let summary_path = args.out_dir.join(SUMMARY_FILE_NAME);
    fs::write(&summary_path, write_summary_csv(&aggregation.summary)?)
        .with_context(|| format!("cannot write {}", summary_path.display()))?;
    let detail_path = args.out_dir.join(DETAIL_FILE_NAME);
    fs::write(&detail_path, write_detail_csv(&aggregation.detail)?)
        .with_context(|| format!("cannot write {}", detail_path.display()))?;

    println!("wrote {}", summary_path.display());
    println!("wrote {}", detail_path.display());
    Ok(())
}

fn print_ranking(aggregation: &Aggregation, top: usize) {
    println!(
        "{} rows read, {} with a utm_term, {} unique creatives",
        aggregation.counts.total_rows,
        aggregation.counts.rows_with_utm_term,
        aggregation.counts.unique_creatives
    );
    for entry in aggregation.summary.iter().take(top) {
        println!(
            "{:>6}  {}  ({})",
            entry.lead_count, entry.utm_term, entry.creative_name
        );
    }
}
