use anyhow::Result;
use clap::{Parser, Subcommand};
use rcollect::{load_tasks_file, Collector, RunReport, StopFlag, Vocabulary};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "rcollect", about = "Resumable, rate-limited Reddit topic collector")]
struct Cli {
    /// Directory holding the record log, checkpoint and exports
    #[arg(long, env = "RCOLLECT_OUT_DIR", default_value = "optimus_data", global = true)]
    out_dir: PathBuf,

    /// JSON task list ([{"community","query","limit"}]); built-in plan if omitted
    #[arg(long, env = "RCOLLECT_TASKS", global = true)]
    tasks: Option<PathBuf>,

    /// Newline-separated signal vocabulary; built-in terms if omitted
    #[arg(long, env = "RCOLLECT_VOCABULARY", global = true)]
    vocabulary: Option<PathBuf>,

    /// Seconds to wait between searches
    #[arg(long, env = "RCOLLECT_INTER_TASK_SECS", default_value_t = 180, global = true)]
    inter_task_secs: u64,

    /// Seconds to wait between pages of one search
    #[arg(long, env = "RCOLLECT_INTER_PAGE_SECS", default_value_t = 2, global = true)]
    inter_page_secs: u64,

    /// Seconds to wait before the next search after a rate-limit response
    #[arg(long, env = "RCOLLECT_BACKOFF_SECS", default_value_t = 300, global = true)]
    backoff_secs: u64,

    /// Rows in the sample export
    #[arg(long, default_value_t = 100, global = true)]
    sample_size: usize,

    /// Minimum combined-text length for a row to appear in the export
    #[arg(long, default_value_t = 30, global = true)]
    min_export_len: usize,

    /// Disable the progress bar
    #[arg(long, global = true)]
    no_progress: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Collect all configured searches, resuming if progress exists
    Run,
    /// Continue a previous run; fails if there is no progress to resume
    Resume,
    /// Show completed and remaining searches without fetching
    Status,
    /// Rebuild the CSV exports from the record log
    Export,
}

fn build_collector(cli: &Cli) -> Result<Collector> {
    let mut c = Collector::new()
        .out_dir(&cli.out_dir)
        .inter_task_delay(Duration::from_secs(cli.inter_task_secs))
        .inter_page_delay(Duration::from_secs(cli.inter_page_secs))
        .backoff_delay(Duration::from_secs(cli.backoff_secs))
        .sample_size(cli.sample_size)
        .min_export_len(cli.min_export_len)
        .progress(!cli.no_progress);
    if let Some(path) = &cli.tasks {
        c = c.tasks(load_tasks_file(path)?);
    }
    if let Some(path) = &cli.vocabulary {
        c = c.vocabulary(Vocabulary::from_file(path)?);
    }
    Ok(c)
}

fn install_interrupt_handler(stop: StopFlag) -> Result<()> {
    ctrlc::set_handler(move || {
        if stop.is_stopped() {
            eprintln!("\nSecond interrupt, exiting immediately.");
            std::process::exit(130);
        }
        eprintln!("\nInterrupt received: finishing the current step and saving progress...");
        stop.request_stop();
    })?;
    Ok(())
}

fn print_report(report: &RunReport) {
    println!();
    println!("Completed searches: {} (plus {} from earlier runs)", report.completed.len(), report.previously_completed.len());
    for t in &report.completed {
        println!("  done     {t}");
    }
    for s in &report.skipped {
        println!("  skipped  {} ({})", s.task, s.reason);
    }
    if let Some(t) = &report.interrupted_task {
        println!("  stopped  {t}");
    }
    for t in &report.not_started {
        println!("  pending  {t}");
    }
    println!(
        "Records: {} total, {} new this run, {} duplicates dropped",
        report.total_records, report.records_admitted, report.duplicates
    );
    if let Some(out) = &report.export {
        println!("Export: {} ({} rows)", out.combined_path.display(), out.rows);
        println!("Sample: {} ({} rows)", out.sample_path.display(), out.sample_rows);
    }
    if report.interrupted {
        println!("Run interrupted; `rcollect resume` continues from the last checkpoint.");
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let collector = build_collector(&cli)?;
    let stop = collector.stop_handle();

    match cli.command {
        Command::Run => {
            install_interrupt_handler(stop)?;
            print_report(&collector.run()?);
        }
        Command::Resume => {
            install_interrupt_handler(stop)?;
            print_report(&collector.resume()?);
        }
        Command::Status => {
            let st = collector.status()?;
            println!("Output: {}", collector.options().out_dir.display());
            println!("Records: {}  Admitted keys: {}", st.records, st.keys);
            println!("Completed: {}", st.completed.len());
            for t in &st.completed {
                println!("  done     {t}");
            }
            for s in &st.skipped {
                println!("  skipped  {} ({})", s.task, s.reason);
            }
            println!("Remaining: {}", st.remaining.len());
            for t in &st.remaining {
                println!("  pending  {t}");
            }
        }
        Command::Export => {
            let out = collector.export()?;
            println!("Export: {} ({} rows)", out.combined_path.display(), out.rows);
            println!("Sample: {} ({} rows)", out.sample_path.display(), out.sample_rows);
        }
    }
    Ok(())
}
