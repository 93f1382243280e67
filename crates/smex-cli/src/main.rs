use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use smex_core::{CancellationToken, ProcessControl, ProcessOptions};

#[derive(Parser)]
#[command(
    name = "smex-rs",
    version,
    about = "Snapchat Memories Export Helper - recover creation dates and sort exported media"
)]
struct Cli {
    /// Root directory of the exported media files (a writable working copy
    /// unless --stage-copy is given)
    input: PathBuf,

    /// Output directory for the sorted buckets
    #[arg(short, long)]
    output: PathBuf,

    /// Path to memories_history.json
    #[arg(long)]
    memories_history: PathBuf,

    /// Path to chat_history.json (optional second record source)
    #[arg(long)]
    chat_history: Option<PathBuf>,

    /// Copy the input tree into <output>/staging first and process the copy,
    /// leaving the original export untouched
    #[arg(long)]
    stage_copy: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let t_total = Instant::now();

    let input = if cli.stage_copy {
        let staged = cli.output.join("staging");
        eprintln!("Staging a writable copy of {} ...", cli.input.display());
        smex_core::relocate::stage_copy(&cli.input, &staged)?;
        staged
    } else {
        cli.input
    };

    let options = ProcessOptions {
        input,
        output: cli.output,
        memories_history: cli.memories_history,
        chat_history: cli.chat_history,
    };

    let token = CancellationToken::new();
    {
        let token = token.clone();
        ctrlc::set_handler(move || token.cancel())?;
    }
    let control = ProcessControl {
        cancel_token: Some(token),
    };

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40}] {pos}/{len} {msg}")
            .unwrap(),
    );

    let result = smex_core::process_with_control(&options, &control, &{
        let pb = pb.clone();
        move |stage: &str, current: u64, total: u64, message: &str| {
            if pb.length() != Some(total) {
                pb.set_length(total);
            }
            pb.set_position(current);
            pb.set_message(format!("{stage}: {message}"));
        }
    })?;
    pb.finish_and_clear();

    eprintln!(
        "Done! {} files: {} found, {} not found, {} manual check, {} passed, {} skipped, {} errors ({:.2}s)",
        result.total_files,
        result.found,
        result.not_found,
        result.manual(),
        result.passed,
        result.skipped_noise,
        result.errors,
        t_total.elapsed().as_secs_f64()
    );
    if !result.warnings.is_empty() {
        eprintln!("{} file(s) failed; see the log above.", result.warnings.len());
    }

    Ok(())
}
