use clap::Parser;
use folio::{
    AssemblyConfiguration, ContextError, MergeFailurePolicy, MergeSpec, Merger, Overlay,
    PageRange, Rotation,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, long_about = None)]
struct CliArguments {
    /// The inputs in output order, each as `file.pdf` or `file.pdf:range` where the range
    /// is a page number such as `3` or a span such as `2-5`
    #[arg(short = 'i', long = "input", value_name = "file[:range]", required = true)]
    inputs: Vec<String>,
    #[arg(short = 'o', long = "output", value_name = "file_path")]
    output_file_path: PathBuf,
    #[arg(short = 'c', long = "configuration", value_name = "json_file")]
    configuration_path: Option<PathBuf>,
    /// Aborts on the first unreadable input or invalid range instead of skipping it
    #[arg(long = "fail-fast")]
    fail_fast: bool,
    #[arg(short = 'w', long = "watermark")]
    watermark: Option<String>,
    /// Display rotation applied to every page of the output, in degrees
    #[arg(short = 'r', long = "rotation")]
    rotation: Option<i64>,
}

fn main() {
    if let Err(error) = fallible_main() {
        log::error!("{}", error);
        std::process::exit(1);
    }
}

/// Splits `file.pdf:2-5` into the path and the page range, the whole document if there is no range.
fn parse_input(input: &str) -> Result<(PathBuf, PageRange), ContextError> {
    match input.rsplit_once(':') {
        Some((path, range)) if !range.contains(['/', '\\']) => {
            Ok((PathBuf::from(path), range.parse::<PageRange>()?))
        }
        _ => Ok((PathBuf::from(input), PageRange::All)),
    }
}

fn fallible_main() -> Result<(), ContextError> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .init();
    let arguments = CliArguments::parse();
    log::debug!("{:?}", arguments);

    let configuration = match &arguments.configuration_path {
        Some(configuration_path) => AssemblyConfiguration::from_path(configuration_path)?,
        None => AssemblyConfiguration::default(),
    };
    let merger = if arguments.fail_fast {
        Merger::new(MergeFailurePolicy::FailFast)
    } else {
        Merger::from_configuration(&configuration)
    };

    let mut merge_spec = MergeSpec::new();
    for input in &arguments.inputs {
        let (path, page_range) = parse_input(input)?;
        merge_spec = merge_spec.with_entry(path, page_range);
    }
    let mut outcome = merger.merge(&merge_spec)?;
    for diagnostic in &outcome.diagnostics {
        log::info!("The input {:?} was left out", arguments.inputs[diagnostic.entry_index]);
    }

    if let Some(rotation) = arguments.rotation {
        outcome.document.set_rotation(Rotation::try_from(rotation)?)?;
    }
    if let Some(watermark) = &arguments.watermark {
        // The warnings are logged as they are raised
        outcome
            .document
            .apply_overlay(&Overlay::watermark(watermark.clone()))?;
    }
    outcome.document.save(&arguments.output_file_path)?;
    log::info!(
        "Saved {} pages to the path: {:?}",
        outcome.document.page_count(),
        arguments.output_file_path
    );

    Ok(())
}
