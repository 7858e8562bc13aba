use clap::Parser;
use folio::{
    AssemblyConfiguration, Compositor, ContextError, DocumentDescription, ErrorKind, HeaderFooter,
    Overlay,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, long_about = None)]
struct CliArguments {
    #[arg(short = 'd', long = "document", value_name = "json_file")]
    document_path: PathBuf,
    #[arg(short = 'c', long = "configuration", value_name = "json_file")]
    configuration_path: Option<PathBuf>,
    #[arg(short = 'o', long = "output", value_name = "file_path")]
    output_file_path: PathBuf,
    /// Stamps a diagonal watermark with the given text on every page
    #[arg(short = 'w', long = "watermark")]
    watermark: Option<String>,
    /// Draws a "Page N of M" footer, with the document title as header if it has one
    #[arg(long = "page-numbers")]
    page_numbers: bool,
    #[arg(long = "optimize")]
    optimize: bool,
}

fn main() {
    if let Err(error) = fallible_main() {
        log::error!("{}", error);
        std::process::exit(1);
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
    let description = DocumentDescription::from_path(&arguments.document_path)?;
    let document = description.to_document(&configuration)?;

    let mut compositor = Compositor::new(configuration)?;
    if arguments.page_numbers {
        let mut header_footer = HeaderFooter::new();
        if let Some(title) = &document.metadata().title {
            header_footer = header_footer.with_header(title.clone());
        }
        compositor = compositor.with_page_hook(header_footer);
    }
    if let Some(watermark) = &arguments.watermark {
        compositor = compositor.with_overlay(Overlay::watermark(watermark.clone()));
    }

    let mut composition = compositor.compose(&document).map_err(|error| {
        ContextError::with_error(error.kind, "Failed to render the document", &error)
    })?;
    if !composition.warnings.is_empty() {
        log::info!("The document was rendered with {} warnings", composition.warnings.len());
    }
    if arguments.optimize {
        composition.document.optimize();
    }
    composition
        .document
        .save(&arguments.output_file_path)
        .map_err(|error| {
            ContextError::with_error(ErrorKind::Resource, "Failed to save the output file", &error)
        })?;
    log::info!(
        "Saved {} pages to the path: {:?}",
        composition.document.page_count(),
        arguments.output_file_path
    );

    Ok(())
}
