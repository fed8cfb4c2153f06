//! stencil's main application entry point.
//! Parses the command line, prepares the output directory and hands the run
//! to the generator.

use std::sync::Arc;

use stencil::{
    cli::{get_args, Args},
    error::Result,
    generator::Generator,
    logger::{init_logger, Logger},
    processor::ensure_output_dir,
    prompt::{DialoguerPrompter, Prompter, SerializedPrompter},
};

/// Main application entry point.
fn main() {
    let args = get_args();
    init_logger(args.verbose);

    if let Err(err) = run(args) {
        eprintln!("Error: {:#}", anyhow::Error::new(err));
        std::process::exit(1);
    }
}

/// Main application logic execution.
///
/// # Flow
/// 1. Builds the run options from the arguments and `STENCIL_*` variables
/// 2. Checks the output directory
/// 3. Generates the template and its dependencies
/// 4. Optionally writes the output manifest
fn run(args: Args) -> Result<()> {
    let options = args.to_options(std::env::vars())?;
    ensure_output_dir(&options.output_folder, args.force)?;

    let prompter: Arc<dyn Prompter> = Arc::new(SerializedPrompter::new(DialoguerPrompter::new()));
    let generator = Generator::new(&options, prompter, Logger::new())?;
    let result = generator.run(&options);

    if let Some(manifest_file) = &args.manifest_file {
        generator.manifest().write_json(manifest_file)?;
    }

    let files = result?;
    println!(
        "Template generation completed successfully in {} ({} file(s)).",
        options.output_folder.display(),
        files.len()
    );
    Ok(())
}
