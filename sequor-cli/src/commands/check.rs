//! Check the validity of a sequence file.

use sequor_core::seq::SequenceDefinition;
use std::path::Path;
use std::process::ExitCode;

/// Validate a sequence file and report the result.
///
/// Exit code 0 when the file is valid, 2 otherwise.
pub fn run(file: &str) -> ExitCode {
    let path = Path::new(file);
    let sequence = match SequenceDefinition::from_file(path) {
        Ok(sequence) => sequence,
        Err(err) => {
            eprintln!("error: {}", err);
            return ExitCode::from(2);
        }
    };

    match sequence.validate() {
        Ok(()) => {
            println!(
                "Sequence file is valid: '{}' ({} nodes)",
                sequence.name,
                sequence.nodes.len()
            );
            ExitCode::SUCCESS
        }
        Err(errors) => {
            eprintln!(
                "Sequence file is not valid: {} error(s) found",
                errors.len()
            );
            for error in errors {
                eprintln!("  - {}", error);
            }
            ExitCode::from(2)
        }
    }
}
