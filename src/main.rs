use workshed::exec::ExitCodeError;
use workshed::{cli, telemetry};

fn main() {
    telemetry::init();

    if let Err(err) = cli::run() {
        // Child exit codes pass through untouched; the child already wrote
        // its own output.
        if let Some(ExitCodeError(code)) = err.downcast_ref::<ExitCodeError>() {
            std::process::exit(*code);
        }
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}
