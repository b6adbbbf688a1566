use std::process::ExitCode;

fn main() -> ExitCode {
    specbridge_cli::run()
}
