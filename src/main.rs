use std::process::ExitCode;

use pinentry_term::app;

fn main() -> ExitCode {
    match app::run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("pinentry-term: {err:#}");
            ExitCode::from(app::EXIT_ERROR)
        }
    }
}
