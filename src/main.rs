//! workflow CLI binary
//!
//! Minimal entrypoint; all logic lives in the library.

fn main() {
    // cli::run() handles ALL output including errors
    if let Err(code) = ace_workflow::cli::run() {
        std::process::exit(code.as_i32());
    }
}
