use std::process;

fn main() {
    if let Err(e) = grgit::cli::run() {
        eprintln!("error: {:#}", e);
        process::exit(1);
    }
}
