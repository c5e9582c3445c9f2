//! Entry point for the command-line interface.
#![forbid(unsafe_code)]

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    if let Err(err) = geotiles_cli::run() {
        eprintln!("geotiles: {}", geotiles_cli::render_error_chain(&err));
        std::process::exit(1);
    }
}
