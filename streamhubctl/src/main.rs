use clap::Parser;

fn main() {
    let cli = streamhubctl::Cli::parse();
    if let Err(err) = streamhubctl::run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
