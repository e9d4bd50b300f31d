fn main() {
    if let Err(err) = kbchat::cli::main() {
        eprintln!("❌ {err}");
        std::process::exit(1);
    }
}
