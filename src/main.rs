fn main() {
    if let Err(err) = topodesign::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
