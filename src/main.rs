fn main() {
    if let Err(err) = metadata_template::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
