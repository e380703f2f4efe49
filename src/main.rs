fn main() {
    if let Err(err) = smart_columns::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
